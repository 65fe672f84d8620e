/*!
# Writers module
Contains the logic for writing the output files for the annotate and benchmark commands.
*/
/// Streams annotated variants to NDJSON
pub mod annotation_writer;
/// Generates the per-source term listings and conflicting annotations
pub mod benchmark_diff;
/// Generates the summary file and per-term counts
pub mod summary;
