/// Per-worker decode, normalize, and annotate pipeline
pub mod annotation_task;
/// The annotation sources and the chain that runs them
pub mod annotators;
/// Concurrent batch runner with ordered output and a single drain step
pub mod batch_runner;
/// Term-level comparison of two annotation sources
pub mod benchmark_comparator;
/// Pairs breakend mates across concurrent workers
pub mod breakend_reconciler;
/// Command line interface functionality
pub mod cli;
/// Contains various shared data types
pub mod data_types;
/// Tooling for parsing input files into meaningful structs / data
pub mod parsing;
/// Haplotype-aware filtering of side store hits
pub mod phase_filter;
/// Key-value stores of precomputed annotation fragments
pub mod side_store;
/// Various utility functions that tend to be very generic
pub mod util;
/// All output writers
pub mod writers;
