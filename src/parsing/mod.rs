/*!
# Parsing module
Contains the logic for parsing input files into meaningful structs / data.
*/
/// Decoder for NDJSON variant records
pub mod json_decoder;
/// Allele trimming into minimal representation
pub mod normalizer;
/// Builds side stores from population-frequency and custom annotation files
pub mod side_store_loader;
/// Line-level VCF decoding
pub mod vcf_decoder;
/// Batch decoding with breakend reconciliation, plus input opening
pub mod variant_decoder;
