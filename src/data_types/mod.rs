
/// Consequence annotation model: SO terms, consequences, population frequencies
pub mod annotation;
/// Running totals for annotator benchmarking
pub mod benchmark_totals;
/// Per-variant comparison results
pub mod comparison;
/// Confidence intervals for structural events
pub mod structural_variant;
/// Variant records and eligibility rules
pub mod variants;
