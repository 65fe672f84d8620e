/*!
# CLI module
Command line interface functionality that is specific to Vannot.
*/

/// The main CLI module that contains the top-level CLI parser and help text
pub mod core;
/// The annotate CLI subcommand
pub mod annotate;
/// The benchmark CLI subcommand
pub mod benchmark;
