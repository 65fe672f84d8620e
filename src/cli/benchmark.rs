use anyhow::bail;
use clap::Args;
use log::info;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::core::{check_required_filename, AFTER_HELP, FULL_VERSION};

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about,
    after_help = &**AFTER_HELP
)]
pub struct BenchmarkSettings {
    #[clap(default_value = "")]
    #[clap(hide = true)]
    vannot_version: String,

    /// Annotated variants from the first source (NDJSON)
    #[clap(required = true)]
    #[clap(short = 'a')]
    #[clap(long = "annotations-a")]
    #[clap(value_name = "JSON")]
    #[clap(help_heading = Some("Input/Output"))]
    pub annotations_a: PathBuf,

    /// Annotated variants from the second source (NDJSON), same variants in the same order
    #[clap(required = true)]
    #[clap(short = 'b')]
    #[clap(long = "annotations-b")]
    #[clap(value_name = "JSON")]
    #[clap(help_heading = Some("Input/Output"))]
    pub annotations_b: PathBuf,

    /// Label for the first source, used in output file names
    #[clap(long = "label-a")]
    #[clap(value_name = "LABEL")]
    #[clap(help_heading = Some("Input/Output"))]
    #[clap(default_value = "a")]
    pub label_a: String,

    /// Label for the second source, used in output file names
    #[clap(long = "label-b")]
    #[clap(value_name = "LABEL")]
    #[clap(help_heading = Some("Input/Output"))]
    #[clap(default_value = "b")]
    pub label_b: String,

    /// Output directory containing the summary and difference files
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output-dir")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_folder: PathBuf,

    /// Optional output debug folder
    #[clap(long = "output-debug")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub debug_folder: Option<PathBuf>,

    /// Keeps regulatory terms in the comparison instead of ignoring them
    #[clap(long = "include-regulatory")]
    #[clap(help_heading = Some("Compare parameters"))]
    pub include_regulatory: bool,

    /// Number of threads to use in the comparison step
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

/// Labels end up in file names, so keep them to a safe character set
fn is_valid_label(label: &str) -> bool {
    !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

pub fn check_benchmark_settings(mut settings: BenchmarkSettings) -> anyhow::Result<BenchmarkSettings> {
    // hard code the version in
    settings.vannot_version = FULL_VERSION.clone();
    info!("Vannot version: {:?}", &settings.vannot_version);
    info!("Sub-command: benchmark");
    info!("Inputs:");

    check_required_filename(&settings.annotations_a, "Annotations A")?;
    check_required_filename(&settings.annotations_b, "Annotations B")?;
    info!("\tAnnotations A: {:?}", &settings.annotations_a);
    info!("\tAnnotations B: {:?}", &settings.annotations_b);

    info!("Outputs:");
    for label in [&settings.label_a, &settings.label_b] {
        if !is_valid_label(label) {
            bail!("Invalid label {label:?}, only alphanumeric characters and \"_-.\" are allowed");
        }
    }
    if settings.label_a == settings.label_b {
        bail!("--label-a and --label-b must be different");
    }
    info!("\tLabels: {:?} / {:?}", &settings.label_a, &settings.label_b);
    info!("\tOutput folder: {:?}", &settings.output_folder);
    if let Some(debug_folder) = settings.debug_folder.as_ref() {
        info!("\tDebug folder: {debug_folder:?}");
    }

    info!("Compare parameters:");
    info!("\tRegulatory terms: {}", if settings.include_regulatory { "INCLUDED" } else { "IGNORED" });

    if settings.threads == 0 {
        settings.threads = 1;
    }
    info!("Processing threads: {}", settings.threads);

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings(folder: &std::path::Path) -> BenchmarkSettings {
        let annotations_a = folder.join("a.json");
        let annotations_b = folder.join("b.json");
        std::fs::write(&annotations_a, "").unwrap();
        std::fs::write(&annotations_b, "").unwrap();
        BenchmarkSettings {
            annotations_a,
            annotations_b,
            label_a: "vep".to_string(),
            label_b: "cellbase".to_string(),
            output_folder: folder.join("out"),
            ..Default::default()
        }
    }

    #[test]
    fn test_check_benchmark_settings() {
        let folder = tempfile::tempdir().unwrap();
        let checked = check_benchmark_settings(base_settings(folder.path())).unwrap();
        assert_eq!(checked.threads, 1);
        assert!(!checked.vannot_version.is_empty());
    }

    #[test]
    fn test_bad_labels() {
        let folder = tempfile::tempdir().unwrap();

        let mut settings = base_settings(folder.path());
        settings.label_b = "vep".to_string();
        assert!(check_benchmark_settings(settings).is_err());

        let mut settings = base_settings(folder.path());
        settings.label_a = "../escape".to_string();
        assert!(check_benchmark_settings(settings).is_err());
    }
}
