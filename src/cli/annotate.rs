use anyhow::{bail, ensure};
use clap::Args;
use log::info;
use rustc_hash::FxHashSet as HashSet;
use serde::Serialize;
use std::path::PathBuf;
use strum_macros::EnumString;

use crate::cli::core::{check_optional_filename, check_required_filename, AFTER_HELP, FULL_VERSION};
use crate::parsing::variant_decoder::resolve_format;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, strum_macros::Display, EnumString, Serialize, clap::ValueEnum)]
pub enum InputFormat {
    /// Decided from the file extension
    #[default]
    #[strum(ascii_case_insensitive, serialize = "auto")]
    #[clap(name = "auto")]
    Auto,
    /// Tab-delimited variant calls
    #[strum(ascii_case_insensitive, serialize = "vcf")]
    #[clap(name = "vcf")]
    Vcf,
    /// One JSON variant record per line
    #[strum(ascii_case_insensitive, serialize = "json")]
    #[clap(name = "json")]
    Json
}

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about,
    after_help = &**AFTER_HELP
)]
pub struct AnnotateSettings {
    #[clap(default_value = "")]
    #[clap(hide = true)]
    vannot_version: String,

    /// Input variant file (VCF or NDJSON, optionally gzipped)
    #[clap(required = true)]
    #[clap(short = 'i')]
    #[clap(long = "input")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub input_filename: PathBuf,

    /// Format of the input file
    #[clap(long = "input-format")]
    #[clap(value_name = "FORMAT")]
    #[clap(help_heading = Some("Input/Output"))]
    #[clap(default_value_t = InputFormat::Auto)]
    pub input_format: InputFormat,

    /// Output annotated variants (NDJSON, gzipped if ending in .gz)
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output")]
    #[clap(value_name = "JSON")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_filename: PathBuf,

    /// Optional output debug folder
    #[clap(long = "output-debug")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub debug_folder: Option<PathBuf>,

    /// Precomputed consequence annotations (NDJSON) used by the local calculator
    #[clap(long = "annotation-cache")]
    #[clap(value_name = "JSON")]
    #[clap(help_heading = Some("Annotation sources"))]
    pub annotation_cache: Option<PathBuf>,

    /// Population frequencies (NDJSON of annotated variants) indexed into a side store
    #[clap(long = "population-frequencies")]
    #[clap(value_name = "JSON")]
    #[clap(help_heading = Some("Annotation sources"))]
    pub population_frequencies: Option<PathBuf>,

    /// Saves the population frequency side store after the run, including consumed entries
    #[clap(long = "save-population-store")]
    #[clap(value_name = "JSON")]
    #[clap(help_heading = Some("Annotation sources"))]
    pub population_store_out: Option<PathBuf>,

    /// Custom annotation file (VCF), may be repeated
    #[clap(long = "custom-file")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Annotation sources"))]
    pub custom_files: Vec<PathBuf>,

    /// Identifier for the corresponding custom file [default: "custom_#"]
    #[clap(long = "custom-id")]
    #[clap(value_name = "ID")]
    #[clap(help_heading = Some("Annotation sources"))]
    pub custom_ids: Vec<String>,

    /// Remote annotation web service host; enables the remote stage
    #[clap(long = "remote-url")]
    #[clap(value_name = "URL")]
    #[clap(help_heading = Some("Annotation sources"))]
    pub remote_url: Option<String>,

    /// API version of the remote annotation service
    #[clap(long = "remote-version")]
    #[clap(value_name = "VERSION")]
    #[clap(help_heading = Some("Annotation sources"))]
    #[clap(default_value = "v5")]
    pub remote_version: String,

    /// Species queried on the remote annotation service
    #[clap(long = "remote-species")]
    #[clap(value_name = "SPECIES")]
    #[clap(help_heading = Some("Annotation sources"))]
    #[clap(default_value = "hsapiens")]
    pub remote_species: String,

    /// Genome assembly passed to the remote annotation service
    #[clap(long = "remote-assembly")]
    #[clap(value_name = "ASSEMBLY")]
    #[clap(help_heading = Some("Annotation sources"))]
    pub remote_assembly: Option<String>,

    /// Timeout in seconds for each remote request
    #[clap(long = "remote-timeout")]
    #[clap(value_name = "SECONDS")]
    #[clap(help_heading = Some("Annotation sources"))]
    #[clap(default_value = "60")]
    pub remote_timeout: u64,

    /// Applies side store hits regardless of haplotype phase
    #[clap(long = "ignore-phase")]
    #[clap(help_heading = Some("Annotation parameters"))]
    pub ignore_phase: bool,

    /// Disables allele trimming before annotation
    #[clap(long = "skip-normalize")]
    #[clap(help_heading = Some("Annotation parameters"))]
    pub skip_normalize: bool,

    /// Number of input lines per batch
    #[clap(long = "batch-size")]
    #[clap(value_name = "LINES")]
    #[clap(help_heading = Some("Annotation parameters"))]
    #[clap(default_value = "200")]
    pub batch_size: usize,

    /// Number of worker threads
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

pub fn check_annotate_settings(mut settings: AnnotateSettings) -> anyhow::Result<AnnotateSettings> {
    // hard code the version in
    settings.vannot_version = FULL_VERSION.clone();
    info!("Vannot version: {:?}", &settings.vannot_version);
    info!("Sub-command: annotate");
    info!("Inputs:");

    check_required_filename(&settings.input_filename, "Input file")?;
    settings.input_format = resolve_format(settings.input_format, &settings.input_filename);
    info!("\tInput: {:?}", &settings.input_filename);
    info!("\tInput format: {}", settings.input_format);

    info!("Annotation sources:");
    check_optional_filename(settings.annotation_cache.as_deref(), "Annotation cache")?;
    if let Some(filename) = settings.annotation_cache.as_deref() {
        info!("\tAnnotation cache: {filename:?}");
    } else {
        info!("\tAnnotation cache: None");
    }

    check_optional_filename(settings.population_frequencies.as_deref(), "Population frequencies")?;
    if let Some(filename) = settings.population_frequencies.as_deref() {
        info!("\tPopulation frequencies: {filename:?}");
        if let Some(out_fn) = settings.population_store_out.as_deref() {
            info!("\tPopulation store output: {out_fn:?}");
        }
    } else {
        info!("\tPopulation frequencies: None");
        if settings.population_store_out.is_some() {
            bail!("--save-population-store requires --population-frequencies");
        }
    }

    match settings.remote_url.as_deref() {
        Some(url) => {
            ensure!(url.starts_with("http://") || url.starts_with("https://"), "--remote-url must start with http:// or https://");
            ensure!(settings.remote_timeout > 0, "--remote-timeout must be >0");
            info!("\tRemote service: {url} ({}, {})", settings.remote_version, settings.remote_species);
        },
        None => info!("\tRemote service: None")
    }

    if settings.custom_ids.len() > settings.custom_files.len() {
        bail!("Received {} --custom-id values for {} --custom-file values", settings.custom_ids.len(), settings.custom_files.len());
    }
    for (i, custom_fn) in settings.custom_files.iter().enumerate() {
        check_required_filename(custom_fn, format!("Custom file #{i}").as_str())?;
        if settings.custom_ids.len() <= i {
            settings.custom_ids.push(format!("custom_{i}"));
        }
        info!("\tCustom file #{i}: {custom_fn:?} => {:?}", settings.custom_ids[i]);
    }
    let unique_ids: HashSet<&str> = settings.custom_ids.iter().map(|s| s.as_str()).collect();
    ensure!(unique_ids.len() == settings.custom_ids.len(), "--custom-id values must be unique");
    ensure!(!unique_ids.contains(""), "--custom-id values must not be empty");

    // outputs
    info!("Outputs:");
    info!("\tOutput: {:?}", &settings.output_filename);
    if let Some(debug_folder) = settings.debug_folder.as_ref() {
        info!("\tDebug folder: {debug_folder:?}");
    }

    info!("Annotation parameters:");
    info!("\tPhase filter: {}", if settings.ignore_phase { "DISABLED" } else { "ENABLED" });
    info!("\tNormalization: {}", if settings.skip_normalize { "DISABLED" } else { "ENABLED" });
    if settings.batch_size == 0 {
        bail!("--batch-size must be >0");
    }
    info!("\tBatch size: {}", settings.batch_size);

    if settings.threads == 0 {
        settings.threads = 1;
    }
    info!("Processing threads: {}", settings.threads);

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    fn base_settings(folder: &std::path::Path) -> AnnotateSettings {
        let input_filename = folder.join("input.vcf");
        std::fs::write(&input_filename, "##fileformat=VCFv4.2\n").unwrap();
        AnnotateSettings {
            input_filename,
            output_filename: folder.join("out.json.gz"),
            batch_size: 200,
            ..Default::default()
        }
    }

    #[test]
    fn test_input_format_parse() {
        assert_eq!(InputFormat::from_str("JSON").unwrap(), InputFormat::Json);
        assert_eq!(InputFormat::Vcf.to_string(), "vcf");
        assert!(InputFormat::from_str("bed").is_err());
    }

    #[test]
    fn test_check_annotate_settings() {
        let folder = tempfile::tempdir().unwrap();
        let custom_fn = folder.path().join("custom.vcf");
        std::fs::write(&custom_fn, "").unwrap();

        let mut settings = base_settings(folder.path());
        settings.custom_files = vec![custom_fn.clone(), custom_fn];
        settings.custom_ids = vec!["clinical".to_string()];

        let checked = check_annotate_settings(settings).unwrap();
        assert_eq!(checked.input_format, InputFormat::Vcf);
        assert_eq!(checked.custom_ids, vec!["clinical".to_string(), "custom_1".to_string()]);
        assert_eq!(checked.threads, 1);
    }

    #[test]
    fn test_bad_annotate_settings() {
        let folder = tempfile::tempdir().unwrap();

        let mut settings = base_settings(folder.path());
        settings.batch_size = 0;
        assert!(check_annotate_settings(settings).is_err());

        let mut settings = base_settings(folder.path());
        settings.population_store_out = Some(folder.path().join("store.json"));
        assert!(check_annotate_settings(settings).is_err());

        let mut settings = base_settings(folder.path());
        settings.custom_ids = vec!["orphan".to_string()];
        assert!(check_annotate_settings(settings).is_err());

        let mut settings = base_settings(folder.path());
        settings.input_filename = folder.path().join("missing.vcf");
        assert!(check_annotate_settings(settings).is_err());
    }

    #[test]
    fn test_remote_settings() {
        let folder = tempfile::tempdir().unwrap();

        let mut settings = base_settings(folder.path());
        settings.remote_url = Some("http://localhost:8080/cellbase".to_string());
        settings.remote_timeout = 30;
        assert!(check_annotate_settings(settings).is_ok());

        let mut settings = base_settings(folder.path());
        settings.remote_url = Some("localhost:8080".to_string());
        settings.remote_timeout = 30;
        assert!(check_annotate_settings(settings).is_err());

        let mut settings = base_settings(folder.path());
        settings.remote_url = Some("https://ws.example.org".to_string());
        settings.remote_timeout = 0;
        assert!(check_annotate_settings(settings).is_err());
    }
}
