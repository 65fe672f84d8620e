use indicatif::{ParallelProgressIterator, ProgressBar};
use itertools::{EitherOrBoth, Itertools};
use log::{LevelFilter, debug, error, info, warn};
use rayon::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vannot::annotation_task::{AnnotationStats, AnnotationTask, ChainConfigBuilder};
use vannot::annotators::AnnotationOptions;
use vannot::annotators::local_calculator::{AnnotationCalculator, CachedCalculator};
use vannot::annotators::remote_service::RemoteAnnotationClient;
use vannot::annotators::rest_client::{RestAnnotationClient, RestClientConfigBuilder};
use vannot::batch_runner::{RunnerConfigBuilder, run_batches};
use vannot::benchmark_comparator::{ComparatorConfigBuilder, PairComparison, compare_variant_pair};
use vannot::breakend_reconciler::{BreakendReconciler, ReconcileError};
use vannot::cli::annotate::{AnnotateSettings, check_annotate_settings};
use vannot::cli::benchmark::{BenchmarkSettings, check_benchmark_settings};
use vannot::cli::core::{Commands, get_cli};
use vannot::data_types::benchmark_totals::BenchmarkTotals;
use vannot::data_types::variants::Variant;
use vannot::parsing::side_store_loader::{index_custom_vcf, index_population_frequencies};
use vannot::parsing::variant_decoder::open_input;
use vannot::side_store::{MemoryStore, SideStore};
use vannot::util::json_io::{load_ndjson, save_json};
use vannot::util::progress_bar::{get_progress_style, get_spinner_style};
use vannot::writers::annotation_writer::AnnotationWriter;
use vannot::writers::benchmark_diff::BenchmarkDiffWriter;
use vannot::writers::summary::SummaryWriter;

/// Number of checked variants between progress messages in the benchmark
const PROGRESS_INTERVAL: u64 = 10000;

fn run_annotate(settings: AnnotateSettings) {
    // start the timer
    let start_time = Instant::now();

    // set up logging before we check the other settings
    let filter_level: LevelFilter = match settings.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    let settings = match check_annotate_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    // create a debug folder if specified
    if let Some(debug_folder) = settings.debug_folder.as_ref() {
        info!("Creating debug folder at {debug_folder:?}...");
        match std::fs::create_dir_all(debug_folder) {
            Ok(()) => {},
            Err(e) => {
                error!("Error while creating debug folder: {e}");
                std::process::exit(exitcode::IOERR);
            }
        }

        // save the CLI options
        let cli_json = debug_folder.join("cli_settings.json");
        info!("Saving CLI options to {cli_json:?}...");
        if let Err(e) = save_json(&settings, &cli_json) {
            error!("Error while saving CLI options: {e}");
            std::process::exit(exitcode::IOERR);
        }
    }

    // load the local calculator cache
    let calculator: Option<Arc<dyn AnnotationCalculator>> = settings.annotation_cache.as_deref().map(|cache_fn| {
        info!("Pre-loading annotation cache into memory...");
        match CachedCalculator::load(cache_fn) {
            Ok(c) => {
                info!("Loaded {} cached annotations.", c.len());
                Arc::new(c) as Arc<dyn AnnotationCalculator>
            },
            Err(e) => {
                error!("Error while loading annotation cache: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        }
    });

    // index the side stores
    let population_store: Option<Arc<MemoryStore>> = settings.population_frequencies.as_deref().map(|freq_fn| {
        info!("Indexing population frequencies...");
        let store = MemoryStore::default();
        match index_population_frequencies(freq_fn, &store) {
            Ok(stats) => debug!("Population frequency index: {stats:?}"),
            Err(e) => {
                error!("Error while indexing population frequencies: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        };
        Arc::new(store)
    });

    let mut custom_stores: Vec<(String, Arc<dyn SideStore>)> = vec![];
    for (custom_fn, custom_id) in settings.custom_files.iter().zip(settings.custom_ids.iter()) {
        info!("Indexing custom file {custom_id:?}...");
        let store = MemoryStore::default();
        match index_custom_vcf(custom_fn, &store) {
            Ok(stats) => debug!("Custom file {custom_id:?} index: {stats:?}"),
            Err(e) => {
                error!("Error while indexing custom file {custom_fn:?}: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        };
        custom_stores.push((custom_id.clone(), Arc::new(store)));
    }

    // connect the remote service
    let remote_client: Option<Arc<dyn RemoteAnnotationClient>> = settings.remote_url.as_ref().map(|url| {
        let client_config = match RestClientConfigBuilder::default()
            .host(url.clone())
            .version(settings.remote_version.clone())
            .species(settings.remote_species.clone())
            .assembly(settings.remote_assembly.clone())
            .timeout(Duration::from_secs(settings.remote_timeout))
            .build() {
            Ok(rc) => rc,
            Err(e) => {
                error!("Error while building remote client config: {e:?}");
                std::process::exit(exitcode::SOFTWARE);
            }
        };
        match RestAnnotationClient::new(&client_config) {
            Ok(c) => Arc::new(c) as Arc<dyn RemoteAnnotationClient>,
            Err(e) => {
                error!("Error while creating remote client: {e}");
                std::process::exit(exitcode::CONFIG);
            }
        }
    });

    // build our configurations
    let chain_config = match ChainConfigBuilder::default()
        .calculator(calculator)
        .remote_client(remote_client)
        .population_store(population_store.clone().map(|s| s as Arc<dyn SideStore>))
        .custom_stores(custom_stores)
        .options(AnnotationOptions { ignore_phase: settings.ignore_phase })
        .build() {
        Ok(cc) => cc,
        Err(e) => {
            error!("Error while building chain config: {e:?}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };
    let runner_config = match RunnerConfigBuilder::default()
        .batch_size(settings.batch_size)
        .build() {
        Ok(rc) => rc,
        Err(e) => {
            error!("Error while building runner config: {e:?}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };

    // open the input and output
    let input = match open_input(&settings.input_filename, settings.input_format) {
        Ok(i) => i,
        Err(e) => {
            error!("Error while opening input file: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };
    if let Some(sample_name) = input.sample_name.as_ref() {
        info!("Using phase information from sample {sample_name:?}");
    }

    let mut annotation_writer = match AnnotationWriter::new(&settings.output_filename) {
        Ok(w) => w,
        Err(e) => {
            error!("Error while creating output file: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    // one task per worker, all sharing the breakend state
    let reconciler = Arc::new(BreakendReconciler::new(settings.threads));
    let shared_stats = Arc::new(Mutex::new(AnnotationStats::default()));
    let tasks: Vec<AnnotationTask> = (0..settings.threads)
        .map(|_| AnnotationTask::new(
            settings.input_format, reconciler.clone(), &chain_config, !settings.skip_normalize, shared_stats.clone()
        ))
        .collect();

    info!("Annotating variants...");
    let spinner = ProgressBar::new_spinner().with_style(get_spinner_style());
    let run_result = run_batches(input.lines, tasks, &runner_config, |records| {
        spinner.inc(records.len() as u64);
        annotation_writer.write_variants(&records)
    });
    spinner.finish();

    let run_stats = match run_result {
        Ok(rs) => rs,
        Err(e) => {
            error!("Error while annotating variants: {e:#}");
            if e.downcast_ref::<ReconcileError>().is_some() {
                std::process::exit(exitcode::SOFTWARE);
            }
            std::process::exit(exitcode::IOERR);
        }
    };

    let records_written = match annotation_writer.finish() {
        Ok(n) => n,
        Err(e) => {
            error!("Error while finalizing output file: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    if let (Some(store), Some(out_fn)) = (population_store.as_ref(), settings.population_store_out.as_deref()) {
        info!("Saving population frequency store to {out_fn:?}...");
        if let Err(e) = store.save(out_fn) {
            error!("Error while saving population frequency store: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    }

    let annotation_stats = match shared_stats.lock() {
        Ok(s) => *s,
        Err(_) => {
            error!("Annotation statistics lock was poisoned");
            std::process::exit(exitcode::SOFTWARE);
        }
    };
    info!("Lines read: {}", run_stats.input_lines);
    info!("Batches processed: {}", run_stats.batches);
    info!("Lines decoded:malformed: {} : {}", annotation_stats.decoded_lines, annotation_stats.malformed_lines);
    info!("Breakend halves: {}", annotation_stats.breakend_halves);
    info!("Drained breakends: {}", annotation_stats.drained_breakends);
    info!("Normalization failures: {}", annotation_stats.normalization_failures);
    if annotation_stats.close_failures > 0 {
        warn!("Annotator stages that failed to close: {}", annotation_stats.close_failures);
    }
    info!("Variants written: {records_written}");

    info!("Annotation completed in {} seconds.", start_time.elapsed().as_secs_f64());
}

fn run_benchmark(settings: BenchmarkSettings) {
    // start the timer
    let start_time = Instant::now();

    // set up logging before we check the other settings
    let filter_level: LevelFilter = match settings.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    let settings = match check_benchmark_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    // set up the number of threads for rayon
    match rayon::ThreadPoolBuilder::new().num_threads(settings.threads).build_global() {
        Ok(()) => {},
        Err(e) => {
            error!("Error while building thread pool: {e}");
            std::process::exit(exitcode::OSERR);
        }
    };

    // create the primary output folder
    info!("Creating output folder at {:?}...", settings.output_folder);
    match std::fs::create_dir_all(&settings.output_folder) {
        Ok(()) => {},
        Err(e) => {
            error!("Error while creating output folder: {e}");
            std::process::exit(exitcode::IOERR);
        }
    }

    if let Some(debug_folder) = settings.debug_folder.as_ref() {
        info!("Creating debug folder at {debug_folder:?}...");
        match std::fs::create_dir_all(debug_folder) {
            Ok(()) => {},
            Err(e) => {
                error!("Error while creating debug folder: {e}");
                std::process::exit(exitcode::IOERR);
            }
        }

        // save the CLI options
        let cli_json = debug_folder.join("cli_settings.json");
        info!("Saving CLI options to {cli_json:?}...");
        if let Err(e) = save_json(&settings, &cli_json) {
            error!("Error while saving CLI options: {e}");
            std::process::exit(exitcode::IOERR);
        }
    }

    // load both sources
    let mut loaded: Vec<Vec<Variant>> = vec![];
    for (label, filename) in [(&settings.label_a, &settings.annotations_a), (&settings.label_b, &settings.annotations_b)] {
        info!("Loading {label:?} annotations from {filename:?}...");
        match load_ndjson::<Variant>(filename) {
            Ok(v) => {
                info!("Loaded {} variants.", v.len());
                loaded.push(v);
            },
            Err(e) => {
                error!("Error while loading annotations: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        }
    }
    let variants_b = loaded.pop().unwrap_or_default();
    let variants_a = loaded.pop().unwrap_or_default();
    if variants_a.len() != variants_b.len() {
        warn!("Sources have different lengths ({} vs. {}), unmatched variants are skipped", variants_a.len(), variants_b.len());
    }

    // build our configuration
    let mut config_builder = ComparatorConfigBuilder::default();
    if settings.include_regulatory {
        config_builder.ignored_terms(Default::default());
    }
    let comparator_config = match config_builder.build() {
        Ok(cc) => cc,
        Err(e) => {
            error!("Error while building comparator config: {e:?}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };

    // compare in parallel, results come back in input order
    let paired: Vec<EitherOrBoth<Variant, Variant>> = variants_a.into_iter()
        .zip_longest(variants_b)
        .collect();
    let num_pairs = paired.len() as u64;
    let style = get_progress_style();
    info!("Comparing annotations...");
    let all_results: Vec<PairComparison> = paired.into_par_iter()
        .map(|pair| {
            match pair {
                EitherOrBoth::Both(variant_a, variant_b) => compare_variant_pair(variant_a, variant_b, &comparator_config),
                EitherOrBoth::Left(v) | EitherOrBoth::Right(v) => PairComparison::NotEvaluable {
                    reason: format!("{} is only present in one source", v.canonical_key())
                }
            }
        })
        .progress_with_style(style)
        .collect();
    info!("Annotation comparisons complete, saving all outputs...");

    let mut diff_writer = match BenchmarkDiffWriter::new(&settings.output_folder, &settings.label_a, &settings.label_b) {
        Ok(w) => w,
        Err(e) => {
            error!("Error while creating difference files: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    let mut totals = BenchmarkTotals::default();
    for (checked, comparison) in all_results.iter().enumerate() {
        totals.add_comparison(comparison);
        if let PairComparison::Evaluated { unit: Some(unit), .. } = comparison {
            if let Err(e) = diff_writer.write_unit(unit) {
                error!("Error while writing differences: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        }

        let checked = checked as u64 + 1;
        if checked % PROGRESS_INTERVAL == 0 {
            info!("{checked} / {num_pairs} variants checked, {} with differences", totals.diff_variants);
        }
    }
    if let Err(e) = diff_writer.finish() {
        error!("Error while finalizing difference files: {e:#}");
        std::process::exit(exitcode::IOERR);
    }

    let mut summary_writer = SummaryWriter::new(settings.label_a.clone(), settings.label_b.clone());
    summary_writer.add_totals(totals);
    let totals = summary_writer.totals();
    info!("Evaluated:skipped variants: {} : {}", totals.evaluated_variants, totals.skipped_variants);
    info!("Variants with differences: {}", totals.diff_variants);
    info!("\tVariant coincidence: {:?}", totals.variant_coincidence());
    info!("\tTerm coincidence {:?}: {:?}", settings.label_a, totals.term_coincidence_a());
    info!("\tTerm coincidence {:?}: {:?}", settings.label_b, totals.term_coincidence_b());

    // now write things
    let summary_fn = settings.output_folder.join("summary.tsv");
    info!("Saving output summary to {summary_fn:?}...");
    if let Err(e) = summary_writer.write_summary(&summary_fn) {
        error!("Error while saving summary file: {e:#}");
        std::process::exit(exitcode::IOERR);
    }
    if let Err(e) = summary_writer.write_term_counts(&settings.output_folder) {
        error!("Error while saving term count files: {e:#}");
        std::process::exit(exitcode::IOERR);
    }

    info!("Benchmark completed in {} seconds.", start_time.elapsed().as_secs_f64());
}

fn main() {
    let cli = get_cli();
    match cli.command {
        Commands::Annotate(settings) => {
            run_annotate(*settings);
        },
        Commands::Benchmark(settings) => {
            run_benchmark(*settings);
        }
    }

    info!("Process finished successfully.");
}
