use derive_builder::Builder;
use log::{debug, warn};
use std::ops::AddAssign;
use std::sync::{Arc, Mutex};

use crate::annotators::custom_file::CustomFileAnnotator;
use crate::annotators::local_calculator::{AnnotationCalculator, LocalCalculatorAnnotator};
use crate::annotators::population_frequency::PopulationFrequencyAnnotator;
use crate::annotators::remote_service::{RemoteAnnotationClient, RemoteServiceAnnotator};
use crate::annotators::{AnnotationOptions, AnnotatorChain, VariantAnnotator};
use crate::batch_runner::BatchTask;
use crate::breakend_reconciler::BreakendReconciler;
use crate::cli::annotate::InputFormat;
use crate::data_types::variants::Variant;
use crate::parsing::normalizer::normalize_variant;
use crate::parsing::variant_decoder::VariantDecoder;
use crate::side_store::SideStore;

/// Resources shared by every worker's annotator chain
#[derive(Builder, Clone, Default)]
#[builder(default)]
pub struct ChainConfig {
    /// Local consequence calculator, runs first
    calculator: Option<Arc<dyn AnnotationCalculator>>,
    /// Remote annotation service, runs after the local calculator
    remote_client: Option<Arc<dyn RemoteAnnotationClient>>,
    /// Population frequency side store
    population_store: Option<Arc<dyn SideStore>>,
    /// Custom annotation side stores, by file id, applied in order
    custom_stores: Vec<(String, Arc<dyn SideStore>)>,
    /// Options handed to every stage
    options: AnnotationOptions
}

impl ChainConfig {
    /// Builds a fresh chain for one worker
    pub fn build_chain(&self) -> AnnotatorChain {
        let mut stages: Vec<Box<dyn VariantAnnotator>> = vec![];
        if let Some(calculator) = self.calculator.as_ref() {
            stages.push(Box::new(LocalCalculatorAnnotator::new(calculator.clone(), self.options)));
        }
        if let Some(client) = self.remote_client.as_ref() {
            stages.push(Box::new(RemoteServiceAnnotator::new(client.clone(), self.options)));
        }
        if let Some(store) = self.population_store.as_ref() {
            stages.push(Box::new(PopulationFrequencyAnnotator::new(store.clone(), self.options)));
        }
        for (file_id, store) in self.custom_stores.iter() {
            stages.push(Box::new(CustomFileAnnotator::new(file_id.clone(), store.clone(), self.options)));
        }
        AnnotatorChain::new(stages)
    }

    pub fn options(&self) -> AnnotationOptions {
        self.options
    }
}

/// Totals across all workers of an annotation run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnnotationStats {
    /// Lines that produced at least one record
    pub decoded_lines: u64,
    /// Lines that could not be decoded
    pub malformed_lines: u64,
    /// Breakend halves sent through the reconciler
    pub breakend_halves: u64,
    /// Records dropped by normalization
    pub normalization_failures: u64,
    /// Records that left the chain
    pub annotated_records: u64,
    /// Unpaired breakends flushed during the drain
    pub drained_breakends: u64,
    /// Annotator stages that failed to close
    pub close_failures: u64
}

impl AddAssign for AnnotationStats {
    fn add_assign(&mut self, rhs: Self) {
        self.decoded_lines += rhs.decoded_lines;
        self.malformed_lines += rhs.malformed_lines;
        self.breakend_halves += rhs.breakend_halves;
        self.normalization_failures += rhs.normalization_failures;
        self.annotated_records += rhs.annotated_records;
        self.drained_breakends += rhs.drained_breakends;
        self.close_failures += rhs.close_failures;
    }
}

/// One worker's decode -> normalize -> annotate pipeline
pub struct AnnotationTask {
    decoder: VariantDecoder,
    reconciler: Arc<BreakendReconciler>,
    chain: AnnotatorChain,
    normalize: bool,
    stats: AnnotationStats,
    shared_stats: Arc<Mutex<AnnotationStats>>
}

impl AnnotationTask {
    /// Constructor
    /// # Arguments
    /// * `format` - resolved input format
    /// * `reconciler` - breakend pairing state shared by all workers
    /// * `chain_config` - used to build this worker's chain
    /// * `normalize` - if false, records are annotated exactly as decoded
    /// * `shared_stats` - where this worker adds its counters when it finishes
    pub fn new(
        format: InputFormat,
        reconciler: Arc<BreakendReconciler>,
        chain_config: &ChainConfig,
        normalize: bool,
        shared_stats: Arc<Mutex<AnnotationStats>>
    ) -> Self {
        Self {
            decoder: VariantDecoder::new(format, reconciler.clone()),
            reconciler,
            chain: chain_config.build_chain(),
            normalize,
            stats: AnnotationStats::default(),
            shared_stats
        }
    }

    /// Normalizes (if enabled) and annotates records in place, dropping any that fail normalization
    fn process(&mut self, variants: Vec<Variant>) -> Vec<Variant> {
        let mut variants = if self.normalize {
            let mut normalized = Vec::with_capacity(variants.len());
            for variant in variants.into_iter() {
                let key = variant.canonical_key();
                match normalize_variant(variant) {
                    Ok(v) => normalized.push(v),
                    Err(e) => {
                        warn!("Skipping {key}, normalization failed: {e}");
                        self.stats.normalization_failures += 1;
                    }
                }
            }
            normalized
        } else {
            variants
        };
        self.chain.run(&mut variants);
        self.stats.annotated_records += variants.len() as u64;
        variants
    }
}

impl BatchTask for AnnotationTask {
    type Output = Variant;

    fn pre(&mut self) -> anyhow::Result<()> {
        self.chain.open()
    }

    fn apply(&mut self, batch: Vec<String>) -> anyhow::Result<Vec<Variant>> {
        let (variants, decode_stats) = self.decoder.decode_batch(&batch)?;
        self.stats.decoded_lines += decode_stats.decoded_lines;
        self.stats.malformed_lines += decode_stats.malformed_lines;
        self.stats.breakend_halves += decode_stats.breakend_halves;
        Ok(self.process(variants))
    }

    fn drain(&mut self) -> anyhow::Result<Vec<Variant>> {
        match self.reconciler.finish_worker()? {
            Some(leftovers) => {
                debug!("Draining {} unpaired breakends", leftovers.len());
                self.stats.drained_breakends += leftovers.len() as u64;
                Ok(self.process(leftovers))
            },
            None => Ok(vec![])
        }
    }

    fn post(&mut self) -> anyhow::Result<()> {
        self.stats.close_failures += self.chain.close() as u64;
        let mut shared = self.shared_stats.lock()
            .map_err(|_| anyhow::anyhow!("Annotation statistics lock was poisoned"))?;
        *shared += self.stats;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::batch_runner::{run_batches, RunnerConfigBuilder};
    use crate::data_types::annotation::{Annotation, ConsequenceType, PopulationFrequency, SequenceOntologyTerm};
    use crate::annotators::local_calculator::CachedCalculator;
    use crate::side_store::MemoryStore;

    fn build_tasks(num_workers: usize, chain_config: &ChainConfig, stats: &Arc<Mutex<AnnotationStats>>) -> Vec<AnnotationTask> {
        let reconciler = Arc::new(BreakendReconciler::new(num_workers));
        (0..num_workers)
            .map(|_| AnnotationTask::new(InputFormat::Vcf, reconciler.clone(), chain_config, true, stats.clone()))
            .collect()
    }

    fn lines(raw: Vec<String>) -> impl Iterator<Item = std::io::Result<String>> + Send {
        raw.into_iter().map(Ok)
    }

    #[test]
    fn test_end_to_end_breakends() {
        let mut input = vec![];
        // the pair is split by a lot of filler so the halves land in different batches
        input.push("chr1\t500\tbnd2\tT\t]chr1:100]T\t.\t.\tSVTYPE=BND;MATEID=bnd1;CIPOS=-4,4".to_string());
        for i in 0..50 {
            input.push(format!("chr2\t{}\t.\tA\tG\t.\t.\t.", 1000 + i));
        }
        input.push("chr1\t100\tbnd1\tA\tA[chr1:500[\t.\t.\tSVTYPE=BND;MATEID=bnd2".to_string());
        // orphan: its mate never shows up
        input.push("chr3\t700\tbnd9\tC\tC[chr5:10[\t.\t.\tSVTYPE=BND;MATEID=bnd10".to_string());
        // ineligible and malformed lines
        input.push("chr2\t5\t.\tA\tA\t.\t.\t.".to_string());
        input.push("chr2\tfive".to_string());

        for num_workers in [1, 3] {
            let stats = Arc::new(Mutex::new(AnnotationStats::default()));
            let tasks = build_tasks(num_workers, &ChainConfig::default(), &stats);
            let config = RunnerConfigBuilder::default().batch_size(4).build().unwrap();

            let mut output: Vec<Variant> = vec![];
            run_batches(lines(input.clone()), tasks, &config, |records| {
                output.extend(records);
                Ok(())
            }).unwrap();

            assert_eq!(output.len(), 52);
            let merged: Vec<&Variant> = output.iter().filter(|v| v.chromosome() == "chr1").collect();
            assert_eq!(merged.len(), 1);
            assert_eq!(merged[0].start(), 100);
            assert_eq!(merged[0].end(), 500);
            assert_eq!(merged[0].sv().unwrap().ci_end_left(), Some(496));

            let orphans: Vec<&Variant> = output.iter().filter(|v| v.id() == Some("bnd9")).collect();
            assert_eq!(orphans.len(), 1);
            // drained records come last
            assert_eq!(output.last().unwrap().id(), Some("bnd9"));

            let stats = *stats.lock().unwrap();
            assert_eq!(stats.breakend_halves, 3);
            assert_eq!(stats.drained_breakends, 1);
            assert_eq!(stats.malformed_lines, 1);
            assert_eq!(stats.annotated_records, 52);
        }
    }

    #[test]
    fn test_chain_applied() {
        let mut calculator = CachedCalculator::default();
        calculator.insert("1:101:-:GT", Annotation {
            consequence_types: Some(vec![ConsequenceType::new(
                Some("T1"), vec![SequenceOntologyTerm::new("SO:0001589", "frameshift_variant")]
            )]),
            ..Default::default()
        });
        let chain_config = ChainConfigBuilder::default()
            .calculator(Some(Arc::new(calculator) as Arc<dyn AnnotationCalculator>))
            .build().unwrap();

        let stats = Arc::new(Mutex::new(AnnotationStats::default()));
        let tasks = build_tasks(2, &chain_config, &stats);
        let mut output: Vec<Variant> = vec![];
        run_batches(
            lines(vec!["1\t100\t.\tA\tAGT\t.\t.\t.".to_string(), "1\t200\t.\tC\tT\t.\t.\t.".to_string()]),
            tasks, &RunnerConfigBuilder::default().batch_size(1).build().unwrap(),
            |records| { output.extend(records); Ok(()) }
        ).unwrap();

        assert_eq!(output.len(), 2);
        // normalized before lookup
        assert_eq!(output[0].canonical_key(), "1:101:-:GT");
        assert!(output[0].annotation().is_some());
        assert!(output[1].annotation().is_none());
    }

    #[test]
    fn test_calculator_and_store_frequencies() {
        let gnomad = |alt_allele_freq: f64| PopulationFrequency {
            study: "GNOMAD".to_string(),
            population: "ALL".to_string(),
            ref_allele: "A".to_string(),
            alt_allele: "C".to_string(),
            ref_allele_freq: 1.0 - alt_allele_freq,
            alt_allele_freq
        };

        let mut calculator = CachedCalculator::default();
        calculator.insert("1:100:A:C", Annotation {
            population_frequencies: vec![gnomad(0.25)],
            ..Default::default()
        });
        let store = MemoryStore::default();
        store.put_variant(
            &Variant::new("1".to_string(), 100, "A".to_string(), "C".to_string()).unwrap()
                .with_annotation(Some(Annotation { population_frequencies: vec![gnomad(0.5)], ..Default::default() }))
        ).unwrap();

        let chain_config = ChainConfigBuilder::default()
            .calculator(Some(Arc::new(calculator) as Arc<dyn AnnotationCalculator>))
            .population_store(Some(Arc::new(store) as Arc<dyn SideStore>))
            .options(AnnotationOptions { ignore_phase: true })
            .build().unwrap();

        let stats = Arc::new(Mutex::new(AnnotationStats::default()));
        let tasks = build_tasks(1, &chain_config, &stats);
        let mut output: Vec<Variant> = vec![];
        run_batches(
            lines(vec!["1\t100\t.\tA\tC\t.\t.\t.".to_string()]),
            tasks, &RunnerConfigBuilder::default().batch_size(1).build().unwrap(),
            |records| { output.extend(records); Ok(()) }
        ).unwrap();

        assert_eq!(output.len(), 1);
        // the store entry replaces the calculator's value for the same study and population
        assert_eq!(output[0].annotation().unwrap().population_frequencies, vec![gnomad(0.5)]);
    }

    /// Stage whose close always fails
    struct LeakyStage;

    impl VariantAnnotator for LeakyStage {
        fn name(&self) -> &str {
            "leaky"
        }

        fn open(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn run(&mut self, _variants: &mut [Variant]) {}

        fn close(&mut self) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("handle still busy"))
        }
    }

    #[test]
    fn test_close_failures_in_stats() {
        let stats = Arc::new(Mutex::new(AnnotationStats::default()));
        let mut task = build_tasks(1, &ChainConfig::default(), &stats).remove(0);
        task.chain = AnnotatorChain::new(vec![Box::new(LeakyStage)]);

        task.pre().unwrap();
        // close failures are logged, not fatal
        task.post().unwrap();
        assert_eq!(stats.lock().unwrap().close_failures, 1);
    }
}
