use anyhow::Context;
use log::{debug, warn};
use rustc_hash::FxHashMap as HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::annotators::{AnnotationOptions, VariantAnnotator};
use crate::data_types::annotation::Annotation;
use crate::data_types::variants::Variant;
use crate::util::json_io::load_ndjson;

/// Computes consequence annotations for a batch
pub trait AnnotationCalculator: Send + Sync {
    /// Produces one annotation per input variant, same order and length.
    /// A `None` entry means nothing could be computed for that variant.
    fn calculate(&self, variants: &[Variant], options: &AnnotationOptions) -> anyhow::Result<Vec<Option<Annotation>>>;
}

/// Calculator backed by pre-computed annotations keyed by canonical variant key
#[derive(Debug, Default)]
pub struct CachedCalculator {
    annotations: HashMap<String, Annotation>
}

impl CachedCalculator {
    /// Loads an NDJSON file of annotated variants
    /// # Errors
    /// * if the file cannot be read or parsed
    pub fn load(filename: &Path) -> anyhow::Result<Self> {
        let records: Vec<Variant> = load_ndjson(filename)
            .with_context(|| format!("Error while loading annotation cache {filename:?}:"))?;
        let mut calculator = Self::default();
        for mut record in records.into_iter() {
            if let Some(annotation) = record.take_annotation() {
                calculator.insert(&record.canonical_key(), annotation);
            }
        }
        debug!("Loaded {} cached annotations from {filename:?}", calculator.len());
        Ok(calculator)
    }

    pub fn insert(&mut self, key: &str, annotation: Annotation) {
        self.annotations.insert(key.to_string(), annotation);
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

impl AnnotationCalculator for CachedCalculator {
    fn calculate(&self, variants: &[Variant], _options: &AnnotationOptions) -> anyhow::Result<Vec<Option<Annotation>>> {
        Ok(variants.iter()
            .map(|v| self.annotations.get(&v.canonical_key()).cloned())
            .collect())
    }
}

/// Stage that runs a local [`AnnotationCalculator`]
pub struct LocalCalculatorAnnotator {
    calculator: Arc<dyn AnnotationCalculator>,
    options: AnnotationOptions,
}

impl LocalCalculatorAnnotator {
    pub fn new(calculator: Arc<dyn AnnotationCalculator>, options: AnnotationOptions) -> Self {
        Self { calculator, options }
    }
}

impl VariantAnnotator for LocalCalculatorAnnotator {
    fn name(&self) -> &str {
        "local_calculator"
    }

    /// A configured calculator is required; the run stops if it is unavailable
    fn is_mandatory(&self) -> bool {
        true
    }

    fn open(&mut self) -> anyhow::Result<()> {
        debug!("Local calculator ready");
        Ok(())
    }

    fn run(&mut self, variants: &mut [Variant]) {
        let results = match self.calculator.calculate(variants, &self.options) {
            Ok(r) => r,
            Err(e) => {
                warn!("Local calculator failed on a batch of {} variants: {e:#}", variants.len());
                return;
            }
        };
        if results.len() != variants.len() {
            warn!("Local calculator returned {} results for {} variants, ignoring batch", results.len(), variants.len());
            return;
        }
        for (variant, annotation) in variants.iter_mut().zip(results.into_iter()) {
            if let Some(annotation) = annotation {
                variant.attach_annotation(annotation);
            }
        }
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
