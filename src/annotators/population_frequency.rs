use log::{debug, trace, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::annotators::{AnnotationOptions, VariantAnnotator};
use crate::data_types::variants::Variant;
use crate::phase_filter::filter_phased_hits;
use crate::side_store::SideStore;

/// Stage that attaches population frequencies from a side store.
///
/// Each stored entry is applied at most once: right after a non-empty fetch the entry is rewritten
/// with an explicit empty `additionalAttributes` map, and entries in that shape are treated as consumed.
pub struct PopulationFrequencyAnnotator {
    store: Arc<dyn SideStore>,
    options: AnnotationOptions
}

impl PopulationFrequencyAnnotator {
    pub fn new(store: Arc<dyn SideStore>, options: AnnotationOptions) -> Self {
        Self { store, options }
    }

    /// Looks up one variant; store failures are logged and treated as a miss
    fn fetch(&self, variant: &Variant) -> Option<Variant> {
        let key = variant.canonical_key();
        let stored = match self.store.get_variant(&key) {
            Ok(Some(s)) => s,
            Ok(None) => return None,
            Err(e) => {
                warn!("Population frequency lookup failed for {key}: {e}");
                return None;
            }
        };

        let annotation = stored.annotation()?;
        if annotation.is_consumed_marker() {
            trace!("Population frequencies for {key} were already applied");
            return None;
        }
        if annotation.population_frequencies.is_empty() {
            return None;
        }
        Some(stored)
    }

    /// Rewrites the stored entry so later lookups skip it
    fn mark_consumed(&self, stored: &Variant) {
        let mut marker = stored.clone();
        marker.annotation_or_default().additional_attributes = Some(BTreeMap::new());
        if let Err(e) = self.store.put_variant(&marker) {
            warn!("Unable to mark population frequencies for {} as applied: {e}", stored.canonical_key());
        }
    }
}

impl VariantAnnotator for PopulationFrequencyAnnotator {
    fn name(&self) -> &str {
        "population_frequency"
    }

    fn open(&mut self) -> anyhow::Result<()> {
        self.store.check()?;
        Ok(())
    }

    fn run(&mut self, variants: &mut [Variant]) {
        let mut hits: Vec<Option<Variant>> = variants.iter()
            .map(|v| self.fetch(v))
            .collect();
        for stored in hits.iter().flatten() {
            self.mark_consumed(stored);
        }
        if !self.options.ignore_phase {
            filter_phased_hits(variants, &mut hits);
        }

        let mut applied = 0;
        for (variant, hit) in variants.iter_mut().zip(hits.into_iter()) {
            let Some(mut stored) = hit else {
                continue;
            };
            let frequencies = stored.take_annotation()
                .map(|a| a.population_frequencies)
                .unwrap_or_default();
            if !frequencies.is_empty() {
                variant.annotation_or_default().upsert_population_frequencies(frequencies);
                applied += 1;
            }
        }
        debug!("Applied population frequencies to {applied} / {} variants", variants.len());
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
