use log::{debug, warn};
use std::sync::Arc;

use crate::annotators::{AnnotationOptions, VariantAnnotator};
use crate::data_types::annotation::{AdditionalAttribute, Annotation};
use crate::data_types::variants::Variant;
use crate::phase_filter::{filter_phased_hits, HAPLOTYPE_KEY};
use crate::side_store::SideStore;

/// Stage that copies INFO attributes from a custom annotation file, stored under the file id
pub struct CustomFileAnnotator {
    file_id: String,
    store: Arc<dyn SideStore>,
    options: AnnotationOptions
}

impl CustomFileAnnotator {
    /// Constructor
    /// # Arguments
    /// * `file_id` - key used in `additionalAttributes` for this file
    /// * `store` - the indexed contents of the file
    /// * `options` - shared annotation options
    pub fn new(file_id: String, store: Arc<dyn SideStore>, options: AnnotationOptions) -> Self {
        Self { file_id, store, options }
    }

    fn fetch(&self, variant: &Variant) -> Option<Variant> {
        let key = variant.canonical_key();
        match self.store.get_variant(&key) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Custom annotation lookup in {} failed for {key}: {e}", self.file_id);
                None
            }
        }
    }
}

impl VariantAnnotator for CustomFileAnnotator {
    fn name(&self) -> &str {
        &self.file_id
    }

    fn open(&mut self) -> anyhow::Result<()> {
        self.store.check()?;
        Ok(())
    }

    fn run(&mut self, variants: &mut [Variant]) {
        let mut hits: Vec<Option<Variant>> = variants.iter()
            .map(|v| self.fetch(v))
            .collect();
        if !self.options.ignore_phase {
            filter_phased_hits(variants, &mut hits);
        }

        let mut applied = 0;
        for (variant, hit) in variants.iter_mut().zip(hits.into_iter()) {
            let Some(stored) = hit else {
                continue;
            };
            let attribute = AdditionalAttribute {
                attribute: stored.info().iter()
                    .filter(|(key, _)| key.as_str() != HAPLOTYPE_KEY)
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            };
            if attribute.attribute.is_empty() {
                continue;
            }
            let mut annotation = Annotation::default();
            annotation.add_attribute(&self.file_id, attribute);
            variant.attach_annotation(annotation);
            applied += 1;
        }
        debug!("Applied {} attributes to {applied} / {} variants", self.file_id, variants.len());
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use indexmap::IndexMap;

    use crate::side_store::MemoryStore;

    fn variant(start: u64) -> Variant {
        Variant::new("1".to_string(), start, "A".to_string(), "C".to_string()).unwrap()
    }

    #[test]
    fn test_attributes_per_file() {
        let first_store = Arc::new(MemoryStore::default());
        let second_store = Arc::new(MemoryStore::default());
        let mut info = IndexMap::new();
        info.insert("SCORE".to_string(), "5".to_string());
        first_store.put_variant(&variant(100).with_info(info.clone())).unwrap();
        info.insert("SCORE".to_string(), "9".to_string());
        second_store.put_variant(&variant(100).with_info(info)).unwrap();

        let mut first = CustomFileAnnotator::new("fileA".to_string(), first_store.clone(), AnnotationOptions::default());
        let mut second = CustomFileAnnotator::new("fileB".to_string(), second_store, AnnotationOptions::default());
        first.open().unwrap();
        second.open().unwrap();

        let mut variants = vec![variant(100), variant(101)];
        first.run(&mut variants);
        second.run(&mut variants);
        // applying the same file again only replaces its own key
        first.run(&mut variants);

        let attributes = variants[0].annotation().unwrap().additional_attributes.as_ref().unwrap();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes["fileA"].attribute["SCORE"], "5");
        assert_eq!(attributes["fileB"].attribute["SCORE"], "9");
        assert!(variants[1].annotation().is_none());

        // no consumed marker for custom files
        let stored = first_store.get_variant("1:100:A:C").unwrap().unwrap();
        assert!(stored.annotation().is_none());
    }
}
