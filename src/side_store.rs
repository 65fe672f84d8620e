/*!
# Side Store
Keyed storage of pre-computed variant payloads, used by the population-frequency and custom-file annotators.
Keys are canonical variant keys (`chromosome:start:reference:alternate`) and values are JSON-serialized [`Variant`] records carrying the stored annotation.

The store is shared between all workers, so implementations must be safe for concurrent `get`/`put`.

## Example usage
```rust
use vannot::data_types::variants::Variant;
use vannot::side_store::{MemoryStore, SideStore};

let store = MemoryStore::default();
let variant = Variant::new("1".to_string(), 100, "A".to_string(), "C".to_string()).unwrap();
store.put_variant(&variant).unwrap();

let fetched = store.get_variant(&variant.canonical_key()).unwrap().unwrap();
assert_eq!(fetched, variant);
assert!(store.get_variant("1:101:A:C").unwrap().is_none());
```
*/
use anyhow::Context;
use log::debug;
use rustc_hash::FxHashMap as HashMap;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::RwLock;

use crate::data_types::variants::Variant;
use crate::util::json_io::{finish_writer, open_reader, open_writer};

#[derive(thiserror::Error, Debug)]
pub enum SideStoreError {
    #[error("side store lock was poisoned")]
    Poisoned,
    #[error("unable to decode stored entry for {key}: {source}")]
    Decode { key: String, source: serde_json::Error },
    #[error("unable to encode entry for {key}: {source}")]
    Encode { key: String, source: serde_json::Error },
    #[error("side store I/O error: {0}")]
    Io(#[from] std::io::Error)
}

/// Byte-level key/value access; the typed helpers are provided on top
pub trait SideStore: Send + Sync {
    /// Checks that the store is usable; called when an annotator opens
    fn check(&self) -> Result<(), SideStoreError>;
    /// Returns the stored bytes for `key`
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, SideStoreError>;
    /// Stores (or replaces) the bytes for `key`
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), SideStoreError>;

    /// Fetches and decodes the variant stored under `key`
    fn get_variant(&self, key: &str) -> Result<Option<Variant>, SideStoreError> {
        match self.get(key.as_bytes())? {
            Some(bytes) => {
                let variant = serde_json::from_slice(&bytes)
                    .map_err(|source| SideStoreError::Decode { key: key.to_string(), source })?;
                Ok(Some(variant))
            },
            None => Ok(None)
        }
    }

    /// Encodes and stores `variant` under its canonical key
    fn put_variant(&self, variant: &Variant) -> Result<(), SideStoreError> {
        let key = variant.canonical_key();
        let bytes = serde_json::to_vec(variant)
            .map_err(|source| SideStoreError::Encode { key: key.clone(), source })?;
        self.put(key.as_bytes(), &bytes)
    }
}

/// In-memory side store, persisted to disk as NDJSON of stored variants
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>
}

impl MemoryStore {
    /// Loads a store from an NDJSON file (optionally gzipped), one stored variant per line.
    /// Later lines with the same key replace earlier ones.
    /// # Errors
    /// * if the file cannot be read
    /// * if any line is not a valid variant record
    pub fn load(filename: &Path) -> anyhow::Result<Self> {
        let store = Self::default();
        let reader = open_reader(filename)?;
        for (line_index, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Error while reading {filename:?}:"))?;
            if line.trim().is_empty() {
                continue;
            }
            let variant: Variant = serde_json::from_str(&line)
                .with_context(|| format!("Error while parsing line {} of {filename:?}:", line_index + 1))?;
            store.put_variant(&variant)?;
        }
        debug!("Loaded {} side store entries from {filename:?}", store.len());
        Ok(store)
    }

    /// Saves the current contents as NDJSON, sorted by key so output is stable
    /// # Errors
    /// * if the file cannot be written
    pub fn save(&self, out_filename: &Path) -> anyhow::Result<()> {
        let entries = self.entries.read().map_err(|_| SideStoreError::Poisoned)?;
        let mut keys: Vec<&Vec<u8>> = entries.keys().collect();
        keys.sort();

        let mut writer = open_writer(out_filename)?;
        for key in keys.into_iter() {
            writer.write_all(&entries[key])?;
            writer.write_all(b"\n")?;
        }
        finish_writer(writer, out_filename)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SideStore for MemoryStore {
    fn check(&self) -> Result<(), SideStoreError> {
        if self.entries.is_poisoned() {
            Err(SideStoreError::Poisoned)
        } else {
            Ok(())
        }
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, SideStoreError> {
        let entries = self.entries.read().map_err(|_| SideStoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), SideStoreError> {
        let mut entries = self.entries.write().map_err(|_| SideStoreError::Poisoned)?;
        entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::data_types::annotation::{Annotation, PopulationFrequency};

    fn stored_variant(start: u64, alt_freq: f64) -> Variant {
        let annotation = Annotation {
            population_frequencies: vec![PopulationFrequency {
                study: "GNOMAD".to_string(),
                population: "ALL".to_string(),
                ref_allele: "A".to_string(),
                alt_allele: "C".to_string(),
                ref_allele_freq: 1.0 - alt_freq,
                alt_allele_freq: alt_freq
            }],
            ..Default::default()
        };
        Variant::new("1".to_string(), start, "A".to_string(), "C".to_string())
            .unwrap()
            .with_annotation(Some(annotation))
    }

    #[test]
    fn test_put_get_replace() {
        let store = MemoryStore::default();
        assert!(store.is_empty());
        store.put_variant(&stored_variant(100, 0.1)).unwrap();
        store.put_variant(&stored_variant(100, 0.2)).unwrap();
        store.put_variant(&stored_variant(200, 0.3)).unwrap();
        assert_eq!(store.len(), 2);

        let fetched = store.get_variant("1:100:A:C").unwrap().unwrap();
        assert_eq!(fetched, stored_variant(100, 0.2));
    }

    #[test]
    fn test_decode_error() {
        let store = MemoryStore::default();
        store.put(b"1:5:A:C", b"{not json").unwrap();
        assert!(matches!(store.get_variant("1:5:A:C"), Err(SideStoreError::Decode { .. })));
    }

    #[test]
    fn test_save_and_load() {
        let folder = tempfile::tempdir().unwrap();
        let filename = folder.path().join("store.json.gz");

        let store = MemoryStore::default();
        store.put_variant(&stored_variant(200, 0.3)).unwrap();
        store.put_variant(&stored_variant(100, 0.1)).unwrap();
        store.save(&filename).unwrap();

        let loaded = MemoryStore::load(&filename).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get_variant("1:200:A:C").unwrap().unwrap(), stored_variant(200, 0.3));
        loaded.check().unwrap();
    }
}
