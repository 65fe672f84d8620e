use anyhow::Context;
use log::{debug, info, warn};
use std::path::Path;

use crate::cli::annotate::InputFormat;
use crate::data_types::variants::Variant;
use crate::parsing::normalizer::normalize_variant;
use crate::parsing::variant_decoder::open_input;
use crate::parsing::vcf_decoder::{decode_vcf_line, DecodedRecord};
use crate::side_store::SideStore;

/// Counters from one indexing pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Records written as new keys
    pub inserted: u64,
    /// Records merged into an existing key
    pub merged: u64,
    /// Records that could not be parsed
    pub skipped: u64
}

/// Loads population frequencies from an NDJSON file of annotated variants into `store`.
/// Repeated keys are merged: frequencies for a study/population that is already stored are replaced, others are appended.
/// # Arguments
/// * `filename` - NDJSON of variants, each carrying `annotation.populationFrequencies`
/// * `store` - the destination store
/// # Errors
/// * if the file cannot be opened or read
/// * if the store fails
pub fn index_population_frequencies(filename: &Path, store: &dyn SideStore) -> anyhow::Result<IndexStats> {
    let input = open_input(filename, InputFormat::Json)?;
    let mut stats = IndexStats::default();
    for (line_index, line) in input.lines.enumerate() {
        let line = line.with_context(|| format!("Error while reading {filename:?}:"))?;
        if line.trim().is_empty() {
            continue;
        }
        let variant = match parse_stored_variant(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping line {} of {filename:?}: {e:#}", line_index + 1);
                stats.skipped += 1;
                continue;
            }
        };

        let key = variant.canonical_key();
        match store.get_variant(&key)? {
            Some(mut existing) => {
                let incoming = variant.annotation()
                    .map(|a| a.population_frequencies.clone())
                    .unwrap_or_default();
                existing.annotation_or_default().upsert_population_frequencies(incoming);
                store.put_variant(&existing)?;
                stats.merged += 1;
            },
            None => {
                store.put_variant(&variant)?;
                stats.inserted += 1;
            }
        }
    }
    info!("Indexed population frequencies from {filename:?}: {stats:?}");
    Ok(stats)
}

fn parse_stored_variant(line: &str) -> anyhow::Result<Variant> {
    let mut variant: Variant = serde_json::from_str(line)?;
    variant.validate()?;
    Ok(normalize_variant(variant)?)
}

/// Loads a custom annotation VCF into `store`, keeping each record's INFO attributes.
/// # Arguments
/// * `filename` - the VCF (optionally gzipped) to index
/// * `store` - the destination store
/// # Errors
/// * if the file cannot be opened or its header is invalid
/// * if the store fails
pub fn index_custom_vcf(filename: &Path, store: &dyn SideStore) -> anyhow::Result<IndexStats> {
    let input = open_input(filename, InputFormat::Vcf)?;
    let mut stats = IndexStats::default();
    for (line_index, line) in input.lines.enumerate() {
        let line = line.with_context(|| format!("Error while reading {filename:?}:"))?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let records = match decode_vcf_line(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping data line {} of {filename:?}: {e}", line_index + 1);
                stats.skipped += 1;
                continue;
            }
        };
        for record in records.into_iter() {
            let variant = match record {
                DecodedRecord::Simple(v) => v,
                DecodedRecord::Breakend(half) => half.into_variant()
            };
            let variant = match normalize_variant(variant) {
                Ok(v) => v,
                Err(e) => {
                    debug!("Skipping record on data line {} of {filename:?}: {e}", line_index + 1);
                    stats.skipped += 1;
                    continue;
                }
            };
            store.put_variant(&variant)?;
            stats.inserted += 1;
        }
    }
    info!("Indexed custom annotation file {filename:?}: {stats:?}");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::side_store::MemoryStore;

    #[test]
    fn test_index_population_frequencies() {
        let folder = tempfile::tempdir().unwrap();
        let filename = folder.path().join("freqs.json");
        std::fs::write(&filename, concat!(
            r#"{"chromosome":"1","start":100,"reference":"A","alternate":"C","annotation":{"populationFrequencies":[{"study":"GNOMAD","population":"ALL","altAlleleFreq":0.1}]}}"#, "\n",
            r#"{"chromosome":"1","start":100,"reference":"A","alternate":"C","annotation":{"populationFrequencies":[{"study":"GNOMAD","population":"ALL","altAlleleFreq":0.2},{"study":"1KG","population":"EUR","altAlleleFreq":0.3}]}}"#, "\n",
            "not json\n",
            r#"{"chromosome":"1","start":200,"reference":"GA","alternate":"GT"}"#, "\n"
        )).unwrap();

        let store = MemoryStore::default();
        let stats = index_population_frequencies(&filename, &store).unwrap();
        assert_eq!(stats, IndexStats { inserted: 2, merged: 1, skipped: 1 });

        let stored = store.get_variant("1:100:A:C").unwrap().unwrap();
        let frequencies = &stored.annotation().unwrap().population_frequencies;
        assert_eq!(frequencies.len(), 2);
        assert_eq!(frequencies[0].alt_allele_freq, 0.2);
        assert_eq!(frequencies[1].study, "1KG");

        // keys are normalized
        assert!(store.get_variant("1:201:A:T").unwrap().is_some());
    }

    #[test]
    fn test_index_custom_vcf() {
        let folder = tempfile::tempdir().unwrap();
        let filename = folder.path().join("custom.vcf");
        std::fs::write(&filename, concat!(
            "##fileformat=VCFv4.2\n",
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n",
            "1\t100\t.\tA\tC,G\t.\t.\tSCORE=5\n",
            "1\tbad\t.\tA\tC\t.\t.\t.\n"
        )).unwrap();

        let store = MemoryStore::default();
        let stats = index_custom_vcf(&filename, &store).unwrap();
        assert_eq!(stats, IndexStats { inserted: 2, merged: 0, skipped: 1 });
        let stored = store.get_variant("1:100:A:G").unwrap().unwrap();
        assert_eq!(stored.info().get("SCORE").map(|s| s.as_str()), Some("5"));
    }
}
