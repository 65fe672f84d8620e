use anyhow::Context;
use log::{debug, warn};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use crate::breakend_reconciler::{BreakendReconciler, ReconcileError};
use crate::cli::annotate::InputFormat;
use crate::data_types::variants::Variant;
use crate::parsing::json_decoder::decode_json_line;
use crate::parsing::vcf_decoder::{decode_vcf_line, DecodedRecord};
use crate::util::json_io::open_reader;

/// Per-batch decoding counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Input lines that produced at least one record
    pub decoded_lines: u64,
    /// Lines that failed to parse and were skipped
    pub malformed_lines: u64,
    /// Breakend halves handed to the reconciler
    pub breakend_halves: u64
}

/// Turns raw input lines into variant records, pairing breakends through the shared reconciler.
/// Each worker owns one decoder; they share the reconciler.
pub struct VariantDecoder {
    format: InputFormat,
    reconciler: Arc<BreakendReconciler>
}

impl VariantDecoder {
    /// Constructor
    /// # Arguments
    /// * `format` - the input format, must be resolved (not `Auto`)
    /// * `reconciler` - the shared breakend pairing state
    pub fn new(format: InputFormat, reconciler: Arc<BreakendReconciler>) -> Self {
        Self { format, reconciler }
    }

    /// Decodes one batch of lines.
    /// Malformed lines are logged and skipped; a parked breakend half produces no output for now.
    /// # Errors
    /// * if the reconciler state is unusable
    pub fn decode_batch(&self, lines: &[String]) -> Result<(Vec<Variant>, DecodeStats), ReconcileError> {
        let mut variants = Vec::with_capacity(lines.len());
        let mut stats = DecodeStats::default();
        for line in lines.iter() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let decoded = match self.format {
                InputFormat::Json => decode_json_line(line).map(|r| vec![r]),
                InputFormat::Vcf | InputFormat::Auto => decode_vcf_line(line)
            };
            let records = match decoded {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping malformed line: {e}");
                    debug!("Malformed line content: {line:?}");
                    stats.malformed_lines += 1;
                    continue;
                }
            };
            if !records.is_empty() {
                stats.decoded_lines += 1;
            }
            for record in records.into_iter() {
                match record {
                    DecodedRecord::Simple(variant) => variants.push(variant),
                    DecodedRecord::Breakend(half) => {
                        stats.breakend_halves += 1;
                        if let Some(merged) = self.reconciler.submit(half)? {
                            variants.push(merged);
                        }
                    }
                }
            }
        }
        Ok((variants, stats))
    }
}

/// Resolves `Auto` based on the file extension
pub fn resolve_format(format: InputFormat, filename: &Path) -> InputFormat {
    if format != InputFormat::Auto {
        return format;
    }
    let name = filename.file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    if name.ends_with(".json") || name.ends_with(".jsonl") || name.ends_with(".ndjson") {
        InputFormat::Json
    } else {
        InputFormat::Vcf
    }
}

/// An opened input: the data lines plus what we learned from the header
pub struct InputSource {
    /// Remaining data lines
    pub lines: Box<dyn Iterator<Item = std::io::Result<String>> + Send>,
    /// First sample name from a VCF header, if any
    pub sample_name: Option<String>
}

/// Opens an input file. For VCF, the header is consumed with noodles and the data lines are returned.
/// # Errors
/// * if the file cannot be opened
/// * if the VCF header is invalid
pub fn open_input(filename: &Path, format: InputFormat) -> anyhow::Result<InputSource> {
    let reader = open_reader(filename)?;
    match resolve_format(format, filename) {
        InputFormat::Json => Ok(InputSource {
            lines: Box::new(reader.lines()),
            sample_name: None
        }),
        InputFormat::Vcf | InputFormat::Auto => {
            let mut vcf_reader = noodles::vcf::io::Reader::new(reader);
            let vcf_header = vcf_reader.read_header()
                .with_context(|| format!("Error while reading header of {filename:?}:"))?;
            let sample_name = vcf_header.sample_names().get_index(0).cloned();
            debug!("VCF header of {filename:?}: {} samples, first = {sample_name:?}", vcf_header.sample_names().len());
            Ok(InputSource {
                lines: Box::new(vcf_reader.into_inner().lines()),
                sample_name
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_resolve_format() {
        assert_eq!(resolve_format(InputFormat::Auto, Path::new("a.vcf.gz")), InputFormat::Vcf);
        assert_eq!(resolve_format(InputFormat::Auto, Path::new("a.json.gz")), InputFormat::Json);
        assert_eq!(resolve_format(InputFormat::Auto, Path::new("a.NDJSON")), InputFormat::Json);
        assert_eq!(resolve_format(InputFormat::Vcf, Path::new("a.json")), InputFormat::Vcf);
    }

    #[test]
    fn test_breakend_pair_across_batches() {
        let reconciler = Arc::new(BreakendReconciler::new(2));
        let decoder_a = VariantDecoder::new(InputFormat::Vcf, reconciler.clone());
        let decoder_b = VariantDecoder::new(InputFormat::Vcf, reconciler.clone());

        let (first, stats) = decoder_a.decode_batch(&lines(&[
            "chr1\t50\t.\tG\tT\t.\t.\t.",
            "chr1\t500\tbnd2\tT\t]chr1:100]T\t.\t.\tSVTYPE=BND;MATEID=bnd1"
        ])).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(stats.breakend_halves, 1);
        assert_eq!(reconciler.pending_len(), 1);

        let (second, _) = decoder_b.decode_batch(&lines(&[
            "chr1\t100\tbnd1\tA\tA[chr1:500[\t.\t.\tSVTYPE=BND;MATEID=bnd2"
        ])).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].start(), 100);
        assert_eq!(second[0].end(), 500);
        assert_eq!(reconciler.pending_len(), 0);
    }

    #[test]
    fn test_malformed_and_comments() {
        let reconciler = Arc::new(BreakendReconciler::new(1));
        let decoder = VariantDecoder::new(InputFormat::Vcf, reconciler);
        let (variants, stats) = decoder.decode_batch(&lines(&[
            "##fileformat=VCFv4.2",
            "1\t100",
            "",
            "1\t100\t.\tA\tC\t.\t.\t."
        ])).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(stats.malformed_lines, 1);
        assert_eq!(stats.decoded_lines, 1);
    }

    #[test]
    fn test_open_vcf_input() {
        let folder = tempfile::tempdir().unwrap();
        let filename = folder.path().join("input.vcf");
        std::fs::write(&filename, concat!(
            "##fileformat=VCFv4.2\n",
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tSAMPLE1\n",
            "1\t100\t.\tA\tC\t.\t.\t.\tGT\t0|1\n"
        )).unwrap();

        let input = open_input(&filename, InputFormat::Auto).unwrap();
        assert_eq!(input.sample_name.as_deref(), Some("SAMPLE1"));
        let data: Vec<String> = input.lines.map(|l| l.unwrap()).collect();
        assert_eq!(data, vec!["1\t100\t.\tA\tC\t.\t.\t.\tGT\t0|1".to_string()]);
    }
}
