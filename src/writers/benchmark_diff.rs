use anyhow::Context;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::data_types::annotation::Annotation;
use crate::data_types::comparison::{ComparisonUnit, DiffSide};
use crate::util::json_io::{finish_writer, open_writer, OutputWriter};
use crate::writers::summary::open_table;

/// One differing term
#[derive(Serialize)]
struct DiffRow<'a> {
    chromosome: &'a str,
    start: u64,
    reference: &'a str,
    alternate: &'a str,
    transcript_id: &'a str,
    so_name: &'a str,
    so_accession: &'a str
}

/// Full annotation of a conflicting variant
#[derive(Serialize)]
struct ConflictRecord<'a> {
    variant: String,
    annotation: &'a Annotation
}

/// Output handles for one annotation source
struct SideOutput {
    terms: csv::Writer<File>,
    annotations: OutputWriter,
    annotations_fn: PathBuf
}

impl SideOutput {
    fn new(output_folder: &Path, label: &str) -> anyhow::Result<Self> {
        let terms_fn = output_folder.join(format!("diff_{label}.tsv"));
        let annotations_fn = output_folder.join(format!("annotation_{label}.json.gz"));
        Ok(Self {
            terms: open_table(&terms_fn)
                .with_context(|| format!("Error while creating {terms_fn:?}:"))?,
            annotations: open_writer(&annotations_fn)?,
            annotations_fn
        })
    }

    fn write(&mut self, unit: &ComparisonUnit, side: &DiffSide) -> anyhow::Result<()> {
        for term in side.terms.iter() {
            self.terms.serialize(DiffRow {
                chromosome: &unit.chromosome,
                start: unit.start,
                reference: &unit.reference,
                alternate: &unit.alternate,
                transcript_id: &term.key.transcript_id,
                so_name: &term.name,
                so_accession: &term.key.accession
            })?;
        }
        serde_json::to_writer(&mut self.annotations, &ConflictRecord {
            variant: unit.variant_label(),
            annotation: &side.annotation
        })?;
        self.annotations.write_all(b"\n")?;
        Ok(())
    }

    fn finish(mut self) -> anyhow::Result<()> {
        self.terms.flush()?;
        finish_writer(self.annotations, &self.annotations_fn)
    }
}

/// Writes the per-source term listings and conflicting annotations of a benchmark
pub struct BenchmarkDiffWriter {
    side_a: SideOutput,
    side_b: SideOutput,
    units_written: u64
}

impl BenchmarkDiffWriter {
    /// Creates all output files in `output_folder`
    /// # Arguments
    /// * `output_folder` - destination folder, must exist
    /// * `label_a` - label of the first source, used in file names
    /// * `label_b` - label of the second source, used in file names
    /// # Errors
    /// * if any of the files cannot be created
    pub fn new(output_folder: &Path, label_a: &str, label_b: &str) -> anyhow::Result<Self> {
        Ok(Self {
            side_a: SideOutput::new(output_folder, label_a)?,
            side_b: SideOutput::new(output_folder, label_b)?,
            units_written: 0
        })
    }

    /// Writes one comparison unit to both sides
    pub fn write_unit(&mut self, unit: &ComparisonUnit) -> anyhow::Result<()> {
        self.side_a.write(unit, &unit.side_a)?;
        self.side_b.write(unit, &unit.side_b)?;
        self.units_written += 1;
        Ok(())
    }

    pub fn units_written(&self) -> u64 {
        self.units_written
    }

    /// Flushes everything to disk
    pub fn finish(self) -> anyhow::Result<()> {
        self.side_a.finish()?;
        self.side_b.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Read;

    use crate::data_types::comparison::{ComparisonTerm, TermKey};

    #[test]
    fn test_write_unit() {
        let folder = tempfile::tempdir().unwrap();
        let mut writer = BenchmarkDiffWriter::new(folder.path(), "a", "b").unwrap();
        let unit = ComparisonUnit {
            chromosome: "1".to_string(),
            start: 100,
            reference: "A".to_string(),
            alternate: "C".to_string(),
            side_a: DiffSide {
                annotation: Annotation { id: Some("rs1".to_string()), ..Default::default() },
                terms: vec![ComparisonTerm {
                    key: TermKey::new("T1", "SO:0001583"),
                    name: "missense_variant".to_string()
                }]
            },
            side_b: DiffSide {
                annotation: Annotation::default(),
                terms: vec![]
            }
        };
        writer.write_unit(&unit).unwrap();
        assert_eq!(writer.units_written(), 1);
        writer.finish().unwrap();

        let diff_a = std::fs::read_to_string(folder.path().join("diff_a.tsv")).unwrap();
        assert_eq!(diff_a, concat!(
            "chromosome\tstart\treference\talternate\ttranscript_id\tso_name\tso_accession\n",
            "1\t100\tA\tC\tT1\tmissense_variant\tSO:0001583\n"
        ));

        let mut decoder = flate2::read::MultiGzDecoder::new(File::open(folder.path().join("annotation_a.json.gz")).unwrap());
        let mut content = String::new();
        decoder.read_to_string(&mut content).unwrap();
        assert_eq!(content, "{\"variant\":\"1:100:A:C\",\"annotation\":{\"id\":\"rs1\"}}\n");
    }
}
