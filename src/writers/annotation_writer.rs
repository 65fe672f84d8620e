use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::data_types::variants::Variant;
use crate::util::json_io::{finish_writer, open_writer, OutputWriter};

/// Streams annotated variants out as NDJSON, gzipped if the path ends in `.gz`
pub struct AnnotationWriter {
    filename: PathBuf,
    writer: OutputWriter,
    records_written: u64
}

impl AnnotationWriter {
    /// Creates the output file
    /// # Errors
    /// * if the file cannot be created
    pub fn new(filename: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            filename: filename.to_path_buf(),
            writer: open_writer(filename)?,
            records_written: 0
        })
    }

    /// Appends a batch of records, one JSON object per line
    pub fn write_variants(&mut self, variants: &[Variant]) -> anyhow::Result<()> {
        for variant in variants.iter() {
            serde_json::to_writer(&mut self.writer, variant)
                .with_context(|| format!("Error while writing to {:?}:", self.filename))?;
            self.writer.write_all(b"\n")?;
        }
        self.records_written += variants.len() as u64;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Flushes and closes the output; must be called before dropping to surface write errors
    pub fn finish(self) -> anyhow::Result<u64> {
        finish_writer(self.writer, &self.filename)?;
        Ok(self.records_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::util::json_io::load_ndjson;

    #[test]
    fn test_write_and_reload() {
        let folder = tempfile::tempdir().unwrap();
        let filename = folder.path().join("out.json.gz");
        let variants = vec![
            Variant::new("1".to_string(), 100, "A".to_string(), "C".to_string()).unwrap(),
            Variant::new("2".to_string(), 5, "".to_string(), "GT".to_string()).unwrap()
        ];

        let mut writer = AnnotationWriter::new(&filename).unwrap();
        writer.write_variants(&variants[..1]).unwrap();
        writer.write_variants(&variants[1..]).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let loaded: Vec<Variant> = load_ndjson(&filename).unwrap();
        assert_eq!(loaded, variants);
    }
}
