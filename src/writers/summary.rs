use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::data_types::benchmark_totals::{BenchmarkTotals, SideTotals};

/// This is a wrapper for writing out benchmark summary stats to files
pub struct SummaryWriter {
    /// Label of the first annotation source
    label_a: String,
    /// Label of the second annotation source
    label_b: String,
    /// Running totals
    totals: BenchmarkTotals
}

/// One metric per row
#[derive(Serialize)]
struct SummaryRow {
    metric: String,
    value: String
}

impl SummaryRow {
    fn new(metric: &str, value: impl ToString) -> Self {
        Self {
            metric: metric.to_string(),
            value: value.to_string()
        }
    }

    /// Percentages are written with two decimals, or empty if undefined
    fn percent(metric: &str, value: Option<f64>) -> Self {
        Self {
            metric: metric.to_string(),
            value: value.map(|v| format!("{v:.2}")).unwrap_or_default()
        }
    }
}

/// Row of the per-term difference counts
#[derive(Serialize)]
struct TermCountRow<'a> {
    so_term: &'a str,
    count: u64
}

impl SummaryWriter {
    /// Creates a new writer to accumulate stats
    pub fn new(label_a: String, label_b: String) -> Self {
        Self {
            label_a,
            label_b,
            totals: BenchmarkTotals::default()
        }
    }

    /// Adds totals from a chunk of comparisons
    pub fn add_totals(&mut self, totals: BenchmarkTotals) {
        self.totals += totals;
    }

    pub fn totals(&self) -> &BenchmarkTotals {
        &self.totals
    }

    /// Will write the summary out to the given file path, one metric per line
    /// # Arguments
    /// * `filename` - the filename for the output (tsv/csv)
    pub fn write_summary(&self, filename: &Path) -> csv::Result<()> {
        let mut csv_writer = open_table(filename)?;
        let totals = &self.totals;
        let rows = [
            SummaryRow::new("total_variants", totals.evaluated_variants + totals.skipped_variants),
            SummaryRow::new("evaluated_variants", totals.evaluated_variants),
            SummaryRow::new("skipped_variants", totals.skipped_variants),
            SummaryRow::new("diff_variants", totals.diff_variants),
            SummaryRow::percent("variant_coincidence_pct", totals.variant_coincidence()),
            SummaryRow::new(&format!("total_terms_{}", self.label_a), totals.side_a.total_terms),
            SummaryRow::new(&format!("total_terms_{}", self.label_b), totals.side_b.total_terms),
            SummaryRow::new(&format!("diff_terms_{}", self.label_a), totals.side_a.diff_terms),
            SummaryRow::new(&format!("diff_terms_{}", self.label_b), totals.side_b.diff_terms),
            SummaryRow::percent(&format!("term_coincidence_pct_{}", self.label_a), totals.term_coincidence_a()),
            SummaryRow::percent(&format!("term_coincidence_pct_{}", self.label_b), totals.term_coincidence_b())
        ];
        for row in rows.iter() {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Writes the per-term difference counts for both sources into `output_folder`
    /// # Arguments
    /// * `output_folder` - destination folder; files are `diff_counts_by_SO_term_<label>.tsv`
    pub fn write_term_counts(&self, output_folder: &Path) -> csv::Result<()> {
        write_term_counts(&output_folder.join(format!("diff_counts_by_SO_term_{}.tsv", self.label_a)), &self.totals.side_a)?;
        write_term_counts(&output_folder.join(format!("diff_counts_by_SO_term_{}.tsv", self.label_b)), &self.totals.side_b)?;
        Ok(())
    }
}

fn write_term_counts(filename: &Path, side: &SideTotals) -> csv::Result<()> {
    let mut csv_writer = open_table(filename)?;
    for (so_term, count) in side.sorted_term_counts().into_iter() {
        csv_writer.serialize(TermCountRow { so_term, count })?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Opens a table writer; the delimiter is "," if the file ends with .csv, tab otherwise
pub fn open_table(filename: &Path) -> csv::Result<csv::Writer<File>> {
    let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
    let delimiter: u8 = if is_csv { b',' } else { b'\t' };
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::data_types::comparison::{ComparisonTerm, TermKey};

    #[test]
    fn test_write_summary() {
        let folder = tempfile::tempdir().unwrap();
        let mut writer = SummaryWriter::new("vep".to_string(), "cellbase".to_string());

        let mut totals = BenchmarkTotals {
            evaluated_variants: 4,
            skipped_variants: 1,
            diff_variants: 1,
            ..Default::default()
        };
        totals.side_a.total_terms = 10;
        totals.side_a.add_diff_terms(&[ComparisonTerm {
            key: TermKey::new("T1", "SO:0001583"),
            name: "missense_variant".to_string()
        }]);
        writer.add_totals(totals);

        let summary_fn = folder.path().join("summary.tsv");
        writer.write_summary(&summary_fn).unwrap();
        writer.write_term_counts(folder.path()).unwrap();

        let summary = std::fs::read_to_string(&summary_fn).unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "metric\tvalue");
        assert_eq!(lines[1], "total_variants\t5");
        assert!(lines.contains(&"variant_coincidence_pct\t75.00"));
        assert!(lines.contains(&"term_coincidence_pct_vep\t90.00"));
        assert!(lines.contains(&"term_coincidence_pct_cellbase\t"));

        let counts = std::fs::read_to_string(folder.path().join("diff_counts_by_SO_term_vep.tsv")).unwrap();
        assert_eq!(counts, "so_term\tcount\nmissense_variant\t1\n");
        // header only when there are no differences
        let counts = std::fs::read_to_string(folder.path().join("diff_counts_by_SO_term_cellbase.tsv")).unwrap();
        assert!(counts.is_empty() || counts == "so_term\tcount\n");
    }
}
