use std::collections::BTreeMap;
use std::ops::AddAssign;

use crate::data_types::comparison::ComparisonTerm;

/// Per-source counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SideTotals {
    /// Number of consequence terms seen on this side across evaluated variants
    pub total_terms: u64,
    /// Number of terms found only on this side
    pub diff_terms: u64,
    /// `diff_terms` broken down by SO term name
    pub diff_by_term: BTreeMap<String, u64>
}

impl AddAssign for SideTotals {
    fn add_assign(&mut self, rhs: Self) {
        self.total_terms += rhs.total_terms;
        self.diff_terms += rhs.diff_terms;
        for (term, count) in rhs.diff_by_term.into_iter() {
            *self.diff_by_term.entry(term).or_insert(0) += count;
        }
    }
}

impl SideTotals {
    /// Registers the terms that were only found on this side for one variant
    pub fn add_diff_terms(&mut self, terms: &[ComparisonTerm]) {
        self.diff_terms += terms.len() as u64;
        for term in terms.iter() {
            let label = if term.name.is_empty() { &term.key.accession } else { &term.name };
            *self.diff_by_term.entry(label.clone()).or_insert(0) += 1;
        }
    }

    /// Per-term counts sorted by descending count, ties broken by name
    pub fn sorted_term_counts(&self) -> Vec<(&str, u64)> {
        let mut counts: Vec<(&str, u64)> = self.diff_by_term.iter()
            .map(|(term, &count)| (term.as_str(), count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        counts
    }
}

/// Aggregate statistics for a benchmark run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BenchmarkTotals {
    /// Variants where both sides had a consequence list
    pub evaluated_variants: u64,
    /// Variants skipped because a side had nothing to compare
    pub skipped_variants: u64,
    /// Evaluated variants with at least one differing term
    pub diff_variants: u64,
    /// Counters for the first source
    pub side_a: SideTotals,
    /// Counters for the second source
    pub side_b: SideTotals
}

impl AddAssign for BenchmarkTotals {
    fn add_assign(&mut self, rhs: Self) {
        self.evaluated_variants += rhs.evaluated_variants;
        self.skipped_variants += rhs.skipped_variants;
        self.diff_variants += rhs.diff_variants;
        self.side_a += rhs.side_a;
        self.side_b += rhs.side_b;
    }
}

impl BenchmarkTotals {
    /// Percentage of evaluated variants with identical term sets
    pub fn variant_coincidence(&self) -> Option<f64> {
        if self.evaluated_variants > 0 {
            Some(100.0 - (self.diff_variants as f64 * 100.0 / self.evaluated_variants as f64))
        } else {
            None
        }
    }

    /// Percentage of the first source's terms that were also in the second
    pub fn term_coincidence_a(&self) -> Option<f64> {
        term_coincidence(&self.side_a)
    }

    /// Percentage of the second source's terms that were also in the first
    pub fn term_coincidence_b(&self) -> Option<f64> {
        term_coincidence(&self.side_b)
    }
}

fn term_coincidence(side: &SideTotals) -> Option<f64> {
    if side.total_terms > 0 {
        Some(100.0 - (side.diff_terms as f64 * 100.0 / side.total_terms as f64))
    } else {
        None
    }
}
