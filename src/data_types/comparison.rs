use serde::Serialize;

use crate::data_types::annotation::Annotation;

/// Identity of a consequence term during comparison.
/// Two terms are the same if they hit the same transcript with the same (canonicalized) accession.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct TermKey {
    /// Transcript id, empty for intergenic consequences
    pub transcript_id: String,
    /// Canonical SO accession
    pub accession: String
}

impl TermKey {
    pub fn new(transcript_id: &str, accession: &str) -> Self {
        Self {
            transcript_id: transcript_id.to_string(),
            accession: accession.to_string()
        }
    }
}

/// A term that was found on only one side, along with the name it was reported with
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ComparisonTerm {
    pub key: TermKey,
    pub name: String
}

/// One side of a variant comparison
#[derive(Clone, Debug, PartialEq)]
pub struct DiffSide {
    /// The full source annotation this side was derived from
    pub annotation: Annotation,
    /// Terms found only on this side, sorted by key
    pub terms: Vec<ComparisonTerm>
}

/// The result of comparing one variant's annotations from two sources.
/// Only created when at least one side has a unique term.
#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonUnit {
    pub chromosome: String,
    pub start: u64,
    pub reference: String,
    pub alternate: String,
    pub side_a: DiffSide,
    pub side_b: DiffSide
}

impl ComparisonUnit {
    /// The `chromosome:start:reference:alternate` label of the compared variant
    pub fn variant_label(&self) -> String {
        format!("{}:{}:{}:{}", self.chromosome, self.start, self.reference, self.alternate)
    }

    pub fn is_empty(&self) -> bool {
        self.side_a.terms.is_empty() && self.side_b.terms.is_empty()
    }
}
