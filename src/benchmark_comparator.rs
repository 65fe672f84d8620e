/*!
# Benchmark Comparator
Compares the consequence terms two annotators produced for the same variant.
Terms are identified by (transcript, canonical accession), where a small equivalence table maps known-synonymous accessions onto one canonical code.
Terms on the ignore list are removed from both sides before comparing.

## Example usage
```rust
use vannot::benchmark_comparator::{compare_variant_pair, ComparatorConfig, PairComparison};
use vannot::data_types::annotation::{Annotation, ConsequenceType, SequenceOntologyTerm};
use vannot::data_types::benchmark_totals::BenchmarkTotals;
use vannot::data_types::variants::Variant;

fn annotated(terms: Vec<SequenceOntologyTerm>) -> Variant {
    Variant::new("1".to_string(), 100, "A".to_string(), "C".to_string()).unwrap()
        .with_annotation(Some(Annotation {
            consequence_types: Some(vec![ConsequenceType::new(Some("T1"), terms)]),
            ..Default::default()
        }))
}

// "2KB upstream" and "upstream" are the same call for benchmarking
let variant_a = annotated(vec![SequenceOntologyTerm::new("SO:0001636", "2KB_upstream_variant")]);
let variant_b = annotated(vec![SequenceOntologyTerm::new("SO:0001631", "upstream_gene_variant")]);

let config = ComparatorConfig::default();
let comparison = compare_variant_pair(variant_a, variant_b, &config);
assert!(matches!(comparison, PairComparison::Evaluated { unit: None, .. }));

let mut totals = BenchmarkTotals::default();
totals.add_comparison(&comparison);
assert_eq!(totals.evaluated_variants, 1);
assert_eq!(totals.diff_variants, 0);
```
*/
use derive_builder::Builder;
use log::debug;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::collections::BTreeMap;

use crate::data_types::annotation::Annotation;
use crate::data_types::benchmark_totals::BenchmarkTotals;
use crate::data_types::comparison::{ComparisonTerm, ComparisonUnit, DiffSide, TermKey};
use crate::data_types::variants::Variant;

/// Accession pairs that denote the same call: (synonym, canonical)
pub const DEFAULT_EQUIVALENCES: [(&str, &str); 5] = [
    // 2KB_upstream_variant -> upstream_gene_variant
    ("SO:0001636", "SO:0001631"),
    // 5KB_upstream_variant -> upstream_gene_variant
    ("SO:0001635", "SO:0001631"),
    // 2KB_downstream_variant -> downstream_gene_variant
    ("SO:0002083", "SO:0001632"),
    // 500B_downstream_variant -> downstream_gene_variant
    ("SO:0001634", "SO:0001632"),
    // 5KB_downstream_variant -> downstream_gene_variant
    ("SO:0001633", "SO:0001632")
];

/// Terms that depend on which regulatory database an annotator uses
pub const DEFAULT_IGNORED: [&str; 4] = [
    "SO:0001566", "regulatory_region_variant",
    "SO:0001782", "TF_binding_site_variant"
];

/// Comparison rules, built once and shared read-only
#[derive(Builder, Clone, Debug)]
#[builder(default)]
pub struct ComparatorConfig {
    /// synonym accession -> canonical accession
    equivalences: HashMap<String, String>,
    /// accessions or names dropped from both sides
    ignored_terms: HashSet<String>
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            equivalences: DEFAULT_EQUIVALENCES.iter()
                .map(|(synonym, canonical)| (synonym.to_string(), canonical.to_string()))
                .collect(),
            ignored_terms: DEFAULT_IGNORED.iter().map(|t| t.to_string()).collect()
        }
    }
}

impl ComparatorConfig {
    /// Maps an accession onto its canonical code
    pub fn canonical_accession<'a>(&'a self, accession: &'a str) -> &'a str {
        self.equivalences.get(accession).map(|s| s.as_str()).unwrap_or(accession)
    }

    /// True if the term is on the ignore list, by accession or by name
    pub fn is_ignored(&self, accession: &str, name: &str) -> bool {
        self.ignored_terms.contains(accession) || self.ignored_terms.contains(name)
    }

    pub fn equivalences(&self) -> &HashMap<String, String> {
        &self.equivalences
    }

    pub fn ignored_terms(&self) -> &HashSet<String> {
        &self.ignored_terms
    }
}

/// Result of comparing one variant across both sources
#[derive(Clone, Debug, PartialEq)]
pub enum PairComparison {
    /// At least one side gave no answer, or the two records are different variants
    NotEvaluable { reason: String },
    /// Both sides were compared
    Evaluated {
        /// Canonical term count on the first side
        terms_a: u64,
        /// Canonical term count on the second side
        terms_b: u64,
        /// Present only when the term sets differ
        unit: Option<ComparisonUnit>
    }
}

/// Collects the canonical, non-ignored terms of an annotation.
/// Returns `None` if the consequence list is missing.
/// # Arguments
/// * `annotation` - the annotation to read
/// * `config` - equivalence and ignore rules
pub fn canonical_terms(annotation: &Annotation, config: &ComparatorConfig) -> Option<BTreeMap<TermKey, String>> {
    let consequence_types = annotation.consequence_types.as_ref()?;
    let mut terms = BTreeMap::new();
    for consequence in consequence_types.iter() {
        let transcript_id = consequence.transcript_id.as_deref().unwrap_or_default();
        for term in consequence.sequence_ontology_terms.iter() {
            if config.is_ignored(&term.accession, &term.name) {
                continue;
            }
            // fall back to the name when an annotator omits the accession
            let identity = if term.accession.is_empty() { &term.name } else { &term.accession };
            let key = TermKey::new(transcript_id, config.canonical_accession(identity));
            terms.entry(key).or_insert_with(|| term.name.clone());
        }
    }
    Some(terms)
}

/// Terms of `first` whose key is absent from `second`
fn difference(first: &BTreeMap<TermKey, String>, second: &BTreeMap<TermKey, String>) -> Vec<ComparisonTerm> {
    first.iter()
        .filter(|(key, _)| !second.contains_key(*key))
        .map(|(key, name)| ComparisonTerm { key: key.clone(), name: name.clone() })
        .collect()
}

/// Compares the annotations of one variant from two sources
/// # Arguments
/// * `variant_a` - the variant as annotated by the first source
/// * `variant_b` - the same variant as annotated by the second source
/// * `config` - equivalence and ignore rules
pub fn compare_variant_pair(mut variant_a: Variant, mut variant_b: Variant, config: &ComparatorConfig) -> PairComparison {
    if variant_a.canonical_key() != variant_b.canonical_key() {
        return PairComparison::NotEvaluable {
            reason: format!("variant mismatch: {} vs {}", variant_a.canonical_key(), variant_b.canonical_key())
        };
    }

    let (Some(annotation_a), Some(annotation_b)) = (variant_a.take_annotation(), variant_b.take_annotation()) else {
        return PairComparison::NotEvaluable {
            reason: format!("{} is missing an annotation", variant_a.canonical_key())
        };
    };
    let (Some(terms_a), Some(terms_b)) = (canonical_terms(&annotation_a, config), canonical_terms(&annotation_b, config)) else {
        return PairComparison::NotEvaluable {
            reason: format!("{} has no consequence list", variant_a.canonical_key())
        };
    };

    let only_a = difference(&terms_a, &terms_b);
    let only_b = difference(&terms_b, &terms_a);
    let unit = if only_a.is_empty() && only_b.is_empty() {
        None
    } else {
        Some(ComparisonUnit {
            chromosome: variant_a.chromosome().to_string(),
            start: variant_a.start(),
            reference: variant_a.reference().to_string(),
            alternate: variant_a.alternate().to_string(),
            side_a: DiffSide { annotation: annotation_a, terms: only_a },
            side_b: DiffSide { annotation: annotation_b, terms: only_b }
        })
    };

    PairComparison::Evaluated {
        terms_a: terms_a.len() as u64,
        terms_b: terms_b.len() as u64,
        unit
    }
}

impl BenchmarkTotals {
    /// Folds one comparison into the running totals
    pub fn add_comparison(&mut self, comparison: &PairComparison) {
        match comparison {
            PairComparison::NotEvaluable { reason } => {
                debug!("Skipping variant: {reason}");
                self.skipped_variants += 1;
            },
            PairComparison::Evaluated { terms_a, terms_b, unit } => {
                self.evaluated_variants += 1;
                self.side_a.total_terms += terms_a;
                self.side_b.total_terms += terms_b;
                if let Some(unit) = unit {
                    self.diff_variants += 1;
                    self.side_a.add_diff_terms(&unit.side_a.terms);
                    self.side_b.add_diff_terms(&unit.side_b.terms);
                }
            }
        }
    }
}
