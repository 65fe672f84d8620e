use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A Sequence Ontology term such as `SO:0001583 missense_variant`
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SequenceOntologyTerm {
    #[serde(default)]
    pub accession: String,
    #[serde(default)]
    pub name: String
}

impl SequenceOntologyTerm {
    pub fn new(accession: &str, name: &str) -> Self {
        Self {
            accession: accession.to_string(),
            name: name.to_string()
        }
    }
}

/// The effect of a variant on one transcript (or on no transcript for intergenic effects)
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsequenceType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_id: Option<String>,
    #[serde(default)]
    pub sequence_ontology_terms: Vec<SequenceOntologyTerm>
}

impl ConsequenceType {
    pub fn new(transcript_id: Option<&str>, sequence_ontology_terms: Vec<SequenceOntologyTerm>) -> Self {
        Self {
            gene_name: None,
            transcript_id: transcript_id.map(|t| t.to_string()),
            sequence_ontology_terms
        }
    }
}

/// Allele frequencies for one study/population
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationFrequency {
    pub study: String,
    pub population: String,
    #[serde(default)]
    pub ref_allele: String,
    #[serde(default)]
    pub alt_allele: String,
    #[serde(default)]
    pub ref_allele_freq: f64,
    #[serde(default)]
    pub alt_allele_freq: f64
}

/// Free-form key/value attributes contributed by one source
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AdditionalAttribute {
    #[serde(default)]
    pub attribute: BTreeMap<String, String>
}

/// Consequence annotation attached to a variant.
/// `consequence_types: None` means "not computed", which is different from an empty list.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chromosome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ancestral_allele: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_consequence_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hgvs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequence_types: Option<Vec<ConsequenceType>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub population_frequencies: Vec<PopulationFrequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_attributes: Option<BTreeMap<String, AdditionalAttribute>>
}

impl Annotation {
    /// Merges a stage's annotation into this one.
    /// Scalars and the consequence list are replaced only by non-null incoming values.
    /// Population frequencies and additional attributes are merged by key.
    pub fn merge_from(&mut self, incoming: Annotation) {
        fn take<T>(target: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *target = value;
            }
        }

        let Annotation {
            id, chromosome, start, reference, alternate, ancestral_allele,
            display_consequence_type, hgvs, consequence_types,
            population_frequencies, additional_attributes
        } = incoming;

        take(&mut self.id, id);
        take(&mut self.chromosome, chromosome);
        take(&mut self.start, start);
        take(&mut self.reference, reference);
        take(&mut self.alternate, alternate);
        take(&mut self.ancestral_allele, ancestral_allele);
        take(&mut self.display_consequence_type, display_consequence_type);
        take(&mut self.hgvs, hgvs);
        take(&mut self.consequence_types, consequence_types);

        self.upsert_population_frequencies(population_frequencies);

        if let Some(attributes) = additional_attributes {
            let existing = self.additional_attributes.get_or_insert_with(BTreeMap::new);
            for (source, attribute) in attributes.into_iter() {
                existing.insert(source, attribute);
            }
        }
    }

    /// Adds frequencies keyed by (study, population); an incoming entry replaces an existing one with the same key
    pub fn upsert_population_frequencies(&mut self, incoming: Vec<PopulationFrequency>) {
        for frequency in incoming.into_iter() {
            match self.population_frequencies.iter_mut()
                .find(|f| f.study == frequency.study && f.population == frequency.population) {
                Some(slot) => *slot = frequency,
                None => self.population_frequencies.push(frequency)
            }
        }
    }

    /// Adds one source's attributes under `source_key`, replacing a previous entry for that key only
    pub fn add_attribute(&mut self, source_key: &str, attribute: AdditionalAttribute) {
        self.additional_attributes
            .get_or_insert_with(BTreeMap::new)
            .insert(source_key.to_string(), attribute);
    }

    /// True when the additional attributes are an explicit empty map.
    /// Side-store entries are rewritten to this shape once consumed.
    pub fn is_consumed_marker(&self) -> bool {
        self.additional_attributes.as_ref().is_some_and(|a| a.is_empty())
    }
}
