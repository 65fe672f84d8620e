use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::data_types::annotation::Annotation;
use crate::data_types::structural_variant::StructuralVariant;

/// Rendering of an empty allele inside canonical variant keys
pub const EMPTY_ALLELE: &str = "-";
/// INFO key linking a breakend to its partner
pub const MATEID_KEY: &str = "MATEID";
/// INFO key carrying the start confidence interval
pub const CIPOS_KEY: &str = "CIPOS";
/// INFO key carrying the end confidence interval
pub const CIEND_KEY: &str = "CIEND";
/// INFO key carrying the mate's CIPOS once a breakend pair is merged
pub const MATE_CIPOS_KEY: &str = "MATE_CIPOS";
/// INFO key carrying the structural variant type
pub const SVTYPE_KEY: &str = "SVTYPE";
/// INFO key carrying the end coordinate of symbolic alleles
pub const END_KEY: &str = "END";

/// All the variant types we currently recognize
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, strum_macros::Display)]
pub enum VariantType {
    /// REF and ALT are both length = 1
    Snv=0,
    /// REF and ALT have the same length > 1
    Mnv,
    /// REF is empty or shorter than ALT with shared anchor
    Insertion,
    /// ALT is empty or shorter than REF with shared anchor
    Deletion,
    /// REF and ALT lengths differ without a clean anchor
    Indel,
    /// Symbolic `<DEL>`
    SvDeletion,
    /// Symbolic `<INS>`
    SvInsertion,
    /// Symbolic `<DUP>`
    SvDuplication,
    /// Symbolic `<INV>`
    SvInversion,
    /// Symbolic `<CNV#>`
    Cnv,
    /// Single or mated breakend notation
    Breakend,
    /// Something that doesn't match the above criteria
    Unknown // make sure Unknown is always the last one in the list
}

#[derive(thiserror::Error, Debug)]
pub enum VariantError {
    #[error("chromosome is empty")]
    EmptyChromosome,
    #[error("reference allele {0:?} is not a supported allele")]
    InvalidReference(String),
    #[error("alternate allele {0:?} is not a supported allele")]
    InvalidAlternate(String),
    #[error("reference and alternate alleles are identical: {0:?}")]
    IdenticalAlleles(String),
    #[error("line has {found} columns, expected at least {expected}")]
    MissingColumns { found: usize, expected: usize },
    #[error("unable to parse {field} from {value:?}")]
    ParseField { field: &'static str, value: String },
    #[error("unable to parse JSON record: {0}")]
    Json(#[from] serde_json::Error)
}

/// Genotype and phase information for the first sample of an input record
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleData {
    /// Raw GT value, e.g. "0|1"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genotype: Option<String>,
    /// Raw PS value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_set: Option<String>
}

/// A variant record flowing through the annotation pipeline.
/// Coordinates are 1-based; `end` is derived from the alleles unless a structural event supplies it.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    /// Contig name
    chromosome: String,
    /// 1-based start coordinate
    start: u64,
    /// Explicit end coordinate, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end: Option<u64>,
    /// Reference allele; may be empty after normalization
    reference: String,
    /// Alternate allele; may be empty after normalization
    alternate: String,
    /// Stable identifier from the input, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    /// Inferred or provided variant type
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    variant_type: Option<VariantType>,
    /// Structural variant fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sv: Option<StructuralVariant>,
    /// INFO attributes from the source file, in file order
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    info: IndexMap<String, String>,
    /// First sample genotype/phase, used for phased lookups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sample: Option<SampleData>,
    /// Annotation accumulated by the annotator chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    annotation: Option<Annotation>
}

impl Variant {
    /// Creates a new variant after checking that it is eligible for annotation.
    /// # Arguments
    /// * `chromosome` - the contig name
    /// * `start` - 1-based start coordinate
    /// * `reference` - the REF allele
    /// * `alternate` - the ALT allele
    /// # Errors
    /// * if either allele falls outside the supported alphabet or tokens
    /// * if REF and ALT are identical
    pub fn new(chromosome: String, start: u64, reference: String, alternate: String) -> Result<Self, VariantError> {
        let mut variant = Self {
            chromosome,
            start,
            reference,
            alternate,
            ..Default::default()
        };
        variant.validate()?;
        variant.variant_type = Some(infer_type(&variant.reference, &variant.alternate));
        Ok(variant)
    }

    /// Checks eligibility for annotation and fills in the type if it is missing.
    /// Used for records that were deserialized rather than constructed.
    pub fn validate(&mut self) -> Result<(), VariantError> {
        if self.chromosome.is_empty() {
            return Err(VariantError::EmptyChromosome);
        }
        if !is_valid_allele(&self.reference) {
            return Err(VariantError::InvalidReference(self.reference.clone()));
        }
        if !(is_valid_allele(&self.alternate) || is_breakend_allele(&self.alternate)) {
            return Err(VariantError::InvalidAlternate(self.alternate.clone()));
        }
        if self.reference == self.alternate {
            return Err(VariantError::IdenticalAlleles(self.reference.clone()));
        }
        if self.variant_type.is_none() {
            self.variant_type = Some(infer_type(&self.reference, &self.alternate));
        }
        Ok(())
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn with_sv(mut self, sv: Option<StructuralVariant>) -> Self {
        self.sv = sv;
        self
    }

    pub fn with_info(mut self, info: IndexMap<String, String>) -> Self {
        self.info = info;
        self
    }

    pub fn with_sample(mut self, sample: Option<SampleData>) -> Self {
        self.sample = sample;
        self
    }

    pub fn with_annotation(mut self, annotation: Option<Annotation>) -> Self {
        self.annotation = annotation;
        self
    }

    /// Identity string used by side-stores and caches: `chromosome:start:reference:alternate`.
    /// Empty alleles are rendered as `-`.
    pub fn canonical_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.chromosome, self.start,
            render_allele(&self.reference), render_allele(&self.alternate)
        )
    }

    /// True if the ALT allele is a symbolic token such as `<DEL>`
    pub fn is_symbolic(&self) -> bool {
        is_symbolic_allele(&self.alternate)
    }

    /// True if the ALT allele uses single or mated breakend notation
    pub fn is_breakend(&self) -> bool {
        is_breakend_allele(&self.alternate)
    }

    /// Returns the mate id advertised in INFO, if any
    pub fn mate_id(&self) -> Option<&str> {
        self.info.get(MATEID_KEY)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty() && *s != ".")
    }

    /// Attaches an annotation, merging into the existing one if present.
    /// # Arguments
    /// * `incoming` - the annotation produced by a stage
    pub fn attach_annotation(&mut self, incoming: Annotation) {
        match self.annotation.as_mut() {
            Some(existing) => existing.merge_from(incoming),
            None => self.annotation = Some(incoming)
        }
    }

    /// Returns the annotation, creating an empty one first if it is absent
    pub fn annotation_or_default(&mut self) -> &mut Annotation {
        self.annotation.get_or_insert_with(Annotation::default)
    }

    // setters
    pub fn set_start(&mut self, start: u64) {
        self.start = start;
    }

    pub fn set_end(&mut self, end: Option<u64>) {
        self.end = end;
    }

    pub fn set_alleles(&mut self, reference: String, alternate: String) {
        self.reference = reference;
        self.alternate = alternate;
    }

    pub fn set_variant_type(&mut self, variant_type: VariantType) {
        self.variant_type = Some(variant_type);
    }

    pub fn info_mut(&mut self) -> &mut IndexMap<String, String> {
        &mut self.info
    }

    pub fn sv_mut(&mut self) -> &mut StructuralVariant {
        self.sv.get_or_insert_with(StructuralVariant::default)
    }

    pub fn take_annotation(&mut self) -> Option<Annotation> {
        self.annotation.take()
    }

    // getters
    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// End coordinate; falls back to the last reference base for simple alleles
    pub fn end(&self) -> u64 {
        match self.end {
            Some(end) => end,
            None => {
                let ref_len = self.reference.len() as u64;
                if ref_len == 0 {
                    // insertions end on the base before `start`
                    self.start.saturating_sub(1)
                } else {
                    self.start + ref_len - 1
                }
            }
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn alternate(&self) -> &str {
        &self.alternate
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn variant_type(&self) -> VariantType {
        self.variant_type.unwrap_or(VariantType::Unknown)
    }

    pub fn sv(&self) -> Option<&StructuralVariant> {
        self.sv.as_ref()
    }

    pub fn info(&self) -> &IndexMap<String, String> {
        &self.info
    }

    pub fn sample(&self) -> Option<&SampleData> {
        self.sample.as_ref()
    }

    pub fn genotype(&self) -> Option<&str> {
        self.sample.as_ref().and_then(|s| s.genotype.as_deref())
    }

    pub fn phase_set(&self) -> Option<&str> {
        self.sample.as_ref().and_then(|s| s.phase_set.as_deref())
    }

    pub fn annotation(&self) -> Option<&Annotation> {
        self.annotation.as_ref()
    }
}

/// Renders an allele for a canonical key
fn render_allele(allele: &str) -> &str {
    if allele.is_empty() {
        EMPTY_ALLELE
    } else {
        allele
    }
}

/// True if the allele is a (possibly empty) run of A/C/G/T/N or a supported symbolic token
pub fn is_valid_allele(allele: &str) -> bool {
    allele.bytes().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T' | b'N'))
        || is_symbolic_allele(allele)
}

/// True for `<DEL>`, `<DUP>`, `<INS>`, `<INV>`, and `<CNV#>` tokens
pub fn is_symbolic_allele(allele: &str) -> bool {
    match allele {
        "<DEL>" | "<DUP>" | "<INS>" | "<INV>" => true,
        _ => allele.strip_prefix("<CNV")
            .and_then(|s| s.strip_suffix('>'))
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    }
}

/// True for mated (`A[chr2:100[`) and single (`A.` / `.A`) breakend notation
pub fn is_breakend_allele(allele: &str) -> bool {
    allele.contains('[') || allele.contains(']')
        || (allele.len() > 1 && (allele.starts_with('.') || allele.ends_with('.')))
}

/// Infers the variant type from the two alleles
/// # Arguments
/// * `reference` - the REF allele
/// * `alternate` - the ALT allele
pub fn infer_type(reference: &str, alternate: &str) -> VariantType {
    if is_breakend_allele(alternate) {
        return VariantType::Breakend;
    }
    match alternate {
        "<DEL>" => return VariantType::SvDeletion,
        "<INS>" => return VariantType::SvInsertion,
        "<DUP>" => return VariantType::SvDuplication,
        "<INV>" => return VariantType::SvInversion,
        _ => {}
    };
    if is_symbolic_allele(alternate) {
        return VariantType::Cnv;
    }

    let (ref_len, alt_len) = (reference.len(), alternate.len());
    if ref_len == alt_len {
        match ref_len {
            1 => VariantType::Snv,
            0 => VariantType::Unknown,
            _ => VariantType::Mnv
        }
    } else if ref_len == 0 || (ref_len < alt_len && alternate.starts_with(reference)) {
        VariantType::Insertion
    } else if alt_len == 0 || (alt_len < ref_len && reference.starts_with(alternate)) {
        VariantType::Deletion
    } else {
        VariantType::Indel
    }
}
