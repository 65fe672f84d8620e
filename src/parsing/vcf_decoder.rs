use indexmap::IndexMap;
use log::trace;

use crate::breakend_reconciler::PendingMate;
use crate::data_types::structural_variant::{parse_confidence_interval, StructuralVariant};
use crate::data_types::variants::{
    is_breakend_allele, is_symbolic_allele, SampleData, Variant, VariantError,
    CIEND_KEY, CIPOS_KEY, END_KEY, SVTYPE_KEY
};

/// Number of fixed VCF columns before FORMAT
const FIXED_COLUMNS: usize = 8;

/// A decoded VCF data line entry
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedRecord {
    /// A record ready for normalization and annotation
    Simple(Variant),
    /// One half of a mated breakend that must go through the reconciler
    Breakend(PendingMate)
}

/// Splits one VCF data line into records, one per alternate allele.
/// Alternates that are not eligible for annotation are dropped.
/// # Arguments
/// * `line` - a tab-delimited VCF data line
/// # Errors
/// * if the line has fewer than 8 columns
/// * if POS or a confidence interval cannot be parsed
pub fn decode_vcf_line(line: &str) -> Result<Vec<DecodedRecord>, VariantError> {
    let columns: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
    if columns.len() < FIXED_COLUMNS {
        return Err(VariantError::MissingColumns { found: columns.len(), expected: FIXED_COLUMNS });
    }

    let chromosome = columns[0].to_string();
    let start: u64 = columns[1].parse()
        .map_err(|_| VariantError::ParseField { field: "POS", value: columns[1].to_string() })?;
    let id = match columns[2] {
        "." | "" => None,
        value => Some(value.to_string())
    };
    let reference = normalize_case(columns[3]);
    let info = parse_info(columns[7]);
    let sample = if columns.len() > FIXED_COLUMNS + 1 {
        parse_first_sample(columns[FIXED_COLUMNS], columns[FIXED_COLUMNS + 1])
    } else {
        None
    };

    let alternates: Vec<String> = match columns[4] {
        "." | "" => vec![],
        value => value.split(',').map(normalize_case).collect()
    };

    // structural fields shared by all alternates on the line
    let cipos_raw = info.get(CIPOS_KEY).cloned();
    let cipos = cipos_raw.as_deref().map(parse_confidence_interval).transpose()?;
    let ciend = info.get(CIEND_KEY).map(|v| parse_confidence_interval(v)).transpose()?;
    let info_end = match info.get(END_KEY) {
        Some(v) => Some(v.parse::<u64>()
            .map_err(|_| VariantError::ParseField { field: "END", value: v.clone() })?),
        None => None
    };

    let mut records = vec![];
    for alternate in alternates.into_iter() {
        if alternate == "*" {
            // overlapping deletion placeholder
            continue;
        }
        let is_structural = is_symbolic_allele(&alternate) || is_breakend_allele(&alternate);
        let variant = match Variant::new(chromosome.clone(), start, reference.clone(), alternate) {
            Ok(v) => v,
            Err(e) => {
                trace!("Skipping ineligible allele at {chromosome}:{start}: {e}");
                continue;
            }
        };

        let mut variant = variant
            .with_id(id.clone())
            .with_info(info.clone())
            .with_sample(sample.clone());

        if is_structural {
            let mut sv = StructuralVariant::default()
                .with_start_interval(start, cipos)
                .with_sv_type(info.get(SVTYPE_KEY).cloned());
            if let Some(end) = info_end {
                sv.set_end_interval(end, ciend);
                variant.set_end(Some(end));
            }
            variant = variant.with_sv(Some(sv));
        }

        if variant.is_breakend() && variant.mate_id().is_some() {
            if variant.id().is_none() {
                trace!("Breakend at {chromosome}:{start} has a mate but no id, forwarding as-is");
                records.push(DecodedRecord::Simple(variant));
            } else {
                records.extend(PendingMate::new(variant, cipos_raw.clone()).map(DecodedRecord::Breakend));
            }
            // mated breakends are never multi-allelic
            break;
        }
        records.push(DecodedRecord::Simple(variant));
    }
    Ok(records)
}

/// Uppercases plain nucleotide alleles; symbolic and breakend alleles are left untouched
fn normalize_case(allele: &str) -> String {
    if allele.bytes().all(|b| b.is_ascii_alphabetic()) {
        allele.to_ascii_uppercase()
    } else {
        allele.to_string()
    }
}

/// Parses an INFO column into an ordered map; flags map to an empty value
pub fn parse_info(column: &str) -> IndexMap<String, String> {
    let mut info = IndexMap::new();
    if column == "." || column.is_empty() {
        return info;
    }
    for entry in column.split(';').filter(|e| !e.is_empty()) {
        match entry.split_once('=') {
            Some((key, value)) => info.insert(key.to_string(), value.to_string()),
            None => info.insert(entry.to_string(), String::new())
        };
    }
    info
}

/// Pulls GT and PS from the first sample column
fn parse_first_sample(format: &str, sample: &str) -> Option<SampleData> {
    let mut data = SampleData::default();
    for (key, value) in format.split(':').zip(sample.split(':')) {
        let value = if value.is_empty() || value == "." { None } else { Some(value.to_string()) };
        match key {
            "GT" => data.genotype = value,
            "PS" => data.phase_set = value,
            _ => {}
        }
    }
    if data.genotype.is_none() && data.phase_set.is_none() {
        None
    } else {
        Some(data)
    }
}
