/*!
# Phase Filter
Side-store entries can describe a haplotype: a list of canonical variant keys that were observed together.
Such an entry only applies to a query variant if every member of the haplotype is also in the current batch and could be on the same chromosome copy as the query.
Missing genotype or phase-set information never rules a match out.
*/
use log::trace;
use rustc_hash::FxHashMap as HashMap;

use crate::data_types::variants::Variant;

/// INFO key of a stored variant listing the canonical keys of its haplotype, comma separated
pub const HAPLOTYPE_KEY: &str = "HAPLOTYPE";

/// Returns the haplotype members listed on a stored variant, if any
pub fn haplotype_members(stored: &Variant) -> Vec<&str> {
    stored.info()
        .get(HAPLOTYPE_KEY)
        .map(|h| h.split(',').map(|k| k.trim()).filter(|k| !k.is_empty()).collect())
        .unwrap_or_default()
}

/// Clears any hit whose stored haplotype is not fully present, in phase, in the batch.
/// # Arguments
/// * `batch` - the query variants
/// * `hits` - stored variants found for each query, same length and order as `batch`
pub fn filter_phased_hits(batch: &[Variant], hits: &mut [Option<Variant>]) {
    debug_assert_eq!(batch.len(), hits.len());
    let by_key: HashMap<String, &Variant> = batch.iter()
        .map(|v| (v.canonical_key(), v))
        .collect();

    for (query, hit) in batch.iter().zip(hits.iter_mut()) {
        let keep = match hit.as_ref() {
            Some(stored) => {
                let members = haplotype_members(stored);
                members.is_empty() || same_haplotype(query, &members, &by_key)
            },
            None => true
        };
        if !keep {
            trace!("Dropping stored entry for {}, haplotype not present in phase", query.canonical_key());
            *hit = None;
        }
    }
}

/// True if every member is in the batch and potentially in phase with `query`
fn same_haplotype(query: &Variant, members: &[&str], by_key: &HashMap<String, &Variant>) -> bool {
    members.iter().all(|key| {
        by_key.get(*key)
            .is_some_and(|other| potentially_in_phase(query.phase_set(), query.genotype(), other))
    })
}

/// Checks whether `other` could share a chromosome copy with a variant carrying `phase_set`/`genotype`.
/// Different phase sets cannot be compared and count as potentially in phase.
pub fn potentially_in_phase(phase_set: Option<&str>, genotype: Option<&str>, other: &Variant) -> bool {
    let (Some(phase_set), Some(other_phase_set)) = (phase_set, other.phase_set()) else {
        return true;
    };
    if phase_set != other_phase_set {
        return true;
    }

    let other_genotype = other.genotype();
    if !(potentially_carries_alt(genotype) && potentially_carries_alt(other_genotype)) {
        return false;
    }

    let (Some(genotype), Some(other_genotype)) = (genotype, other_genotype) else {
        return true;
    };
    if genotype.contains('/') || other_genotype.contains('/') {
        return true;
    }

    let first: Vec<&str> = genotype.split('|').collect();
    let second: Vec<&str> = other_genotype.split('|').collect();
    fn at<'a>(alleles: &[&'a str], i: usize) -> &'a str {
        alleles.get(i).copied().unwrap_or(".")
    }

    if first.len() == 1 && first[0] != "0" {
        // haploid query allele can pair with either copy of a diploid partner
        if second.len() == 1 {
            allele_match(first[0], second[0])
        } else {
            allele_match(first[0], at(&second, 0)) || allele_match(first[0], at(&second, 1))
        }
    } else if second.len() == 1 && second[0] != "0" {
        allele_match(second[0], at(&first, 0)) || allele_match(second[0], at(&first, 1))
    } else {
        allele_match(at(&first, 0), at(&second, 0)) || allele_match(at(&first, 1), at(&second, 1))
    }
}

/// Missing genotypes might carry the alternate; reference-only genotypes do not
fn potentially_carries_alt(genotype: Option<&str>) -> bool {
    match genotype {
        None => true,
        Some(gt) => {
            let alleles: Vec<&str> = gt.split(['/', '|']).collect();
            match alleles.len() {
                1 => alleles[0] != "0",
                _ => alleles.iter().filter(|a| **a == "0").count() < alleles.len()
            }
        }
    }
}

/// Two phased alleles match if neither is reference and they are equal or either is missing
fn allele_match(first: &str, second: &str) -> bool {
    let missing = |a: &str| a.is_empty() || a == ".";
    first != "0" && second != "0"
        && (first == second || missing(first) || missing(second))
}
