use crate::data_types::variants::{infer_type, Variant, VariantError};

/// Trims the alleles of a simple variant down to their minimal representation.
/// Shared trailing bases are removed first, then shared leading bases, shifting `start` accordingly.
/// Symbolic and breakend alleles are returned unchanged.
/// # Errors
/// * if trimming leaves both alleles empty, i.e. REF and ALT were identical
pub fn normalize_variant(mut variant: Variant) -> Result<Variant, VariantError> {
    if variant.is_symbolic() || variant.is_breakend() {
        return Ok(variant);
    }

    let (start, reference, alternate) = trim_alleles(variant.start(), variant.reference(), variant.alternate());
    if reference == alternate {
        return Err(VariantError::IdenticalAlleles(variant.reference().to_string()));
    }
    if start != variant.start() || reference.len() != variant.reference().len() || alternate.len() != variant.alternate().len() {
        let variant_type = infer_type(reference, alternate);
        let (reference, alternate) = (reference.to_string(), alternate.to_string());
        variant.set_start(start);
        variant.set_alleles(reference, alternate);
        variant.set_variant_type(variant_type);
        // recomputed from the trimmed alleles
        variant.set_end(None);
    }
    Ok(variant)
}

/// Removes the shared suffix and then the shared prefix of two alleles
fn trim_alleles<'a>(start: u64, reference: &'a str, alternate: &'a str) -> (u64, &'a str, &'a str) {
    let (ref_bytes, alt_bytes) = (reference.as_bytes(), alternate.as_bytes());
    let suffix = ref_bytes.iter().rev()
        .zip(alt_bytes.iter().rev())
        .take_while(|(r, a)| r == a)
        .count();
    let (reference, alternate) = (
        &reference[..reference.len() - suffix],
        &alternate[..alternate.len() - suffix]
    );

    let prefix = reference.bytes()
        .zip(alternate.bytes())
        .take_while(|(r, a)| r == a)
        .count();
    (start + prefix as u64, &reference[prefix..], &alternate[prefix..])
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::data_types::variants::VariantType;

    fn variant(start: u64, reference: &str, alternate: &str) -> Variant {
        Variant::new("1".to_string(), start, reference.to_string(), alternate.to_string()).unwrap()
    }

    #[test]
    fn test_snv_unchanged() {
        let v = normalize_variant(variant(100, "A", "C")).unwrap();
        assert_eq!(v, variant(100, "A", "C"));
    }

    #[test]
    fn test_anchored_indels() {
        let v = normalize_variant(variant(100, "A", "AGT")).unwrap();
        assert_eq!(v.canonical_key(), "1:101:-:GT");
        assert_eq!(v.variant_type(), VariantType::Insertion);

        let v = normalize_variant(variant(100, "AGT", "A")).unwrap();
        assert_eq!(v.canonical_key(), "1:101:GT:-");
        assert_eq!(v.variant_type(), VariantType::Deletion);
        assert_eq!(v.end(), 102);
    }

    #[test]
    fn test_suffix_then_prefix() {
        // shared trailing C is removed before the shared leading T
        let v = normalize_variant(variant(10, "TAC", "TGC")).unwrap();
        assert_eq!(v.canonical_key(), "1:11:A:G");
        assert_eq!(v.variant_type(), VariantType::Snv);

        // repeat context: suffix trimming wins
        let v = normalize_variant(variant(10, "CAA", "CA")).unwrap();
        assert_eq!(v.canonical_key(), "1:11:A:-");
    }

    #[test]
    fn test_structural_untouched() {
        let v = normalize_variant(variant(10, "A", "<DEL>")).unwrap();
        assert_eq!(v.canonical_key(), "1:10:A:<DEL>");
    }
}
