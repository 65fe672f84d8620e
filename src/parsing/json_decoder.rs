use crate::breakend_reconciler::PendingMate;
use crate::data_types::variants::{Variant, VariantError, CIPOS_KEY};
use crate::parsing::vcf_decoder::DecodedRecord;

/// Decodes one NDJSON line holding a serialized variant.
/// Mated breakends are routed to the reconciler the same way as VCF input.
/// # Errors
/// * if the line is not a valid variant record
/// * if the record is not eligible for annotation
pub fn decode_json_line(line: &str) -> Result<DecodedRecord, VariantError> {
    let mut variant: Variant = serde_json::from_str(line)?;
    variant.validate()?;

    if variant.is_breakend() && variant.mate_id().is_some() && variant.id().is_some() {
        let cipos = variant.info().get(CIPOS_KEY).cloned();
        if let Some(half) = PendingMate::new(variant.clone(), cipos) {
            return Ok(DecodedRecord::Breakend(half));
        }
    }
    Ok(DecodedRecord::Simple(variant))
}
