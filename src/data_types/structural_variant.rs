use serde::{Deserialize, Serialize};

use crate::data_types::variants::VariantError;

/// Confidence interval bounds of a structural event.
/// All bounds are absolute 1-based coordinates.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralVariant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ci_start_left: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ci_start_right: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ci_end_left: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ci_end_right: Option<u64>,
    /// Raw SVTYPE value, e.g. "BND"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sv_type: Option<String>
}

impl StructuralVariant {
    /// Builds the start interval around `position`.
    /// A missing interval collapses both bounds onto `position`.
    pub fn with_start_interval(mut self, position: u64, offsets: Option<(i64, i64)>) -> Self {
        let (left, right) = resolve_interval(position, offsets);
        self.ci_start_left = Some(left);
        self.ci_start_right = Some(right);
        self
    }

    pub fn with_sv_type(mut self, sv_type: Option<String>) -> Self {
        self.sv_type = sv_type;
        self
    }

    /// Sets the end interval around `position`, see [`StructuralVariant::with_start_interval`]
    pub fn set_end_interval(&mut self, position: u64, offsets: Option<(i64, i64)>) {
        let (left, right) = resolve_interval(position, offsets);
        self.ci_end_left = Some(left);
        self.ci_end_right = Some(right);
    }

    pub fn ci_start_left(&self) -> Option<u64> {
        self.ci_start_left
    }

    pub fn ci_start_right(&self) -> Option<u64> {
        self.ci_start_right
    }

    pub fn ci_end_left(&self) -> Option<u64> {
        self.ci_end_left
    }

    pub fn ci_end_right(&self) -> Option<u64> {
        self.ci_end_right
    }

    pub fn sv_type(&self) -> Option<&str> {
        self.sv_type.as_deref()
    }
}

/// Converts relative offsets into absolute bounds, clamping at 0
fn resolve_interval(position: u64, offsets: Option<(i64, i64)>) -> (u64, u64) {
    match offsets {
        Some((left, right)) => (
            position.saturating_add_signed(left),
            position.saturating_add_signed(right)
        ),
        None => (position, position)
    }
}

/// Parses a CIPOS/CIEND value such as "-10,25" into relative offsets.
/// # Errors
/// * if the value does not have exactly two integer components
pub fn parse_confidence_interval(value: &str) -> Result<(i64, i64), VariantError> {
    let parse_error = || VariantError::ParseField { field: "confidence interval", value: value.to_string() };
    let mut parts = value.split(',');
    let left = parts.next()
        .and_then(|p| p.trim().parse::<i64>().ok())
        .ok_or_else(parse_error)?;
    let right = parts.next()
        .and_then(|p| p.trim().parse::<i64>().ok())
        .ok_or_else(parse_error)?;
    if parts.next().is_some() {
        return Err(parse_error());
    }
    Ok((left, right))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_confidence_interval() {
        assert_eq!(parse_confidence_interval("-10,25").unwrap(), (-10, 25));
        assert_eq!(parse_confidence_interval("0,0").unwrap(), (0, 0));
        assert!(parse_confidence_interval("10").is_err());
        assert!(parse_confidence_interval("a,b").is_err());
        assert!(parse_confidence_interval("1,2,3").is_err());
    }

    #[test]
    fn test_intervals() {
        let mut sv = StructuralVariant::default().with_start_interval(100, Some((-5, 5)));
        assert_eq!(sv.ci_start_left(), Some(95));
        assert_eq!(sv.ci_start_right(), Some(105));
        assert_eq!(sv.ci_end_left(), None);

        // precise when absent
        sv.set_end_interval(500, None);
        assert_eq!(sv.ci_end_left(), Some(500));
        assert_eq!(sv.ci_end_right(), Some(500));

        // clamps rather than wrapping
        let sv = StructuralVariant::default().with_start_interval(3, Some((-10, 0)));
        assert_eq!(sv.ci_start_left(), Some(0));
    }
}
