//! `T<seconds>` offset prefix.

use crate::error::StoreError;

pub const PREFIX: char = 'T';

/// Format an elapsed-seconds offset. Negative and non-finite values are
/// clamped to zero so the result always decodes.
pub fn encode(offset: f64) -> String {
    let offset = if offset.is_finite() && offset > 0.0 {
        offset
    } else {
        0.0
    };
    format!("{PREFIX}{offset}")
}

/// Parse a `T<seconds>` token.
pub fn decode(token: &str) -> Result<f64, StoreError> {
    let malformed = || StoreError::MalformedTimestamp(token.to_string());
    let number = token.strip_prefix(PREFIX).ok_or_else(malformed)?;
    let offset: f64 = number.parse().map_err(|_| malformed())?;
    if !offset.is_finite() || offset < 0.0 {
        return Err(malformed());
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uses_shortest_form() {
        assert_eq!(encode(0.0), "T0");
        assert_eq!(encode(5.0), "T5");
        assert_eq!(encode(12.3), "T12.3");
        assert_eq!(encode(0.001953125), "T0.001953125");
    }

    #[test]
    fn test_encode_clamps_invalid_offsets() {
        assert_eq!(encode(-1.5), "T0");
        assert_eq!(encode(f64::NAN), "T0");
        assert_eq!(encode(f64::INFINITY), "T0");
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode("T0").unwrap(), 0.0);
        assert_eq!(decode("T12.3").unwrap(), 12.3);
        assert_eq!(decode("T1e2").unwrap(), 100.0);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        for token in ["", "T", "12.3", "Tabc", "T-1", "TNaN", "Tinf", "t1"] {
            assert!(
                matches!(decode(token), Err(StoreError::MalformedTimestamp(_))),
                "{token:?} should be malformed"
            );
        }
    }
}
