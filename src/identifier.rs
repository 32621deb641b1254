// 🔑 Identifier Normalizer - canonical county codes
// Both sources disagree on padding (501 vs "00501"); everything is joined on
// the fixed-width form produced here.

use crate::error::IdentifierError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Canonical code length for a county-level entity (2-digit state + 3-digit county)
pub const IDENTIFIER_WIDTH: usize = 5;

/// Largest code a fixed-width identifier can hold
pub const MAX_CODE: u32 = 99_999;

/// Largest primary-entity code. State prefixes 60 and above are territories.
pub const MAX_PRIMARY_CODE: u32 = 59_999;

// ============================================================================
// RAW IDENTIFIER (as supplied by a source)
// ============================================================================

/// Identifier exactly as a source supplied it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Number(n) => write!(f, "{}", n),
            RawId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RawId {
    fn from(n: i64) -> Self {
        RawId::Number(n)
    }
}

impl From<u32> for RawId {
    fn from(n: u32) -> Self {
        RawId::Number(i64::from(n))
    }
}

impl From<&str> for RawId {
    fn from(s: &str) -> Self {
        RawId::Text(s.to_string())
    }
}

impl From<String> for RawId {
    fn from(s: String) -> Self {
        RawId::Text(s)
    }
}

impl From<&RawId> for RawId {
    fn from(raw: &RawId) -> Self {
        raw.clone()
    }
}

impl From<Identifier> for RawId {
    fn from(id: Identifier) -> Self {
        RawId::Text(id.to_string())
    }
}

impl From<&Identifier> for RawId {
    fn from(id: &Identifier) -> Self {
        RawId::Text(id.to_string())
    }
}

// ============================================================================
// IDENTIFIER
// ============================================================================

/// Fixed-width county code. Ordering matches the padded string ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    code: u32,
}

impl Identifier {
    pub fn code(&self) -> u32 {
        self.code
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.code, width = IDENTIFIER_WIDTH)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawId::deserialize(deserializer)?;
        normalize_with_limit(raw, MAX_CODE).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Normalize a raw code against the default primary-entity limit
///
/// Example:
/// ```
/// use broadband_reconcile::identifier::normalize;
///
/// assert_eq!(normalize(501u32).unwrap().to_string(), "00501");
/// assert_eq!(normalize("00501").unwrap(), normalize(501u32).unwrap());
/// assert!(normalize(72001u32).unwrap_err().is_territory());
/// ```
pub fn normalize(raw: impl Into<RawId>) -> Result<Identifier, IdentifierError> {
    normalize_with_limit(raw, MAX_PRIMARY_CODE)
}

/// Normalize a raw code, flagging anything above `max_primary_code`
pub fn normalize_with_limit(
    raw: impl Into<RawId>,
    max_primary_code: u32,
) -> Result<Identifier, IdentifierError> {
    let code = parse_code(&raw.into())?;

    if code > max_primary_code {
        return Err(IdentifierError::Territory { code });
    }

    Ok(Identifier { code })
}

fn parse_code(raw: &RawId) -> Result<u32, IdentifierError> {
    match raw {
        RawId::Number(n) => {
            if *n < 0 {
                return Err(IdentifierError::Malformed { raw: n.to_string() });
            }
            u32::try_from(*n)
                .ok()
                .filter(|code| *code <= MAX_CODE)
                .ok_or_else(|| IdentifierError::TooWide {
                    raw: n.to_string(),
                    width: IDENTIFIER_WIDTH,
                })
        }
        RawId::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Err(IdentifierError::Empty);
            }
            if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
                return Err(IdentifierError::Malformed { raw: s.clone() });
            }

            let significant = trimmed.trim_start_matches('0');
            if significant.len() > IDENTIFIER_WIDTH {
                return Err(IdentifierError::TooWide {
                    raw: s.clone(),
                    width: IDENTIFIER_WIDTH,
                });
            }
            if significant.is_empty() {
                return Ok(0);
            }

            significant
                .parse::<u32>()
                .map_err(|_| IdentifierError::Malformed { raw: s.clone() })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pads_numbers_and_short_strings() {
        assert_eq!(normalize(501u32).unwrap().to_string(), "00501");
        assert_eq!(normalize("501").unwrap().to_string(), "00501");
        assert_eq!(normalize("01001").unwrap().to_string(), "01001");
        assert_eq!(normalize(" 6037 ").unwrap().to_string(), "06037");
    }

    #[test]
    fn test_number_and_text_compare_equal() {
        assert_eq!(normalize(1001i64).unwrap(), normalize("001001").unwrap());
    }

    #[test]
    fn test_idempotent() {
        let once = normalize("501").unwrap();
        let twice = normalize(once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.to_string().len(), IDENTIFIER_WIDTH);
    }

    #[test]
    fn test_territories_flagged() {
        assert_eq!(
            normalize(72001u32),
            Err(IdentifierError::Territory { code: 72001 })
        );
        assert_eq!(
            normalize("60010"),
            Err(IdentifierError::Territory { code: 60010 })
        );
        // 57001 sits below the territory range
        assert!(normalize(57001u32).is_ok());
    }

    #[test]
    fn test_custom_limit() {
        assert!(normalize_with_limit(57001u32, 57000).unwrap_err().is_territory());
        assert!(normalize_with_limit(57000u32, 57000).is_ok());
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(normalize(""), Err(IdentifierError::Empty));
        assert_eq!(normalize("   "), Err(IdentifierError::Empty));
        assert!(matches!(normalize("12a45"), Err(IdentifierError::Malformed { .. })));
        assert!(matches!(normalize(-5i64), Err(IdentifierError::Malformed { .. })));
        assert!(matches!(normalize("123456"), Err(IdentifierError::TooWide { .. })));
        assert!(matches!(normalize(100_000u32), Err(IdentifierError::TooWide { .. })));
    }

    #[test]
    fn test_zero_and_code() {
        assert_eq!(normalize("0000").unwrap().to_string(), "00000");

        let id = normalize(6037u32).unwrap();
        assert_eq!(id.code(), 6037);
    }

    #[test]
    fn test_serde_uses_padded_string() {
        let id = normalize(501u32).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"00501\"");

        let back: Identifier = serde_json::from_str("501").unwrap();
        assert_eq!(back, id);
    }
}
