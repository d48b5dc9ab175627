use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ValidationError, ValidationResult};

pub const MAX_USER_ID_LENGTH: usize = 128;

/// Canonical identifier of a user (token subject or pet owner).
///
/// Identifiers are trimmed when parsed and otherwise kept byte-for-byte, so
/// owner comparison is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> ValidationResult<Self> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::RequiredField {
                field: "owner".to_string(),
            });
        }

        if trimmed.len() > MAX_USER_ID_LENGTH {
            return Err(ValidationError::TooLong {
                field: "owner".to_string(),
                max_length: MAX_USER_ID_LENGTH,
                actual_length: trimmed.len(),
            });
        }

        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::InvalidValue {
                field: "owner".to_string(),
                value: raw.to_string(),
                reason: "User id cannot contain whitespace or control characters".to_string(),
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims() {
        let id = UserId::parse("  5A7DB6C74D55BC51BDF39793 ").unwrap();
        assert_eq!(id.as_str(), "5A7DB6C74D55BC51BDF39793");
        assert_eq!(id, UserId::parse("5A7DB6C74D55BC51BDF39793").unwrap());
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        let upper = UserId::parse("Auth0|AbC").unwrap();
        let lower = UserId::parse("auth0|abc").unwrap();
        assert_ne!(upper, lower);
        assert_eq!(upper.as_str(), "Auth0|AbC");
    }

    #[test]
    fn test_parse_rejects_blank_and_whitespace() {
        assert!(matches!(
            UserId::parse("   "),
            Err(ValidationError::RequiredField { .. })
        ));
        assert!(matches!(
            UserId::parse("user one"),
            Err(ValidationError::InvalidValue { .. })
        ));
        assert!(UserId::parse(&"a".repeat(MAX_USER_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_serde_uses_canonical_form() {
        let id: UserId = serde_json::from_str("\"User-A\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"User-A\"");
        assert!(serde_json::from_str::<UserId>("\"\"").is_err());
    }
}
