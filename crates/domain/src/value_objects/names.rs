//! Validated name newtypes.
//!
//! Names are valid by construction: non-empty, trimmed, within length
//! limits. A part with an empty name is a data-integrity violation that
//! blocks quote conversion, so the constructor is the single gate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

const MAX_NAME_LENGTH: usize = 200;

/// A validated part name (non-empty, <=200 chars, trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartName(String);

impl PartName {
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("Part name cannot be empty"));
        }
        if trimmed.len() > MAX_NAME_LENGTH {
            return Err(DomainError::validation(format!(
                "Part name cannot exceed {} characters",
                MAX_NAME_LENGTH
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for PartName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PartName> for String {
    fn from(value: PartName) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_accepts() {
        let name = PartName::new("  Bracket, left  ").unwrap();
        assert_eq!(name.as_str(), "Bracket, left");
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(PartName::new("").is_err());
        assert!(PartName::new("   ").is_err());
    }

    #[test]
    fn rejects_overlong() {
        assert!(PartName::new("x".repeat(MAX_NAME_LENGTH + 1)).is_err());
    }
}
