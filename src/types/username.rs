use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 64;

/// A validated username.
///
/// Keeps the spelling the user chose for display, and a lowercased key that
/// every store uses for uniqueness and lookup. Equality, ordering and
/// hashing only look at the key, so `Alice` and `alice` are the same user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username {
    display: String,
    key: String,
}

impl Username {
    pub fn parse(raw: &str) -> Result<Self> {
        let display = raw.trim();
        let len = display.chars().count();

        if len < MIN_USERNAME_LEN {
            return Err(Error::Validation(format!(
                "username must be at least {MIN_USERNAME_LEN} characters"
            )));
        }
        if len > MAX_USERNAME_LEN {
            return Err(Error::Validation(format!(
                "username cannot exceed {MAX_USERNAME_LEN} characters"
            )));
        }
        if display.chars().any(char::is_control) {
            return Err(Error::Validation(
                "username cannot contain control characters".to_string(),
            ));
        }

        Ok(Self {
            display: display.to_string(),
            key: canonical_key(display),
        })
    }

    /// The spelling shown to people.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// The canonical storage key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Canonical form of a username or email used for case-insensitive keys.
///
/// Lowercasing is Unicode-aware, so `JOSÉ` and `josé` share a key.
#[must_use]
pub fn canonical_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl PartialEq for Username {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Username {}

impl Hash for Username {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Username {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Username {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl TryFrom<String> for Username {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.display
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_keys_lowercase() {
        let name = Username::parse("  Alice_01 ").unwrap();
        assert_eq!(name.as_str(), "Alice_01");
        assert_eq!(name.key(), "alice_01");
    }

    #[test]
    fn test_case_variants_are_equal() {
        let a = Username::parse("Alice").unwrap();
        let b = Username::parse("aLICE").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        assert!(Username::parse("ab").is_err());
        assert!(Username::parse("   ").is_err());
        assert!(Username::parse("tab\there").is_err());
        assert!(Username::parse(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_spaces_and_accents_are_allowed() {
        let name = Username::parse(" John Doe ").unwrap();
        assert_eq!(name.as_str(), "John Doe");
        assert_eq!(name.key(), "john doe");

        let jose = Username::parse("JOSÉ").unwrap();
        assert_eq!(jose, Username::parse("josé").unwrap());
        assert_eq!(jose.key(), "josé");

        // Length counts characters, not bytes.
        assert!(Username::parse("Zoë").is_ok());
        assert!(Username::parse(&"é".repeat(64)).is_ok());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Username = serde_json::from_str("\"Bob\"").unwrap();
        assert_eq!(ok.key(), "bob");
        assert!(serde_json::from_str::<Username>("\"b\"").is_err());
    }
}
