//! Signup input validators.
//!
//! Pure, deterministic checks over display names and passwords. No Unicode
//! normalization is applied; predicates are byte-for-byte over what the
//! caller sent.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Punctuation characters that count toward the password "special" rule.
pub const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

/// Outcome of display-name validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NameValidation {
    pub valid: bool,
    /// Error message for the first failed rule, if any.
    pub error: Option<String>,
}

impl NameValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn fail(message: &str) -> Self {
        Self {
            valid: false,
            error: Some(message.to_string()),
        }
    }
}

/// Validate a display name.
///
/// Rules, in order: non-empty after trimming, at least 2 characters, and only
/// letters, whitespace, hyphens, and apostrophes.
pub fn validate_name(name: &str) -> NameValidation {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return NameValidation::fail("Name is required");
    }
    if trimmed.chars().count() < 2 {
        return NameValidation::fail("Name must be at least 2 characters");
    }
    let charset_ok = trimmed
        .chars()
        .all(|c| c.is_alphabetic() || c.is_whitespace() || c == '-' || c == '\'');
    if !charset_ok {
        return NameValidation::fail("Name can only contain letters, spaces, and hyphens");
    }
    NameValidation::ok()
}

/// Per-rule breakdown of password strength.
///
/// Each field is independently computed; `meets_all` is the conjunction of
/// the five rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PasswordRequirements {
    /// Strictly more than 8 characters.
    pub min_length: bool,
    /// At least 2 uppercase letters.
    pub uppercase: bool,
    /// At least 2 lowercase letters.
    pub lowercase: bool,
    /// At least 2 digits.
    pub number: bool,
    /// At least 2 characters from [`SPECIAL_CHARS`].
    pub special: bool,
    pub meets_all: bool,
}

/// Evaluate a password against the five strength rules.
pub fn validate_password(password: &str) -> PasswordRequirements {
    let min_length = password.chars().count() > 8;
    let uppercase = password.chars().filter(|c| c.is_ascii_uppercase()).count() >= 2;
    let lowercase = password.chars().filter(|c| c.is_ascii_lowercase()).count() >= 2;
    let number = password.chars().filter(|c| c.is_ascii_digit()).count() >= 2;
    let special = password.chars().filter(|c| SPECIAL_CHARS.contains(*c)).count() >= 2;

    PasswordRequirements {
        min_length,
        uppercase,
        lowercase,
        number,
        special,
        meets_all: min_length && uppercase && lowercase && number && special,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_required() {
        let result = validate_name("");
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("Name is required"));
        // Whitespace-only trims to empty
        let result = validate_name("   ");
        assert_eq!(result.error.as_deref(), Some("Name is required"));
    }

    #[test]
    fn test_name_too_short() {
        let result = validate_name("A");
        assert!(!result.valid);
        assert_eq!(
            result.error.as_deref(),
            Some("Name must be at least 2 characters")
        );
    }

    #[test]
    fn test_name_charset() {
        let result = validate_name("Bob123");
        assert!(!result.valid);
        assert_eq!(
            result.error.as_deref(),
            Some("Name can only contain letters, spaces, and hyphens")
        );
        assert!(!validate_name("Eve_Smith").valid);
    }

    #[test]
    fn test_name_valid() {
        assert!(validate_name("Mary-Jane O'Brien").valid);
        assert!(validate_name("Jo").valid);
        // Surrounding whitespace is trimmed before the rules apply
        assert!(validate_name("  Ada Lovelace  ").valid);
    }

    #[test]
    fn test_password_all_rules_met() {
        let req = validate_password("AAbb12!?x");
        assert!(req.min_length);
        assert!(req.uppercase);
        assert!(req.lowercase);
        assert!(req.number);
        assert!(req.special);
        assert!(req.meets_all);
    }

    #[test]
    fn test_password_each_rule_independently_toggleable() {
        // Length is exactly 8: min_length fails, everything else holds
        let req = validate_password("AAbb12!?");
        assert!(!req.min_length);
        assert!(req.uppercase && req.lowercase && req.number && req.special);
        assert!(!req.meets_all);

        // Only one uppercase letter
        let req = validate_password("Aabbb12!?");
        assert!(!req.uppercase);
        assert!(req.min_length && req.lowercase && req.number && req.special);
        assert!(!req.meets_all);

        // Only one lowercase letter
        let req = validate_password("AABBb12!?");
        assert!(!req.lowercase);
        assert!(!req.meets_all);

        // Only one digit
        let req = validate_password("AAbbcc1!?");
        assert!(!req.number);
        assert!(!req.meets_all);

        // Only one special character
        let req = validate_password("AAbbcc12!");
        assert!(!req.special);
        assert!(!req.meets_all);
    }

    #[test]
    fn test_password_no_case_folding() {
        // Non-ASCII uppercase does not count toward the ASCII predicates
        let req = validate_password("ÄÖbb12!?x");
        assert!(!req.uppercase);
    }
}
