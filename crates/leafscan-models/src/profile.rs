//! User profile record.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Display name used when neither an identity claim nor an email is available.
pub const DEFAULT_DISPLAY_NAME: &str = "Plant Lover";

/// A user profile.
///
/// Created lazily on the first authenticated scan request and effectively
/// immutable afterwards, except for the display name which the profile
/// endpoint may update.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Profile {
    /// Auth provider user ID.
    pub uid: String,
    /// Email address, if the identity provider supplied one.
    pub email: Option<String>,
    /// Display name.
    pub full_name: String,
    /// Admin users bypass all metering.
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Create a fresh profile from identity claims.
    pub fn new(uid: impl Into<String>, email: Option<String>, name_claim: Option<String>) -> Self {
        let email = email.filter(|e| !e.is_empty());
        let full_name = display_name_from_claims(name_claim.as_deref(), email.as_deref());
        let now = Utc::now();
        Self {
            uid: uid.into(),
            email,
            full_name,
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Resolve a display name from identity claims.
///
/// Falls back from the provider's name claim to the email local part, then to
/// a generic default.
pub fn display_name_from_claims(name_claim: Option<&str>, email: Option<&str>) -> String {
    if let Some(name) = name_claim {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    if let Some(email) = email {
        if let Some(local) = email.split('@').next() {
            if !local.is_empty() {
                return local.to_string();
            }
        }
    }
    DEFAULT_DISPLAY_NAME.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_prefers_claim() {
        let name = display_name_from_claims(Some("Ada Lovelace"), Some("ada@example.com"));
        assert_eq!(name, "Ada Lovelace");
    }

    #[test]
    fn test_display_name_falls_back_to_email_local_part() {
        let name = display_name_from_claims(None, Some("ada@example.com"));
        assert_eq!(name, "ada");
        let name = display_name_from_claims(Some("   "), Some("ada@example.com"));
        assert_eq!(name, "ada");
    }

    #[test]
    fn test_display_name_generic_default() {
        assert_eq!(display_name_from_claims(None, None), DEFAULT_DISPLAY_NAME);
        assert_eq!(
            display_name_from_claims(None, Some("@nodomain")),
            DEFAULT_DISPLAY_NAME
        );
    }

    #[test]
    fn test_new_profile_is_not_admin() {
        let profile = Profile::new("u1", Some("u1@example.com".to_string()), None);
        assert!(!profile.is_admin);
        assert_eq!(profile.full_name, "u1");
    }
}
