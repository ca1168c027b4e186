//! Subscription records and usability rules.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Subscription lifecycle status.
///
/// Only `Active` subscriptions can fund scans. Statuses we don't recognize
/// parse to `Other` and are treated as not usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
    Other,
}

impl SubscriptionStatus {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" => Self::Active,
            "cancelled" | "canceled" => Self::Cancelled,
            "expired" => Self::Expired,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A purchased block of scan credits.
///
/// A user may accumulate several subscriptions over time; the most recently
/// created usable one funds scans. `scans_remaining` only ever decreases via
/// debits and never drops below zero.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Subscription {
    /// Unique identifier (UUID).
    pub id: String,
    /// Owning user.
    pub user_id: String,
    pub status: SubscriptionStatus,
    /// Plan identifier from the fixed catalog.
    pub plan_type: String,
    /// Scan credits left on this subscription.
    pub scans_remaining: u32,
    /// Validity cutoff; credits are unusable past this instant.
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Whether this subscription can fund a scan right now.
    ///
    /// Usable iff active, unexpired, and holding at least one credit.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.expires_at > now && self.scans_remaining > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn subscription(status: SubscriptionStatus, scans: u32, expires_in_hours: i64) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: "sub-1".to_string(),
            user_id: "u1".to_string(),
            status,
            plan_type: "premium".to_string(),
            scans_remaining: scans,
            expires_at: now + Duration::hours(expires_in_hours),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_usable_requires_all_three_conditions() {
        let now = Utc::now();
        assert!(subscription(SubscriptionStatus::Active, 1, 1).is_usable(now));
        assert!(!subscription(SubscriptionStatus::Cancelled, 1, 1).is_usable(now));
        assert!(!subscription(SubscriptionStatus::Active, 0, 1).is_usable(now));
        assert!(!subscription(SubscriptionStatus::Active, 1, -1).is_usable(now));
    }

    #[test]
    fn test_expiry_boundary_is_strict() {
        let sub = subscription(SubscriptionStatus::Active, 5, 0);
        // expires_at == now is not usable; the cutoff is strictly in the future
        assert!(!sub.is_usable(sub.expires_at));
    }

    #[test]
    fn test_status_parse_round_trip() {
        assert_eq!(SubscriptionStatus::from_str("ACTIVE"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_str("canceled"), SubscriptionStatus::Cancelled);
        assert_eq!(SubscriptionStatus::from_str("trialing"), SubscriptionStatus::Other);
        assert_eq!(SubscriptionStatus::Active.as_str(), "active");
    }
}
