//! Daily free-quota usage counters.

use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Free scans allowed per user per UTC calendar day.
pub const DAILY_FREE_SCAN_LIMIT: u32 = 5;

/// Per-day usage counter for a user.
///
/// At most one record exists per (user, UTC calendar date); the record is
/// created on the first free scan of the day and incremented afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DailyUsage {
    pub user_id: String,
    /// UTC calendar date this counter covers.
    pub day: NaiveDate,
    /// Free scans consumed on `day`.
    pub scans_used: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyUsage {
    /// Counter for the first scan of a day.
    pub fn first_scan(user_id: impl Into<String>, day: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            day,
            scans_used: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the free quota is exhausted.
    pub fn limit_reached(&self) -> bool {
        self.scans_used >= DAILY_FREE_SCAN_LIMIT
    }
}

/// Day key for a date, in "YYYY-MM-DD" format.
///
/// Used as the document ID for daily usage records, which makes the
/// one-record-per-(user, date) invariant structural.
pub fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Today's UTC calendar date.
pub fn today_key() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_key_format() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(day_key(day), "2025-03-07");
    }

    #[test]
    fn test_limit_boundary() {
        let mut usage = DailyUsage::first_scan("u1", today_key());
        assert!(!usage.limit_reached());
        usage.scans_used = DAILY_FREE_SCAN_LIMIT - 1;
        assert!(!usage.limit_reached());
        usage.scans_used = DAILY_FREE_SCAN_LIMIT;
        assert!(usage.limit_reached());
    }

    #[test]
    fn test_first_scan_starts_at_one() {
        let usage = DailyUsage::first_scan("u1", today_key());
        assert_eq!(usage.scans_used, 1);
    }
}
