//! Shared data models for the LeafScan backend.
//!
//! This crate provides:
//! - Entitlement records (Profile, Subscription, DailyUsage)
//! - Scan records and detection results
//! - The fixed subscription plan catalog
//! - Signup input validators (name, password)

pub mod plan;
pub mod profile;
pub mod scan;
pub mod subscription;
pub mod usage;
pub mod validation;

pub use plan::ScanPlan;
pub use profile::Profile;
pub use scan::{DetectionResult, ScanRecord, ScanStatus};
pub use subscription::{Subscription, SubscriptionStatus};
pub use usage::{day_key, today_key, DailyUsage, DAILY_FREE_SCAN_LIMIT};
pub use validation::{validate_name, validate_password, NameValidation, PasswordRequirements};
