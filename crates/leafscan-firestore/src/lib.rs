//! Firestore REST persistence layer for LeafScan.
//!
//! This crate provides:
//! - Typed repositories for profiles, subscriptions, daily usage, and scans
//! - Service account authentication via gcp_auth with token caching
//! - Optimistic-concurrency writes via updateTime preconditions

pub mod client;
pub mod error;
pub mod metrics;
pub mod repos;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use repos::{
    DailyUsageRepository, ProfileRepository, ScanRecordRepository, SubscriptionRepository,
};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
