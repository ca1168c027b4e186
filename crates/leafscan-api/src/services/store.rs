//! Persistence seam for the metering subsystem.
//!
//! The evaluator, debiter and orchestrator only touch storage through
//! [`EntitlementStore`], so the decision logic stays testable against an
//! in-memory implementation (see [`crate::services::testing`]).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use leafscan_firestore::repos::{
    DailyUsageRepository, ProfileRepository, ScanRecordRepository, SubscriptionRepository,
};
use leafscan_firestore::{FirestoreClient, FirestoreResult};
use leafscan_models::{Profile, ScanRecord, Subscription};

/// Storage operations the metering subsystem needs.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Fetch the profile, creating it from identity claims if absent.
    async fn get_or_create_profile(
        &self,
        uid: &str,
        email: Option<&str>,
        name_claim: Option<&str>,
    ) -> FirestoreResult<Profile>;

    /// Fetch the profile without creating it.
    async fn get_profile(&self, uid: &str) -> FirestoreResult<Option<Profile>>;

    /// Update the profile's display name.
    async fn update_profile_name(&self, uid: &str, full_name: &str) -> FirestoreResult<()>;

    /// Most recently created usable subscription for the user, if any.
    async fn usable_subscription(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> FirestoreResult<Option<Subscription>>;

    /// Record a purchased subscription.
    async fn create_subscription(&self, sub: &Subscription) -> FirestoreResult<()>;

    /// Atomically decrement the subscription's balance by one scan.
    /// Returns false if the subscription was no longer usable.
    async fn debit_subscription_scan(&self, sub_id: &str) -> FirestoreResult<bool>;

    /// Free scans the user has consumed on the given day.
    async fn scans_used_on(&self, user_id: &str, day: NaiveDate) -> FirestoreResult<u32>;

    /// Count one free scan against the day, returning the new count.
    async fn count_daily_scan(&self, user_id: &str, day: NaiveDate) -> FirestoreResult<u32>;

    /// Append a scan record.
    async fn save_scan(&self, record: &ScanRecord) -> FirestoreResult<()>;

    /// Most recent scans for the user, newest first.
    async fn recent_scans(&self, user_id: &str, limit: i32) -> FirestoreResult<Vec<ScanRecord>>;

    /// Cheap reachability probe for the readiness endpoint.
    async fn health_check(&self) -> FirestoreResult<()>;
}

/// Firestore-backed entitlement store.
#[derive(Clone)]
pub struct FirestoreEntitlementStore {
    client: Arc<FirestoreClient>,
    profiles: ProfileRepository,
    subscriptions: SubscriptionRepository,
}

impl FirestoreEntitlementStore {
    pub fn new(client: Arc<FirestoreClient>) -> Self {
        let profiles = ProfileRepository::new((*client).clone());
        let subscriptions = SubscriptionRepository::new((*client).clone());
        Self {
            client,
            profiles,
            subscriptions,
        }
    }

    fn daily_usage(&self, user_id: &str) -> DailyUsageRepository {
        DailyUsageRepository::new((*self.client).clone(), user_id)
    }

    fn scans(&self, user_id: &str) -> ScanRecordRepository {
        ScanRecordRepository::new((*self.client).clone(), user_id)
    }
}

#[async_trait]
impl EntitlementStore for FirestoreEntitlementStore {
    async fn get_or_create_profile(
        &self,
        uid: &str,
        email: Option<&str>,
        name_claim: Option<&str>,
    ) -> FirestoreResult<Profile> {
        self.profiles.get_or_create(uid, email, name_claim).await
    }

    async fn get_profile(&self, uid: &str) -> FirestoreResult<Option<Profile>> {
        self.profiles.get(uid).await
    }

    async fn update_profile_name(&self, uid: &str, full_name: &str) -> FirestoreResult<()> {
        self.profiles.update_name(uid, full_name).await
    }

    async fn usable_subscription(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> FirestoreResult<Option<Subscription>> {
        self.subscriptions.latest_usable(user_id, now).await
    }

    async fn create_subscription(&self, sub: &Subscription) -> FirestoreResult<()> {
        self.subscriptions.create(sub).await
    }

    async fn debit_subscription_scan(&self, sub_id: &str) -> FirestoreResult<bool> {
        self.subscriptions.debit_scan(sub_id).await
    }

    async fn scans_used_on(&self, user_id: &str, day: NaiveDate) -> FirestoreResult<u32> {
        self.daily_usage(user_id).scans_used_on(day).await
    }

    async fn count_daily_scan(&self, user_id: &str, day: NaiveDate) -> FirestoreResult<u32> {
        self.daily_usage(user_id).record_scan(day).await
    }

    async fn save_scan(&self, record: &ScanRecord) -> FirestoreResult<()> {
        self.scans(&record.user_id).create(record).await
    }

    async fn recent_scans(&self, user_id: &str, limit: i32) -> FirestoreResult<Vec<ScanRecord>> {
        self.scans(user_id).list_recent(limit).await
    }

    async fn health_check(&self) -> FirestoreResult<()> {
        // A miss still proves the backend is reachable
        self.client.get_document("_health", "_check").await.map(|_| ())
    }
}
