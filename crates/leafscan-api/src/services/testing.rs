//! In-memory [`EntitlementStore`] for tests.
//!
//! Not part of the public API surface; exists so unit and integration tests
//! can exercise the metering logic without a Firestore project.

#![doc(hidden)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use leafscan_firestore::{FirestoreError, FirestoreResult};
use leafscan_models::{Profile, ScanRecord, Subscription};

use crate::services::store::EntitlementStore;

#[derive(Default)]
struct State {
    profiles: HashMap<String, Profile>,
    subscriptions: HashMap<String, Subscription>,
    daily_usage: HashMap<(String, NaiveDate), u32>,
    scans: Vec<ScanRecord>,
    profile_creates: u32,
    fail_next_subscription_debit: bool,
    fail_next_daily_count: bool,
    fail_next_save_scan: bool,
}

/// In-memory entitlement store.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn add_profile(&self, profile: Profile) {
        let mut state = self.state.lock().await;
        state.profiles.insert(profile.uid.clone(), profile);
    }

    pub async fn add_subscription(&self, sub: Subscription) {
        let mut state = self.state.lock().await;
        state.subscriptions.insert(sub.id.clone(), sub);
    }

    pub async fn set_daily_usage(&self, user_id: &str, day: NaiveDate, scans_used: u32) {
        let mut state = self.state.lock().await;
        state.daily_usage.insert((user_id.to_string(), day), scans_used);
    }

    pub async fn scans_used(&self, user_id: &str, day: NaiveDate) -> u32 {
        let state = self.state.lock().await;
        state
            .daily_usage
            .get(&(user_id.to_string(), day))
            .copied()
            .unwrap_or(0)
    }

    pub async fn subscription_balance(&self, sub_id: &str) -> Option<u32> {
        let state = self.state.lock().await;
        state.subscriptions.get(sub_id).map(|s| s.scans_remaining)
    }

    pub async fn saved_scans(&self) -> Vec<ScanRecord> {
        self.state.lock().await.scans.clone()
    }

    pub async fn profile_create_count(&self) -> u32 {
        self.state.lock().await.profile_creates
    }

    /// Make the next conditional subscription debit report failure, as a
    /// concurrent drain of the balance would.
    pub async fn fail_next_subscription_debit(&self) {
        self.state.lock().await.fail_next_subscription_debit = true;
    }

    /// Make the next daily counter write return a storage error.
    pub async fn fail_next_daily_count(&self) {
        self.state.lock().await.fail_next_daily_count = true;
    }

    /// Make the next scan record write return a storage error.
    pub async fn fail_next_save_scan(&self) {
        self.state.lock().await.fail_next_save_scan = true;
    }
}

#[async_trait]
impl EntitlementStore for InMemoryStore {
    async fn get_or_create_profile(
        &self,
        uid: &str,
        email: Option<&str>,
        name_claim: Option<&str>,
    ) -> FirestoreResult<Profile> {
        let mut state = self.state.lock().await;
        if let Some(profile) = state.profiles.get(uid) {
            return Ok(profile.clone());
        }
        let profile = Profile::new(uid, email.map(String::from), name_claim.map(String::from));
        state.profiles.insert(uid.to_string(), profile.clone());
        state.profile_creates += 1;
        Ok(profile)
    }

    async fn get_profile(&self, uid: &str) -> FirestoreResult<Option<Profile>> {
        Ok(self.state.lock().await.profiles.get(uid).cloned())
    }

    async fn update_profile_name(&self, uid: &str, full_name: &str) -> FirestoreResult<()> {
        let mut state = self.state.lock().await;
        match state.profiles.get_mut(uid) {
            Some(profile) => {
                profile.full_name = full_name.to_string();
                profile.updated_at = Utc::now();
                Ok(())
            }
            None => Err(FirestoreError::not_found(format!("profiles/{}", uid))),
        }
    }

    async fn usable_subscription(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> FirestoreResult<Option<Subscription>> {
        let state = self.state.lock().await;
        let mut usable: Vec<_> = state
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id && s.is_usable(now))
            .cloned()
            .collect();
        usable.sort_by_key(|s| std::cmp::Reverse(s.created_at));
        Ok(usable.into_iter().next())
    }

    async fn create_subscription(&self, sub: &Subscription) -> FirestoreResult<()> {
        let mut state = self.state.lock().await;
        if state.subscriptions.contains_key(&sub.id) {
            return Err(FirestoreError::AlreadyExists(sub.id.clone()));
        }
        state.subscriptions.insert(sub.id.clone(), sub.clone());
        Ok(())
    }

    async fn debit_subscription_scan(&self, sub_id: &str) -> FirestoreResult<bool> {
        let mut state = self.state.lock().await;
        if state.fail_next_subscription_debit {
            state.fail_next_subscription_debit = false;
            return Ok(false);
        }
        match state.subscriptions.get_mut(sub_id) {
            Some(sub) if sub.is_usable(Utc::now()) => {
                sub.scans_remaining -= 1;
                sub.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scans_used_on(&self, user_id: &str, day: NaiveDate) -> FirestoreResult<u32> {
        let state = self.state.lock().await;
        Ok(state
            .daily_usage
            .get(&(user_id.to_string(), day))
            .copied()
            .unwrap_or(0))
    }

    async fn count_daily_scan(&self, user_id: &str, day: NaiveDate) -> FirestoreResult<u32> {
        let mut state = self.state.lock().await;
        if state.fail_next_daily_count {
            state.fail_next_daily_count = false;
            return Err(FirestoreError::request_failed("injected daily counter failure"));
        }
        let counter = state
            .daily_usage
            .entry((user_id.to_string(), day))
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn save_scan(&self, record: &ScanRecord) -> FirestoreResult<()> {
        let mut state = self.state.lock().await;
        if state.fail_next_save_scan {
            state.fail_next_save_scan = false;
            return Err(FirestoreError::request_failed("injected scan write failure"));
        }
        state.scans.push(record.clone());
        Ok(())
    }

    async fn health_check(&self) -> FirestoreResult<()> {
        Ok(())
    }

    async fn recent_scans(&self, user_id: &str, limit: i32) -> FirestoreResult<Vec<ScanRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<_> = state
            .scans
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|s| std::cmp::Reverse(s.created_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}
