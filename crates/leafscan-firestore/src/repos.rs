//! Typed repositories for profiles, subscriptions, daily usage and scans.
//!
//! Write paths that race (subscription debits, daily counters) use optimistic
//! locking on Firestore's `updateTime` precondition with bounded retries.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use leafscan_models::{
    day_key, DailyUsage, Profile, ScanRecord, ScanStatus, Subscription, SubscriptionStatus,
};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_precondition_conflict;
use crate::types::{
    CollectionSelector, Document, Filter, FromFirestoreValue, Order, StructuredQuery,
    ToFirestoreValue, Value,
};

/// Maximum retries for optimistically-locked writes.
const MAX_WRITE_RETRIES: u32 = 5;

/// Base delay for backoff between retries (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 50;

// =============================================================================
// Profiles
// =============================================================================

/// Repository for user profile documents at `profiles/{uid}`.
#[derive(Clone)]
pub struct ProfileRepository {
    client: FirestoreClient,
}

impl ProfileRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Get a profile by user ID.
    pub async fn get(&self, uid: &str) -> FirestoreResult<Option<Profile>> {
        let doc = self.client.get_document("profiles", uid).await?;
        match doc {
            Some(d) => Ok(Some(document_to_profile(&d, uid)?)),
            None => Ok(None),
        }
    }

    /// Fetch the profile, creating it from auth claims on first sight.
    ///
    /// Safe under concurrent first requests: if another request creates the
    /// document between our miss and our create, we re-read and return theirs.
    pub async fn get_or_create(
        &self,
        uid: &str,
        email: Option<&str>,
        name_claim: Option<&str>,
    ) -> FirestoreResult<Profile> {
        if let Some(profile) = self.get(uid).await? {
            return Ok(profile);
        }

        let profile = Profile::new(uid, email.map(String::from), name_claim.map(String::from));
        match self
            .client
            .create_document("profiles", uid, profile_to_fields(&profile))
            .await
        {
            Ok(_) => {
                info!(uid = %uid, "Created profile");
                Ok(profile)
            }
            Err(e) if e.is_already_exists() => {
                debug!(uid = %uid, "Profile created concurrently, re-reading");
                self.get(uid).await?.ok_or_else(|| {
                    FirestoreError::invalid_response(format!(
                        "Profile {} vanished after concurrent create",
                        uid
                    ))
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Update the display name.
    pub async fn update_name(&self, uid: &str, full_name: &str) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("full_name".to_string(), full_name.to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

        self.client
            .update_document(
                "profiles",
                uid,
                fields,
                Some(vec!["full_name".to_string(), "updated_at".to_string()]),
            )
            .await?;
        Ok(())
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Repository for subscription documents at `subscriptions/{id}`.
///
/// Subscriptions live in a top-level collection keyed by their own ID and
/// carry a `user_id` field, so fulfillment can write them without touching
/// the owner's profile document.
#[derive(Clone)]
pub struct SubscriptionRepository {
    client: FirestoreClient,
}

impl SubscriptionRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Get a subscription by ID.
    pub async fn get(&self, sub_id: &str) -> FirestoreResult<Option<Subscription>> {
        let doc = self.client.get_document("subscriptions", sub_id).await?;
        match doc {
            Some(d) => Ok(Some(document_to_subscription(&d, sub_id)?)),
            None => Ok(None),
        }
    }

    /// Create a subscription record.
    pub async fn create(&self, sub: &Subscription) -> FirestoreResult<()> {
        self.client
            .create_document("subscriptions", &sub.id, subscription_to_fields(sub))
            .await?;
        info!(
            subscription_id = %sub.id,
            user_id = %sub.user_id,
            scans = sub.scans_remaining,
            "Created subscription"
        );
        Ok(())
    }

    /// Most recently created subscription for the user that is active,
    /// unexpired and has scans remaining. Returns `None` when the user has
    /// no usable subscription.
    pub async fn latest_usable(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> FirestoreResult<Option<Subscription>> {
        let query = StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: "subscriptions".to_string(),
                all_descendants: None,
            }],
            r#where: Some(Filter::and(vec![
                Filter::field("user_id", "EQUAL", user_id.to_firestore_value()),
                Filter::field(
                    "status",
                    "EQUAL",
                    SubscriptionStatus::Active.as_str().to_firestore_value(),
                ),
            ])),
            order_by: Some(vec![Order::desc("created_at")]),
            limit: Some(10),
        };

        let docs = self.client.run_query("", query).await?;

        // Expiry and remaining-scan checks stay client-side so a stale status
        // field cannot hand out scans
        for doc in &docs {
            let Some(sub_id) = doc.doc_id() else { continue };
            match document_to_subscription(doc, sub_id) {
                Ok(sub) if sub.is_usable(now) => return Ok(Some(sub)),
                Ok(_) => continue,
                Err(e) => {
                    warn!(subscription_id = %sub_id, error = %e, "Skipping malformed subscription");
                    continue;
                }
            }
        }
        Ok(None)
    }

    /// Atomically take one scan off the subscription's balance.
    ///
    /// Returns `Ok(true)` when a scan was debited, `Ok(false)` when the
    /// subscription was gone or no longer usable by the time we got there,
    /// so the caller can fall back to the daily free quota.
    pub async fn debit_scan(&self, sub_id: &str) -> FirestoreResult<bool> {
        for attempt in 0..MAX_WRITE_RETRIES {
            let doc = match self.client.get_document("subscriptions", sub_id).await? {
                Some(d) => d,
                None => return Ok(false),
            };
            let sub = document_to_subscription(&doc, sub_id)?;
            if !sub.is_usable(Utc::now()) {
                return Ok(false);
            }

            let remaining = sub.scans_remaining - 1;
            let mut fields = HashMap::new();
            fields.insert(
                "scans_remaining".to_string(),
                remaining.to_firestore_value(),
            );
            fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

            match self
                .client
                .update_document_with_precondition(
                    "subscriptions",
                    sub_id,
                    fields,
                    Some(vec!["scans_remaining".to_string(), "updated_at".to_string()]),
                    doc.update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    info!(
                        subscription_id = %sub_id,
                        remaining = remaining,
                        "Debited subscription scan"
                    );
                    return Ok(true);
                }
                Err(e) if e.is_precondition_failed() => {
                    record_precondition_conflict("subscription_debit");
                    debug!(
                        subscription_id = %sub_id,
                        attempt = attempt + 1,
                        "Subscription debit lost the race, retrying"
                    );
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    warn!(subscription_id = %sub_id, error = %e, "Subscription debit failed");
                    return Err(e);
                }
            }
        }

        warn!(
            subscription_id = %sub_id,
            retries = MAX_WRITE_RETRIES,
            "Subscription debit exhausted retries under contention"
        );
        Err(FirestoreError::request_failed(
            "Failed to debit subscription due to concurrent updates",
        ))
    }
}

// =============================================================================
// Daily usage
// =============================================================================

/// Repository for free-tier usage counters at
/// `profiles/{uid}/daily_usage/{YYYY-MM-DD}`.
///
/// The document ID is the UTC day key, so "one counter per user per day"
/// holds by construction and counting a scan is an upsert on a fixed path.
#[derive(Clone)]
pub struct DailyUsageRepository {
    client: FirestoreClient,
    user_id: String,
}

impl DailyUsageRepository {
    pub fn new(client: FirestoreClient, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }

    fn collection(&self) -> String {
        format!("profiles/{}/daily_usage", self.user_id)
    }

    /// Get the usage counter for a day, if one exists.
    pub async fn get(&self, day: NaiveDate) -> FirestoreResult<Option<DailyUsage>> {
        let doc = self
            .client
            .get_document(&self.collection(), &day_key(day))
            .await?;
        match doc {
            Some(d) => Ok(Some(document_to_daily_usage(&d, &self.user_id, day)?)),
            None => Ok(None),
        }
    }

    /// Number of free scans consumed on the given day. Absent counter means 0.
    pub async fn scans_used_on(&self, day: NaiveDate) -> FirestoreResult<u32> {
        Ok(self.get(day).await?.map(|u| u.scans_used).unwrap_or(0))
    }

    /// Count one free scan against the day, creating the counter at 1 when it
    /// is the first scan. Returns the count after the increment.
    pub async fn record_scan(&self, day: NaiveDate) -> FirestoreResult<u32> {
        let doc_id = day_key(day);

        for attempt in 0..MAX_WRITE_RETRIES {
            let doc = self.client.get_document(&self.collection(), &doc_id).await?;

            let Some(doc) = doc else {
                let usage = DailyUsage::first_scan(&self.user_id, day);
                match self
                    .client
                    .create_document(&self.collection(), &doc_id, daily_usage_to_fields(&usage))
                    .await
                {
                    Ok(_) => {
                        debug!(user_id = %self.user_id, day = %doc_id, "Started daily usage counter");
                        return Ok(usage.scans_used);
                    }
                    Err(e) if e.is_already_exists() => {
                        // First scan of the day raced another request
                        record_precondition_conflict("daily_usage_create");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };

            let current = document_to_daily_usage(&doc, &self.user_id, day)?;
            let scans_used = current.scans_used.saturating_add(1);

            let mut fields = HashMap::new();
            fields.insert("scans_used".to_string(), scans_used.to_firestore_value());
            fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

            match self
                .client
                .update_document_with_precondition(
                    &self.collection(),
                    &doc_id,
                    fields,
                    Some(vec!["scans_used".to_string(), "updated_at".to_string()]),
                    doc.update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    debug!(
                        user_id = %self.user_id,
                        day = %doc_id,
                        scans_used = scans_used,
                        "Recorded daily scan"
                    );
                    return Ok(scans_used);
                }
                Err(e) if e.is_precondition_failed() => {
                    record_precondition_conflict("daily_usage_increment");
                    debug!(
                        user_id = %self.user_id,
                        day = %doc_id,
                        attempt = attempt + 1,
                        "Daily counter increment lost the race, retrying"
                    );
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            user_id = %self.user_id,
            retries = MAX_WRITE_RETRIES,
            "Daily usage increment exhausted retries under contention"
        );
        Err(FirestoreError::request_failed(
            "Failed to record daily scan due to concurrent updates",
        ))
    }
}

// =============================================================================
// Scan records
// =============================================================================

/// Repository for scan history at `profiles/{uid}/scans/{scan_id}`.
#[derive(Clone)]
pub struct ScanRecordRepository {
    client: FirestoreClient,
    user_id: String,
}

impl ScanRecordRepository {
    pub fn new(client: FirestoreClient, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }

    fn collection(&self) -> String {
        format!("profiles/{}/scans", self.user_id)
    }

    /// Persist a completed scan.
    pub async fn create(&self, record: &ScanRecord) -> FirestoreResult<()> {
        self.client
            .create_document(&self.collection(), &record.id, scan_record_to_fields(record))
            .await?;
        info!(
            user_id = %self.user_id,
            scan_id = %record.id,
            disease = %record.disease_name,
            "Saved scan record"
        );
        Ok(())
    }

    /// Most recent scans, newest first.
    pub async fn list_recent(&self, limit: i32) -> FirestoreResult<Vec<ScanRecord>> {
        let query = StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: "scans".to_string(),
                all_descendants: None,
            }],
            r#where: None,
            order_by: Some(vec![Order::desc("created_at")]),
            limit: Some(limit),
        };

        let parent = format!("profiles/{}", self.user_id);
        let docs = self.client.run_query(&parent, query).await?;

        let mut records = Vec::with_capacity(docs.len());
        for doc in &docs {
            let Some(scan_id) = doc.doc_id() else { continue };
            match document_to_scan_record(doc, &self.user_id, scan_id) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(scan_id = %scan_id, error = %e, "Skipping malformed scan record");
                }
            }
        }
        Ok(records)
    }
}

// =============================================================================
// Document conversion
// =============================================================================

fn field<'a>(doc: &'a Document, name: &str) -> Option<&'a Value> {
    doc.fields.as_ref().and_then(|f| f.get(name))
}

fn required<T: FromFirestoreValue>(doc: &Document, name: &str, path: &str) -> FirestoreResult<T> {
    field(doc, name)
        .and_then(T::from_firestore_value)
        .ok_or_else(|| {
            FirestoreError::invalid_response(format!("{}: missing or invalid field '{}'", path, name))
        })
}

fn optional<T: FromFirestoreValue>(doc: &Document, name: &str) -> Option<T> {
    field(doc, name).and_then(T::from_firestore_value)
}

fn profile_to_fields(profile: &Profile) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("email".to_string(), profile.email.to_firestore_value());
    fields.insert("full_name".to_string(), profile.full_name.to_firestore_value());
    fields.insert("is_admin".to_string(), profile.is_admin.to_firestore_value());
    fields.insert("created_at".to_string(), profile.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), profile.updated_at.to_firestore_value());
    fields
}

fn document_to_profile(doc: &Document, uid: &str) -> FirestoreResult<Profile> {
    let path = format!("profiles/{}", uid);
    Ok(Profile {
        uid: uid.to_string(),
        email: optional(doc, "email"),
        full_name: required(doc, "full_name", &path)?,
        is_admin: optional(doc, "is_admin").unwrap_or(false),
        created_at: required(doc, "created_at", &path)?,
        updated_at: required(doc, "updated_at", &path)?,
    })
}

fn subscription_to_fields(sub: &Subscription) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("user_id".to_string(), sub.user_id.to_firestore_value());
    fields.insert("status".to_string(), sub.status.as_str().to_firestore_value());
    fields.insert("plan_type".to_string(), sub.plan_type.to_firestore_value());
    fields.insert(
        "scans_remaining".to_string(),
        sub.scans_remaining.to_firestore_value(),
    );
    fields.insert("expires_at".to_string(), sub.expires_at.to_firestore_value());
    fields.insert("created_at".to_string(), sub.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), sub.updated_at.to_firestore_value());
    fields
}

fn document_to_subscription(doc: &Document, sub_id: &str) -> FirestoreResult<Subscription> {
    let path = format!("subscriptions/{}", sub_id);
    let status: String = required(doc, "status", &path)?;
    Ok(Subscription {
        id: sub_id.to_string(),
        user_id: required(doc, "user_id", &path)?,
        status: SubscriptionStatus::from_str(&status),
        plan_type: required(doc, "plan_type", &path)?,
        scans_remaining: required(doc, "scans_remaining", &path)?,
        expires_at: required(doc, "expires_at", &path)?,
        created_at: required(doc, "created_at", &path)?,
        updated_at: required(doc, "updated_at", &path)?,
    })
}

fn daily_usage_to_fields(usage: &DailyUsage) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("user_id".to_string(), usage.user_id.to_firestore_value());
    fields.insert("day".to_string(), usage.day.to_firestore_value());
    fields.insert("scans_used".to_string(), usage.scans_used.to_firestore_value());
    fields.insert("created_at".to_string(), usage.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), usage.updated_at.to_firestore_value());
    fields
}

fn document_to_daily_usage(
    doc: &Document,
    user_id: &str,
    day: NaiveDate,
) -> FirestoreResult<DailyUsage> {
    let path = format!("profiles/{}/daily_usage/{}", user_id, day_key(day));
    Ok(DailyUsage {
        user_id: user_id.to_string(),
        day: optional(doc, "day").unwrap_or(day),
        scans_used: required(doc, "scans_used", &path)?,
        created_at: required(doc, "created_at", &path)?,
        updated_at: required(doc, "updated_at", &path)?,
    })
}

fn scan_record_to_fields(record: &ScanRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("user_id".to_string(), record.user_id.to_firestore_value());
    fields.insert("image_path".to_string(), record.image_path.to_firestore_value());
    fields.insert(
        "disease_name".to_string(),
        record.disease_name.to_firestore_value(),
    );
    fields.insert("confidence".to_string(), record.confidence.to_firestore_value());
    fields.insert("remedies".to_string(), record.remedies.to_firestore_value());
    fields.insert("status".to_string(), record.status.as_str().to_firestore_value());
    fields.insert("created_at".to_string(), record.created_at.to_firestore_value());
    fields
}

fn document_to_scan_record(
    doc: &Document,
    user_id: &str,
    scan_id: &str,
) -> FirestoreResult<ScanRecord> {
    let path = format!("profiles/{}/scans/{}", user_id, scan_id);
    let status: String = required(doc, "status", &path)?;
    Ok(ScanRecord {
        id: scan_id.to_string(),
        user_id: user_id.to_string(),
        image_path: required(doc, "image_path", &path)?,
        disease_name: required(doc, "disease_name", &path)?,
        confidence: required(doc, "confidence", &path)?,
        remedies: optional(doc, "remedies").unwrap_or_default(),
        status: ScanStatus::from_str(&status),
        created_at: required(doc, "created_at", &path)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc_with(fields: Vec<(&str, Value)>) -> Document {
        Document {
            name: None,
            fields: Some(
                fields
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            ),
            create_time: None,
            update_time: Some("2025-06-01T00:00:00Z".to_string()),
        }
    }

    #[test]
    fn test_profile_round_trip() {
        let profile = Profile::new(
            "u1",
            Some("alex@example.com".to_string()),
            Some("Alex".to_string()),
        );
        let doc = Document::new(profile_to_fields(&profile));
        let parsed = document_to_profile(&doc, "u1").unwrap();
        assert_eq!(parsed.uid, "u1");
        assert_eq!(parsed.email.as_deref(), Some("alex@example.com"));
        assert_eq!(parsed.full_name, "Alex");
        assert!(!parsed.is_admin);
    }

    #[test]
    fn test_profile_missing_is_admin_defaults_false() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let doc = doc_with(vec![
            ("full_name", "Sam".to_firestore_value()),
            ("created_at", now.to_firestore_value()),
            ("updated_at", now.to_firestore_value()),
        ]);
        let parsed = document_to_profile(&doc, "u2").unwrap();
        assert!(!parsed.is_admin);
        assert!(parsed.email.is_none());
    }

    #[test]
    fn test_subscription_unknown_status_is_not_usable() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let doc = doc_with(vec![
            ("user_id", "u1".to_firestore_value()),
            ("status", "paused".to_firestore_value()),
            ("plan_type", "premium".to_firestore_value()),
            ("scans_remaining", 10u32.to_firestore_value()),
            ("expires_at", (now + chrono::Duration::days(30)).to_firestore_value()),
            ("created_at", now.to_firestore_value()),
            ("updated_at", now.to_firestore_value()),
        ]);
        let sub = document_to_subscription(&doc, "s1").unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Other);
        assert!(!sub.is_usable(now));
    }

    #[test]
    fn test_daily_usage_missing_counter_field_is_error() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let doc = doc_with(vec![("day", day.to_firestore_value())]);
        assert!(document_to_daily_usage(&doc, "u1", day).is_err());
    }

    #[test]
    fn test_scan_record_round_trip() {
        let record = ScanRecord::completed(
            "u1",
            "uploads/u1/leaf.jpg",
            leafscan_models::DetectionResult {
                disease_name: "Leaf Rust".to_string(),
                confidence: 0.92,
                remedies: vec!["Remove affected leaves".to_string()],
            },
        );
        let doc = Document::new(scan_record_to_fields(&record));
        let parsed = document_to_scan_record(&doc, "u1", &record.id).unwrap();
        assert_eq!(parsed.disease_name, "Leaf Rust");
        assert_eq!(parsed.status, ScanStatus::Completed);
        assert_eq!(parsed.remedies.len(), 1);
    }
}
