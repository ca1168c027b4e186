//! Scan orchestration.
//!
//! Sequences one scan request: profile bootstrap, entitlement evaluation,
//! detection, result persistence, then debiting. A scan result is only
//! returned once it is durably recorded; a failed debit after that point is
//! logged and deliberately swallowed (under-charging beats losing the
//! result the user already paid latency for).

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use leafscan_models::ScanRecord;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::detection::DiseaseDetector;
use crate::services::entitlement::EntitlementService;
use crate::services::store::EntitlementStore;

/// Orchestrates the scan request flow.
#[derive(Clone)]
pub struct ScanService {
    store: Arc<dyn EntitlementStore>,
    detector: Arc<dyn DiseaseDetector>,
    entitlements: EntitlementService,
}

impl ScanService {
    pub fn new(store: Arc<dyn EntitlementStore>, detector: Arc<dyn DiseaseDetector>) -> Self {
        let entitlements = EntitlementService::new(Arc::clone(&store));
        Self {
            store,
            detector,
            entitlements,
        }
    }

    /// Run one scan for an authenticated user.
    pub async fn run_scan(
        &self,
        uid: &str,
        email: Option<&str>,
        name_claim: Option<&str>,
        image: &[u8],
        image_name: Option<&str>,
    ) -> ApiResult<ScanRecord> {
        let profile = self
            .store
            .get_or_create_profile(uid, email, name_claim)
            .await?;

        let now = Utc::now();
        let decision = self.entitlements.can_scan(uid, profile.is_admin, now).await?;
        if !decision.allowed {
            info!(uid = %uid, reason = %decision.reason, "Scan denied");
            metrics::record_scan_denied();
            return Err(ApiError::quota_exceeded(decision.reason));
        }

        if image.is_empty() {
            return Err(ApiError::bad_request("Image payload is required"));
        }

        let start = Instant::now();
        let detection = self.detector.classify(image).await;
        metrics::record_detection_duration(start.elapsed().as_secs_f64());

        let image_path = match image_name {
            Some(name) => format!("uploads/{}/{}", uid, name),
            None => format!("uploads/{}/{}.jpg", uid, Uuid::new_v4()),
        };

        // Persist before debiting so the caller never sees an unrecorded result
        let record = ScanRecord::completed(uid, image_path, detection);
        self.store.save_scan(&record).await?;

        match self.entitlements.debit_scan(uid, profile.is_admin, now).await {
            Ok(outcome) => {
                metrics::record_scan(outcome.funding_label());
                info!(
                    uid = %uid,
                    scan_id = %record.id,
                    funding = outcome.funding_label(),
                    "Scan completed"
                );
            }
            Err(e) => {
                // Accepted under-charge: the recorded result still goes back
                // to the caller
                warn!(
                    uid = %uid,
                    scan_id = %record.id,
                    error = %e,
                    "Debit failed after completed scan"
                );
            }
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::detection::MockDetector;
    use crate::services::testing::InMemoryStore;
    use leafscan_models::DAILY_FREE_SCAN_LIMIT;
    use std::time::Duration;

    fn scan_service(store: &Arc<InMemoryStore>) -> ScanService {
        ScanService::new(
            Arc::clone(store) as Arc<dyn EntitlementStore>,
            Arc::new(MockDetector::with_delay(Duration::ZERO)),
        )
    }

    #[tokio::test]
    async fn test_fresh_user_scan_counts_one_against_quota() {
        let store = InMemoryStore::shared();
        let svc = scan_service(&store);

        let record = svc
            .run_scan("u1", Some("u1@example.com"), None, b"leaf", None)
            .await
            .unwrap();

        assert!(!record.disease_name.is_empty());
        assert_eq!(store.scans_used("u1", Utc::now().date_naive()).await, 1);
        assert_eq!(store.saved_scans().await.len(), 1);
    }

    #[tokio::test]
    async fn test_profile_bootstrap_is_idempotent() {
        let store = InMemoryStore::shared();
        let svc = scan_service(&store);

        svc.run_scan("u1", Some("u1@example.com"), None, b"leaf", None)
            .await
            .unwrap();
        svc.run_scan("u1", Some("u1@example.com"), None, b"leaf", None)
            .await
            .unwrap();

        assert_eq!(store.profile_create_count().await, 1);
    }

    #[tokio::test]
    async fn test_sixth_scan_denied_with_no_record() {
        let store = InMemoryStore::shared();
        let svc = scan_service(&store);

        for _ in 0..DAILY_FREE_SCAN_LIMIT {
            svc.run_scan("u1", None, None, b"leaf", None).await.unwrap();
        }

        let err = svc.run_scan("u1", None, None, b"leaf", None).await.unwrap_err();
        match err {
            ApiError::QuotaExceeded(reason) => {
                assert_eq!(
                    reason,
                    "Daily scan limit reached. Please subscribe for unlimited scans."
                );
            }
            other => panic!("expected quota denial, got {:?}", other),
        }
        assert_eq!(store.saved_scans().await.len(), DAILY_FREE_SCAN_LIMIT as usize);
    }

    #[tokio::test]
    async fn test_empty_image_is_client_error_and_unmetered() {
        let store = InMemoryStore::shared();
        let svc = scan_service(&store);

        let err = svc.run_scan("u1", None, None, b"", None).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(store.scans_used("u1", Utc::now().date_naive()).await, 0);
        assert!(store.saved_scans().await.is_empty());
    }

    #[tokio::test]
    async fn test_debit_failure_is_swallowed() {
        let store = InMemoryStore::shared();
        let svc = scan_service(&store);
        store.fail_next_daily_count().await;

        let record = svc.run_scan("u1", None, None, b"leaf", None).await.unwrap();
        assert!(!record.id.is_empty());
        // The scan record survives; only the charge was lost
        assert_eq!(store.saved_scans().await.len(), 1);
        assert_eq!(store.scans_used("u1", Utc::now().date_naive()).await, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_terminal() {
        let store = InMemoryStore::shared();
        let svc = scan_service(&store);
        store.fail_next_save_scan().await;

        let err = svc.run_scan("u1", None, None, b"leaf", None).await.unwrap_err();
        assert!(matches!(err, ApiError::Firestore(_)));
        // No debit happens for a scan that was never recorded
        assert_eq!(store.scans_used("u1", Utc::now().date_naive()).await, 0);
    }

    #[tokio::test]
    async fn test_admin_scan_leaves_no_charges() {
        let store = InMemoryStore::shared();
        let mut profile = leafscan_models::Profile::new("admin-1", None, Some("Root".to_string()));
        profile.is_admin = true;
        store.add_profile(profile).await;

        let svc = scan_service(&store);
        for _ in 0..10 {
            svc.run_scan("admin-1", None, None, b"leaf", None).await.unwrap();
        }

        assert_eq!(store.scans_used("admin-1", Utc::now().date_naive()).await, 0);
        assert_eq!(store.saved_scans().await.len(), 10);
    }
}
