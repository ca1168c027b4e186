//! Entitlement evaluation and usage debiting.
//!
//! Policy, in strict order: admin identities bypass metering entirely, a
//! usable subscription is preferred over free quota, and the daily free
//! quota is the fallback. Evaluation is read-only; debiting re-queries
//! state and charges exactly one funding source.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use leafscan_firestore::FirestoreResult;
use leafscan_models::{Subscription, DAILY_FREE_SCAN_LIMIT};

use crate::services::store::EntitlementStore;

/// Reason strings surfaced to the caller.
pub mod reasons {
    pub const ADMIN: &str = "Admin user";
    pub const SUBSCRIPTION: &str = "Active subscription";
    pub const WITHIN_LIMIT: &str = "Within daily limit";
    pub const LIMIT_REACHED: &str =
        "Daily scan limit reached. Please subscribe for unlimited scans.";
}

/// Outcome of an entitlement evaluation.
#[derive(Debug, Clone)]
pub struct ScanDecision {
    pub allowed: bool,
    pub reason: &'static str,
    /// Subscription that would fund the scan, when one applies.
    pub funding: Option<Subscription>,
}

impl ScanDecision {
    fn allowed(reason: &'static str, funding: Option<Subscription>) -> Self {
        Self {
            allowed: true,
            reason,
            funding,
        }
    }

    fn denied(reason: &'static str) -> Self {
        Self {
            allowed: false,
            reason,
            funding: None,
        }
    }
}

/// How a completed scan was charged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    /// Admin identities are never charged.
    AdminBypass,
    /// One credit taken off a subscription.
    SubscriptionDebited { subscription_id: String },
    /// One free scan counted against today's quota.
    DailyQuotaCounted { scans_used: u32 },
}

impl DebitOutcome {
    /// Funding label for metrics.
    pub fn funding_label(&self) -> &'static str {
        match self {
            Self::AdminBypass => "admin",
            Self::SubscriptionDebited { .. } => "subscription",
            Self::DailyQuotaCounted { .. } => "daily_quota",
        }
    }
}

/// Evaluates and debits scan entitlements.
#[derive(Clone)]
pub struct EntitlementService {
    store: Arc<dyn EntitlementStore>,
}

impl EntitlementService {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    /// Decide whether the user may scan right now, and which funding source
    /// would be charged. Reads only, first match wins.
    pub async fn can_scan(
        &self,
        user_id: &str,
        is_admin: bool,
        now: DateTime<Utc>,
    ) -> FirestoreResult<ScanDecision> {
        if is_admin {
            return Ok(ScanDecision::allowed(reasons::ADMIN, None));
        }

        if let Some(sub) = self.store.usable_subscription(user_id, now).await? {
            return Ok(ScanDecision::allowed(reasons::SUBSCRIPTION, Some(sub)));
        }

        let used = self.store.scans_used_on(user_id, now.date_naive()).await?;
        if used >= DAILY_FREE_SCAN_LIMIT {
            return Ok(ScanDecision::denied(reasons::LIMIT_REACHED));
        }
        Ok(ScanDecision::allowed(reasons::WITHIN_LIMIT, None))
    }

    /// Charge exactly one funding source for a completed scan.
    ///
    /// Re-queries the subscription independently of the earlier evaluation;
    /// if it was exhausted in the meantime the charge falls through to the
    /// daily counter, so a completed scan is always accounted somewhere.
    pub async fn debit_scan(
        &self,
        user_id: &str,
        is_admin: bool,
        now: DateTime<Utc>,
    ) -> FirestoreResult<DebitOutcome> {
        if is_admin {
            return Ok(DebitOutcome::AdminBypass);
        }

        if let Some(sub) = self.store.usable_subscription(user_id, now).await? {
            if self.store.debit_subscription_scan(&sub.id).await? {
                return Ok(DebitOutcome::SubscriptionDebited {
                    subscription_id: sub.id,
                });
            }
            debug!(
                user_id = %user_id,
                subscription_id = %sub.id,
                "Subscription exhausted concurrently, charging daily quota"
            );
        }

        let scans_used = self.store.count_daily_scan(user_id, now.date_naive()).await?;
        Ok(DebitOutcome::DailyQuotaCounted { scans_used })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::InMemoryStore;
    use chrono::Duration;
    use leafscan_models::SubscriptionStatus;

    fn subscription(id: &str, user_id: &str, scans: u32, expires_in_hours: i64) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: id.to_string(),
            user_id: user_id.to_string(),
            status: SubscriptionStatus::Active,
            plan_type: "premium".to_string(),
            scans_remaining: scans,
            expires_at: now + Duration::hours(expires_in_hours),
            created_at: now,
            updated_at: now,
        }
    }

    fn service(store: &Arc<InMemoryStore>) -> EntitlementService {
        EntitlementService::new(Arc::clone(store) as Arc<dyn EntitlementStore>)
    }

    #[tokio::test]
    async fn test_admin_always_allowed_and_never_charged() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        let now = Utc::now();

        let decision = svc.can_scan("admin-1", true, now).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, reasons::ADMIN);

        let outcome = svc.debit_scan("admin-1", true, now).await.unwrap();
        assert_eq!(outcome, DebitOutcome::AdminBypass);
        assert_eq!(store.scans_used("admin-1", now.date_naive()).await, 0);
    }

    #[tokio::test]
    async fn test_subscription_takes_precedence_over_exhausted_quota() {
        let store = Arc::new(InMemoryStore::new());
        store.add_subscription(subscription("s1", "u1", 3, 24)).await;
        store.set_daily_usage("u1", Utc::now().date_naive(), DAILY_FREE_SCAN_LIMIT).await;

        let svc = service(&store);
        let decision = svc.can_scan("u1", false, Utc::now()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, reasons::SUBSCRIPTION);
        assert_eq!(decision.funding.unwrap().id, "s1");
    }

    #[tokio::test]
    async fn test_daily_limit_boundary_is_exactly_five() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        let now = Utc::now();

        store.set_daily_usage("u1", now.date_naive(), 4).await;
        let decision = svc.can_scan("u1", false, now).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, reasons::WITHIN_LIMIT);

        store.set_daily_usage("u1", now.date_naive(), 5).await;
        let decision = svc.can_scan("u1", false, now).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, reasons::LIMIT_REACHED);
    }

    #[tokio::test]
    async fn test_debit_charges_subscription_not_quota() {
        let store = Arc::new(InMemoryStore::new());
        store.add_subscription(subscription("s1", "u1", 2, 24)).await;

        let svc = service(&store);
        let now = Utc::now();
        let outcome = svc.debit_scan("u1", false, now).await.unwrap();
        assert_eq!(
            outcome,
            DebitOutcome::SubscriptionDebited {
                subscription_id: "s1".to_string()
            }
        );
        assert_eq!(store.subscription_balance("s1").await, Some(1));
        assert_eq!(store.scans_used("u1", now.date_naive()).await, 0);
    }

    #[tokio::test]
    async fn test_debit_falls_back_to_daily_quota() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        let now = Utc::now();

        let outcome = svc.debit_scan("u1", false, now).await.unwrap();
        assert_eq!(outcome, DebitOutcome::DailyQuotaCounted { scans_used: 1 });

        let outcome = svc.debit_scan("u1", false, now).await.unwrap();
        assert_eq!(outcome, DebitOutcome::DailyQuotaCounted { scans_used: 2 });
    }

    #[tokio::test]
    async fn test_exhausted_subscription_falls_through_to_quota() {
        let store = Arc::new(InMemoryStore::new());
        let mut sub = subscription("s1", "u1", 1, 24);
        sub.scans_remaining = 1;
        store.add_subscription(sub).await;
        // Simulate a concurrent debit draining the balance between the
        // usable-subscription read and the conditional decrement
        store.fail_next_subscription_debit().await;

        let svc = service(&store);
        let now = Utc::now();
        let outcome = svc.debit_scan("u1", false, now).await.unwrap();
        assert_eq!(outcome, DebitOutcome::DailyQuotaCounted { scans_used: 1 });
    }

    #[tokio::test]
    async fn test_zero_credit_subscription_is_not_usable() {
        let store = Arc::new(InMemoryStore::new());
        store.add_subscription(subscription("s1", "u1", 0, 24)).await;

        let svc = service(&store);
        let decision = svc.can_scan("u1", false, Utc::now()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, reasons::WITHIN_LIMIT);
        assert!(decision.funding.is_none());
    }

    #[tokio::test]
    async fn test_most_recent_usable_subscription_wins() {
        let store = Arc::new(InMemoryStore::new());
        let mut old = subscription("s-old", "u1", 5, 24);
        old.created_at = Utc::now() - Duration::days(10);
        store.add_subscription(old).await;
        store.add_subscription(subscription("s-new", "u1", 5, 24)).await;

        let svc = service(&store);
        let decision = svc.can_scan("u1", false, Utc::now()).await.unwrap();
        assert_eq!(decision.funding.unwrap().id, "s-new");
    }
}
