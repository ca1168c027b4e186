//! Application state.

use std::sync::Arc;

use leafscan_firestore::FirestoreClient;

use crate::auth::JwksCache;
use crate::config::ApiConfig;
use crate::services::{
    DiseaseDetector, EntitlementStore, FirestoreEntitlementStore, MockDetector, ScanService,
    StripeService,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jwks: Arc<JwksCache>,
    pub store: Arc<dyn EntitlementStore>,
    pub scans: ScanService,
    pub stripe: StripeService,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let firestore = Arc::new(FirestoreClient::from_env().await?);
        let jwks = Arc::new(JwksCache::new().await?);

        let store: Arc<dyn EntitlementStore> =
            Arc::new(FirestoreEntitlementStore::new(firestore));
        let detector: Arc<dyn DiseaseDetector> = Arc::new(MockDetector::new());
        let scans = ScanService::new(Arc::clone(&store), detector);
        let stripe = StripeService::new(config.stripe.clone(), config.app_base_url.clone());

        Ok(Self {
            config,
            jwks,
            store,
            scans,
            stripe,
        })
    }

    /// State wired to the given store and detector, with an offline token
    /// verifier. Test support.
    #[doc(hidden)]
    pub fn with_store(
        config: ApiConfig,
        store: Arc<dyn EntitlementStore>,
        detector: Arc<dyn DiseaseDetector>,
    ) -> Self {
        let jwks = Arc::new(JwksCache::offline("test-project"));
        let scans = ScanService::new(Arc::clone(&store), detector);
        let stripe = StripeService::new(config.stripe.clone(), config.app_base_url.clone());

        Self {
            config,
            jwks,
            store,
            scans,
            stripe,
        }
    }
}
