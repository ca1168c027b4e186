//! Service-account token caching.
//!
//! Thread-safe, async-aware token cache with a refresh margin so tokens never
//! expire mid-request, single-flight refresh, and graceful fallback to a
//! still-usable token when a refresh attempt fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh tokens this long before their actual expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Conservative TTL when the provider reports no usable expiry.
/// OAuth access tokens are typically valid for 60 minutes.
const DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore access via the Datastore API surface.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Token cache with single-flight refresh.
pub struct TokenCache {
    auth: Arc<dyn TokenProvider>,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            auth,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token so the next request forces a refresh.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        // Fast path under the read lock
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_fresh() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the write lock
        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        match self.auth.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let access_token = token.as_str().to_string();
                let expires_at = {
                    let remaining = token.expires_at() - Utc::now();
                    match remaining.to_std() {
                        // Expired-on-arrival tokens get a near-immediate expiry so the
                        // next request forces another refresh.
                        Ok(ttl) if !ttl.is_zero() => Instant::now() + ttl,
                        Ok(_) | Err(_) => {
                            if token.expires_at() <= Utc::now() {
                                Instant::now()
                            } else {
                                Instant::now() + DEFAULT_TTL
                            }
                        }
                    }
                };

                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });
                debug!("Refreshed Firestore auth token");
                Ok(access_token)
            }
            Err(e) => {
                // A stale-but-unexpired token beats failing the request outright
                if let Some(cached) = cache.as_ref() {
                    if cached.is_usable() {
                        warn!("Token refresh failed, using existing token: {}", e);
                        return Ok(cached.access_token.clone());
                    }
                }
                Err(FirestoreError::auth(format!(
                    "Failed to obtain auth token: {}",
                    e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_margin_below_default_ttl() {
        assert!(REFRESH_MARGIN < DEFAULT_TTL);
    }

    #[test]
    fn test_firestore_scope() {
        assert!(FIRESTORE_SCOPE.contains("datastore"));
    }
}
