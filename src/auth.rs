//! Auth token freshness checks.
//!
//! The guard never fails an upload by itself. It reports what it sees and
//! refreshes proactively when a token is close to expiry; the pipeline
//! decides what a missing session means.

use crate::upload::BackendFailure;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tokens with less than this much lifetime left are refreshed.
pub const TOKEN_REFRESH_THRESHOLD: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// The opaque identity provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Reads the current token, forcing a network round-trip when `force_refresh` is set.
    async fn get_token(&self, force_refresh: bool) -> Result<TokenInfo, BackendFailure>;

    fn current_user_present(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSnapshot {
    pub user_present: bool,
    pub token_valid: bool,
    pub token_expiry: Option<DateTime<Utc>>,
}

impl AuthSnapshot {
    pub fn signed_out() -> Self {
        Self {
            user_present: false,
            token_valid: false,
            token_expiry: None,
        }
    }
}

#[derive(Clone)]
pub struct AuthGuard {
    provider: Arc<dyn AuthProvider>,
    refresh_threshold: chrono::Duration,
}

impl std::fmt::Debug for AuthGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGuard")
            .field("provider", &"<auth provider>")
            .field("refresh_threshold", &self.refresh_threshold)
            .finish()
    }
}

impl AuthGuard {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self::with_threshold(provider, TOKEN_REFRESH_THRESHOLD)
    }

    pub fn with_threshold(provider: Arc<dyn AuthProvider>, threshold: Duration) -> Self {
        Self {
            provider,
            refresh_threshold: chrono::Duration::from_std(threshold)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }

    /// Reads the token without forcing a refresh.
    pub async fn get_auth_snapshot(&self) -> AuthSnapshot {
        if !self.provider.current_user_present() {
            return AuthSnapshot::signed_out();
        }

        match self.provider.get_token(false).await {
            Ok(info) => AuthSnapshot {
                user_present: true,
                token_valid: !info.token.is_empty(),
                token_expiry: Some(info.expires_at),
            },
            Err(failure) => {
                warn!(error = %failure, "Failed to read auth token");
                AuthSnapshot {
                    user_present: true,
                    token_valid: false,
                    token_expiry: None,
                }
            }
        }
    }

    /// Forces a refresh when the token is within the threshold of expiry.
    ///
    /// Returns true only if a refresh was performed. Cheap when the token is
    /// fresh, so it is safe to call before every attempt.
    pub async fn refresh_if_needed(&self) -> bool {
        if !self.provider.current_user_present() {
            return false;
        }

        let info = match self.provider.get_token(false).await {
            Ok(info) => info,
            Err(failure) => {
                warn!(error = %failure, "Could not read token expiry");
                return false;
            }
        };

        let remaining = info.expires_at - Utc::now();
        if remaining >= self.refresh_threshold {
            debug!(remaining_secs = remaining.num_seconds(), "Token is fresh");
            return false;
        }

        match self.provider.get_token(true).await {
            Ok(refreshed) => {
                info!(
                    remaining_secs = remaining.num_seconds(),
                    new_expiry = %refreshed.expires_at,
                    "Refreshed auth token ahead of expiry"
                );
                true
            }
            Err(failure) => {
                warn!(error = %failure, "Token refresh failed");
                false
            }
        }
    }
}
