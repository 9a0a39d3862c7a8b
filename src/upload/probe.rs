//! Connectivity probe run once at the start of each upload.
//!
//! Distinct from the background monitor: it times a forced token refresh as
//! a lightweight authenticated round-trip.

use super::classify::classify_backend_failure;
use crate::auth::AuthProvider;
use crate::network::{NetworkMonitor, Quality};
use crate::upload_error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    Good,
    Poor,
    Offline,
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbeOutcome::Good => "good",
            ProbeOutcome::Poor => "poor",
            ProbeOutcome::Offline => "offline",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub timeout: Duration,
    /// Round-trips slower than this count as a poor link
    pub slow_threshold: Duration,
}

/// Classifies the link as good, poor or offline.
///
/// Skips the round-trip when nobody is signed in; the auth stage reports that.
pub async fn probe_connectivity(
    monitor: &NetworkMonitor,
    auth: &dyn AuthProvider,
    settings: ProbeSettings,
) -> ProbeOutcome {
    let state = monitor.refresh();
    if !state.online {
        return ProbeOutcome::Offline;
    }

    let monitor_says_poor = state.quality == Quality::Poor;
    let fallback = if monitor_says_poor {
        ProbeOutcome::Poor
    } else {
        ProbeOutcome::Good
    };

    if !auth.current_user_present() {
        debug!(quality = %state.quality, "No user signed in, skipping probe round-trip");
        return fallback;
    }

    let started = Instant::now();
    match tokio::time::timeout(settings.timeout, auth.get_token(true)).await {
        Ok(Ok(_)) => {
            let latency = started.elapsed();
            debug!(latency_ms = latency.as_millis() as u64, "Connectivity probe finished");
            if latency > settings.slow_threshold {
                ProbeOutcome::Poor
            } else {
                fallback
            }
        }
        Ok(Err(failure)) => {
            let kind = classify_backend_failure(&failure);
            warn!(error = %failure, %kind, "Connectivity probe failed");
            if kind == ErrorKind::Network {
                ProbeOutcome::Offline
            } else {
                ProbeOutcome::Poor
            }
        }
        Err(_) => {
            warn!(
                timeout_ms = settings.timeout.as_millis() as u64,
                "Connectivity probe timed out"
            );
            ProbeOutcome::Poor
        }
    }
}
