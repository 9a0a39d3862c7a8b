//! Link-quality classification.
//!
//! [`classify_quality`] is a pure function of a [`NetworkSnapshot`]; the
//! monitor only decides *when* to call it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Effective connection type hint reported by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
}

impl EffectiveType {
    /// Parses a hint such as `"4g"`; unknown hints yield `None`.
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim().to_ascii_lowercase().as_str() {
            "slow-2g" => Some(EffectiveType::Slow2g),
            "2g" => Some(EffectiveType::TwoG),
            "3g" => Some(EffectiveType::ThreeG),
            "4g" => Some(EffectiveType::FourG),
            _ => None,
        }
    }
}

/// Classified link quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Excellent,
    Good,
    Fair,
    Poor,
    Offline,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Quality::Excellent => "excellent",
            Quality::Good => "good",
            Quality::Fair => "fair",
            Quality::Poor => "poor",
            Quality::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Point-in-time read of the transport layer. Never persisted.
///
/// `downlink_mbps` and `rtt_ms` are `0.0` when the platform reports nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSnapshot {
    pub online: bool,
    pub connection_type: Option<String>,
    pub effective_type: Option<EffectiveType>,
    pub downlink_mbps: f64,
    pub rtt_ms: f64,
}

impl NetworkSnapshot {
    /// Online with no quality hints at all.
    pub fn online() -> Self {
        Self {
            online: true,
            connection_type: None,
            effective_type: None,
            downlink_mbps: 0.0,
            rtt_ms: 0.0,
        }
    }

    pub fn offline() -> Self {
        Self {
            online: false,
            ..Self::online()
        }
    }

    pub fn with_effective_type(mut self, effective_type: EffectiveType) -> Self {
        self.effective_type = Some(effective_type);
        self
    }

    pub fn with_link(mut self, downlink_mbps: f64, rtt_ms: f64) -> Self {
        self.downlink_mbps = downlink_mbps;
        self.rtt_ms = rtt_ms;
        self
    }
}

impl Default for NetworkSnapshot {
    fn default() -> Self {
        Self::online()
    }
}

/// Classified state published by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub online: bool,
    pub quality: Quality,
    pub effective_type: Option<EffectiveType>,
    pub downlink_mbps: f64,
    pub rtt_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl NetworkState {
    pub fn from_snapshot(snapshot: &NetworkSnapshot) -> Self {
        Self {
            online: snapshot.online,
            quality: classify_quality(snapshot),
            effective_type: snapshot.effective_type,
            downlink_mbps: snapshot.downlink_mbps,
            rtt_ms: snapshot.rtt_ms,
            timestamp: Utc::now(),
        }
    }

    /// Listener-visible equality: only `online` and `quality` count.
    pub fn same_status(&self, other: &NetworkState) -> bool {
        self.online == other.online && self.quality == other.quality
    }
}

pub fn classify_quality(snapshot: &NetworkSnapshot) -> Quality {
    if !snapshot.online {
        return Quality::Offline;
    }

    let downlink = snapshot.downlink_mbps;
    let rtt = snapshot.rtt_ms;

    if let Some(effective_type) = snapshot.effective_type {
        return match effective_type {
            EffectiveType::FourG => {
                if downlink >= 10.0 && rtt < 100.0 {
                    Quality::Excellent
                } else {
                    Quality::Good
                }
            }
            EffectiveType::ThreeG => {
                if downlink >= 1.5 && rtt < 300.0 {
                    Quality::Good
                } else {
                    Quality::Fair
                }
            }
            EffectiveType::TwoG | EffectiveType::Slow2g => Quality::Poor,
        };
    }

    if downlink >= 10.0 && rtt < 100.0 {
        Quality::Excellent
    } else if downlink >= 3.0 && rtt < 200.0 {
        Quality::Good
    } else if downlink >= 1.0 && rtt < 500.0 {
        Quality::Fair
    } else if downlink > 0.0 {
        Quality::Poor
    } else {
        // No signal at all: stay optimistic.
        Quality::Good
    }
}
