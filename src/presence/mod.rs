//! Presence model and the mapping to canonical buckets

mod client;

pub use client::{PresenceClient, PresenceResponse};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Availability values reported by the Graph presence API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Available,
    AvailableIdle,
    Away,
    BeRightBack,
    Busy,
    BusyIdle,
    DoNotDisturb,
    Offline,
    PresenceUnknown,
}

impl Availability {
    pub fn parse(raw: &str) -> Option<Self> {
        let availability = match raw {
            "Available" => Self::Available,
            "AvailableIdle" => Self::AvailableIdle,
            "Away" => Self::Away,
            "BeRightBack" => Self::BeRightBack,
            "Busy" => Self::Busy,
            "BusyIdle" => Self::BusyIdle,
            "DoNotDisturb" => Self::DoNotDisturb,
            "Offline" => Self::Offline,
            "PresenceUnknown" => Self::PresenceUnknown,
            _ => return None,
        };
        Some(availability)
    }
}

/// Reduced presence that drives the actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceBucket {
    Available,
    Away,
    Busy,
    Offline,
}

impl PresenceBucket {
    /// Lowercase name used as the key in configured mappings.
    pub fn key(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Away => "away",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl From<Availability> for PresenceBucket {
    fn from(availability: Availability) -> Self {
        match availability {
            Availability::Available | Availability::AvailableIdle => Self::Available,
            Availability::Away | Availability::BeRightBack => Self::Away,
            Availability::Busy | Availability::BusyIdle | Availability::DoNotDisturb => Self::Busy,
            Availability::Offline | Availability::PresenceUnknown => Self::Offline,
        }
    }
}

/// Map a raw availability string to its bucket; unknown or missing is offline.
pub fn canonicalize(raw: Option<&str>) -> PresenceBucket {
    raw.and_then(Availability::parse)
        .map(PresenceBucket::from)
        .unwrap_or(PresenceBucket::Offline)
}
