//! Busy flag device server: on/off signals and position/color payloads
//!
//! Every call is fire-and-forget. Failures are logged and swallowed so the
//! poller carries on with its schedule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::presence::PresenceBucket;

/// Servo angle payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionAngle {
    pub angle: u16,
}

/// RGB light color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// JSON body POSTed to the position/color endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ActuatorPayload {
    Angle(PositionAngle),
    Color {
        #[serde(flatten)]
        color: StatusColor,
        #[serde(rename = "lightType", skip_serializing_if = "Option::is_none")]
        light_type: Option<String>,
    },
}

const UP_ANGLE: u16 = 5;
const DOWN_ANGLE: u16 = 120;

fn default_angle(bucket: PresenceBucket) -> Option<PositionAngle> {
    let angle = match bucket {
        PresenceBucket::Available | PresenceBucket::Away => DOWN_ANGLE,
        PresenceBucket::Busy => UP_ANGLE,
        PresenceBucket::Offline => return None,
    };
    Some(PositionAngle { angle })
}

fn default_color(bucket: PresenceBucket) -> Option<StatusColor> {
    let (red, green, blue) = match bucket {
        PresenceBucket::Available => (0, 255, 0),
        PresenceBucket::Away => (255, 191, 0),
        PresenceBucket::Busy => (255, 0, 0),
        PresenceBucket::Offline => return None,
    };
    Some(StatusColor { red, green, blue })
}

/// Configured entry, else built-in default, else nothing.
fn lookup<T: Copy>(
    configured: &BTreeMap<String, T>,
    bucket: PresenceBucket,
    default: fn(PresenceBucket) -> Option<T>,
) -> Option<T> {
    if let Some(value) = configured.get(bucket.key()) {
        return Some(*value);
    }
    if let Some(value) = default(bucket) {
        tracing::debug!("No configured payload for {}, using default", bucket);
        return Some(value);
    }
    tracing::debug!("No payload for {}, nothing to send", bucket);
    None
}

/// Bucket to device payload, per actuator kind.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionMapping {
    Servo(BTreeMap<String, PositionAngle>),
    Light {
        colors: BTreeMap<String, StatusColor>,
        light_type: Option<String>,
    },
}

impl PositionMapping {
    pub fn resolve(&self, bucket: PresenceBucket) -> Option<ActuatorPayload> {
        match self {
            Self::Servo(angles) => lookup(angles, bucket, default_angle).map(ActuatorPayload::Angle),
            Self::Light { colors, light_type } => {
                lookup(colors, bucket, default_color).map(|color| ActuatorPayload::Color {
                    color,
                    light_type: light_type.clone(),
                })
            }
        }
    }
}

/// Plain HTTP client for the device server.
#[derive(Debug, Clone)]
pub struct ActuatorClient {
    http: reqwest::Client,
}

impl ActuatorClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// GET without a body, used for bare on/off signals.
    pub async fn signal(&self, url: &str) {
        tracing::debug!("Actuator GET {}", url);
        match self.http.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("Actuator GET {} -> {}", url, resp.status());
            }
            Ok(resp) => {
                tracing::warn!("Actuator GET {} returned HTTP {}", url, resp.status().as_u16());
            }
            Err(e) => tracing::warn!("Actuator GET {} failed: {}", url, e),
        }
    }

    /// POST a position or color payload.
    pub async fn set_position(&self, url: &str, payload: &ActuatorPayload) {
        tracing::debug!("Actuator POST {} {:?}", url, payload);
        match self.http.post(url).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("Actuator POST {} -> {}", url, resp.status());
            }
            Ok(resp) => {
                tracing::warn!("Actuator POST {} returned HTTP {}", url, resp.status().as_u16());
            }
            Err(e) => tracing::warn!("Actuator POST {} failed: {}", url, e),
        }
    }
}
