//! Token records and the in-memory auth session

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Access token for one protected resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub value: String,
    pub expires_on: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(value: String, expires_in: Duration) -> Self {
        Self {
            value,
            expires_on: Utc::now() + expires_in,
        }
    }

    /// A token is usable only while its expiry is strictly in the future.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on > now
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Utc::now())
    }
}

/// Process-lifetime authentication state.
///
/// A JSON snapshot of this struct is written to the key/value store after
/// every successful acquisition and read back at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSession {
    pub connected: bool,
    pub refresh_token: Option<String>,
    pub tenant_id: Option<String>,
    pub access_tokens: HashMap<String, TokenRecord>,
}

impl AuthSession {
    pub fn token(&self, resource: &str) -> Option<&TokenRecord> {
        self.access_tokens.get(resource)
    }

    /// Record a successful exchange for `resource`.
    ///
    /// The refresh token is replaced when the server rotated it and kept
    /// otherwise.
    pub fn record_grant(&mut self, resource: &str, record: TokenRecord, refresh_token: Option<String>) {
        self.access_tokens.insert(resource.to_string(), record);
        if let Some(rt) = refresh_token {
            self.refresh_token = Some(rt);
        }
        self.connected = true;
    }

    pub fn logout(&mut self) {
        *self = Self::default();
    }
}
