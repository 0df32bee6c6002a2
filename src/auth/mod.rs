//! Authentication module for Microsoft Graph
//!
//! Implements the OAuth2 device code flow for Azure AD, keeps bearer tokens
//! cached and refreshed, and persists them across restarts.

pub mod error;
pub mod manager;
pub mod oauth;
pub mod store;
pub mod tokens;

pub use error::AuthError;
pub use manager::{AuthManager, AuthStatus};
pub use oauth::{AuthorizationClient, AzureAdClient, DeviceCodeGrant, TokenGrant};
pub use store::TokenStore;
pub use tokens::{AuthSession, TokenRecord};

/// Microsoft login endpoint; `common` accepts both work and personal accounts.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/common";

/// Resource whose token backs the presence API.
pub const GRAPH_RESOURCE: &str = "https://graph.microsoft.com";

/// Azure AD client configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth2 client ID of the registered application (public client)
    pub client_id: String,
    /// Authority base URL, tenant segment included
    pub authority: String,
}

impl AuthConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            authority: DEFAULT_AUTHORITY.to_string(),
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }
}
