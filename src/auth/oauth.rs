//! OAuth2 device code and refresh token grants against Azure AD

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use futures::future::BoxFuture;
use futures::FutureExt;
use oauth2::{
    basic::BasicClient, AuthUrl, ClientId, DeviceAuthorizationUrl, ErrorResponse, RefreshToken,
    RequestTokenError, Scope, StandardDeviceAuthorizationResponse, TokenResponse, TokenUrl,
};

use super::error::AuthError;
use super::AuthConfig;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Device code issued by the authorization server, waiting for the user.
#[derive(Debug, Clone)]
pub struct DeviceCodeGrant {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: Duration,
    pub interval: Duration,
}

impl DeviceCodeGrant {
    /// Operator-facing sign-in instruction.
    pub fn message(&self) -> String {
        format!(
            "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
            self.verification_uri, self.user_code
        )
    }
}

/// Successful token endpoint response.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: ChronoDuration,
    pub refresh_token: Option<String>,
}

/// Request/response contract with the authorization server.
///
/// `wait_for_device_token` resolves only once the user finished (or
/// abandoned) the out-of-band sign-in; callers race it against a
/// cancellation signal.
pub trait AuthorizationClient: Send + Sync {
    fn request_device_code<'a>(
        &'a self,
        resource: &'a str,
    ) -> BoxFuture<'a, Result<DeviceCodeGrant, AuthError>>;

    fn wait_for_device_token<'a>(
        &'a self,
        grant: &'a DeviceCodeGrant,
    ) -> BoxFuture<'a, Result<TokenGrant, AuthError>>;

    fn exchange_refresh_token<'a>(
        &'a self,
        refresh_token: &'a str,
        resource: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, AuthError>>;
}

/// Scopes for a v1-style resource URL on the v2.0 endpoints.
fn resource_scopes(resource: &str) -> [Scope; 2] {
    [
        Scope::new(format!("{}/.default", resource.trim_end_matches('/'))),
        Scope::new("offline_access".to_string()),
    ]
}

/// Azure AD client built on the `oauth2` crate.
pub struct AzureAdClient {
    client: BasicClient,
}

impl AzureAdClient {
    pub fn new(auth_config: &AuthConfig) -> Result<Self, AuthError> {
        Ok(Self {
            client: build_client(auth_config)?,
        })
    }

    async fn request_device_code_inner(&self, resource: &str) -> Result<DeviceCodeGrant, AuthError> {
        let [default_scope, offline_scope] = resource_scopes(resource);
        let details: StandardDeviceAuthorizationResponse = self
            .client
            .exchange_device_code()
            .map_err(|e| AuthError::Configuration(e.to_string()))?
            .add_scope(default_scope)
            .add_scope(offline_scope)
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| classify("failed to request device code", e))?;

        Ok(DeviceCodeGrant {
            device_code: details.device_code().secret().to_string(),
            user_code: details.user_code().secret().to_string(),
            verification_uri: details.verification_uri().as_str().to_string(),
            expires_in: details.expires_in(),
            interval: details.interval(),
        })
    }

    async fn wait_for_device_token_inner(&self, grant: &DeviceCodeGrant) -> Result<TokenGrant, AuthError> {
        // The oauth2 poller wants its own response type back; rebuild it from
        // the fields we kept.
        let details: StandardDeviceAuthorizationResponse = serde_json::from_value(serde_json::json!({
            "device_code": grant.device_code,
            "user_code": grant.user_code,
            "verification_uri": grant.verification_uri,
            "expires_in": grant.expires_in.as_secs(),
            "interval": grant.interval.as_secs(),
        }))
        .map_err(|e| AuthError::Configuration(e.to_string()))?;

        let token_response = self
            .client
            .exchange_device_access_token(&details)
            .request_async(oauth2::reqwest::async_http_client, tokio::time::sleep, None)
            .await
            .map_err(|e| classify("failed to exchange device code for token", e))?;

        Ok(to_grant(&token_response))
    }

    async fn exchange_refresh_token_inner(
        &self,
        refresh_token: &str,
        resource: &str,
    ) -> Result<TokenGrant, AuthError> {
        let [default_scope, offline_scope] = resource_scopes(resource);
        let token_response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .add_scope(default_scope)
            .add_scope(offline_scope)
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| classify("failed to refresh token", e))?;

        Ok(to_grant(&token_response))
    }
}

impl AuthorizationClient for AzureAdClient {
    fn request_device_code<'a>(
        &'a self,
        resource: &'a str,
    ) -> BoxFuture<'a, Result<DeviceCodeGrant, AuthError>> {
        self.request_device_code_inner(resource).boxed()
    }

    fn wait_for_device_token<'a>(
        &'a self,
        grant: &'a DeviceCodeGrant,
    ) -> BoxFuture<'a, Result<TokenGrant, AuthError>> {
        self.wait_for_device_token_inner(grant).boxed()
    }

    fn exchange_refresh_token<'a>(
        &'a self,
        refresh_token: &'a str,
        resource: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, AuthError>> {
        self.exchange_refresh_token_inner(refresh_token, resource)
            .boxed()
    }
}

/// Transport failures are `Network`; anything the server answered is `Rejected`.
fn classify<RE, T>(action: &str, error: RequestTokenError<RE, T>) -> AuthError
where
    RE: std::error::Error + 'static,
    T: ErrorResponse + 'static,
{
    match error {
        RequestTokenError::Request(e) => match std::error::Error::source(&e) {
            Some(source) => AuthError::Network(format!("{}: {}: {}", action, e, source)),
            None => AuthError::Network(format!("{}: {}", action, e)),
        },
        other => AuthError::Rejected(format!("{}: {}", action, other)),
    }
}

fn to_grant<T: TokenResponse<oauth2::basic::BasicTokenType>>(token_response: &T) -> TokenGrant {
    let expires_in = token_response
        .expires_in()
        .and_then(|d| ChronoDuration::from_std(d).ok())
        .unwrap_or_else(|| ChronoDuration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));

    TokenGrant {
        access_token: token_response.access_token().secret().to_string(),
        expires_in,
        refresh_token: token_response
            .refresh_token()
            .map(|rt| rt.secret().to_string()),
    }
}

/// Build the OAuth2 client from an AuthConfig
fn build_client(auth_config: &AuthConfig) -> Result<BasicClient, AuthError> {
    let auth_url = AuthUrl::new(format!("{}/oauth2/v2.0/authorize", auth_config.authority))?;
    let token_url = TokenUrl::new(format!("{}/oauth2/v2.0/token", auth_config.authority))?;
    let device_url =
        DeviceAuthorizationUrl::new(format!("{}/oauth2/v2.0/devicecode", auth_config.authority))?;

    Ok(BasicClient::new(
        ClientId::new(auth_config.client_id.clone()),
        None,
        auth_url,
        Some(token_url),
    )
    .set_device_authorization_url(device_url))
}
