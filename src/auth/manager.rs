//! Token lifecycle: cached token, then refresh token, then device code

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::error::AuthError;
use super::oauth::{AuthorizationClient, TokenGrant};
use super::store::TokenStore;
use super::tokens::{AuthSession, TokenRecord};
use super::GRAPH_RESOURCE;

/// Snapshot of the session for status reporting.
#[derive(Debug, Clone)]
pub struct AuthStatus {
    pub connected: bool,
    pub has_refresh_token: bool,
    /// (resource, expiry, still valid)
    pub tokens: Vec<(String, DateTime<Utc>, bool)>,
}

/// Facade over the token store and the authorization client.
///
/// `ensure_access_token` never fails loudly: every error is logged and comes
/// back as `None`, which callers treat as "try again later".
pub struct AuthManager {
    app_id: String,
    primary_resource: String,
    store: TokenStore,
    client: Arc<dyn AuthorizationClient>,
    session: Mutex<AuthSession>,
    device_flow: Mutex<Option<CancellationToken>>,
}

impl AuthManager {
    /// Build a manager and restore whatever session state survived on disk.
    pub fn new(app_id: impl Into<String>, store: TokenStore, client: Arc<dyn AuthorizationClient>) -> Self {
        let app_id = app_id.into();
        let primary_resource = GRAPH_RESOURCE.to_string();
        let session = restore_session(&store, &app_id, &primary_resource);

        Self {
            app_id,
            primary_resource,
            store,
            client,
            session: Mutex::new(session),
            device_flow: Mutex::new(None),
        }
    }

    fn session(&self) -> MutexGuard<'_, AuthSession> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot_key(&self, resource: &str) -> String {
        format!("{}-{}", self.app_id, resource)
    }

    pub fn is_connected(&self) -> bool {
        self.session().connected
    }

    /// Return a bearer token for `resource`, acquiring one if needed.
    pub async fn ensure_access_token(
        &self,
        resource: &str,
        allow_interactive: bool,
        force_refresh: bool,
    ) -> Option<String> {
        if !force_refresh {
            if let Some(token) = self.cached_token(resource) {
                return Some(token);
            }
        }

        let result = match self.acquire(resource, allow_interactive).await {
            Ok(grant) => self.store_grant(resource, grant),
            Err(e) => Err(e),
        };

        match result {
            Ok(token) => Some(token),
            Err(AuthError::Cancelled) => {
                tracing::info!("Device code sign-in for {} was cancelled", resource);
                None
            }
            Err(e) => {
                tracing::error!("Failed to retrieve an access token for {}: {}", resource, e);
                None
            }
        }
    }

    fn cached_token(&self, resource: &str) -> Option<String> {
        let session = self.session();
        match session.token(resource) {
            Some(record) if !record.is_expired() => {
                tracing::debug!(
                    "Existing access token for {} valid until {}",
                    resource,
                    record.expires_on
                );
                Some(record.value.clone())
            }
            Some(record) => {
                tracing::debug!(
                    "Access token for {} expired at {}",
                    resource,
                    record.expires_on
                );
                None
            }
            None => {
                tracing::debug!("No token found for resource {}", resource);
                None
            }
        }
    }

    async fn acquire(&self, resource: &str, allow_interactive: bool) -> Result<TokenGrant, AuthError> {
        let refresh_token = self.session().refresh_token.clone();

        if let Some(rt) = refresh_token {
            tracing::debug!("Retrieving new access token for {} using refresh token", resource);
            match self.client.exchange_refresh_token(&rt, resource).await {
                Ok(grant) => return Ok(grant),
                Err(e) if allow_interactive => {
                    tracing::warn!("Refresh failed, falling back to device code: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        if !allow_interactive {
            return Err(AuthError::InteractionRequired);
        }

        self.acquire_with_device_code(resource).await
    }

    async fn acquire_with_device_code(&self, resource: &str) -> Result<TokenGrant, AuthError> {
        tracing::debug!("Starting device code flow for {}", resource);

        let cancel = CancellationToken::new();
        *self.device_flow.lock().unwrap_or_else(|e| e.into_inner()) = Some(cancel.clone());

        let flow = async {
            let grant = self.client.request_device_code(resource).await?;
            tracing::info!("{}", grant.message());
            self.client.wait_for_device_token(&grant).await
        };

        let result = tokio::select! {
            result = flow => result,
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
        };

        self.device_flow
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        result
    }

    /// Cache the grant, write the token files and the session snapshot.
    fn store_grant(&self, resource: &str, grant: TokenGrant) -> Result<String, AuthError> {
        let record = TokenRecord::new(grant.access_token, grant.expires_in);

        let snapshot = {
            let mut session = self.session();
            session.record_grant(resource, record.clone(), grant.refresh_token);
            session.clone()
        };

        if resource == self.primary_resource {
            self.store.save_token_files(&record)?;
        }

        if let Err(e) = self.store.save_snapshot(&self.snapshot_key(resource), &snapshot) {
            tracing::warn!("Failed to store connection info: {}", e);
        }

        tracing::info!("Access token for {} acquired, expires {}", resource, record.expires_on);
        Ok(record.value)
    }

    /// Abort an in-flight device code wait, if any.
    pub fn cancel(&self) {
        let pending = self
            .device_flow
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(token) = pending {
            tracing::info!("Cancelling device code sign-in");
            token.cancel();
        }
    }

    /// Forget every token and the refresh token, on disk as well.
    pub fn logout(&self) -> Result<(), AuthError> {
        let resources: Vec<String> = {
            let mut session = self.session();
            let resources = session.access_tokens.keys().cloned().collect();
            session.logout();
            resources
        };

        self.store.clear(&self.snapshot_key(&self.primary_resource))?;
        for resource in resources {
            self.store.clear(&self.snapshot_key(&resource))?;
        }
        Ok(())
    }

    pub fn status(&self) -> AuthStatus {
        let session = self.session();
        let now = Utc::now();
        let mut tokens: Vec<_> = session
            .access_tokens
            .iter()
            .map(|(resource, record)| (resource.clone(), record.expires_on, record.is_valid_at(now)))
            .collect();
        tokens.sort();

        AuthStatus {
            connected: session.connected,
            has_refresh_token: session.refresh_token.is_some(),
            tokens,
        }
    }
}

/// Rebuild the session from the snapshot. The primary token comes from
/// whichever of the snapshot and the flat files expires later.
fn restore_session(store: &TokenStore, app_id: &str, primary_resource: &str) -> AuthSession {
    let mut session = store
        .load_snapshot(&format!("{}-{}", app_id, primary_resource))
        .unwrap_or_default();

    if let Some(record) = store.load_token_files() {
        let newer = session
            .token(primary_resource)
            .map_or(true, |current| record.expires_on > current.expires_on);
        if newer {
            session
                .access_tokens
                .insert(primary_resource.to_string(), record);
        }
    }

    session
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::testing::FakeAuthClient;
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, client: Arc<FakeAuthClient>) -> AuthManager {
        AuthManager::new("app", TokenStore::new(dir.path().to_path_buf()), client)
    }

    #[tokio::test]
    async fn test_second_call_hits_cache_without_network() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeAuthClient::default());
        let auth = manager(&dir, client.clone());

        let first = auth.ensure_access_token(GRAPH_RESOURCE, true, false).await;
        assert_eq!(first.as_deref(), Some("device-1"));
        assert_eq!(client.network_calls(), 1);

        let second = auth.ensure_access_token(GRAPH_RESOURCE, true, false).await;
        assert_eq!(second, first);
        assert_eq!(client.network_calls(), 1);
        assert!(auth.is_connected());
    }

    #[tokio::test]
    async fn test_expired_token_uses_refresh_token() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeAuthClient::default());
        client.short_lived.store(true, Ordering::SeqCst);
        let auth = manager(&dir, client.clone());

        assert!(auth.ensure_access_token(GRAPH_RESOURCE, true, false).await.is_some());
        let token = auth.ensure_access_token(GRAPH_RESOURCE, false, false).await;

        assert_eq!(token.as_deref(), Some("refreshed-1"));
        assert_eq!(client.device_code_requests.load(Ordering::SeqCst), 1);
        assert_eq!(client.refresh_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeAuthClient::default());
        let auth = manager(&dir, client.clone());

        auth.ensure_access_token(GRAPH_RESOURCE, true, false).await;
        let token = auth.ensure_access_token(GRAPH_RESOURCE, true, true).await;

        assert_eq!(token.as_deref(), Some("refreshed-1"));
        assert_eq!(client.refresh_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_device_code() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeAuthClient::default());
        let auth = manager(&dir, client.clone());

        auth.ensure_access_token(GRAPH_RESOURCE, true, false).await;
        client.refresh_fails.store(true, Ordering::SeqCst);

        let token = auth.ensure_access_token(GRAPH_RESOURCE, true, true).await;
        assert_eq!(token.as_deref(), Some("device-2"));
        assert_eq!(client.device_code_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_interactive_failure_returns_none() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeAuthClient::default());
        let auth = manager(&dir, client.clone());

        // No refresh token yet: nothing may be attempted.
        assert!(auth.ensure_access_token(GRAPH_RESOURCE, false, false).await.is_none());
        assert_eq!(client.network_calls(), 0);

        auth.ensure_access_token(GRAPH_RESOURCE, true, false).await;
        client.refresh_fails.store(true, Ordering::SeqCst);
        assert!(auth.ensure_access_token(GRAPH_RESOURCE, false, true).await.is_none());
        assert_eq!(client.device_code_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_device_code_returns_none() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeAuthClient::default());
        client.device_code_fails.store(true, Ordering::SeqCst);
        let auth = manager(&dir, client.clone());

        assert!(auth.ensure_access_token(GRAPH_RESOURCE, true, false).await.is_none());
        assert!(!auth.is_connected());
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeAuthClient::default());
        let token = manager(&dir, client.clone())
            .ensure_access_token(GRAPH_RESOURCE, true, false)
            .await;

        let restarted_client = Arc::new(FakeAuthClient::default());
        let restarted = manager(&dir, restarted_client.clone());
        assert!(restarted.is_connected());
        assert_eq!(restarted.ensure_access_token(GRAPH_RESOURCE, true, false).await, token);
        assert_eq!(restarted_client.network_calls(), 0);
        assert!(restarted.status().has_refresh_token);
    }

    #[tokio::test]
    async fn test_token_files_alone_restore_cached_token() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().to_path_buf());
        store
            .save_token_files(&TokenRecord::new("from-files".into(), chrono::Duration::hours(1)))
            .unwrap();

        let client = Arc::new(FakeAuthClient::default());
        let auth = manager(&dir, client.clone());
        let token = auth.ensure_access_token(GRAPH_RESOURCE, true, false).await;
        assert_eq!(token.as_deref(), Some("from-files"));
        assert_eq!(client.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_newer_token_files_beat_stale_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().to_path_buf());
        let mut stale = AuthSession::default();
        stale.record_grant(
            GRAPH_RESOURCE,
            TokenRecord::new("from-snapshot".into(), chrono::Duration::minutes(-10)),
            Some("rt".into()),
        );
        store
            .save_snapshot(&format!("app-{}", GRAPH_RESOURCE), &stale)
            .unwrap();
        store
            .save_token_files(&TokenRecord::new("from-files".into(), chrono::Duration::hours(1)))
            .unwrap();

        let client = Arc::new(FakeAuthClient::default());
        let auth = manager(&dir, client.clone());
        let token = auth.ensure_access_token(GRAPH_RESOURCE, false, false).await;
        assert_eq!(token.as_deref(), Some("from-files"));
        assert_eq!(client.network_calls(), 0);
        assert!(auth.status().has_refresh_token);
    }

    #[tokio::test]
    async fn test_cancel_aborts_device_code_wait() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeAuthClient::default());
        client.device_wait_hangs.store(true, Ordering::SeqCst);
        let auth = Arc::new(manager(&dir, client.clone()));

        let pending = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.ensure_access_token(GRAPH_RESOURCE, true, false).await })
        };
        while client.device_code_requests.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        auth.cancel();
        let token = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .expect("device code wait did not stop")
            .unwrap();
        assert!(token.is_none());
        assert!(!auth.is_connected());
    }

    #[tokio::test]
    async fn test_logout_clears_memory_and_disk() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeAuthClient::default());
        let auth = manager(&dir, client.clone());
        auth.ensure_access_token(GRAPH_RESOURCE, true, false).await;

        auth.logout().unwrap();
        let status = auth.status();
        assert!(!status.connected);
        assert!(!status.has_refresh_token);
        assert!(status.tokens.is_empty());

        let restarted = manager(&dir, Arc::new(FakeAuthClient::default()));
        assert!(!restarted.is_connected());
        assert!(restarted
            .ensure_access_token(GRAPH_RESOURCE, false, false)
            .await
            .is_none());
    }
}
