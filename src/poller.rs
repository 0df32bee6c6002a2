//! Presence polling loop
//!
//! `start` spawns one timer chain: sign in, signal the actuator on, then tick
//! every `max(interval, 1)` minutes. `stop` aborts the chain and any pending
//! device code sign-in. A tick always reschedules, whatever happened inside
//! it; ticks never overlap because the next sleep starts only after the
//! current tick returned.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;

use crate::accessory::SwitchState;
use crate::actuator::{ActuatorClient, PositionMapping};
use crate::auth::{AuthManager, GRAPH_RESOURCE};
use crate::config::PresenceConfig;
use crate::presence::{canonicalize, PresenceClient};

/// Lifecycle of the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerPhase {
    Idle,
    Authenticating,
    Polling,
}

#[derive(Default)]
struct PollState {
    pending: Option<JoinHandle<()>>,
}

struct Shared {
    config: PresenceConfig,
    auth: Arc<AuthManager>,
    switch: SwitchState,
    presence: PresenceClient,
    actuator: ActuatorClient,
    mapping: PositionMapping,
    phase: Mutex<PollerPhase>,
}

pub struct PresencePoller {
    shared: Arc<Shared>,
    state: Mutex<PollState>,
    tick_period: Duration,
}

impl PresencePoller {
    pub fn new(
        config: PresenceConfig,
        auth: Arc<AuthManager>,
        switch: SwitchState,
        http: reqwest::Client,
    ) -> Self {
        let tick_period = config.poll_interval();
        let shared = Shared {
            presence: PresenceClient::new(http.clone(), &config.graph_url),
            actuator: ActuatorClient::new(http),
            mapping: config.position_mapping(),
            config,
            auth,
            switch,
            phase: Mutex::new(PollerPhase::Idle),
        };

        Self {
            shared: Arc::new(shared),
            state: Mutex::new(PollState::default()),
            tick_period,
        }
    }

    /// Override the delay between ticks.
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    fn state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> PollerPhase {
        self.shared.phase()
    }

    /// True while a timer chain is alive (signing in or polling).
    pub fn is_active(&self) -> bool {
        self.state()
            .pending
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Toggle on: replace any existing chain with a fresh one.
    pub fn start(&self) {
        let mut state = self.state();
        if let Some(previous) = state.pending.take() {
            previous.abort();
        }

        let shared = self.shared.clone();
        let period = self.tick_period;
        state.pending = Some(tokio::spawn(async move { shared.run(period).await }));
    }

    /// Toggle off: drop the pending tick and any device code wait.
    pub fn stop(&self) {
        if let Some(handle) = self.state().pending.take() {
            handle.abort();
            tracing::info!("Presence polling stopped");
        }
        self.shared.auth.cancel();
        self.shared.set_phase(PollerPhase::Idle);
    }
}

impl Drop for PresencePoller {
    fn drop(&mut self) {
        if let Some(handle) = self.state().pending.take() {
            handle.abort();
        }
    }
}

impl Shared {
    fn phase(&self) -> PollerPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: PollerPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    async fn run(&self, period: Duration) {
        self.set_phase(PollerPhase::Authenticating);

        if self
            .auth
            .ensure_access_token(GRAPH_RESOURCE, true, false)
            .await
            .is_none()
        {
            tracing::warn!("No access token, presence polling not started");
            self.set_phase(PollerPhase::Idle);
            return;
        }
        tracing::info!("Access token acquired");

        if let Some(url) = self.config.on_url() {
            self.actuator.signal(&url).await;
        }

        self.set_phase(PollerPhase::Polling);
        loop {
            self.tick().await;
            tracing::debug!("Next presence check in {:?}", period);
            tokio::time::sleep(period).await;
        }
    }

    async fn tick(&self) {
        let Some(token) = self
            .auth
            .ensure_access_token(GRAPH_RESOURCE, false, false)
            .await
        else {
            tracing::warn!("No valid access token; switch the accessory off and on to sign in again");
            return;
        };

        let now = Local::now().naive_local();
        if self.config.schedule(self.switch.is_on()).allows(now) {
            self.update_position(&token).await;
        } else if let Some(url) = self.config.off_url() {
            self.actuator.signal(&url).await;
        }
    }

    async fn update_position(&self, token: &str) {
        let presence = match self.presence.fetch(token).await {
            Ok(presence) => presence,
            Err(e) => {
                tracing::warn!("Presence check failed: {:#}", e);
                return;
            }
        };

        let Some(raw) = presence.availability.as_deref() else {
            tracing::warn!("Presence response has no availability");
            return;
        };
        let bucket = canonicalize(Some(raw));
        tracing::debug!(
            "Presence {} (activity {}) maps to {}",
            raw,
            presence.activity.as_deref().unwrap_or("unknown"),
            bucket
        );

        let Some(url) = self.config.position_url() else {
            tracing::debug!("Neither servo_api nor set_color_api configured");
            return;
        };
        if let Some(payload) = self.mapping.resolve(bucket) {
            self.actuator.set_position(&url, &payload).await;
        }
    }
}
