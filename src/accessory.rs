//! Switch accessory bound to the presence poller
//!
//! The host automation platform owns registration and the characteristic
//! plumbing. This adapter is what it talks to: a switch that can be read and
//! set, plus the accessory information it displays.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::auth::AuthManager;
use crate::config::PresenceConfig;
use crate::poller::{PollerPhase, PresencePoller};

const MANUFACTURER: &str = "busyflag";
const MODEL: &str = "Presence Indicator";
const SERIAL_NUMBER: &str = "PI_01";

/// The switch's "On" characteristic, shared with the poller.
#[derive(Debug, Clone, Default)]
pub struct SwitchState(Arc<AtomicBool>);

impl SwitchState {
    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::SeqCst);
    }
}

/// Host registry context handed to each accessory at construction.
#[derive(Debug, Clone)]
pub struct AccessoryContext {
    /// Version of the host platform, for the startup banner
    pub host_version: String,
    /// Version reported as firmware revision
    pub plugin_version: String,
    /// Shared HTTP client for every outbound call
    pub http: reqwest::Client,
}

impl AccessoryContext {
    pub fn new(host_version: impl Into<String>) -> Self {
        Self {
            host_version: host_version.into(),
            plugin_version: env!("CARGO_PKG_VERSION").to_string(),
            http: reqwest::Client::new(),
        }
    }
}

/// Services exposed to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessoryService {
    Information {
        manufacturer: String,
        model: String,
        serial_number: String,
        firmware_revision: String,
    },
    Switch {
        name: String,
    },
}

pub struct PresenceAccessory {
    name: String,
    firmware_revision: String,
    switch: SwitchState,
    poller: PresencePoller,
}

impl PresenceAccessory {
    pub fn new(ctx: &AccessoryContext, config: PresenceConfig, auth: Arc<AuthManager>) -> Self {
        tracing::info!(
            "{} {} on host {}",
            config.accessory,
            ctx.plugin_version,
            ctx.host_version
        );

        let switch = SwitchState::default();
        Self {
            name: config.name.clone(),
            firmware_revision: ctx.plugin_version.clone(),
            poller: PresencePoller::new(config, auth, switch.clone(), ctx.http.clone()),
            switch,
        }
    }

    pub fn services(&self) -> Vec<AccessoryService> {
        vec![
            AccessoryService::Information {
                manufacturer: MANUFACTURER.to_string(),
                model: MODEL.to_string(),
                serial_number: SERIAL_NUMBER.to_string(),
                firmware_revision: self.firmware_revision.clone(),
            },
            AccessoryService::Switch {
                name: self.name.clone(),
            },
        ]
    }

    pub fn is_on(&self) -> bool {
        self.switch.is_on()
    }

    pub fn phase(&self) -> PollerPhase {
        self.poller.phase()
    }

    /// Handle a switch change from the host. The background work is started
    /// or stopped and `callback` runs before this returns.
    pub fn set_status<F: FnOnce()>(&self, on: bool, callback: F) {
        self.switch.set(on);
        if on {
            tracing::info!("{} switched on", self.name);
            self.poller.start();
        } else {
            tracing::info!("{} switched off", self.name);
            self.poller.stop();
        }
        callback();
    }
}
