//! busyflag - drive a busy flag from Microsoft Teams presence
//!
//! Polls the signed-in user's presence from Microsoft Graph and moves a
//! servo or colors a light on a small device server accordingly, while an
//! on/off switch is enabled.

pub mod accessory;
pub mod actuator;
pub mod auth;
pub mod config;
pub mod poller;
pub mod presence;
pub mod schedule;
