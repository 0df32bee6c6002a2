//! Accessory configuration

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::actuator::{PositionAngle, PositionMapping, StatusColor};
use crate::auth::{DEFAULT_AUTHORITY, GRAPH_RESOURCE};
use crate::schedule::ScheduleConfig;

/// Recognized accessory options. Every field has a default so a config file
/// only needs what differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Display name of the switch
    pub name: String,
    /// Accessory type name the host registers this under
    pub accessory: String,
    /// Azure AD application (client) ID
    #[serde(alias = "appId")]
    pub app_id: String,
    /// Actuator server host, scheme optional (`http://` assumed)
    pub hostname: String,
    pub port: u16,
    /// Servo endpoint; used unless `set_color_api` is set
    #[serde(alias = "servoApi")]
    pub servo_api: Option<String>,
    /// Light endpoint; switches the accessory to color payloads
    #[serde(alias = "setColorApi")]
    pub set_color_api: Option<String>,
    #[serde(alias = "lightType")]
    pub light_type: Option<String>,
    /// Bucket name (available/away/busy) to servo angle
    #[serde(alias = "positionAngles")]
    pub position_angles: BTreeMap<String, PositionAngle>,
    /// Bucket name (available/away/busy) to light color
    #[serde(alias = "statusColors")]
    pub status_colors: BTreeMap<String, StatusColor>,
    /// "HH:MM"; no checks before this time
    #[serde(alias = "startTime")]
    pub start_time: Option<String>,
    /// "HH:MM"; no checks after this time
    #[serde(alias = "endTime")]
    pub end_time: Option<String>,
    /// Polling interval in minutes
    pub interval: u64,
    #[serde(alias = "onApi")]
    pub on_api: Option<String>,
    #[serde(alias = "offApi")]
    pub off_api: Option<String>,
    /// Keep checking on Saturday and Sunday
    pub weekend: bool,
    pub debug: bool,
    /// Where tokens and session snapshots are kept
    pub persist_dir: Option<PathBuf>,
    pub graph_url: String,
    pub authority: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            name: "Presence Indicator".to_string(),
            accessory: "PresenceIndicator".to_string(),
            app_id: String::new(),
            hostname: String::new(),
            port: 5000,
            servo_api: None,
            set_color_api: None,
            light_type: None,
            position_angles: BTreeMap::new(),
            status_colors: BTreeMap::new(),
            start_time: None,
            end_time: None,
            interval: 1,
            on_api: None,
            off_api: None,
            weekend: false,
            debug: false,
            persist_dir: None,
            graph_url: GRAPH_RESOURCE.to_string(),
            authority: DEFAULT_AUTHORITY.to_string(),
        }
    }
}

impl PresenceConfig {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "busyflag", "busyflag").context("Could not determine config directory")
    }

    /// Default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Load configuration from `path`, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            bail!("app_id is required (Azure AD application client ID)");
        }
        if self.hostname.trim().is_empty() {
            bail!("hostname of the actuator server is required");
        }
        Ok(())
    }

    /// Minutes between ticks, never less than one.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1).saturating_mul(60))
    }

    /// Full actuator URL for an API path.
    pub fn actuator_url(&self, api: &str) -> String {
        let host = self.hostname.trim_end_matches('/');
        if host.contains("://") {
            format!("{}:{}{}", host, self.port, api)
        } else {
            format!("http://{}:{}{}", host, self.port, api)
        }
    }

    pub fn on_url(&self) -> Option<String> {
        self.on_api.as_deref().map(|api| self.actuator_url(api))
    }

    pub fn off_url(&self) -> Option<String> {
        self.off_api.as_deref().map(|api| self.actuator_url(api))
    }

    /// Endpoint receiving position/color payloads; the light API wins when set.
    pub fn position_url(&self) -> Option<String> {
        self.set_color_api
            .as_deref()
            .or(self.servo_api.as_deref())
            .map(|api| self.actuator_url(api))
    }

    pub fn position_mapping(&self) -> PositionMapping {
        if self.set_color_api.is_some() {
            PositionMapping::Light {
                colors: self.status_colors.clone(),
                light_type: self.light_type.clone(),
            }
        } else {
            PositionMapping::Servo(self.position_angles.clone())
        }
    }

    /// Schedule inputs for the given switch state.
    pub fn schedule(&self, toggle_state: bool) -> ScheduleConfig {
        ScheduleConfig {
            toggle_state,
            weekend_allowed: self.weekend,
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
        }
    }

    pub fn persist_dir(&self) -> Result<PathBuf> {
        match &self.persist_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("persist")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name = "Office flag"
app_id = "00000000-1111-2222-3333-444444444444"
hostname = "192.168.1.20"
servo_api = "/api/servo"
on_api = "/api/on"
off_api = "/api/off"
start_time = "08:30"
end_time = "17:00"
interval = 0

[position_angles.busy]
angle = 10
"#;

    #[test]
    fn test_parse_sample_with_defaults() {
        let config = PresenceConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.name, "Office flag");
        assert_eq!(config.port, 5000);
        assert!(!config.weekend);
        assert!(!config.debug);
        assert_eq!(config.graph_url, GRAPH_RESOURCE);
        assert_eq!(config.position_angles["busy"].angle, 10);
    }

    #[test]
    fn test_interval_is_floored_to_one_minute() {
        let config = PresenceConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(60));

        let config = PresenceConfig {
            interval: 5,
            ..config
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_huge_interval_saturates() {
        let config = PresenceConfig::parse(
            "app_id = \"app\"\nhostname = \"host\"\ninterval = 307445734561825861",
        )
        .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_camel_case_option_names() {
        let config = PresenceConfig::parse(
            r#"
appId = "app"
hostname = "host"
setColorApi = "/color"
lightType = "hue"
startTime = "09:00"
endTime = "17:30"
onApi = "/on"
offApi = "/off"

[statusColors.busy]
red = 200
green = 0
blue = 0
"#,
        )
        .unwrap();
        assert_eq!(config.app_id, "app");
        assert_eq!(config.set_color_api.as_deref(), Some("/color"));
        assert_eq!(config.light_type.as_deref(), Some("hue"));
        assert_eq!(config.start_time.as_deref(), Some("09:00"));
        assert_eq!(config.end_time.as_deref(), Some("17:30"));
        assert_eq!(config.on_url().unwrap(), "http://host:5000/on");
        assert_eq!(config.status_colors["busy"].red, 200);
    }

    #[test]
    fn test_actuator_urls() {
        let config = PresenceConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.on_url().unwrap(), "http://192.168.1.20:5000/api/on");
        assert_eq!(config.position_url().unwrap(), "http://192.168.1.20:5000/api/servo");

        let config = PresenceConfig {
            hostname: "https://flag.local/".into(),
            set_color_api: Some("/api/color".into()),
            off_api: None,
            ..config
        };
        assert_eq!(config.position_url().unwrap(), "https://flag.local:5000/api/color");
        assert!(config.off_url().is_none());
    }

    #[test]
    fn test_color_api_selects_light_mapping() {
        let config = PresenceConfig::parse(SAMPLE).unwrap();
        assert!(matches!(config.position_mapping(), PositionMapping::Servo(_)));

        let config = PresenceConfig {
            set_color_api: Some("/api/color".into()),
            ..config
        };
        assert!(matches!(config.position_mapping(), PositionMapping::Light { .. }));
    }

    #[test]
    fn test_missing_required_fields() {
        assert!(PresenceConfig::parse("hostname = \"host\"").is_err());
        assert!(PresenceConfig::parse("app_id = \"app\"").is_err());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = PresenceConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }

    #[test]
    fn test_schedule_mirrors_config() {
        let config = PresenceConfig::parse(SAMPLE).unwrap();
        let schedule = config.schedule(true);
        assert!(schedule.toggle_state);
        assert_eq!(schedule.start_time.as_deref(), Some("08:30"));
        assert_eq!(schedule.end_time.as_deref(), Some("17:00"));
    }
}
