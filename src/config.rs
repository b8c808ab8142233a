use serde::{Deserialize, Serialize};

use crate::PitboardError;

const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
pub const DEFAULT_DEVICE_PORT: u16 = 8080;

/// Per-field enable toggles. A disabled field is neither classified nor
/// pushed to the display sink.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FieldToggles {
    pub flags: bool,
    pub ratings: bool,
    pub position: bool,
    pub laps: bool,
    pub best_lap: bool,
}

impl Default for FieldToggles {
    fn default() -> Self {
        Self {
            flags: true,
            ratings: true,
            position: true,
            laps: true,
            best_lap: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub device_ip: Option<String>,
    pub api_key: Option<String>,
    pub device_port: u16,
    pub poll_interval_ms: u64,
    pub fields: FieldToggles,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_ip: None,
            api_key: None,
            device_port: DEFAULT_DEVICE_PORT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            fields: FieldToggles::default(),
        }
    }
}

impl AppConfig {
    pub fn from_local_file() -> Option<Self> {
        let config_path = dirs::config_dir()?.join("pitboard").join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let file = std::fs::File::open(config_path).expect("Could not open config file");
            Some(serde_json::from_reader(file).expect("Could not parse config file"))
        } else {
            None
        }
    }

    pub fn save(&self) -> Result<(), PitboardError> {
        let config_path = dirs::config_dir()
            .ok_or(PitboardError::NoConfigDir)?
            .join("pitboard")
            .join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            std::fs::create_dir_all(config_path.parent().unwrap())
                .map_err(|e| PitboardError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| PitboardError::ConfigIOError { source: e })?;
        serde_json::to_writer(file, self).map_err(|e| PitboardError::ConfigSerializeError { source: e })
    }

    /// The device notification endpoint, or `None` while the IP is unset.
    pub fn notification_url(&self) -> Option<String> {
        let ip = self.device_ip.as_deref()?;
        Some(format!(
            "http://{}:{}/api/v2/device/notifications",
            ip, self.device_port
        ))
    }

    pub fn is_device_configured(&self) -> bool {
        self.device_ip.as_deref().is_some_and(|ip| !ip.is_empty())
            && self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_all_fields() {
        let config = AppConfig::default();
        assert!(config.fields.flags);
        assert!(config.fields.ratings);
        assert!(config.fields.best_lap);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.device_port, DEFAULT_DEVICE_PORT);
        assert!(!config.is_device_configured());
    }

    #[test]
    fn test_notification_url() {
        let config = AppConfig {
            device_ip: Some("192.168.1.50".to_string()),
            api_key: Some("secret".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.notification_url().unwrap(),
            "http://192.168.1.50:8080/api/v2/device/notifications"
        );
        assert!(config.is_device_configured());
    }

    #[test]
    fn test_empty_key_is_not_configured() {
        let config = AppConfig {
            device_ip: Some("192.168.1.50".to_string()),
            api_key: Some(String::new()),
            ..Default::default()
        };
        assert!(!config.is_device_configured());
    }

    #[test]
    fn test_partial_config_file_round_trip() {
        // Old config files without newer keys still deserialize thanks to
        // #[serde(default)].
        let parsed: AppConfig =
            serde_json::from_str(r#"{"device_ip": "10.0.0.2", "api_key": "k"}"#).unwrap();
        assert_eq!(parsed.device_ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(parsed.device_port, DEFAULT_DEVICE_PORT);
        assert!(parsed.fields.laps);

        let serialized = serde_json::to_string(&parsed).unwrap();
        let back: AppConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, parsed);
    }
}
