use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::PitboardError;
use crate::config::AppConfig;

use super::{Notification, NotificationTransport, QueuedNotification};

/// The device's HTTP API authenticates with a fixed username and the
/// per-device API key as the password.
const BASIC_AUTH_USER: &str = "dev";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct SendResponse {
    success: SendSuccess,
}

#[derive(Debug, Deserialize)]
struct SendSuccess {
    id: String,
}

/// Notification transport against a LaMetric Time clock on the local
/// network. Calls block with a short timeout; the polling cycle is strictly
/// serialized, so a stalled call delays the next cycle but never overlaps
/// it.
pub struct LaMetricTransport {
    client: reqwest::blocking::Client,
    device: Option<DeviceSettings>,
}

struct DeviceSettings {
    base_url: String,
    api_key: String,
}

impl LaMetricTransport {
    /// Reads the device address and key from the config. An incomplete
    /// config still yields a transport: every call then short-circuits to
    /// [`PitboardError::DeviceNotConfigured`] so the pipeline keeps running
    /// while the user fills in their settings.
    pub fn from_config(config: &AppConfig) -> Result<Self, PitboardError> {
        let device = match (config.notification_url(), config.api_key.as_deref()) {
            (Some(base_url), Some(api_key)) if config.is_device_configured() => {
                Some(DeviceSettings {
                    base_url,
                    api_key: api_key.to_string(),
                })
            }
            _ => None,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PitboardError::TransportError {
                description: e.to_string(),
            })?;

        Ok(Self { client, device })
    }

    fn device(&self) -> Result<&DeviceSettings, PitboardError> {
        self.device.as_ref().ok_or(PitboardError::DeviceNotConfigured)
    }
}

impl NotificationTransport for LaMetricTransport {
    fn send(&mut self, notification: &Notification) -> Result<String, PitboardError> {
        let device = self.device()?;

        let response = self
            .client
            .post(&device.base_url)
            .basic_auth(BASIC_AUTH_USER, Some(&device.api_key))
            .json(notification)
            .send()
            .map_err(|e| PitboardError::TransportError {
                description: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PitboardError::TransportError {
                description: format!("device returned {}", status),
            });
        }

        let body: SendResponse =
            response
                .json()
                .map_err(|e| PitboardError::MalformedDeviceResponse {
                    description: e.to_string(),
                })?;
        debug!("device accepted notification {}", body.success.id);
        Ok(body.success.id)
    }

    fn queued(&mut self) -> Result<Vec<QueuedNotification>, PitboardError> {
        let device = self.device()?;

        let response = self
            .client
            .get(&device.base_url)
            .basic_auth(BASIC_AUTH_USER, Some(&device.api_key))
            .send()
            .map_err(|e| PitboardError::TransportError {
                description: e.to_string(),
            })?;

        response
            .json()
            .map_err(|e| PitboardError::MalformedDeviceResponse {
                description: e.to_string(),
            })
    }

    fn dismiss(&mut self, id: &str) -> Result<bool, PitboardError> {
        let device = self.device()?;

        let response = self
            .client
            .delete(format!("{}/{}", device.base_url, id))
            .basic_auth(BASIC_AUTH_USER, Some(&device.api_key))
            .send()
            .map_err(|e| PitboardError::TransportError {
                description: e.to_string(),
            })?;

        Ok(response.status().is_success())
    }
}
