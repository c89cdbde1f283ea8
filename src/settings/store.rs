use serde::Deserialize;

use crate::api::client::ApiClient;
use crate::api::error::{ApiError, Result};
use crate::settings::types::MonitoringSettings;

const SETTINGS_PATH: &str = "monitoring-settings";

/// Where monitoring settings are loaded from and persisted to.
pub trait SettingsStore: Send + Sync {
    fn fetch(&self) -> Result<MonitoringSettings>;

    /// Persist `settings`, returning what the store now holds.
    fn persist(&self, settings: &MonitoringSettings) -> Result<MonitoringSettings>;
}

/// Confirmation returned by a successful save. Both fields are optional;
/// any 2xx answer counts as saved.
#[derive(Debug, Default, Deserialize)]
struct SaveConfirmation {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    settings: Option<MonitoringSettings>,
}

/// Settings kept by the detection service.
pub struct RemoteSettingsStore {
    client: ApiClient,
}

impl RemoteSettingsStore {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

impl SettingsStore for RemoteSettingsStore {
    fn fetch(&self) -> Result<MonitoringSettings> {
        let settings: MonitoringSettings = self
            .client
            .get_json("load settings", &self.client.detect_url(SETTINGS_PATH))?;
        settings.validate().map_err(|e| ApiError::Decode {
            action: "load settings",
            message: e.to_string(),
        })?;
        Ok(settings)
    }

    fn persist(&self, settings: &MonitoringSettings) -> Result<MonitoringSettings> {
        let body = self.client.post_json(
            "save settings",
            &self.client.detect_url(SETTINGS_PATH),
            settings,
        )?;
        let confirmation = serde_json::from_str::<SaveConfirmation>(&body).unwrap_or_else(|e| {
            tracing::debug!("save settings: unrecognised confirmation ({e})");
            SaveConfirmation::default()
        });
        if let Some(message) = &confirmation.message {
            tracing::info!("settings store: {message}");
        }
        // Without an echo the service holds what was sent.
        Ok(confirmation.settings.unwrap_or(*settings))
    }
}
