use crate::api::error::{ApiError, Result};
use crate::settings::store::SettingsStore;
use crate::settings::types::{self, MonitoringSettings, SettingsField};

pub const SAVED_NOTICE: &str = "Settings saved successfully!";
pub const SAVE_FAILED_NOTICE: &str = "Failed to save settings.";
pub const LOAD_FAILED_NOTICE: &str = "Failed to load settings; showing defaults.";

/// Operator-facing settings form.
///
/// `saved` mirrors the store's last known value; `draft` holds the
/// operator's edits. A failed request leaves both untouched.
#[derive(Debug, Clone, Default)]
pub struct SettingsForm {
    saved: MonitoringSettings,
    draft: MonitoringSettings,
}

impl SettingsForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> &MonitoringSettings {
        &self.saved
    }

    pub fn draft(&self) -> &MonitoringSettings {
        &self.draft
    }

    pub fn is_dirty(&self) -> bool {
        self.saved != self.draft
    }

    pub fn edit(&mut self, field: SettingsField, value: i64) -> types::Result<()> {
        self.draft.set(field, value)
    }

    /// Replace both copies with the store's value. On failure the current
    /// values (defaults before any load) stay in place.
    pub fn load(&mut self, store: &dyn SettingsStore) -> Result<()> {
        match store.fetch() {
            Ok(settings) => {
                self.saved = settings;
                self.draft = settings;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{e}");
                Err(e)
            }
        }
    }

    /// Persist the draft. On failure the draft keeps the operator's edits.
    pub fn save(&mut self, store: &dyn SettingsStore) -> Result<()> {
        self.draft
            .validate()
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        match store.persist(&self.draft) {
            Ok(confirmed) => {
                self.saved = confirmed;
                self.draft = confirmed;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{e}");
                Err(e)
            }
        }
    }
}
