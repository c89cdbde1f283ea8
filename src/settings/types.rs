use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: SettingsField,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("unknown settings field '{0}'")]
    UnknownField(String),

    #[error("{field} expects a whole number, got '{raw}'")]
    NotANumber { field: SettingsField, raw: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Monitoring thresholds kept by the detection service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringSettings {
    pub monitoring_start_hour: u32,
    pub monitoring_end_hour: u32,
    /// Seconds.
    pub inactivity_threshold: u32,
    /// Seconds.
    pub no_person_threshold: u32,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            monitoring_start_hour: 6,
            monitoring_end_hour: 7,
            inactivity_threshold: 10,
            no_person_threshold: 5,
        }
    }
}

impl MonitoringSettings {
    pub fn get(&self, field: SettingsField) -> u32 {
        match field {
            SettingsField::StartHour => self.monitoring_start_hour,
            SettingsField::EndHour => self.monitoring_end_hour,
            SettingsField::InactivityThreshold => self.inactivity_threshold,
            SettingsField::NoPersonThreshold => self.no_person_threshold,
        }
    }

    /// Set one field after checking its range.
    pub fn set(&mut self, field: SettingsField, value: i64) -> Result<()> {
        let value = field.check(value)?;
        match field {
            SettingsField::StartHour => self.monitoring_start_hour = value,
            SettingsField::EndHour => self.monitoring_end_hour = value,
            SettingsField::InactivityThreshold => self.inactivity_threshold = value,
            SettingsField::NoPersonThreshold => self.no_person_threshold = value,
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for field in SettingsField::ALL {
            field.check(i64::from(self.get(field)))?;
        }
        Ok(())
    }
}

impl fmt::Display for MonitoringSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Monitoring Time: {}:00 - {}:00",
            self.monitoring_start_hour, self.monitoring_end_hour
        )?;
        writeln!(f, "Inactivity Alert: {} seconds", self.inactivity_threshold)?;
        write!(f, "No Person Alert: {} seconds", self.no_person_threshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    StartHour,
    EndHour,
    InactivityThreshold,
    NoPersonThreshold,
}

impl SettingsField {
    pub const ALL: [SettingsField; 4] = [
        SettingsField::StartHour,
        SettingsField::EndHour,
        SettingsField::InactivityThreshold,
        SettingsField::NoPersonThreshold,
    ];

    /// Wire name, also accepted by the shell.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsField::StartHour => "monitoring_start_hour",
            SettingsField::EndHour => "monitoring_end_hour",
            SettingsField::InactivityThreshold => "inactivity_threshold",
            SettingsField::NoPersonThreshold => "no_person_threshold",
        }
    }

    fn range(&self) -> (i64, i64) {
        match self {
            SettingsField::StartHour | SettingsField::EndHour => (0, 23),
            SettingsField::InactivityThreshold | SettingsField::NoPersonThreshold => {
                (1, i64::from(u32::MAX))
            }
        }
    }

    fn check(&self, value: i64) -> Result<u32> {
        let (min, max) = self.range();
        if !(min..=max).contains(&value) {
            return Err(SettingsError::OutOfRange {
                field: *self,
                value,
                min,
                max,
            });
        }
        u32::try_from(value).map_err(|_| SettingsError::OutOfRange {
            field: *self,
            value,
            min,
            max,
        })
    }

    /// Parse a raw value typed by the operator.
    pub fn parse_value(&self, raw: &str) -> Result<i64> {
        raw.trim()
            .parse::<i64>()
            .map_err(|_| SettingsError::NotANumber {
                field: *self,
                raw: raw.to_string(),
            })
    }
}

impl fmt::Display for SettingsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingsField {
    type Err = SettingsError;

    /// Accepts the wire name or a short alias (`start`, `end`, `inactivity`, `no-person`).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monitoring_start_hour" | "start" => Ok(SettingsField::StartHour),
            "monitoring_end_hour" | "end" => Ok(SettingsField::EndHour),
            "inactivity_threshold" | "inactivity" => Ok(SettingsField::InactivityThreshold),
            "no_person_threshold" | "no-person" | "noperson" => {
                Ok(SettingsField::NoPersonThreshold)
            }
            other => Err(SettingsError::UnknownField(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_defaults() {
        let settings = MonitoringSettings::default();
        assert_eq!(settings.monitoring_start_hour, 6);
        assert_eq!(settings.monitoring_end_hour, 7);
        assert_eq!(settings.inactivity_threshold, 10);
        assert_eq!(settings.no_person_threshold, 5);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn serialises_with_wire_names() {
        let json = serde_json::to_value(MonitoringSettings::default()).unwrap();
        assert_eq!(json["monitoring_start_hour"], 6);
        assert_eq!(json["monitoring_end_hour"], 7);
        assert_eq!(json["inactivity_threshold"], 10);
        assert_eq!(json["no_person_threshold"], 5);
    }

    #[test]
    fn set_rejects_out_of_range_hours() {
        let mut settings = MonitoringSettings::default();
        let err = settings.set(SettingsField::StartHour, 24).unwrap_err();
        assert!(matches!(err, SettingsError::OutOfRange { value: 24, .. }));
        assert_eq!(settings.monitoring_start_hour, 6);

        settings.set(SettingsField::EndHour, 23).unwrap();
        assert_eq!(settings.monitoring_end_hour, 23);
    }

    #[test]
    fn thresholds_must_be_positive() {
        let mut settings = MonitoringSettings::default();
        assert!(settings.set(SettingsField::NoPersonThreshold, 0).is_err());
        assert!(settings.set(SettingsField::InactivityThreshold, -3).is_err());
        settings.set(SettingsField::InactivityThreshold, 120).unwrap();
        assert_eq!(settings.inactivity_threshold, 120);
    }

    #[test]
    fn validate_catches_bad_loaded_values() {
        let settings: MonitoringSettings = serde_json::from_str(
            r#"{"monitoring_start_hour":30,"monitoring_end_hour":7,"inactivity_threshold":10,"no_person_threshold":5}"#,
        )
        .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn field_names_and_aliases_parse() {
        assert_eq!("start".parse::<SettingsField>().unwrap(), SettingsField::StartHour);
        assert_eq!(
            "no_person_threshold".parse::<SettingsField>().unwrap(),
            SettingsField::NoPersonThreshold
        );
        assert!(matches!(
            "bogus".parse::<SettingsField>(),
            Err(SettingsError::UnknownField(_))
        ));
        assert!(SettingsField::EndHour.parse_value("seven").is_err());
        assert_eq!(SettingsField::EndHour.parse_value(" 8 ").unwrap(), 8);
    }

    #[test]
    fn display_summarises_settings() {
        let text = MonitoringSettings::default().to_string();
        assert_eq!(
            text,
            "Monitoring Time: 6:00 - 7:00\nInactivity Alert: 10 seconds\nNo Person Alert: 5 seconds"
        );
    }
}
