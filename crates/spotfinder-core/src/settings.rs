use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::llm::LlmOverrides;
use crate::model::SpotCategory;

const DEFAULT_RECREATION_URL: &str = "https://goboardapi.azurewebsites.net/api/FacilityCount/GetCountsByAccount?AccountAPIKey=99563b55-ae4f-4001-b384-648e0ebeaeb5";
const DEFAULT_LIBRARY_URL: &str = "https://php.library.tamu.edu/utilities/occupancy/index.php";
const DEFAULT_EVENTS_URL: &str = "https://calendar.tamu.edu/live/json/events?user_tz=America/Chicago&group=*%20Main%20University%20Calendar";

/// Upstream feed locations and fetch behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub recreation_url: String,
    pub library_url: String,
    pub events_url: String,
    /// Per-request budget, humantime syntax (`"10s"`, `"1500ms"`).
    pub fetch_timeout: String,
    pub events_limit: usize,
    /// Offset applied when rendering event times for display.
    pub utc_offset_minutes: i32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            recreation_url: DEFAULT_RECREATION_URL.to_string(),
            library_url: DEFAULT_LIBRARY_URL.to_string(),
            events_url: DEFAULT_EVENTS_URL.to_string(),
            fetch_timeout: "10s".to_string(),
            events_limit: 20,
            utc_offset_minutes: -360,
        }
    }
}

impl SourceSettings {
    pub fn fetch_timeout(&self) -> Result<Duration, SettingsError> {
        humantime::parse_duration(self.fetch_timeout.trim()).map_err(|err| {
            SettingsError::InvalidDuration {
                field: "sources.fetch_timeout",
                value: self.fetch_timeout.clone(),
                reason: err.to_string(),
            }
        })
    }

    pub fn display_offset(&self) -> Result<FixedOffset, SettingsError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or(SettingsError::InvalidOffset {
            minutes: self.utc_offset_minutes,
        })
    }
}

/// How many entries the best-spot rankings return by default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingSettings {
    pub study_limit: usize,
    pub workout_limit: usize,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            study_limit: SpotCategory::Study.default_limit(),
            workout_limit: SpotCategory::Workout.default_limit(),
        }
    }
}

/// Top-level settings assembled from an optional file plus `SPOTFINDER__*`
/// environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub sources: SourceSettings,
    pub ranking: RankingSettings,
    pub llm: LlmOverrides,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("`{field}` is not a valid duration (got `{value}`): {reason}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("utc offset of {minutes} minutes is out of range")]
    InvalidOffset { minutes: i32 },
    #[error("`{field}` must be greater than zero")]
    ZeroLimit { field: &'static str },
}

impl AppSettings {
    const ENV_PREFIX: &'static str = "SPOTFINDER";

    /// Load settings, layering the optional file under environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings: AppSettings = builder
            .add_source(
                Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("failed to assemble configuration sources")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.sources.fetch_timeout()?;
        self.sources.display_offset()?;
        if self.ranking.study_limit == 0 {
            return Err(SettingsError::ZeroLimit {
                field: "ranking.study_limit",
            });
        }
        if self.ranking.workout_limit == 0 {
            return Err(SettingsError::ZeroLimit {
                field: "ranking.workout_limit",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_validate() {
        let settings = AppSettings::default();
        settings.validate().expect("defaults should be valid");
        assert_eq!(
            settings.sources.fetch_timeout().unwrap(),
            Duration::from_secs(10)
        );
        assert_eq!(settings.sources.events_limit, 20);
        assert_eq!(settings.ranking.study_limit, 3);
        assert_eq!(settings.ranking.workout_limit, 5);
    }

    #[test]
    fn loads_partial_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spotfinder.toml");
        fs::write(
            &path,
            r#"
[sources]
library_url = "file:///tmp/library.json"
fetch_timeout = "1500ms"

[ranking]
workout_limit = 2

[llm]
provider = "noop"
model = "config-model"
"#,
        )
        .unwrap();

        let settings = AppSettings::load(Some(&path)).expect("config should load");
        assert_eq!(settings.sources.library_url, "file:///tmp/library.json");
        assert_eq!(settings.sources.recreation_url, DEFAULT_RECREATION_URL);
        assert_eq!(
            settings.sources.fetch_timeout().unwrap(),
            Duration::from_millis(1500)
        );
        assert_eq!(settings.ranking.workout_limit, 2);
        assert_eq!(settings.ranking.study_limit, 3);
        assert_eq!(settings.llm.model.as_deref(), Some("config-model"));
    }

    #[test]
    fn rejects_bad_duration() {
        let mut settings = AppSettings::default();
        settings.sources.fetch_timeout = "soonish".into();
        let err = settings.validate().expect_err("duration should be rejected");
        assert!(matches!(err, SettingsError::InvalidDuration { .. }));
    }

    #[test]
    fn rejects_zero_limits() {
        let mut settings = AppSettings::default();
        settings.ranking.study_limit = 0;
        assert_eq!(
            settings.validate(),
            Err(SettingsError::ZeroLimit {
                field: "ranking.study_limit"
            })
        );
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let mut settings = AppSettings::default();
        settings.sources.utc_offset_minutes = 24 * 60;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidOffset { .. })
        ));
    }
}
