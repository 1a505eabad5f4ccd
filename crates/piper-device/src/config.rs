//! Device configuration.
//!
//! Settings are loaded in layers, each overriding the previous one:
//!
//! 1. Defaults from [`DeviceSettings::default`]
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `PIPER_` (nested keys use `__`)
//!
//! ```toml
//! instance_id = "Piper"
//! save_to = "/data/scratch/frames"
//! tick_interval_ms = 100
//! rate_refresh_interval_s = 1.0
//! pattern_size = 512
//! channel_capacity = 16
//! log_level = "info"
//! ```
//!
//! Only `save_to` may change after the device starts; see
//! [`PiperDevice::set_save_to`](crate::PiperDevice::set_save_to).

use anyhow::{Context, Result};
use figment::{providers::Serialized, Figment, Provider};
use piper_core::error::{AppResult, PiperError};
use piper_core::limits::{PATTERN_SIZE, RATE_REFRESH_INTERVAL, TICK_INTERVAL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory frames are saved to unless configured otherwise.
pub const DEFAULT_SAVE_TO: &str =
    "/gpfs/exfel/data/scratch/danilevc/lpd_data_to_validate/Q2M1_cell_8_relgain_only";

/// Longest accepted throughput refresh window, in seconds (one day).
const MAX_RATE_REFRESH_S: f64 = 86_400.0;

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Runtime settings of the simulated detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Identifier placed in each primary frame's passport.
    pub instance_id: String,

    /// Directory inbound frames are saved to. Created on demand.
    pub save_to: PathBuf,

    /// Producer tick period in milliseconds (1 - 60000).
    pub tick_interval_ms: u64,

    /// Throughput refresh window in seconds (0 - 86400, exclusive of 0).
    pub rate_refresh_interval_s: f64,

    /// Edge length of the square pattern images (1 - 4096).
    pub pattern_size: usize,

    /// Capacity of the output broadcast channels and the input queue.
    pub channel_capacity: usize,

    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            instance_id: "Piper".to_string(),
            save_to: PathBuf::from(DEFAULT_SAVE_TO),
            tick_interval_ms: TICK_INTERVAL.as_millis() as u64,
            rate_refresh_interval_s: RATE_REFRESH_INTERVAL.as_secs_f64(),
            pattern_size: PATTERN_SIZE,
            channel_capacity: 16,
            log_level: "info".to_string(),
        }
    }
}

impl Provider for DeviceSettings {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("Device Defaults")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(DeviceSettings::default()).data()
    }
}

impl DeviceSettings {
    /// Load settings from defaults, an optional TOML file and `PIPER_*`
    /// environment variables, then validate them.
    ///
    /// A missing file is not an error; the defaults are used and a warning is
    /// logged.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        use figment::providers::{Env, Format, Toml};

        let mut figment = Figment::from(DeviceSettings::default());

        if let Some(path) = config_path {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            } else {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            }
        }

        figment = figment.merge(Env::prefixed("PIPER_").split("__"));

        let settings: DeviceSettings = figment
            .extract()
            .context("Failed to extract configuration from Figment")?;

        settings
            .validate()
            .context("Configuration validation failed")?;

        Ok(settings)
    }

    /// Check semantic constraints on every field.
    pub fn validate(&self) -> AppResult<()> {
        if self.instance_id.trim().is_empty() {
            return Err(invalid("instance_id cannot be empty"));
        }
        validate_save_to(&self.save_to)?;
        if !(1..=60_000).contains(&self.tick_interval_ms) {
            return Err(invalid(format!(
                "tick_interval_ms = {} is out of valid range (1 - 60000)",
                self.tick_interval_ms
            )));
        }
        let window = self.rate_refresh_interval_s;
        if window.is_nan() || window <= 0.0 || window > MAX_RATE_REFRESH_S {
            return Err(invalid(format!(
                "rate_refresh_interval_s = {} is out of valid range (0 - 86400]",
                window
            )));
        }
        if !(1..=4096).contains(&self.pattern_size) {
            return Err(invalid(format!(
                "pattern_size = {} is out of valid range (1 - 4096)",
                self.pattern_size
            )));
        }
        if !(1..=65_536).contains(&self.channel_capacity) {
            return Err(invalid(format!(
                "channel_capacity = {} is out of valid range (1 - 65536)",
                self.channel_capacity
            )));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(invalid(format!("Invalid log level: {}", self.log_level)));
        }
        Ok(())
    }

    /// Producer tick period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Throughput refresh window.
    ///
    /// Fails for values `validate` would reject instead of panicking.
    pub fn rate_refresh_interval(&self) -> AppResult<Duration> {
        Duration::try_from_secs_f64(self.rate_refresh_interval_s).map_err(|e| {
            invalid(format!(
                "rate_refresh_interval_s = {}: {}",
                self.rate_refresh_interval_s, e
            ))
        })
    }
}

/// Reject save directories that cannot name a location.
pub fn validate_save_to(path: &Path) -> AppResult<()> {
    if path.as_os_str().is_empty() {
        return Err(invalid("save_to cannot be empty"));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> PiperError {
    PiperError::Configuration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = DeviceSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.tick_interval(), Duration::from_millis(100));
        assert_eq!(settings.rate_refresh_interval().unwrap(), Duration::from_secs(1));
        assert_eq!(settings.save_to, PathBuf::from(DEFAULT_SAVE_TO));
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let settings = DeviceSettings::load(Some(Path::new("config/nonexistent.toml"))).unwrap();
        assert_eq!(settings.instance_id, "Piper");
        assert_eq!(settings.pattern_size, 512);
    }

    #[test]
    fn load_merges_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            instance_id = "SPB_DET/PIPER/1"
            save_to = "/tmp/piper-frames"
            tick_interval_ms = 50
            "#
        )
        .unwrap();

        let settings = DeviceSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.instance_id, "SPB_DET/PIPER/1");
        assert_eq!(settings.save_to, PathBuf::from("/tmp/piper-frames"));
        assert_eq!(settings.tick_interval_ms, 50);
        // Unset keys keep their defaults.
        assert_eq!(settings.channel_capacity, 16);
    }

    #[test]
    fn shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/piper.toml");
        let settings = DeviceSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.save_to, PathBuf::from("/tmp/piper/frames"));
    }

    #[test]
    fn load_rejects_invalid_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tick_interval_ms = 0").unwrap();
        assert!(DeviceSettings::load(Some(file.path())).is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let cases: Vec<Box<dyn Fn(&mut DeviceSettings)>> = vec![
            Box::new(|s| s.instance_id = " ".into()),
            Box::new(|s| s.save_to = PathBuf::new()),
            Box::new(|s| s.tick_interval_ms = 60_001),
            Box::new(|s| s.rate_refresh_interval_s = 0.0),
            Box::new(|s| s.rate_refresh_interval_s = f64::NAN),
            Box::new(|s| s.rate_refresh_interval_s = f64::INFINITY),
            Box::new(|s| s.rate_refresh_interval_s = 86_400.5),
            Box::new(|s| s.rate_refresh_interval_s = 1e20),
            Box::new(|s| s.pattern_size = 0),
            Box::new(|s| s.channel_capacity = 0),
            Box::new(|s| s.log_level = "verbose".into()),
        ];

        for mutate in cases {
            let mut settings = DeviceSettings::default();
            mutate(&mut settings);
            assert!(
                matches!(settings.validate(), Err(PiperError::Configuration(_))),
                "accepted {:?}",
                settings
            );
        }
    }

    #[test]
    fn refresh_window_accepts_the_upper_bound() {
        let settings = DeviceSettings {
            rate_refresh_interval_s: 86_400.0,
            ..DeviceSettings::default()
        };
        assert!(settings.validate().is_ok());
        assert_eq!(
            settings.rate_refresh_interval().unwrap(),
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn oversized_refresh_window_is_an_error_not_a_panic() {
        let settings = DeviceSettings {
            rate_refresh_interval_s: 1e20,
            ..DeviceSettings::default()
        };
        assert!(matches!(
            settings.rate_refresh_interval(),
            Err(PiperError::Configuration(_))
        ));
    }
}
