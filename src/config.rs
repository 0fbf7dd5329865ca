//! Configuration using Figment
//!
//! Strongly-typed configuration for the `ivqc` tool. Configuration is loaded from:
//! 1. `config/ivqc.toml` (or an explicit path); a missing file yields the defaults
//! 2. Environment variables prefixed with `IVQC_`, nested keys separated by `__`
//!
//! # Example
//! ```no_run
//! use ivqc::config::IvConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IvConfig::load()?;
//! println!("Institution: {}", config.conversion.institution);
//! # Ok(())
//! # }
//! ```

use crate::error::{AppResult, IvError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/ivqc.toml";

/// Smallest accepted scan or ramp step magnitude, V.
pub const MIN_STEP_VOLTAGE: f64 = 0.1;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IvConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Analysis settings
    pub analysis: AnalysisConfig,
    /// Raw scan to record conversion settings
    pub conversion: ConversionConfig,
    /// IV scan settings
    pub scan: ScanConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "ivqc".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Analysis configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Sensor area in cm² for serial numbers the area table does not cover
    pub area_overrides: BTreeMap<String, f64>,
}

impl AnalysisConfig {
    /// Configured area override for `serial`, if any.
    pub fn area_for(&self, serial: &str) -> Option<f64> {
        self.area_overrides.get(serial.trim()).copied()
    }
}

/// Settings used when turning a raw scan into a test-run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Institution short code
    pub institution: String,
    /// Production database test type
    pub test_type: String,
    /// Run number stored with the record
    pub run_number: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            institution: "BONN".to_string(),
            test_type: "IV_MEASURE".to_string(),
            run_number: "1".to_string(),
        }
    }
}

/// IV scan settings. Voltages are negative (reverse bias), currents in A.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// First voltage step
    pub start_voltage: f64,
    /// Last voltage step (inclusive when reached exactly)
    pub stop_voltage: f64,
    /// Step size, same sign as `stop_voltage - start_voltage`
    pub step_voltage: f64,
    /// The scan aborts once a current magnitude exceeds this
    pub max_leakage: f64,
    /// Safety limit; steps beyond this magnitude are not applied
    pub max_voltage: f64,
    /// Source-meter compliance current
    pub current_limit: f64,
    /// Settling time after each voltage step
    pub wait_settle_secs: f64,
    /// Delay between current readings
    pub wait_meas_secs: f64,
    /// Current readings averaged per step
    pub n_meas: usize,
    /// Voltage to ramp back to after the scan; `None` leaves the bias where it is
    pub bias_voltage: Option<f64>,
    /// Step size of the ramp back
    pub ramp_step: f64,
    /// Delay between ramp steps
    pub ramp_wait_secs: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start_voltage: 0.0,
            stop_voltage: -150.0,
            step_voltage: -5.0,
            max_leakage: 99e-6,
            max_voltage: -155.0,
            current_limit: 100e-6,
            wait_settle_secs: 4.0,
            wait_meas_secs: 0.5,
            n_meas: 10,
            bias_voltage: Some(-5.0),
            ramp_step: 5.0,
            ramp_wait_secs: 1.0,
        }
    }
}

impl ScanConfig {
    /// Voltage steps from start to stop.
    pub fn voltages(&self) -> Vec<f64> {
        if self.step_voltage == 0.0 {
            return vec![self.start_voltage];
        }
        let span = self.stop_voltage - self.start_voltage;
        let steps = (span / self.step_voltage + 1e-9).floor();
        if steps < 0.0 {
            return vec![self.start_voltage];
        }
        (0..=steps as usize)
            .map(|i| self.start_voltage + i as f64 * self.step_voltage)
            .collect()
    }

    /// Validate the scan settings.
    pub fn validate(&self) -> AppResult<()> {
        if self.start_voltage > 0.0 || self.stop_voltage > 0.0 {
            return Err(IvError::Settings(
                "Scan voltages must not be positive (reverse bias)".to_string(),
            ));
        }
        if self.step_voltage >= 0.0 && self.stop_voltage < self.start_voltage {
            return Err(IvError::Settings(format!(
                "step_voltage {} does not move from {} V towards {} V",
                self.step_voltage, self.start_voltage, self.stop_voltage
            )));
        }
        let step = self.step_voltage.abs();
        if self.stop_voltage != self.start_voltage && (step.is_nan() || step < MIN_STEP_VOLTAGE) {
            return Err(IvError::Settings(format!(
                "step_voltage {} V is smaller than {MIN_STEP_VOLTAGE} V",
                self.step_voltage
            )));
        }
        if self.n_meas == 0 {
            return Err(IvError::Settings("n_meas must be at least 1".to_string()));
        }
        if self.max_leakage <= 0.0 || self.current_limit <= 0.0 {
            return Err(IvError::Settings(
                "max_leakage and current_limit must be positive".to_string(),
            ));
        }
        if self.wait_settle_secs < 0.0 || self.wait_meas_secs < 0.0 || self.ramp_wait_secs < 0.0 {
            return Err(IvError::Settings("Wait times cannot be negative".to_string()));
        }
        if let Some(bias) = self.bias_voltage {
            if bias > 0.0 {
                return Err(IvError::Settings(
                    "bias_voltage must not be positive".to_string(),
                ));
            }
            if bias < self.stop_voltage {
                return Err(IvError::Settings(format!(
                    "bias_voltage {} V lies beyond the last scanned voltage {} V",
                    bias, self.stop_voltage
                )));
            }
            if self.ramp_step.is_nan() || self.ramp_step < MIN_STEP_VOLTAGE {
                return Err(IvError::Settings(format!(
                    "ramp_step must be at least {MIN_STEP_VOLTAGE} V"
                )));
            }
        }
        Ok(())
    }
}

impl IvConfig {
    /// Load configuration from `config/ivqc.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `IVQC_`.
    /// Example: `IVQC_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(IvConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("IVQC_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| IvError::Settings(e.to_string()))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(IvError::Settings(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(IvError::Settings(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        for (serial, area) in &self.analysis.area_overrides {
            if !area.is_finite() || *area <= 0.0 {
                return Err(IvError::Settings(format!(
                    "Area override for '{}' must be positive, got {}",
                    serial, area
                )));
            }
        }

        if self.conversion.institution.trim().is_empty() {
            return Err(IvError::Settings("institution cannot be empty".to_string()));
        }

        self.scan.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IvConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.conversion.test_type, "IV_MEASURE");
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = IvConfig::default();
        config.application.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = IvConfig::default();
        config.application.log_format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_area_override_rejected() {
        let mut config = IvConfig::default();
        config
            .analysis
            .area_overrides
            .insert("20UPGST0100001".to_string(), -1.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("20UPGST0100001"));
    }

    #[test]
    fn test_positive_scan_voltage_rejected() {
        let mut config = IvConfig::default();
        config.scan.stop_voltage = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bias_beyond_scan_rejected() {
        let mut config = IvConfig::default();
        config.scan.bias_voltage = Some(-200.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tiny_steps_rejected() {
        let mut config = IvConfig::default();
        config.scan.step_voltage = -1e-9;
        assert!(matches!(config.validate(), Err(IvError::Settings(_))));

        let mut config = IvConfig::default();
        config.scan.ramp_step = 1e-9;
        assert!(matches!(config.validate(), Err(IvError::Settings(_))));

        let mut config = IvConfig::default();
        config.scan.step_voltage = -MIN_STEP_VOLTAGE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_voltage_steps() {
        let voltages = ScanConfig::default().voltages();
        assert_eq!(voltages.len(), 31);
        assert_eq!(voltages[0], 0.0);
        assert_eq!(voltages[1], -5.0);
        assert_eq!(voltages[30], -150.0);
    }

    #[test]
    fn test_area_override_lookup_trims() {
        let mut config = AnalysisConfig::default();
        config
            .area_overrides
            .insert("20UPGST0100001".to_string(), 0.5);
        assert_eq!(config.area_for(" 20UPGST0100001 "), Some(0.5));
        assert_eq!(config.area_for("20UPGS81100001"), None);
    }
}
