//! Test-run records as exchanged with the production database.
//!
//! An IV test run is stored as a JSON document:
//!
//! ```json
//! {
//!   "component": "20UPGS81100001",
//!   "testType": "IV_MEASURE",
//!   "institution": "BONN",
//!   "date": "2024-03-01T10:15Z",
//!   "runNumber": "1",
//!   "passed": "true",
//!   "problems": "false",
//!   "depletion_voltage": 20,
//!   "properties": { "HUM": "0.0", "TEMP": "20.1" },
//!   "results": {
//!     "IV_ARRAY": { "time": [], "voltage": [], "current": [], "sigma current": [],
//!                   "temperature": [], "humidity": [] },
//!     "BREAKDOWN_VOLTAGE": 0.0,
//!     "LEAK_CURRENT": 0.0
//!   }
//! }
//! ```
//!
//! Converted files store booleans and numbers as strings, so those fields accept both.
//! Unknown keys in `results` are kept verbatim.

use crate::analysis::{AnalysisRequest, SweepResult};
use crate::error::{AppResult, IvError};
use crate::sweep::{CurrentUnit, Sweep, SweepColumns};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Placeholder value left in prototype files.
const PROTOTYPE_PLACEHOLDER: &str = "some_string";

/// One IV test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunRecord {
    /// Sensor serial number.
    pub component: String,
    /// Test type short code.
    #[serde(rename = "testType")]
    pub test_type: String,
    /// Institution short code.
    pub institution: Option<String>,
    /// Measurement date.
    #[serde(default)]
    pub date: String,
    /// Run number.
    #[serde(rename = "runNumber")]
    pub run_number: String,
    /// Overall verdict.
    #[serde(deserialize_with = "lenient_bool")]
    pub passed: bool,
    /// Problems flag.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub problems: bool,
    /// Current unit prefix; `"A"` means amperes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Declared depletion voltage in V.
    #[serde(
        default,
        deserialize_with = "lenient_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub depletion_voltage: Option<f64>,
    /// Free-form properties (`HUM`, `TEMP`, ...).
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Measurement arrays and derived values.
    pub results: TestResults,
}

/// The `results` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    /// Parallel measurement arrays.
    #[serde(rename = "IV_ARRAY")]
    pub iv_array: IvArray,
    /// Breakdown voltage (-999.0 for none).
    #[serde(rename = "BREAKDOWN_VOLTAGE", default)]
    pub breakdown_voltage: f64,
    /// Leakage current at the reference point, µA.
    #[serde(rename = "LEAK_CURRENT", default)]
    pub leak_current: f64,
    /// Largest voltage reached.
    #[serde(rename = "MAXIMUM_VOLTAGE", default, skip_serializing_if = "Option::is_none")]
    pub maximum_voltage: Option<f64>,
    /// No breakdown observed.
    #[serde(
        rename = "NO_BREAKDOWN_VOLTAGE_OBSERVED",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub no_breakdown_voltage_observed: Option<bool>,
    /// Any other result keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parallel arrays of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IvArray {
    /// Seconds since start.
    #[serde(default)]
    pub time: Vec<f64>,
    /// Voltages in V.
    pub voltage: Vec<f64>,
    /// Currents.
    pub current: Vec<f64>,
    /// Current standard deviations.
    #[serde(rename = "sigma current", alias = "sigma_current", default)]
    pub sigma_current: Vec<f64>,
    /// Temperatures in °C.
    #[serde(default)]
    pub temperature: Vec<f64>,
    /// Relative humidities in %.
    #[serde(default)]
    pub humidity: Vec<f64>,
}

/// Ambient conditions of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    /// Temperature in °C.
    pub temperature: Option<f64>,
    /// Relative humidity in %.
    pub humidity: Option<f64>,
}

impl TestRunRecord {
    /// Read a record from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let record: Self = serde_json::from_str(&text)?;
        debug!(path = %path.display(), component = %record.component, "Loaded test-run record");
        Ok(record)
    }

    /// Write the record as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> AppResult<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        info!(path = %path.display(), component = %self.component, "Saved test-run record");
        Ok(())
    }

    /// Checks the production database applies before accepting an upload.
    pub fn validate(&self) -> AppResult<()> {
        if self.component.trim().is_empty() {
            return Err(IvError::InvalidRecord(
                "Need reference to component, hex string".to_string(),
            ));
        }
        if self.test_type.trim().is_empty() {
            return Err(IvError::InvalidRecord(
                "Need to know test type, short code".to_string(),
            ));
        }
        if self
            .institution
            .as_deref()
            .map_or(true, |i| i.trim().is_empty())
        {
            return Err(IvError::InvalidRecord(
                "Need to know institution, short code".to_string(),
            ));
        }
        if self.run_number.trim().is_empty() {
            return Err(IvError::InvalidRecord("Need runNumber field (string)".to_string()));
        }
        for (key, value) in &self.properties {
            if value.as_str() == Some(PROTOTYPE_PLACEHOLDER) {
                return Err(IvError::InvalidRecord(format!(
                    "This looks like a prototype file, property: {key}"
                )));
            }
        }
        Ok(())
    }

    /// Unit of the stored currents.
    pub fn unit(&self) -> CurrentUnit {
        CurrentUnit::from_prefix(self.prefix.as_deref())
    }

    /// The stored samples as a validated sweep.
    pub fn sweep(&self) -> AppResult<Sweep> {
        let iv = &self.results.iv_array;
        Sweep::from_columns(SweepColumns {
            voltage: &iv.voltage,
            current: &iv.current,
            sigma_current: &iv.sigma_current,
            temperature: &iv.temperature,
            humidity: &iv.humidity,
            time: &iv.time,
        })
    }

    /// Analysis request for this record.
    ///
    /// `depletion_voltage` and `area` are explicit caller values; the depletion voltage
    /// falls back to the one stored in the record.
    pub fn analysis_request(
        &self,
        depletion_voltage: Option<f64>,
        area: Option<f64>,
    ) -> AnalysisRequest {
        AnalysisRequest {
            serial: self.component.clone(),
            depletion_voltage: depletion_voltage.or(self.depletion_voltage),
            unit: self.unit(),
            area_override: area,
        }
    }

    /// Temperature and humidity from the properties, else the array averages.
    pub fn environment(&self) -> Environment {
        let iv = &self.results.iv_array;
        Environment {
            temperature: property_f64(&self.properties, "TEMP").or_else(|| mean(&iv.temperature)),
            humidity: property_f64(&self.properties, "HUM").or_else(|| mean(&iv.humidity)),
        }
    }

    /// Merge an analysis result into the record.
    pub fn apply_result(&mut self, result: &SweepResult) {
        let fields = result.fields();
        self.passed = fields.passed;
        self.depletion_voltage = Some(result.depletion_voltage);
        self.results.breakdown_voltage = fields.breakdown_voltage.as_wire();
        self.results.leak_current = fields.leak_current;
        self.results.maximum_voltage = Some(fields.maximum_voltage);
        self.results.no_breakdown_voltage_observed = Some(fields.no_breakdown_voltage_observed);
    }
}

fn property_f64(properties: &Map<String, Value>, key: &str) -> Option<f64> {
    match properties.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(de::Error::custom(format!("expected boolean, got '{other}'"))),
        },
        other => Err(de::Error::custom(format!("expected boolean, got {other}"))),
    }
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected number, got '{s}'"))),
        other => Err(de::Error::custom(format!("expected number, got {other}"))),
    }
}
