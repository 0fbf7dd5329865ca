//! Raw scan files and their conversion to test-run records.
//!
//! An IV scan is written as CSV with one row per voltage step:
//!
//! ```text
//! timestamp,voltage,current,current_err,rel_humidity,chuck_temp
//! 1709287200.0,0.0,-1.2e-8,3.0e-10,35.2,20.1
//! ```
//!
//! Voltages and currents are raw instrument values (V, A, negative for reverse bias). The
//! converter produces the database format: magnitudes, currents in µA, time relative to
//! the first point.

use crate::acquisition::ScanPoint;
use crate::config::ConversionConfig;
use crate::error::{AppResult, IvError};
use crate::record::{IvArray, TestResults, TestRunRecord};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

/// Read a raw scan CSV.
pub fn read_scan_csv(path: impl AsRef<Path>) -> AppResult<Vec<ScanPoint>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let points = reader
        .deserialize()
        .collect::<Result<Vec<ScanPoint>, csv::Error>>()?;
    debug!(path = %path.as_ref().display(), points = points.len(), "Read raw scan");
    Ok(points)
}

/// Write a raw scan CSV.
pub fn write_scan_csv(path: impl AsRef<Path>, points: &[ScanPoint]) -> AppResult<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for point in points {
        writer.serialize(point)?;
    }
    writer.flush()?;
    info!(path = %path.as_ref().display(), points = points.len(), "Wrote raw scan");
    Ok(())
}

/// Build a test-run record from raw scan points.
///
/// The record is marked not passed until it has been analysed.
pub fn scan_to_record(
    points: &[ScanPoint],
    serial: &str,
    depletion_voltage: Option<f64>,
    config: &ConversionConfig,
) -> AppResult<TestRunRecord> {
    let first = points.first().ok_or(IvError::EmptySweep)?;
    let start = first.timestamp;

    let mut properties = Map::new();
    properties.insert("HUM".to_string(), Value::String(first.rel_humidity.to_string()));
    properties.insert("TEMP".to_string(), Value::String(first.chuck_temp.to_string()));

    let iv_array = IvArray {
        time: points.iter().map(|p| p.timestamp - start).collect(),
        voltage: points.iter().map(|p| p.voltage.abs()).collect(),
        current: points.iter().map(|p| p.current.abs() * 1e6).collect(),
        sigma_current: points.iter().map(|p| p.current_err.abs() * 1e6).collect(),
        temperature: points.iter().map(|p| p.chuck_temp).collect(),
        humidity: points.iter().map(|p| p.rel_humidity).collect(),
    };

    Ok(TestRunRecord {
        component: serial.trim().to_string(),
        test_type: config.test_type.clone(),
        institution: Some(config.institution.clone()),
        date: format_date(start)?,
        run_number: config.run_number.clone(),
        passed: false,
        problems: false,
        prefix: None,
        depletion_voltage,
        properties,
        results: TestResults {
            iv_array,
            breakdown_voltage: 0.0,
            leak_current: 0.0,
            maximum_voltage: None,
            no_breakdown_voltage_observed: None,
            extra: Map::new(),
        },
    })
}

/// Convert a raw scan CSV into a record file.
///
/// Without an explicit output path the record is written next to the input with a
/// `.json` extension. Returns the output path.
pub fn convert_scan_file(
    input: &Path,
    output: Option<&Path>,
    serial: &str,
    depletion_voltage: Option<f64>,
    config: &ConversionConfig,
) -> AppResult<PathBuf> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension("json"));
    info!(input = %input.display(), output = %output.display(), "Converting raw scan");

    let points = read_scan_csv(input)?;
    let record = scan_to_record(&points, serial, depletion_voltage, config)?;
    record.save(&output)?;
    Ok(output)
}

fn format_date(timestamp: f64) -> AppResult<String> {
    let out_of_range =
        || IvError::InvalidRecord(format!("scan timestamp {timestamp} is out of range"));
    if !timestamp.is_finite() {
        return Err(out_of_range());
    }
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(timestamp: f64, voltage: f64, current: f64) -> ScanPoint {
        ScanPoint {
            timestamp,
            voltage,
            current,
            current_err: -1e-9,
            rel_humidity: 30.0,
            chuck_temp: 21.5,
        }
    }

    #[test]
    fn test_scan_to_record_converts_units() {
        let points = vec![
            point(1_709_287_200.0, 0.0, -1e-7),
            point(1_709_287_205.5, -5.0, -2e-7),
        ];
        let record =
            scan_to_record(&points, " 20UPGS81100001 ", Some(20.0), &ConversionConfig::default())
                .unwrap();

        let iv = &record.results.iv_array;
        assert_eq!(iv.time, vec![0.0, 5.5]);
        assert_eq!(iv.voltage, vec![0.0, 5.0]);
        assert!((iv.current[1] - 0.2).abs() < 1e-9);
        assert!((iv.sigma_current[0] - 0.001).abs() < 1e-12);
        assert_eq!(record.component, "20UPGS81100001");
        assert_eq!(record.date, "2024-03-01T10:00Z");
        assert_eq!(record.properties["TEMP"], Value::String("21.5".to_string()));
        assert_eq!(record.prefix, None);
        assert!(!record.passed);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_empty_scan_rejected() {
        let err = scan_to_record(&[], "20UPGS81100001", None, &ConversionConfig::default())
            .unwrap_err();
        assert!(matches!(err, IvError::EmptySweep));
    }

    #[test]
    fn test_out_of_range_timestamp_rejected() {
        for timestamp in [1e20, f64::NAN] {
            let points = vec![point(timestamp, 0.0, -1e-7)];
            let err = scan_to_record(&points, "20UPGS81100001", None, &ConversionConfig::default())
                .unwrap_err();
            assert!(matches!(err, IvError::InvalidRecord(_)));
        }
    }

    #[test]
    fn test_missing_environment_columns_default_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.csv");
        std::fs::write(
            &path,
            "timestamp,voltage,current,current_err\n100.0,0.0,-1e-8,0.0\n104.0,-5.0,-2e-8,0.0\n",
        )
        .unwrap();

        let points = read_scan_csv(&path).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].rel_humidity, 0.0);
        assert_eq!(points[1].chuck_temp, 0.0);
    }
}
