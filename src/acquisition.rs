//! IV scan procedure.
//!
//! Steps a source-measure unit through reverse-bias voltages, averaging several current
//! readings per step and recording the ambient conditions next to each point. The scan
//! stops early when the safety voltage would be exceeded or when a single reading exceeds
//! the leakage limit. Afterwards the bias is ramped back to the configured resting
//! voltage and the output switched off.

use crate::config::ScanConfig;
use crate::error::{AppResult, IvError};
use crate::hardware::{Hygrometer, SourceMeter};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// One stored voltage step, in raw instrument units (V, A).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    /// Unix time in seconds
    pub timestamp: f64,
    /// Applied voltage
    pub voltage: f64,
    /// Mean of the accepted readings
    pub current: f64,
    /// Standard deviation of all readings
    pub current_err: f64,
    /// Relative humidity in %
    #[serde(default)]
    pub rel_humidity: f64,
    /// Chuck temperature in °C
    #[serde(default)]
    pub chuck_temp: f64,
}

/// Result of a completed or aborted scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    /// Stored steps in scan order.
    pub points: Vec<ScanPoint>,
    /// The leakage limit was exceeded and the scan stopped.
    pub aborted_on_compliance: bool,
    /// Last voltage applied before the ramp back.
    pub last_voltage: f64,
}

/// A configured IV scan.
#[derive(Debug, Clone)]
pub struct IvScan {
    config: ScanConfig,
}

impl IvScan {
    /// Validates the settings.
    pub fn new(config: ScanConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Scan settings.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run the scan.
    ///
    /// The output is switched off on instrument errors, during the sweep or the ramp down,
    /// even when no resting voltage is configured.
    #[instrument(level = "info", skip_all)]
    pub async fn run<S, H>(&self, smu: &S, hygrometer: &H) -> AppResult<ScanOutcome>
    where
        S: SourceMeter + ?Sized,
        H: Hygrometer + ?Sized,
    {
        let result = async {
            let outcome = self.sweep(smu, hygrometer).await?;
            self.ramp_down(smu, outcome.last_voltage).await?;
            Ok::<_, IvError>(outcome)
        }
        .await;

        if let Err(e) = &result {
            error!(error = %e, "IV scan failed, switching output off");
            if let Err(off) = smu.output_off().await {
                warn!(error = %off, "Could not switch output off");
            }
        }
        result
    }

    async fn sweep<S, H>(&self, smu: &S, hygrometer: &H) -> AppResult<ScanOutcome>
    where
        S: SourceMeter + ?Sized,
        H: Hygrometer + ?Sized,
    {
        let cfg = &self.config;
        smu.set_current_limit(cfg.current_limit)
            .await
            .map_err(instrument_error)?;
        smu.set_voltage(0.0).await.map_err(instrument_error)?;
        smu.output_on().await.map_err(instrument_error)?;

        let mut outcome = ScanOutcome {
            points: Vec::new(),
            aborted_on_compliance: false,
            last_voltage: 0.0,
        };

        for voltage in cfg.voltages() {
            if voltage.abs() > cfg.max_voltage.abs() {
                info!(voltage, "Maximum voltage reached, stopping scan");
                break;
            }
            info!(voltage, "Setting voltage");
            smu.set_voltage(voltage).await.map_err(instrument_error)?;
            outcome.last_voltage = voltage;
            pause(cfg.wait_settle_secs).await;

            let rel_humidity = hygrometer.get_humidity().await.map_err(instrument_error)?;
            let chuck_temp = hygrometer
                .get_temperature()
                .await
                .map_err(instrument_error)?;

            let first = match smu.get_current().await {
                Ok(current) => current,
                Err(e) => {
                    warn!(voltage, error = %e, "Could not measure current, skipping this voltage step");
                    continue;
                }
            };

            if first.abs() > cfg.max_leakage.abs() {
                error!(voltage, current = first, "Maximum current reached, stopping scan");
                outcome.points.push(ScanPoint {
                    timestamp: now(),
                    voltage,
                    current: first,
                    current_err: 0.0,
                    rel_humidity,
                    chuck_temp,
                });
                outcome.aborted_on_compliance = true;
                break;
            }

            let mut readings = Vec::with_capacity(cfg.n_meas);
            for _ in 0..cfg.n_meas {
                let current = smu.get_current().await.map_err(instrument_error)?;
                debug!(voltage, current, rel_humidity, chuck_temp, "Reading");
                readings.push(current);
                pause(cfg.wait_meas_secs).await;
            }

            outcome.points.push(ScanPoint {
                timestamp: now(),
                voltage,
                current: selected_mean(&readings),
                current_err: std_dev(&readings),
                rel_humidity,
                chuck_temp,
            });
        }

        info!(
            points = outcome.points.len(),
            aborted = outcome.aborted_on_compliance,
            "IV scan finished"
        );
        Ok(outcome)
    }

    async fn ramp_down<S: SourceMeter + ?Sized>(&self, smu: &S, from: f64) -> AppResult<()> {
        let Some(bias) = self.config.bias_voltage else {
            return Ok(());
        };
        info!(from, to = bias, "Ramping bias voltage down");
        for voltage in ramp_voltages(from, bias, self.config.ramp_step) {
            pause(self.config.ramp_wait_secs).await;
            smu.set_voltage(voltage).await.map_err(instrument_error)?;
        }
        smu.output_off().await.map_err(instrument_error)?;
        Ok(())
    }
}

/// Voltages from `from` towards `to` in `step` increments, never passing `to`.
pub fn ramp_voltages(from: f64, to: f64, step: f64) -> Vec<f64> {
    let step = step.abs();
    if step == 0.0 {
        return Vec::new();
    }
    let mut voltages = Vec::new();
    let mut voltage = from;
    while voltage <= to + 1e-9 {
        voltages.push(voltage);
        voltage += step;
    }
    voltages
}

/// Mean of the readings within a factor of two of the overall mean.
///
/// Falls back to the plain mean when no reading qualifies.
pub fn selected_mean(readings: &[f64]) -> f64 {
    let mean = plain_mean(readings);
    let selected: Vec<f64> = readings
        .iter()
        .copied()
        .filter(|r| {
            let ratio = r / mean;
            ratio > 0.5 && ratio < 2.0
        })
        .collect();
    if selected.is_empty() {
        mean
    } else {
        plain_mean(&selected)
    }
}

/// Population standard deviation.
pub fn std_dev(readings: &[f64]) -> f64 {
    if readings.is_empty() {
        return 0.0;
    }
    let mean = plain_mean(readings);
    let variance =
        readings.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / readings.len() as f64;
    variance.sqrt()
}

fn plain_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}

async fn pause(secs: f64) {
    let duration = Duration::try_from_secs_f64(secs).unwrap_or_default();
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

fn instrument_error(e: anyhow::Error) -> IvError {
    IvError::Instrument(format!("{e:#}"))
}
