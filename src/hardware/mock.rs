//! Mock Hardware Implementations
//!
//! Simulated instruments for running IV scans without a test bench.
//! All mock devices use async-safe state (tokio::sync::RwLock).
//!
//! # Available Mocks
//!
//! - `MockSourceMeter` - bias supply driving a deterministic diode model
//! - `MockHygrometer` - constant humidity and temperature
//!
//! Readings are noise-free so that scans are reproducible.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use crate::hardware::capabilities::{Hygrometer, SourceMeter};

// =============================================================================
// DiodeModel - reverse-biased sensor
// =============================================================================

/// Reverse current of a sensor as a function of bias.
///
/// Below breakdown the current grows linearly with |V| from `base_current`; above it
/// grows exponentially with a `breakdown_width` volt e-folding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiodeModel {
    /// Current at 0 V in A (magnitude).
    pub base_current: f64,
    /// Relative increase per volt below breakdown.
    pub slope_per_volt: f64,
    /// Breakdown voltage magnitude in V, if any.
    pub breakdown_voltage: Option<f64>,
    /// Exponential scale above breakdown in V.
    pub breakdown_width: f64,
}

impl Default for DiodeModel {
    fn default() -> Self {
        Self {
            base_current: 100e-9,
            slope_per_volt: 0.002,
            breakdown_voltage: None,
            breakdown_width: 5.0,
        }
    }
}

impl DiodeModel {
    /// Current in A for the applied voltage, signed like the voltage.
    pub fn current(&self, volts: f64) -> f64 {
        let magnitude = volts.abs();
        let mut current = self.base_current * (1.0 + self.slope_per_volt * magnitude);
        if let Some(breakdown) = self.breakdown_voltage {
            if magnitude > breakdown {
                current *= ((magnitude - breakdown) / self.breakdown_width).exp();
            }
        }
        if volts < 0.0 {
            -current
        } else {
            current
        }
    }
}

// =============================================================================
// MockSourceMeter
// =============================================================================

#[derive(Debug)]
struct SmuState {
    voltage: f64,
    output: bool,
    current_limit: f64,
    fail_next_read: bool,
    history: Vec<f64>,
    set_calls: usize,
}

/// Mock source-measure unit
///
/// Simulates:
/// - programmable voltage with an output relay
/// - compliance clamping at the current limit
/// - optional read failures on the first reading after selected set points
///
/// # Example
///
/// ```rust,ignore
/// let smu = MockSourceMeter::new(DiodeModel::default());
/// smu.output_on().await?;
/// smu.set_voltage(-50.0).await?;
/// let current = smu.get_current().await?;
/// ```
pub struct MockSourceMeter {
    model: DiodeModel,
    state: RwLock<SmuState>,
    failing_set_points: Vec<f64>,
    failing_set_call: Option<usize>,
    reads: AtomicU64,
}

impl MockSourceMeter {
    /// Create a mock at 0 V with output off
    pub fn new(model: DiodeModel) -> Self {
        Self {
            model,
            state: RwLock::new(SmuState {
                voltage: 0.0,
                output: false,
                current_limit: 1e-3,
                fail_next_read: false,
                history: Vec::new(),
                set_calls: 0,
            }),
            failing_set_points: Vec::new(),
            failing_set_call: None,
            reads: AtomicU64::new(0),
        }
    }

    /// The first current reading after programming any of `volts` fails.
    pub fn with_failing_set_points(mut self, volts: Vec<f64>) -> Self {
        self.failing_set_points = volts;
        self
    }

    /// The `call`-th `set_voltage` (counting from 1) fails and leaves the set point as is.
    pub fn with_failing_set_call(mut self, call: usize) -> Self {
        self.failing_set_call = Some(call);
        self
    }

    /// Every programmed voltage, in order.
    pub async fn voltage_history(&self) -> Vec<f64> {
        self.state.read().await.history.clone()
    }

    /// Whether the output is enabled.
    pub async fn is_output_on(&self) -> bool {
        self.state.read().await.output
    }

    /// Current set point.
    pub async fn voltage(&self) -> f64 {
        self.state.read().await.voltage
    }

    /// Number of current readings taken.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Default for MockSourceMeter {
    fn default() -> Self {
        Self::new(DiodeModel::default())
    }
}

#[async_trait]
impl SourceMeter for MockSourceMeter {
    async fn set_current_limit(&self, amps: f64) -> Result<()> {
        if amps <= 0.0 {
            return Err(anyhow!("MockSourceMeter: current limit must be positive"));
        }
        self.state.write().await.current_limit = amps;
        Ok(())
    }

    async fn set_voltage(&self, volts: f64) -> Result<()> {
        let mut state = self.state.write().await;
        state.set_calls += 1;
        if self.failing_set_call == Some(state.set_calls) {
            anyhow::bail!("MockSourceMeter: bus timeout setting {volts} V");
        }
        state.voltage = volts;
        state.history.push(volts);
        state.fail_next_read = self.failing_set_points.contains(&volts);
        debug!(volts, "MockSourceMeter: voltage set");
        Ok(())
    }

    async fn get_current(&self) -> Result<f64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;
        if state.fail_next_read {
            state.fail_next_read = false;
            anyhow::bail!("MockSourceMeter: read timeout at {} V", state.voltage);
        }
        if !state.output {
            return Ok(0.0);
        }
        let current = self.model.current(state.voltage);
        Ok(current.clamp(-state.current_limit, state.current_limit))
    }

    async fn output_on(&self) -> Result<()> {
        self.state.write().await.output = true;
        debug!("MockSourceMeter: output on");
        Ok(())
    }

    async fn output_off(&self) -> Result<()> {
        self.state.write().await.output = false;
        debug!("MockSourceMeter: output off");
        Ok(())
    }
}

// =============================================================================
// MockHygrometer
// =============================================================================

/// Mock thermo-hygrometer with fixed readings
pub struct MockHygrometer {
    humidity: f64,
    temperature: f64,
}

impl MockHygrometer {
    /// Create with fixed humidity (%) and temperature (°C)
    pub fn new(humidity: f64, temperature: f64) -> Self {
        Self {
            humidity,
            temperature,
        }
    }
}

impl Default for MockHygrometer {
    fn default() -> Self {
        Self::new(30.0, 20.0)
    }
}

#[async_trait]
impl Hygrometer for MockHygrometer {
    async fn get_humidity(&self) -> Result<f64> {
        Ok(self.humidity)
    }

    async fn get_temperature(&self) -> Result<f64> {
        Ok(self.temperature)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diode_model_sign_and_breakdown() {
        let model = DiodeModel {
            breakdown_voltage: Some(100.0),
            ..Default::default()
        };
        assert!(model.current(-50.0) < 0.0);
        assert!((model.current(-50.0).abs() - 110e-9).abs() < 1e-15);
        // one e-folding 5 V above breakdown
        let ratio = model.current(-105.0) / (model.base_current * (1.0 + 0.002 * 105.0));
        assert!((ratio - std::f64::consts::E).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_output_off_reads_zero() {
        let smu = MockSourceMeter::default();
        smu.set_voltage(-50.0).await.unwrap();
        assert_eq!(smu.get_current().await.unwrap(), 0.0);

        smu.output_on().await.unwrap();
        assert!(smu.get_current().await.unwrap() < 0.0);
        assert_eq!(smu.read_count(), 2);
    }

    #[tokio::test]
    async fn test_compliance_clamp() {
        let smu = MockSourceMeter::new(DiodeModel {
            breakdown_voltage: Some(10.0),
            ..Default::default()
        });
        smu.set_current_limit(1e-6).await.unwrap();
        smu.output_on().await.unwrap();
        smu.set_voltage(-200.0).await.unwrap();
        assert_eq!(smu.get_current().await.unwrap(), -1e-6);
        assert!(smu.set_current_limit(0.0).await.is_err());
    }

    #[tokio::test]
    async fn test_failing_set_point_fails_first_read_only() {
        let smu = MockSourceMeter::default().with_failing_set_points(vec![-10.0]);
        smu.output_on().await.unwrap();
        smu.set_voltage(-10.0).await.unwrap();
        assert!(smu.get_current().await.is_err());
        assert!(smu.get_current().await.is_ok());
        assert_eq!(smu.voltage_history().await, vec![-10.0]);
    }

    #[tokio::test]
    async fn test_failing_set_call_keeps_set_point() {
        let smu = MockSourceMeter::default().with_failing_set_call(2);
        smu.set_voltage(-5.0).await.unwrap();
        assert!(smu.set_voltage(-10.0).await.is_err());
        smu.set_voltage(-15.0).await.unwrap();
        assert_eq!(smu.voltage_history().await, vec![-5.0, -15.0]);
        assert_eq!(smu.voltage().await, -15.0);
    }

    #[tokio::test]
    async fn test_hygrometer_readings() {
        let hygro = MockHygrometer::new(42.0, 19.5);
        assert_eq!(hygro.get_humidity().await.unwrap(), 42.0);
        assert_eq!(hygro.get_temperature().await.unwrap(), 19.5);
    }
}
