//! Instrument Capabilities
//!
//! Fine-grained capability traits for the instruments an IV scan needs. Concrete drivers
//! (source-measure units, thermo-hygrometers) live outside this crate and implement these
//! traits; the scan procedure only sees the capabilities:
//!
//! - a source-measure unit implements [`SourceMeter`]
//! - a thermo-hygrometer implements [`Hygrometer`]
//!
//! # Design
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//!
//! # Example
//!
//! ```rust,ignore
//! async fn bias_and_read<S: SourceMeter>(smu: &S, volts: f64) -> Result<f64> {
//!     smu.set_voltage(volts).await?;
//!     smu.get_current().await
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

/// Capability: Bias Source with Current Readback
///
/// # Contract
/// - Voltages in V, currents in A, signed as the instrument reports them
/// - `set_voltage` returns once the new set point is programmed (not settled)
/// - `get_current` performs one measurement
/// - `output_off` must be safe to call repeatedly
#[async_trait]
pub trait SourceMeter: Send + Sync {
    /// Program the compliance current limit.
    async fn set_current_limit(&self, amps: f64) -> Result<()>;

    /// Program the output voltage.
    async fn set_voltage(&self, volts: f64) -> Result<()>;

    /// Measure the current once.
    async fn get_current(&self) -> Result<f64>;

    /// Enable the output.
    async fn output_on(&self) -> Result<()>;

    /// Disable the output.
    async fn output_off(&self) -> Result<()>;
}

/// Capability: Ambient Conditions
///
/// Relative humidity in % and temperature in °C, typically of the measurement chuck.
#[async_trait]
pub trait Hygrometer: Send + Sync {
    /// Read the relative humidity.
    async fn get_humidity(&self) -> Result<f64>;

    /// Read the temperature.
    async fn get_temperature(&self) -> Result<f64>;
}
