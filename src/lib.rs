//! # ivqc
//!
//! Quality control of pixel sensor tiles from their current-voltage (IV) characteristic.
//! The crate is organised around one pure analysis routine plus the plumbing that feeds
//! it and consumes its result:
//!
//! - **`analysis`**: the IV curve analyzer. Takes a validated [`sweep::Sweep`] and an
//!   [`analysis::AnalysisRequest`], returns an [`analysis::SweepResult`] with breakdown
//!   voltage, leakage current and the pass/fail verdicts.
//! - **`sensor`**: decodes family, size class, thickness and area from a serial number.
//! - **`criteria`**: family and thickness dependent acceptance thresholds.
//! - **`sweep`**: samples, current units and data-shape validation.
//! - **`record`**: the JSON test-run record exchanged with the production database.
//! - **`convert`**: raw scan CSV files to test-run records.
//! - **`hardware`**: instrument capability traits and mock instruments.
//! - **`acquisition`**: the IV scan procedure driving those capabilities.
//! - **`report`**: plain-text presentation of a result.
//! - **`config`**, **`logging`**, **`error`**: application configuration, tracing setup
//!   and the crate error type.

pub mod acquisition;
pub mod analysis;
pub mod config;
pub mod convert;
pub mod criteria;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod record;
pub mod report;
pub mod sensor;
pub mod sweep;

pub use analysis::{analyze, AnalysisRequest, BreakdownVoltage, SweepResult};
pub use error::{AppResult, IvError};
