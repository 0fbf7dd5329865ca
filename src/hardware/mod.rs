//! Hardware Abstractions
//!
//! Capability traits for the instruments an IV scan drives, plus mock implementations
//! for running scans without hardware.

pub mod capabilities;
pub mod mock;

pub use capabilities::{Hygrometer, SourceMeter};
pub use mock::{DiodeModel, MockHygrometer, MockSourceMeter};
