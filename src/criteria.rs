//! Pass/fail thresholds for the IV acceptance test.
//!
//! 3D and planar sensors are judged by two disjoint rule sets. All voltage thresholds are
//! relative to the declared depletion voltage.

use crate::sensor::{SensorFamily, SensorIdentity, Thickness};
use serde::{Deserialize, Serialize};

/// Leakage current limit for 3D sensors, µA/cm².
pub const LEAKAGE_SPEC_3D: f64 = 2.5;
/// Leakage current limit for planar sensors, µA/cm².
pub const LEAKAGE_SPEC_PLANAR: f64 = 0.75;

/// Open voltage interval `(low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenInterval {
    /// Exclusive lower bound.
    pub low: f64,
    /// Exclusive upper bound.
    pub high: f64,
}

impl OpenInterval {
    /// Whether `value` lies strictly inside.
    pub fn contains(&self, value: f64) -> bool {
        self.low < value && value < self.high
    }
}

/// Thresholds for one sensor at one depletion voltage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    /// Family the rule set belongs to.
    pub family: SensorFamily,
    /// Accepted depletion voltages; `None` when the thickness is not encoded (always fails).
    pub depletion_range: Option<OpenInterval>,
    /// Voltage at which the leakage current is read.
    pub reference_voltage: f64,
    /// A breakdown below this voltage fails the sensor.
    pub breakdown_threshold: f64,
    /// Maximum leakage current density in µA/cm².
    pub leakage_spec: f64,
}

impl Criteria {
    /// Derive the thresholds for `identity` at `depletion_voltage`.
    pub fn for_sensor(identity: &SensorIdentity, depletion_voltage: f64) -> Self {
        match identity.family() {
            SensorFamily::ThreeD => Self {
                family: SensorFamily::ThreeD,
                depletion_range: Some(OpenInterval {
                    low: 0.0,
                    high: 10.0,
                }),
                reference_voltage: depletion_voltage + 20.0,
                breakdown_threshold: depletion_voltage + 20.0,
                leakage_spec: LEAKAGE_SPEC_3D,
            },
            SensorFamily::Planar => {
                let depletion_range = match identity.thickness() {
                    Thickness::Um100 => Some(OpenInterval {
                        low: 0.0,
                        high: 60.0,
                    }),
                    Thickness::Um150 => Some(OpenInterval {
                        low: 0.0,
                        high: 100.0,
                    }),
                    Thickness::Unknown => None,
                };
                Self {
                    family: SensorFamily::Planar,
                    depletion_range,
                    reference_voltage: depletion_voltage + 50.0,
                    breakdown_threshold: depletion_voltage + 70.0,
                    leakage_spec: LEAKAGE_SPEC_PLANAR,
                }
            }
        }
    }

    /// Depletion-voltage criterion.
    pub fn depletion_in_range(&self, depletion_voltage: f64) -> bool {
        self.depletion_range
            .is_some_and(|range| range.contains(depletion_voltage))
    }
}
