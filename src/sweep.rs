//! Measurement samples of one IV sweep.
//!
//! A [`Sweep`] is an immutable, validated sequence of [`Sample`]s. Construction checks the
//! data shape (non-empty, parallel arrays of equal length, finite values) so that the
//! analyzer never has to.

use crate::error::{AppResult, IvError};
use serde::{Deserialize, Serialize};

/// Amperes to microamperes.
const MICRO_PER_UNIT: f64 = 1e6;

/// One point of an IV sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Applied bias voltage in V (sign is the sweep direction).
    pub voltage: f64,
    /// Mean current, in the sweep's [`CurrentUnit`].
    pub current: f64,
    /// Standard deviation of the current, same unit.
    pub current_std: f64,
    /// Temperature in °C.
    pub temperature: Option<f64>,
    /// Relative humidity in %.
    pub humidity: Option<f64>,
    /// Seconds since the start of the sweep.
    pub time: Option<f64>,
}

impl Sample {
    /// A sample with only voltage and current set.
    pub fn new(voltage: f64, current: f64) -> Self {
        Self {
            voltage,
            current,
            current_std: 0.0,
            temperature: None,
            humidity: None,
            time: None,
        }
    }
}

/// Unit the currents of a sweep were recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CurrentUnit {
    /// Amperes; converted to µA before analysis.
    Ampere,
    /// Microamperes.
    #[default]
    Microampere,
}

impl CurrentUnit {
    /// Interpret the `prefix` field of a test-run record. Only `"A"` means amperes.
    pub fn from_prefix(prefix: Option<&str>) -> Self {
        match prefix.map(str::trim) {
            Some("A") => CurrentUnit::Ampere,
            _ => CurrentUnit::Microampere,
        }
    }

    /// Factor converting a value in this unit to µA.
    pub fn to_micro(self) -> f64 {
        match self {
            CurrentUnit::Ampere => MICRO_PER_UNIT,
            CurrentUnit::Microampere => 1.0,
        }
    }
}

/// Borrowed parallel arrays as stored in a test-run record.
///
/// `voltage` and `current` are required; the other columns may be empty, meaning absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepColumns<'a> {
    /// Voltages.
    pub voltage: &'a [f64],
    /// Mean currents.
    pub current: &'a [f64],
    /// Current standard deviations.
    pub sigma_current: &'a [f64],
    /// Temperatures.
    pub temperature: &'a [f64],
    /// Relative humidities.
    pub humidity: &'a [f64],
    /// Relative timestamps.
    pub time: &'a [f64],
}

/// Validated samples of one sweep, in acquisition order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sweep {
    samples: Vec<Sample>,
}

impl Sweep {
    /// Build a sweep from samples.
    pub fn new(samples: Vec<Sample>) -> AppResult<Self> {
        if samples.is_empty() {
            return Err(IvError::EmptySweep);
        }
        for (index, sample) in samples.iter().enumerate() {
            check_finite("voltage", index, sample.voltage)?;
            check_finite("current", index, sample.current)?;
            check_finite("sigma_current", index, sample.current_std)?;
        }
        Ok(Self { samples })
    }

    /// Build a sweep from parallel arrays.
    pub fn from_columns(columns: SweepColumns<'_>) -> AppResult<Self> {
        let len = columns.voltage.len();
        if len == 0 {
            return Err(IvError::EmptySweep);
        }
        check_len("current", len, columns.current, false)?;
        check_len("sigma_current", len, columns.sigma_current, true)?;
        check_len("temperature", len, columns.temperature, true)?;
        check_len("humidity", len, columns.humidity, true)?;
        check_len("time", len, columns.time, true)?;

        let optional = |column: &[f64], index: usize| column.get(index).copied();
        let samples = (0..len)
            .map(|i| Sample {
                voltage: columns.voltage[i],
                current: columns.current[i],
                current_std: optional(columns.sigma_current, i).unwrap_or(0.0),
                temperature: optional(columns.temperature, i),
                humidity: optional(columns.humidity, i),
                time: optional(columns.time, i),
            })
            .collect();

        Self::new(samples)
    }

    /// Samples in acquisition order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a constructed sweep.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest voltage magnitude reached.
    pub fn max_voltage(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.voltage.abs())
            .fold(0.0, f64::max)
    }

    /// Magnitudes in V and µA, stably ordered by voltage magnitude.
    pub fn normalized(&self, unit: CurrentUnit) -> Vec<Sample> {
        let scale = unit.to_micro();
        let mut samples: Vec<Sample> = self
            .samples
            .iter()
            .map(|s| Sample {
                voltage: s.voltage.abs(),
                current: s.current.abs() * scale,
                current_std: s.current_std.abs() * scale,
                ..*s
            })
            .collect();
        samples.sort_by(|a, b| a.voltage.total_cmp(&b.voltage));
        samples
    }
}

fn check_finite(field: &'static str, index: usize, value: f64) -> AppResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(IvError::NonFiniteSample { field, index })
    }
}

fn check_len(field: &'static str, expected: usize, column: &[f64], optional: bool) -> AppResult<()> {
    if column.len() == expected || (optional && column.is_empty()) {
        Ok(())
    } else {
        Err(IvError::LengthMismatch {
            field,
            expected,
            found: column.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sweep_rejected() {
        assert!(matches!(Sweep::new(vec![]), Err(IvError::EmptySweep)));
        assert!(matches!(
            Sweep::from_columns(SweepColumns::default()),
            Err(IvError::EmptySweep)
        ));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let columns = SweepColumns {
            voltage: &[0.0, -5.0, -10.0],
            current: &[0.1, 0.2],
            ..Default::default()
        };
        match Sweep::from_columns(columns) {
            Err(IvError::LengthMismatch {
                field,
                expected,
                found,
            }) => {
                assert_eq!(field, "current");
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let columns = SweepColumns {
            voltage: &[0.0, -5.0],
            current: &[0.1, 0.2],
            humidity: &[40.0],
            ..Default::default()
        };
        assert!(Sweep::from_columns(columns).is_err());
    }

    #[test]
    fn test_optional_columns_may_be_absent() {
        let columns = SweepColumns {
            voltage: &[0.0, -5.0],
            current: &[0.1, 0.2],
            temperature: &[20.0, 20.5],
            ..Default::default()
        };
        let sweep = Sweep::from_columns(columns).unwrap();
        assert_eq!(sweep.len(), 2);
        assert_eq!(sweep.samples()[1].temperature, Some(20.5));
        assert_eq!(sweep.samples()[1].humidity, None);
        assert_eq!(sweep.samples()[1].current_std, 0.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        let err = Sweep::new(vec![Sample::new(0.0, 0.1), Sample::new(-5.0, f64::NAN)]).unwrap_err();
        assert!(matches!(
            err,
            IvError::NonFiniteSample {
                field: "current",
                index: 1
            }
        ));
    }

    #[test]
    fn test_normalization_takes_magnitudes_and_converts_amperes() {
        let sweep = Sweep::new(vec![
            Sample::new(0.0, -1e-7),
            Sample::new(-10.0, -2e-7),
            Sample::new(-5.0, -1.5e-7),
        ])
        .unwrap();

        let normalized = sweep.normalized(CurrentUnit::Ampere);
        let voltages: Vec<f64> = normalized.iter().map(|s| s.voltage).collect();
        assert_eq!(voltages, vec![0.0, 5.0, 10.0]);
        assert!((normalized[2].current - 0.2).abs() < 1e-12);
        assert_eq!(sweep.max_voltage(), 10.0);
    }

    #[test]
    fn test_unit_prefix() {
        assert_eq!(CurrentUnit::from_prefix(Some("A")), CurrentUnit::Ampere);
        assert_eq!(CurrentUnit::from_prefix(Some("uA")), CurrentUnit::Microampere);
        assert_eq!(CurrentUnit::from_prefix(None), CurrentUnit::Microampere);
    }
}
