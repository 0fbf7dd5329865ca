//! IV curve analysis.
//!
//! [`analyze`] turns one validated [`Sweep`] plus the sensor's metadata into a
//! [`SweepResult`]: breakdown voltage, leakage current at the reference point, the
//! maximum voltage reached and the combined pass/fail verdict.
//!
//! # Algorithm
//!
//! 1. Normalize: magnitudes of voltage and current, currents converted to µA, samples
//!    stably ordered by voltage magnitude.
//! 2. Classify the sensor from its serial number and resolve its area.
//! 3. Derive the family-specific [`Criteria`].
//! 4. Single forward pass over the samples at or above the depletion voltage:
//!    - the leakage current is the last sample at or below the reference voltage;
//!    - 3D: breakdown at the first `i` with `I[i] > 2 * I[i-5]` and `V[i-5] > V_depl`,
//!      reported as `V[i-5]`; the pass stops there;
//!    - planar: every `i` re-evaluates `I[i] > 1.2 * I[i-1]` with `V[i-1] != 0` and
//!      overwrites the breakdown state, so the last evaluated sample decides.
//! 5. Per-criterion verdicts and their conjunction.
//!
//! The function is pure: identical inputs give identical results, and nothing is
//! printed or prompted. Presentation lives in [`crate::report`].

use crate::criteria::Criteria;
use crate::error::{AppResult, IvError};
use crate::sensor::{SensorFamily, SensorIdentity};
use crate::sweep::{CurrentUnit, Sample, Sweep};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};

/// Wire value for "no breakdown observed".
pub const NO_BREAKDOWN_SENTINEL: f64 = -999.0;

const LOOKBACK_3D: usize = 5;
const CURRENT_RATIO_3D: f64 = 2.0;
const LOOKBACK_PLANAR: usize = 1;
const CURRENT_RATIO_PLANAR: f64 = 1.2;

/// Breakdown voltage, or the absence of one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakdownVoltage {
    /// Breakdown detected at this voltage magnitude (V).
    Observed(f64),
    /// No breakdown within the sweep.
    NotObserved,
}

impl BreakdownVoltage {
    /// Decode the stored representation.
    pub fn from_wire(value: f64) -> Self {
        if value == NO_BREAKDOWN_SENTINEL {
            BreakdownVoltage::NotObserved
        } else {
            BreakdownVoltage::Observed(value)
        }
    }

    /// Stored representation: the voltage, or [`NO_BREAKDOWN_SENTINEL`].
    pub fn as_wire(self) -> f64 {
        match self {
            BreakdownVoltage::Observed(v) => v,
            BreakdownVoltage::NotObserved => NO_BREAKDOWN_SENTINEL,
        }
    }

    /// Whether a breakdown was detected.
    pub fn is_observed(self) -> bool {
        matches!(self, BreakdownVoltage::Observed(_))
    }

    /// Breakdown criterion.
    ///
    /// Only a breakdown strictly between 0 V and `threshold` fails. An observed value of
    /// exactly 0 V passes, as it always has in the stored results.
    pub fn passes(self, threshold: f64) -> bool {
        match self {
            BreakdownVoltage::NotObserved => true,
            BreakdownVoltage::Observed(v) => !(0.0 < v && v < threshold),
        }
    }
}

impl Serialize for BreakdownVoltage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for BreakdownVoltage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Self::from_wire)
    }
}

/// Everything the analyzer needs besides the samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    /// Sensor serial number.
    pub serial: String,
    /// Declared depletion voltage in V. Required; `None` is reported, never defaulted.
    pub depletion_voltage: Option<f64>,
    /// Unit of the recorded currents.
    pub unit: CurrentUnit,
    /// Explicit sensor area in cm², overriding the serial-number table.
    pub area_override: Option<f64>,
}

impl AnalysisRequest {
    /// Request for `serial` with µA currents and nothing else set.
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            depletion_voltage: None,
            unit: CurrentUnit::Microampere,
            area_override: None,
        }
    }

    /// Set the depletion voltage.
    pub fn with_depletion_voltage(mut self, volts: f64) -> Self {
        self.depletion_voltage = Some(volts);
        self
    }

    /// Set the current unit.
    pub fn with_unit(mut self, unit: CurrentUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Set an explicit area.
    pub fn with_area(mut self, cm2: f64) -> Self {
        self.area_override = Some(cm2);
        self
    }
}

/// The three independent sub-verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdicts {
    /// Declared depletion voltage inside the accepted interval.
    pub depletion: bool,
    /// Leakage current density within spec.
    pub leakage: bool,
    /// No breakdown below the threshold.
    pub breakdown: bool,
}

impl Verdicts {
    /// Conjunction of all three.
    pub fn all(&self) -> bool {
        self.depletion && self.leakage && self.breakdown
    }
}

/// Outcome of analysing one sweep. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepResult {
    /// Sensor serial number.
    pub serial: String,
    /// 3D or planar.
    pub family: SensorFamily,
    /// Area used for the current density, cm².
    pub area: f64,
    /// Declared depletion voltage, V.
    pub depletion_voltage: f64,
    /// Thresholds applied.
    pub criteria: Criteria,
    /// Breakdown voltage.
    pub breakdown_voltage: BreakdownVoltage,
    /// Leakage current at the reference point, µA.
    pub leak_current: f64,
    /// Voltage of the sample the leakage current was read from.
    pub leak_voltage: Option<f64>,
    /// Leakage current density, µA/cm², rounded to 4 decimals.
    pub leakage_per_area: f64,
    /// Largest voltage magnitude in the sweep.
    pub maximum_voltage: f64,
    /// Sub-verdicts.
    pub verdicts: Verdicts,
    /// Overall verdict.
    pub passed: bool,
}

impl SweepResult {
    /// Whether the sweep ended without a detected breakdown.
    pub fn no_breakdown_voltage_observed(&self) -> bool {
        !self.breakdown_voltage.is_observed()
    }

    /// The fields persisted with the test run.
    pub fn fields(&self) -> ResultFields {
        ResultFields {
            breakdown_voltage: self.breakdown_voltage,
            leak_current: self.leak_current,
            no_breakdown_voltage_observed: self.no_breakdown_voltage_observed(),
            maximum_voltage: self.maximum_voltage,
            passed: self.passed,
        }
    }
}

/// Result record merged into the caller's stored test run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultFields {
    /// Breakdown voltage or -999.0.
    pub breakdown_voltage: BreakdownVoltage,
    /// Leakage current at the reference point, µA.
    pub leak_current: f64,
    /// No breakdown observed.
    pub no_breakdown_voltage_observed: bool,
    /// Largest voltage magnitude reached.
    pub maximum_voltage: f64,
    /// Overall verdict.
    pub passed: bool,
}

struct ScanOutcome {
    leak: Option<Sample>,
    breakdown: BreakdownVoltage,
}

/// Analyse one sweep.
///
/// # Errors
/// - Configuration class: invalid serial number, missing or invalid depletion voltage,
///   unresolvable area.
///
/// Data-shape problems are already excluded by [`Sweep`] construction.
#[tracing::instrument(level = "debug", skip(sweep, request), fields(serial = %request.serial))]
pub fn analyze(sweep: &Sweep, request: &AnalysisRequest) -> AppResult<SweepResult> {
    let identity = SensorIdentity::parse(&request.serial)?;

    let depletion_voltage = request
        .depletion_voltage
        .ok_or_else(|| IvError::MissingDepletionVoltage(identity.serial().to_string()))?;
    // a negative value is a declaration, judged by the depletion verdict
    if !depletion_voltage.is_finite() {
        return Err(IvError::InvalidDepletionVoltage(depletion_voltage));
    }

    let area = identity.resolve_area(request.area_override)?;
    let criteria = Criteria::for_sensor(&identity, depletion_voltage);
    debug!(
        family = %criteria.family,
        size = %identity.size_class(),
        area,
        reference_voltage = criteria.reference_voltage,
        breakdown_threshold = criteria.breakdown_threshold,
        "Classified sensor"
    );

    let samples = sweep.normalized(request.unit);
    let scan = scan(&samples, &criteria, depletion_voltage);

    let leak_current = scan.leak.map_or(0.0, |s| s.current);
    if scan.leak.is_none() {
        warn!(
            depletion_voltage,
            reference_voltage = criteria.reference_voltage,
            "No sample between depletion and reference voltage; leakage current taken as 0"
        );
    }
    let leakage_per_area = round4(leak_current / area);

    let verdicts = Verdicts {
        depletion: criteria.depletion_in_range(depletion_voltage),
        leakage: leakage_per_area <= criteria.leakage_spec,
        breakdown: scan.breakdown.passes(criteria.breakdown_threshold),
    };
    let passed = verdicts.all();

    info!(
        breakdown_voltage = scan.breakdown.as_wire(),
        leak_current,
        leakage_per_area,
        passed,
        "IV analysis complete"
    );

    Ok(SweepResult {
        serial: identity.serial().to_string(),
        family: criteria.family,
        area,
        depletion_voltage,
        criteria,
        breakdown_voltage: scan.breakdown,
        leak_current,
        leak_voltage: scan.leak.map(|s| s.voltage),
        leakage_per_area,
        maximum_voltage: sweep.max_voltage(),
        verdicts,
        passed,
    })
}

/// Leakage and breakdown search over normalized, ordered samples.
fn scan(samples: &[Sample], criteria: &Criteria, depletion_voltage: f64) -> ScanOutcome {
    let mut leak = None;
    let mut breakdown = BreakdownVoltage::NotObserved;

    for (i, sample) in samples.iter().enumerate() {
        if sample.voltage < depletion_voltage {
            continue;
        }
        if sample.voltage <= criteria.reference_voltage {
            leak = Some(*sample);
        }

        match criteria.family {
            SensorFamily::ThreeD => {
                let Some(base) = i.checked_sub(LOOKBACK_3D).map(|j| &samples[j]) else {
                    continue;
                };
                if sample.current > CURRENT_RATIO_3D * base.current
                    && base.voltage > depletion_voltage
                {
                    debug!(voltage = base.voltage, index = i, "3D breakdown detected");
                    breakdown = BreakdownVoltage::Observed(base.voltage);
                    break;
                }
            }
            SensorFamily::Planar => {
                let Some(prev) = i.checked_sub(LOOKBACK_PLANAR).map(|j| &samples[j]) else {
                    continue;
                };
                // overwritten on every sample: the last evaluation decides
                breakdown = if sample.current > CURRENT_RATIO_PLANAR * prev.current
                    && prev.voltage != 0.0
                {
                    BreakdownVoltage::Observed(sample.voltage)
                } else {
                    BreakdownVoltage::NotObserved
                };
            }
        }
    }

    ScanOutcome { leak, breakdown }
}

/// Four decimals, rounded on the exact binary value like `round(x, 4)` in the stored
/// historic results.
fn round4(value: f64) -> f64 {
    format!("{value:.4}").parse().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLANAR_FULL: &str = "20UPGS81100001";
    const THREE_D_FULL: &str = "20UPGSI1100001";

    fn sweep(points: &[(f64, f64)]) -> Sweep {
        Sweep::new(points.iter().map(|&(v, i)| Sample::new(v, i)).collect()).unwrap()
    }

    #[test]
    fn test_missing_depletion_voltage_is_reported() {
        let err = analyze(&sweep(&[(0.0, 0.1)]), &AnalysisRequest::new(PLANAR_FULL)).unwrap_err();
        assert!(matches!(err, IvError::MissingDepletionVoltage(_)));
    }

    #[test]
    fn test_invalid_depletion_voltage_is_reported() {
        let request = AnalysisRequest::new(PLANAR_FULL).with_depletion_voltage(f64::NAN);
        assert!(matches!(
            analyze(&sweep(&[(0.0, 0.1)]), &request),
            Err(IvError::InvalidDepletionVoltage(_))
        ));
    }

    #[test]
    fn test_negative_depletion_voltage_fails_verdict() {
        let data = sweep(&[(0.0, 0.384), (20.0, 0.384), (40.0, 0.384), (60.0, 0.384)]);
        let request = AnalysisRequest::new(PLANAR_FULL).with_depletion_voltage(-20.0);
        let result = analyze(&data, &request).unwrap();
        assert_eq!(result.depletion_voltage, -20.0);
        assert!(!result.verdicts.depletion);
        assert!(result.verdicts.leakage);
        assert!(!result.passed);
    }

    #[test]
    fn test_short_3d_sweep_has_no_breakdown() {
        // fewer samples than the look-back window: no indexing, no breakdown
        let data = sweep(&[(0.0, 0.1), (5.0, 10.0), (10.0, 100.0)]);
        let request = AnalysisRequest::new(THREE_D_FULL).with_depletion_voltage(2.0);
        let result = analyze(&data, &request).unwrap();
        assert_eq!(result.breakdown_voltage, BreakdownVoltage::NotObserved);
        assert!(result.no_breakdown_voltage_observed());
    }

    #[test]
    fn test_single_sample_planar_sweep() {
        let data = sweep(&[(30.0, 1.0)]);
        let request = AnalysisRequest::new(PLANAR_FULL).with_depletion_voltage(20.0);
        let result = analyze(&data, &request).unwrap();
        assert_eq!(result.breakdown_voltage, BreakdownVoltage::NotObserved);
        assert_eq!(result.leak_current, 1.0);
        assert_eq!(result.leak_voltage, Some(30.0));
    }

    #[test]
    fn test_planar_breakdown_state_follows_last_sample() {
        // jump at 60 V, then flat: the final evaluation clears the breakdown again
        let data = sweep(&[
            (0.0, 0.1),
            (20.0, 0.1),
            (40.0, 0.1),
            (60.0, 1.0),
            (80.0, 1.0),
        ]);
        let request = AnalysisRequest::new(PLANAR_FULL).with_depletion_voltage(20.0);
        let result = analyze(&data, &request).unwrap();
        assert_eq!(result.breakdown_voltage, BreakdownVoltage::NotObserved);

        // jump on the last sample sticks
        let data = sweep(&[(0.0, 0.1), (20.0, 0.1), (40.0, 0.1), (60.0, 1.0)]);
        let result = analyze(&data, &request).unwrap();
        assert_eq!(result.breakdown_voltage, BreakdownVoltage::Observed(60.0));
        assert!(!result.verdicts.breakdown);
    }

    #[test]
    fn test_planar_jump_from_zero_volts_is_ignored() {
        let data = sweep(&[(0.0, 0.01), (10.0, 0.5)]);
        let request = AnalysisRequest::new(PLANAR_FULL).with_depletion_voltage(5.0);
        let result = analyze(&data, &request).unwrap();
        assert_eq!(result.breakdown_voltage, BreakdownVoltage::NotObserved);
    }

    #[test]
    fn test_leakage_without_reference_sample_is_zero() {
        // depletion at 20 V, reference at 70 V, no sample in [20, 70]
        let data = sweep(&[(0.0, 0.1), (10.0, 0.1), (100.0, 0.2)]);
        let request = AnalysisRequest::new(PLANAR_FULL).with_depletion_voltage(20.0);
        let result = analyze(&data, &request).unwrap();
        assert_eq!(result.leak_current, 0.0);
        assert_eq!(result.leak_voltage, None);
        assert!(result.verdicts.leakage);
    }

    #[test]
    fn test_breakdown_verdict_boundaries() {
        assert!(BreakdownVoltage::NotObserved.passes(90.0));
        assert!(BreakdownVoltage::Observed(0.0).passes(90.0));
        assert!(BreakdownVoltage::Observed(90.0).passes(90.0));
        assert!(BreakdownVoltage::Observed(120.0).passes(90.0));
        assert!(!BreakdownVoltage::Observed(89.9).passes(90.0));
    }

    #[test]
    fn test_breakdown_wire_format() {
        assert_eq!(BreakdownVoltage::NotObserved.as_wire(), -999.0);
        assert_eq!(
            BreakdownVoltage::from_wire(-999.0),
            BreakdownVoltage::NotObserved
        );
        assert_eq!(
            BreakdownVoltage::from_wire(85.0),
            BreakdownVoltage::Observed(85.0)
        );
        let json = serde_json::to_string(&BreakdownVoltage::NotObserved).unwrap();
        assert_eq!(json, "-999.0");
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round4(0.123_449), 0.1234);
        assert_eq!(round4(0.123_46), 0.1235);
        assert_eq!(round4(0.1), 0.1);
        // just below the tie in binary
        assert_eq!(round4(0.750_05), 0.75);
        assert_eq!(round4(2.500_05), 2.5);
        assert_eq!(round4(-0.123_46), -0.1235);
    }
}
