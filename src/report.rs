//! Human-readable analysis report.

use crate::analysis::{BreakdownVoltage, SweepResult};
use std::fmt;

const LABEL_WIDTH: usize = 48;

/// Plain-text summary of one [`SweepResult`], one criterion per line.
pub struct Report<'a> {
    result: &'a SweepResult,
}

impl<'a> Report<'a> {
    /// Report for `result`.
    ///
    /// ```
    /// use ivqc::analysis::{analyze, AnalysisRequest};
    /// use ivqc::report::Report;
    /// use ivqc::sweep::{Sample, Sweep};
    ///
    /// let sweep = Sweep::new(vec![Sample::new(0.0, -0.1), Sample::new(-80.0, -0.1)])?;
    /// let request = AnalysisRequest::new("20UPGS81100001").with_depletion_voltage(20.0);
    /// let result = analyze(&sweep, &request)?;
    /// let text = Report::new(&result).to_string();
    /// assert!(text.trim_end().ends_with("[PASSED]"));
    /// # Ok::<(), ivqc::IvError>(())
    /// ```
    pub fn new(result: &'a SweepResult) -> Self {
        Self { result }
    }
}

fn flag(passed: bool) -> &'static str {
    if passed {
        "Yes, [PASSED]"
    } else {
        "No, [FAILED]"
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.result;
        let c = &r.criteria;

        writeln!(f, "{:LABEL_WIDTH$} {}", "Sensor ID:", r.serial)?;
        writeln!(f, "{:LABEL_WIDTH$} {}", "Sensor family:", r.family)?;
        writeln!(f, "{:LABEL_WIDTH$} {} cm2", "Area:", r.area)?;
        writeln!(
            f,
            "{:LABEL_WIDTH$} {}",
            format!("Depletion voltage {:.1} V in range?", r.depletion_voltage),
            flag(r.verdicts.depletion)
        )?;

        match r.breakdown_voltage {
            BreakdownVoltage::Observed(v) => {
                writeln!(f, "{:LABEL_WIDTH$} {:.1} V", "Breakdown voltage:", v)?
            }
            BreakdownVoltage::NotObserved => writeln!(
                f,
                "{:LABEL_WIDTH$} not observed up to {:.1} V",
                "Breakdown voltage:", r.maximum_voltage
            )?,
        }
        writeln!(
            f,
            "{:LABEL_WIDTH$} {}",
            format!("In excess of Vdepl + offset (={:.0} V)?", c.breakdown_threshold),
            flag(r.verdicts.breakdown)
        )?;

        let leak_at = r
            .leak_voltage
            .map_or_else(|| "n/a".to_string(), |v| format!("{v:.0} V"));
        writeln!(
            f,
            "{:LABEL_WIDTH$} {} uA",
            format!(
                "Leakage current at {:.0} V (sample {}):",
                c.reference_voltage, leak_at
            ),
            r.leak_current
        )?;
        writeln!(
            f,
            "{:LABEL_WIDTH$} {}",
            format!(
                "Leakage current {} uA/cm2 <= {} uA/cm2?",
                r.leakage_per_area, c.leakage_spec
            ),
            flag(r.verdicts.leakage)
        )?;
        write!(
            f,
            "{:LABEL_WIDTH$} {}",
            "Does the sensor meet all IV criteria?",
            flag(r.passed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{analyze, AnalysisRequest};
    use crate::sweep::{Sample, Sweep};

    fn flat_sweep(current: f64) -> Sweep {
        let samples = (0..=40)
            .map(|i| Sample::new(-(i as f64) * 5.0, -current))
            .collect();
        Sweep::new(samples).unwrap()
    }

    #[test]
    fn test_report_for_passing_sensor() {
        let result = analyze(
            &flat_sweep(0.384),
            &AnalysisRequest::new("20UPGS81100001").with_depletion_voltage(20.0),
        )
        .unwrap();
        let text = Report::new(&result).to_string();

        assert!(text.contains("20UPGS81100001"));
        assert!(text.contains("not observed up to 200.0 V"));
        assert!(text.contains("Does the sensor meet all IV criteria?"));
        assert!(text.lines().last().unwrap().ends_with("Yes, [PASSED]"));
        assert!(!text.contains("[FAILED]"));
    }

    #[test]
    fn test_report_marks_failed_depletion() {
        let result = analyze(
            &flat_sweep(0.384),
            &AnalysisRequest::new("20UPGS81100001").with_depletion_voltage(65.0),
        )
        .unwrap();
        let text = Report::new(&result).to_string();

        let depletion_line = text
            .lines()
            .find(|l| l.starts_with("Depletion voltage"))
            .unwrap();
        assert!(depletion_line.ends_with("No, [FAILED]"));
        assert!(text.lines().last().unwrap().ends_with("No, [FAILED]"));
    }
}
