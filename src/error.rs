//! Custom error types for the crate.
//!
//! This module defines the primary error type, `IvError`. Using the `thiserror` crate, it
//! provides a centralized and consistent way to handle everything that can go wrong between
//! reading a sweep and producing a verdict.
//!
//! ## Error Hierarchy
//!
//! `IvError` groups its variants into classes (see [`ErrorClass`]):
//!
//! - **Configuration**: the sensor cannot be classified or the caller did not supply a value
//!   the analysis needs (depletion voltage, sensor area). These are never guessed; the caller
//!   decides whether to re-prompt, override, or give up.
//! - **DataShape**: the sample arrays are empty, of mismatched length, or carry non-finite
//!   values. Raised before the breakdown scan starts.
//! - **Record**: a test-run file is structurally valid JSON but fails the checks the
//!   production database applies before upload.
//! - **Settings**: the application configuration could not be extracted or is invalid.
//! - **Io**: file, JSON and CSV errors from the collaborator layer.
//! - **Instrument**: a capability call failed during an IV scan.
//!
//! By using `#[from]`, `IvError` can be created from underlying error types, simplifying
//! error handling with the `?` operator.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, IvError>;

/// Everything that can go wrong between reading a sweep and producing a verdict.
#[derive(Error, Debug)]
pub enum IvError {
    /// Serial number too short or not alphanumeric.
    #[error("Invalid serial number '{0}': expected at least 9 ASCII alphanumeric characters")]
    InvalidSerialNumber(String),

    /// The area table has no entry for this size class and area code.
    #[error("No area known for sensor '{serial}' (size class {size}, area code '{code}'); supply an explicit area")]
    UnresolvedArea {
        /// Normalised serial number
        serial: String,
        /// Size class name
        size: String,
        /// Area code character from the serial
        code: char,
    },

    /// No depletion voltage was supplied for this serial.
    #[error("Depletion voltage for sensor '{0}' is missing; it must be supplied by the caller")]
    MissingDepletionVoltage(String),

    /// Depletion voltage is NaN or infinite.
    #[error("Invalid depletion voltage {0} V")]
    InvalidDepletionVoltage(f64),

    /// Area override is not positive and finite.
    #[error("Invalid sensor area {0} cm^2: must be positive and finite")]
    InvalidArea(f64),

    /// Sweep has no samples.
    #[error("Sweep contains no samples")]
    EmptySweep,

    /// A sample array differs in length from the voltage array.
    #[error("Sweep array '{field}' has {found} entries, expected {expected}")]
    LengthMismatch {
        /// Offending array
        field: &'static str,
        /// Length of the voltage array
        expected: usize,
        /// Length of the offending array
        found: usize,
    },

    /// A sample array holds NaN or infinity.
    #[error("Sweep array '{field}' holds a non-finite value at index {index}")]
    NonFiniteSample {
        /// Offending array
        field: &'static str,
        /// Position of the first bad value
        index: usize,
    },

    /// Test-run record fails the pre-upload checks.
    #[error("Invalid test-run record: {0}")]
    InvalidRecord(String),

    /// Configuration values are out of range.
    #[error("Configuration validation error: {0}")]
    Settings(String),

    /// Configuration could not be extracted.
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read or write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A source meter or hygrometer call failed.
    #[error("Instrument error: {0}")]
    Instrument(String),
}

/// Coarse classification of an [`IvError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Unresolvable sensor metadata; needs an explicit value from the caller.
    Configuration,
    /// Sample arrays cannot be analysed as given.
    DataShape,
    /// Test-run record fails the pre-upload checks.
    Record,
    /// Application configuration problem.
    Settings,
    /// File or format error.
    Io,
    /// Hardware capability failure.
    Instrument,
}

impl IvError {
    /// Class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            IvError::InvalidSerialNumber(_)
            | IvError::UnresolvedArea { .. }
            | IvError::MissingDepletionVoltage(_)
            | IvError::InvalidDepletionVoltage(_)
            | IvError::InvalidArea(_) => ErrorClass::Configuration,
            IvError::EmptySweep | IvError::LengthMismatch { .. } | IvError::NonFiniteSample { .. } => {
                ErrorClass::DataShape
            }
            IvError::InvalidRecord(_) => ErrorClass::Record,
            IvError::Settings(_) | IvError::Figment(_) => ErrorClass::Settings,
            IvError::Io(_) | IvError::Json(_) | IvError::Csv(_) => ErrorClass::Io,
            IvError::Instrument(_) => ErrorClass::Instrument,
        }
    }

    /// Whether the caller can fix this by supplying a value (depletion voltage, area).
    pub fn needs_caller_input(&self) -> bool {
        matches!(
            self,
            IvError::UnresolvedArea { .. } | IvError::MissingDepletionVoltage(_)
        )
    }
}

impl From<figment::Error> for IvError {
    fn from(value: figment::Error) -> Self {
        IvError::Figment(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_configuration_errors() {
        let err = IvError::UnresolvedArea {
            serial: "20UPGPT0000001".into(),
            size: "Test".into(),
            code: '1',
        };
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(err.needs_caller_input());
        assert!(err.to_string().contains("20UPGPT0000001"));

        let err = IvError::InvalidSerialNumber("20U".into());
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(!err.needs_caller_input());
    }

    #[test]
    fn classifies_data_shape_errors() {
        let err = IvError::LengthMismatch {
            field: "current",
            expected: 10,
            found: 9,
        };
        assert_eq!(err.class(), ErrorClass::DataShape);
        assert_eq!(
            err.to_string(),
            "Sweep array 'current' has 9 entries, expected 10"
        );
        assert_eq!(IvError::EmptySweep.class(), ErrorClass::DataShape);
    }

    #[test]
    fn wraps_io_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: IvError = io.into();
        assert_eq!(err.class(), ErrorClass::Io);
    }
}
