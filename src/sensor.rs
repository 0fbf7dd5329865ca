//! Sensor identity parsed from an ATLAS ITk serial number.
//!
//! Serial numbers look like `20UPGS81234567`. Three fixed positions carry everything the
//! IV analysis needs to know about the tile:
//!
//! - index 6: fabrication family (3D or planar), size class and wafer thickness
//! - index 7: vendor digit, only consulted for 3D diode test structures
//! - index 8: tile multiplicity / structure code, which selects the area
//!
//! [`SensorIdentity::parse`] validates the string once and decodes these positions into
//! typed values; everything downstream matches on the enums instead of slicing strings.

use crate::error::{AppResult, IvError};
use serde::{Deserialize, Serialize};
use std::fmt;

const FAMILY_INDEX: usize = 6;
const VENDOR_INDEX: usize = 7;
const AREA_CODE_INDEX: usize = 8;

/// Sensor fabrication technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorFamily {
    /// 3D sensors (columnar electrodes etched through the bulk).
    ThreeD,
    /// Planar sensors.
    Planar,
}

impl fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorFamily::ThreeD => write!(f, "3D"),
            SensorFamily::Planar => write!(f, "planar"),
        }
    }
}

/// Tile size class, independent of the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeClass {
    /// Half-size tile.
    Half,
    /// Full-size tile, including the inner-layer 3D tiles coded 0, 1 and 3.
    Full,
    /// Test structure (diodes and other small pads).
    Test,
    /// The family character does not encode a size.
    Unclassified,
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SizeClass::Half => "Half",
            SizeClass::Full => "Full",
            SizeClass::Test => "Test",
            SizeClass::Unclassified => "Unclassified",
        };
        write!(f, "{name}")
    }
}

/// Planar wafer thickness bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Thickness {
    /// 100 µm active thickness.
    Um100,
    /// 150 µm active thickness.
    Um150,
    /// Not encoded in the serial number.
    Unknown,
}

/// Sensor area categories of the lookup table, in cm².
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AreaCategory {
    /// Half-size single tile, 1.92 cm².
    HalfSingle,
    /// Full-size single tile, 3.84 cm².
    FullSingle,
    /// Half-size double tile, 3.86 cm².
    HalfDouble,
    /// Full-size double tile, 7.73 cm².
    FullDouble,
    /// Quad tile, 15.52 cm².
    Quad,
    /// 3D diode with 1600 pixels (vendor digits 2 and 7), 0.04 cm².
    Diode3dSmall,
    /// 3D diode of the vendor coded 2 at index 6, 0.0625 cm².
    Diode3dLarge,
    /// Planar diode, 0.25 cm².
    PlanarDiode,
}

impl AreaCategory {
    /// Area in cm².
    pub fn cm2(self) -> f64 {
        match self {
            AreaCategory::HalfSingle => 1.92,
            AreaCategory::FullSingle => 3.84,
            AreaCategory::HalfDouble => 3.86,
            AreaCategory::FullDouble => 7.73,
            AreaCategory::Quad => 15.52,
            AreaCategory::Diode3dSmall => 0.04,
            AreaCategory::Diode3dLarge => 0.0625,
            AreaCategory::PlanarDiode => 0.25,
        }
    }
}

/// Decoded view of a sensor serial number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorIdentity {
    serial: String,
    family_code: char,
    vendor_code: char,
    area_code: char,
}

impl SensorIdentity {
    /// Parse and validate a serial number.
    ///
    /// Surrounding whitespace is ignored. The string must hold at least nine ASCII
    /// alphanumeric characters so that every decoded position exists.
    pub fn parse(serial: &str) -> AppResult<Self> {
        let serial = serial.trim();
        let valid = serial.len() > AREA_CODE_INDEX
            && serial.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(IvError::InvalidSerialNumber(serial.to_string()));
        }

        // ASCII checked above, so byte indexing is char indexing
        let bytes = serial.as_bytes();
        Ok(Self {
            serial: serial.to_string(),
            family_code: bytes[FAMILY_INDEX] as char,
            vendor_code: bytes[VENDOR_INDEX] as char,
            area_code: bytes[AREA_CODE_INDEX] as char,
        })
    }

    /// The serial number as given (trimmed).
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Family character at index 6.
    pub fn family_code(&self) -> char {
        self.family_code
    }

    /// Area code character at index 8.
    pub fn area_code(&self) -> char {
        self.area_code
    }

    /// 3D or planar.
    pub fn family(&self) -> SensorFamily {
        match self.family_code {
            'G' | 'H' | 'I' | 'J' | 'V' | 'W' => SensorFamily::ThreeD,
            _ => SensorFamily::Planar,
        }
    }

    /// Half, full or test structure.
    pub fn size_class(&self) -> SizeClass {
        match self.family_code {
            '6' | '7' | 'G' | 'H' => SizeClass::Half,
            '8' | '9' | 'I' | 'J' => SizeClass::Full,
            '0' | '1' | '3' => SizeClass::Full,
            'T' | 'U' | 'V' | 'W' => SizeClass::Test,
            _ => SizeClass::Unclassified,
        }
    }

    /// Planar wafer thickness.
    pub fn thickness(&self) -> Thickness {
        match self.family_code {
            '6' | '8' | '2' | 'T' => Thickness::Um100,
            '7' | '9' | '3' | 'U' => Thickness::Um150,
            _ => Thickness::Unknown,
        }
    }

    /// Look up the area category, first match wins.
    ///
    /// Returns `None` when the combination is not in the table.
    pub fn area_category(&self) -> Option<AreaCategory> {
        let size = self.size_class();
        match (size, self.area_code) {
            (SizeClass::Half, '1') => Some(AreaCategory::HalfSingle),
            (SizeClass::Full, '1') => Some(AreaCategory::FullSingle),
            (SizeClass::Half, '2') => Some(AreaCategory::HalfDouble),
            (SizeClass::Full, '2') => Some(AreaCategory::FullDouble),
            (_, '3') => Some(AreaCategory::Quad),
            (_, '9') if matches!(self.vendor_code, '2' | '7') => Some(AreaCategory::Diode3dSmall),
            (_, '9') if self.family_code == '2' => Some(AreaCategory::Diode3dLarge),
            (_, '4') => Some(AreaCategory::PlanarDiode),
            _ => None,
        }
    }

    /// Resolve the sensor area in cm².
    ///
    /// An explicit override always wins. Without one, the lookup table must know the
    /// serial number, otherwise [`IvError::UnresolvedArea`] is returned.
    pub fn resolve_area(&self, area_override: Option<f64>) -> AppResult<f64> {
        if let Some(area) = area_override {
            if !area.is_finite() || area <= 0.0 {
                return Err(IvError::InvalidArea(area));
            }
            return Ok(area);
        }

        self.area_category()
            .map(AreaCategory::cm2)
            .ok_or_else(|| IvError::UnresolvedArea {
                serial: self.serial.clone(),
                size: self.size_class().to_string(),
                code: self.area_code,
            })
    }
}

impl fmt::Display for SensorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(family: char, vendor: char, code: char) -> SensorIdentity {
        SensorIdentity::parse(&format!("20UPGS{family}{vendor}{code}00001")).unwrap()
    }

    #[test]
    fn test_rejects_short_or_garbled_serials() {
        assert!(SensorIdentity::parse("20UPGS81").is_err());
        assert!(SensorIdentity::parse("").is_err());
        assert!(SensorIdentity::parse("20UPGS8-100001").is_err());
        assert!(SensorIdentity::parse("20UPGSé100001").is_err());
        assert!(SensorIdentity::parse("  20UPGS81100001 ").is_ok());
    }

    #[test]
    fn test_family_classification() {
        for c in ['G', 'H', 'I', 'J', 'V', 'W'] {
            assert_eq!(id(c, '0', '1').family(), SensorFamily::ThreeD, "{c}");
        }
        for c in ['0', '6', '7', '8', '9', 'T', 'U', 'A'] {
            assert_eq!(id(c, '0', '1').family(), SensorFamily::Planar, "{c}");
        }
    }

    #[test]
    fn test_size_classification() {
        assert_eq!(id('6', '0', '1').size_class(), SizeClass::Half);
        assert_eq!(id('H', '0', '1').size_class(), SizeClass::Half);
        assert_eq!(id('9', '0', '1').size_class(), SizeClass::Full);
        assert_eq!(id('I', '0', '1').size_class(), SizeClass::Full);
        assert_eq!(id('0', '0', '1').size_class(), SizeClass::Full);
        assert_eq!(id('3', '0', '1').size_class(), SizeClass::Full);
        assert_eq!(id('V', '0', '1').size_class(), SizeClass::Test);
        assert_eq!(id('U', '0', '1').size_class(), SizeClass::Test);
        assert_eq!(id('2', '0', '1').size_class(), SizeClass::Unclassified);
    }

    #[test]
    fn test_thickness_buckets() {
        assert_eq!(id('8', '0', '1').thickness(), Thickness::Um100);
        assert_eq!(id('2', '0', '1').thickness(), Thickness::Um100);
        assert_eq!(id('9', '0', '1').thickness(), Thickness::Um150);
        assert_eq!(id('U', '0', '1').thickness(), Thickness::Um150);
        assert_eq!(id('0', '0', '1').thickness(), Thickness::Unknown);
        assert_eq!(id('G', '0', '1').thickness(), Thickness::Unknown);
    }

    #[test]
    fn test_area_table() {
        let cases = [
            (('6', '0', '1'), 1.92),
            (('8', '0', '1'), 3.84),
            (('7', '0', '2'), 3.86),
            (('J', '0', '2'), 7.73),
            (('T', '0', '3'), 15.52),
            (('V', '2', '9'), 0.04),
            (('W', '7', '9'), 0.04),
            (('2', '0', '9'), 0.0625),
            (('T', '0', '4'), 0.25),
        ];
        for ((family, vendor, code), area) in cases {
            let sensor = id(family, vendor, code);
            assert_eq!(sensor.resolve_area(None).unwrap(), area, "{sensor}");
        }
    }

    #[test]
    fn test_vendor_digit_takes_precedence_for_diodes() {
        // both diode rules match; the vendor rule is listed first
        assert_eq!(
            id('2', '7', '9').area_category(),
            Some(AreaCategory::Diode3dSmall)
        );
    }

    #[test]
    fn test_unknown_area_requires_override() {
        let sensor = id('T', '0', '1');
        let err = sensor.resolve_area(None).unwrap_err();
        assert!(err.needs_caller_input());

        assert_eq!(sensor.resolve_area(Some(0.5)).unwrap(), 0.5);
        assert!(sensor.resolve_area(Some(0.0)).is_err());
        assert!(sensor.resolve_area(Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_override_wins_over_table() {
        assert_eq!(id('8', '0', '1').resolve_area(Some(4.0)).unwrap(), 4.0);
    }
}
