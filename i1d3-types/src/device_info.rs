//! Device identity structures

use std::fmt;

use crate::variant::{SubVariant, Variant};

/// Identity reported by the instrument
///
/// All strings are owned copies of what the firmware returned, so several
/// attached instruments never share description buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Product name (e.g. "i1Display3 ")
    pub product_name: String,

    /// Numeric product type
    pub product_type: u16,

    /// Firmware version string
    pub firmware_version: String,

    /// Firmware build date string
    pub firmware_date: String,

    /// Free-form information string
    pub info: String,

    /// Base variant, known once an unlock key has been accepted
    pub variant: Variant,

    /// OEM sub-variant, known once an unlock key has been accepted
    pub sub_variant: SubVariant,
}

impl DeviceInfo {
    pub fn new(product_name: String, firmware_version: String) -> Self {
        Self {
            product_name,
            product_type: 0,
            firmware_version,
            firmware_date: String::new(),
            info: String::new(),
            variant: Variant::Unknown,
            sub_variant: SubVariant::None,
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[{} ({}/{}), FW: {} {}]",
            self.product_name.trim_end(),
            self.variant,
            self.sub_variant,
            self.firmware_version,
            self.firmware_date
        )
    }
}
