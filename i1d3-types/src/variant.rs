//! Instrument variants
//!
//! The same hardware ships under several brands. Which one we are talking to
//! is only known once an unlock key is accepted, so both tags start out as
//! unknown.

use std::fmt;

/// Base instrument variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variant {
    #[default]
    Unknown,
    DisplayPro,
    ColorMunkiDisplay,
}

/// OEM sub-variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubVariant {
    #[default]
    None,
    Retail,
    Oem,
    NecSpectraSensorPro,
    QuatoSilverHaze3,
    HpDreamColor,
    WideLib,
    Other(u8),
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::DisplayPro => "i1 DisplayPro",
            Self::ColorMunkiDisplay => "ColorMunki Display",
        };
        f.write_str(name)
    }
}

impl fmt::Display for SubVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Retail => f.write_str("retail"),
            Self::Oem => f.write_str("OEM"),
            Self::NecSpectraSensorPro => f.write_str("NEC SpectraSensor Pro"),
            Self::QuatoSilverHaze3 => f.write_str("Quato Silver Haze 3"),
            Self::HpDreamColor => f.write_str("HP DreamColor"),
            Self::WideLib => f.write_str("Wide Lib"),
            Self::Other(tag) => write!(f, "other({tag})"),
        }
    }
}
