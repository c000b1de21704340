//! Measurement related types

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// How a reading is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasureMode {
    /// Frequency survey, then period sampling for dim channels
    #[default]
    Adaptive,

    /// A single fixed-period frequency sample
    FrequencyOnly,

    /// Period sampling on every channel
    PeriodOnly,
}

/// Measurement geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Geometry {
    /// Light emitted by a display
    #[default]
    Emissive,

    /// Light passed through a sample
    Transmissive,

    /// Light reflected off a sample
    Reflective,
}

impl Geometry {
    /// Whether readings in this geometry depend on a white reference
    pub fn needs_white_reference(self) -> bool {
        matches!(self, Self::Reflective)
    }

    /// Whether readings in this geometry depend on a dark reference
    pub fn needs_dark_reference(self) -> bool {
        matches!(self, Self::Emissive | Self::Transmissive)
    }
}

impl FromStr for Geometry {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "emissive" | "emission" => Ok(Self::Emissive),
            "transmissive" | "transmission" => Ok(Self::Transmissive),
            "reflective" | "reflection" => Ok(Self::Reflective),
            other => Err(Error::Parse(format!("unknown geometry: {other}"))),
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Emissive => "emissive",
            Self::Transmissive => "transmissive",
            Self::Reflective => "reflective",
        };
        f.write_str(name)
    }
}

/// Which reference a calibration uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationKind {
    White,
    Dark,
}

impl fmt::Display for CalibrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::White => f.write_str("white"),
            Self::Dark => f.write_str("dark"),
        }
    }
}

/// Snapshot of outstanding calibrations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationStatus {
    pub needs_white: bool,
    pub needs_dark: bool,
}

impl CalibrationStatus {
    /// Calibrations that must run before a reading in `geometry`
    pub fn pending_for(self, geometry: Geometry) -> Vec<CalibrationKind> {
        let mut pending = Vec::new();
        if self.needs_white && geometry.needs_white_reference() {
            pending.push(CalibrationKind::White);
        }
        if self.needs_dark && geometry.needs_dark_reference() {
            pending.push(CalibrationKind::Dark);
        }
        pending
    }
}

/// Sensor channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Red = 0,
    Green = 1,
    Blue = 2,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Set of sensor channels, one bit per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelMask(u8);

impl ChannelMask {
    pub const NONE: ChannelMask = ChannelMask(0);
    pub const ALL: ChannelMask = ChannelMask(0b111);

    /// Build a mask from raw bits
    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits & !0b111 != 0 {
            return Err(Error::Validation(format!(
                "channel mask 0x{bits:02X} has bits outside R/G/B"
            )));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, channel: Channel) -> bool {
        self.0 & (1 << channel.index()) != 0
    }

    pub fn with(self, channel: Channel) -> Self {
        Self(self.0 | (1 << channel.index()))
    }

    pub fn without(self, channel: Channel) -> Self {
        Self(self.0 & !(1 << channel.index()))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn channels(self) -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

/// Outcome of refresh-rate estimation
///
/// `rate_hz` is only known when several correlation peaks agree on a common
/// period. `quantization` is the integration-time granularity (seconds) that
/// keeps fixed-period samples aligned with the display's modulation; it can
/// be present without a rate when only one peak was found.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RefreshEstimate {
    pub rate_hz: Option<f64>,
    pub quantization: Option<f64>,
}

impl RefreshEstimate {
    /// No refresh modulation detected
    pub const NONE: RefreshEstimate = RefreshEstimate {
        rate_hz: None,
        quantization: None,
    };
}

impl fmt::Display for RefreshEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.rate_hz, self.quantization) {
            (Some(rate), Some(q)) => write!(f, "{rate:.2} Hz (quantization {:.2} ms)", q * 1e3),
            (None, Some(q)) => write!(f, "unknown rate (quantization {:.2} ms)", q * 1e3),
            _ => f.write_str("no refresh"),
        }
    }
}
