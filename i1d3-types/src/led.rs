//! Indicator LED settings

use std::fmt;

/// Indicator LED behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LedMode {
    #[default]
    Off = 0x00,
    On = 0x01,
    Pulse = 0x03,
}

impl fmt::Display for LedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::On => f.write_str("on"),
            Self::Pulse => f.write_str("pulse"),
        }
    }
}

/// LED pattern as sent to the firmware
///
/// Times are in firmware ticks; `count` is the number of pulses, 0 meaning
/// forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedPattern {
    pub mode: LedMode,
    pub off_ticks: u8,
    pub on_ticks: u8,
    pub count: u8,
}

impl LedPattern {
    /// LED dark, as needed while measuring a dark reference
    pub const OFF: LedPattern = LedPattern {
        mode: LedMode::Off,
        off_ticks: 0,
        on_ticks: 0,
        count: 0,
    };

    /// Pulse `count` times
    pub fn pulse(off_ticks: u8, on_ticks: u8, count: u8) -> Self {
        Self {
            mode: LedMode::Pulse,
            off_ticks,
            on_ticks,
            count,
        }
    }
}
