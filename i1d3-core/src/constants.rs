//! Protocol constants

/// USB vendor id
pub const VENDOR_ID: u16 = 0x0765;

/// USB product id
pub const PRODUCT_ID: u16 = 0x5020;

/// Sensor reference clock (Hz)
pub const CLOCK_HZ: f64 = 12_000_000.0;

/// Longest frequency integration the firmware accepts (seconds)
pub const MAX_FREQUENCY_TIME: f64 = 20.0;

/// Fewest edges a period measurement can wait for
pub const MIN_PERIOD_EDGES: u32 = 2;

/// Most edges a period measurement can wait for
pub const MAX_PERIOD_EDGES: u32 = 65534;

/// Device-side give-up time of a period measurement that sees no edges
pub const PERIOD_NO_EDGE_TIMEOUT: f64 = 10.0;

/// Raw counts are biased low by half an edge by the sensor's reset logic
pub const COUNT_CORRECTION: f64 = 0.5;

/// Above this many Hz a channel is saturated
pub const SATURATION_HZ: f64 = 100_000.0;

/// Status/payload values with special meaning
pub mod status {
    /// Response status on success
    pub const OK: u8 = 0x00;

    /// Status a period measurement sometimes reports when it saw no edges
    pub const PERIOD_NO_EDGES: u8 = 0x83;

    /// Byte 2 of an accepted unlock response
    pub const UNLOCK_ACCEPTED: u8 = 0x77;
}

/// Integration times (seconds)
pub mod integration {
    /// Default integration time of a reading
    pub const DEFAULT: f64 = 0.2;

    /// Shortest integration time a reading may be configured with
    pub const MINIMUM: f64 = 0.01;

    /// Base integration time of a refresh-detection sample
    pub const REFRESH_SAMPLE: f64 = 0.002;

    /// Relative jitter applied to refresh-detection samples
    pub const REFRESH_JITTER: f64 = 0.4;

    /// Dark reference sample
    pub const DARK: f64 = 1.0;
}

/// Exchange timeouts (seconds)
pub mod timeouts {
    /// Plain queries
    pub const QUERY: f64 = 1.0;

    /// Short read used to discard a stale response
    pub const FLUSH: f64 = 0.1;

    /// Margin added to an integration time
    pub const MEASURE_MARGIN: f64 = 2.0;

    /// Period measurements may wait for the device's own no-edge timeout
    pub const PERIOD: f64 = 20.0;
}

/// Refresh detection limits
pub mod refresh {
    /// Most samples taken
    pub const MAX_SAMPLES: usize = 1300;

    /// Fewest samples worth analysing
    pub const MIN_SAMPLES: usize = 100;

    /// Wall-time cap on sampling (seconds)
    pub const MAX_DURATION: f64 = 6.0;
}

/// EEPROM geometry
pub mod eeprom {
    /// Internal EEPROM size in bytes
    pub const INTERNAL_SIZE: usize = 256;

    /// External EEPROM size in bytes
    pub const EXTERNAL_SIZE: usize = 8192;

    /// Most bytes one internal read returns (data starts at byte 4)
    pub const INTERNAL_CHUNK: usize = 60;

    /// Most bytes one external read returns (data starts at byte 5)
    pub const EXTERNAL_CHUNK: usize = 59;
}
