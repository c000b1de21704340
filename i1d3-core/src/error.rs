//! Error types for i1d3-core

use crate::command::Command;

/// Result type alias for i1d3 protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame is not exactly 64 bytes
    #[error("Bad frame length: expected {expected} bytes, got {actual} bytes")]
    BadLength {
        expected: usize,
        actual: usize,
    },
    
    /// Device reported a non-zero status byte
    #[error("Device returned status 0x{status:02X} for {command}")]
    BadStatus {
        command: Command,
        status: u8,
    },
    
    /// Response did not echo the expected command byte
    #[error("Bad echoed command for {command}: expected 0x{expected:02X}, got 0x{actual:02X}")]
    BadEcho {
        command: Command,
        expected: u8,
        actual: u8,
    },
    
    /// Unknown command code
    #[error("Unknown command code: 0x{0:04X}")]
    UnknownCommand(u16),
    
    /// Field does not fit in the frame
    #[error("Field of {len} bytes at offset {offset} exceeds frame of {frame} bytes")]
    FieldOutOfRange {
        offset: usize,
        len: usize,
        frame: usize,
    },
    
    /// Payload too large for a request frame
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },
    
    /// Invariant broken inside the driver rather than on the device
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is recoverable (caller may re-arm calibration and retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BadLength { .. }
                | Self::BadStatus { .. }
                | Self::BadEcho { .. }
        )
    }
    
    /// Check if error originated in the instrument's answer
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::BadLength { .. }
                | Self::BadStatus { .. }
                | Self::BadEcho { .. }
                | Self::UnknownCommand(_)
        )
    }
}
