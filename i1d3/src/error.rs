//! High-level error types

use i1d3_core::Command;
use i1d3_types::{CalibrationKind, Channel};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] i1d3_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] i1d3_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] i1d3_types::Error),

    /// Request could not be written even after resynchronizing
    #[error("Communication failure on {command}: {source}")]
    CommsFailure {
        command: Command,
        #[source]
        source: i1d3_transport::Error,
    },

    #[error("Too bright: {channel:?} channel at {hz:.0} Hz")]
    TooBright { channel: Channel, hz: f64 },

    /// A human must put the instrument into position first
    #[error("Manual setup needed for {0} calibration")]
    NeedsManualSetup(CalibrationKind),

    #[error("No unlock key accepted for product {0:?}")]
    UnknownKey(String),

    #[error("Operation aborted")]
    Aborted,
}

impl Error {
    /// Check if the error came from the instrument or the link to it
    pub fn is_hardware(&self) -> bool {
        match self {
            Self::Core(e) => e.is_protocol(),
            Self::Transport(_) | Self::CommsFailure { .. } => true,
            _ => false,
        }
    }

    /// Check if the caller may fix the situation and retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_recoverable(),
            Self::Transport(e) => !e.is_fatal(),
            Self::NeedsManualSetup(_) | Self::Aborted => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let bad_status = Error::from(i1d3_core::Error::BadStatus {
            command: Command::GetLocked,
            status: 0x01,
        });
        assert!(bad_status.is_hardware());
        assert!(bad_status.is_recoverable());

        let internal = Error::from(i1d3_core::Error::Internal("broken invariant".into()));
        assert!(!internal.is_hardware());
        assert!(!internal.is_recoverable());

        let setup = Error::NeedsManualSetup(CalibrationKind::Dark);
        assert!(!setup.is_hardware());
        assert!(setup.is_recoverable());
        assert_eq!(setup.to_string(), "Manual setup needed for dark calibration");

        let gone = Error::from(i1d3_transport::Error::Disconnected);
        assert!(gone.is_hardware());
        assert!(!gone.is_recoverable());
    }
}
