//! Transport layer for i1d3 instruments
//!
//! Provides blocking 64-byte frame exchange with the instrument.

pub mod error;
#[cfg(feature = "hid")]
pub mod hid;
pub mod scripted;

pub use error::{Error, Result};
#[cfg(feature = "hid")]
pub use hid::HidTransport;
pub use scripted::{ScriptHandle, ScriptedTransport};

use std::fmt;
use std::time::Duration;

/// Kind of endpoint pair the instrument is attached through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Hid,
    BulkUsb,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hid => f.write_str("HID"),
            Self::BulkUsb => f.write_str("bulk USB"),
        }
    }
}

/// Blocking transport to the instrument
///
/// Implementations move raw bytes only; framing and validation belong to
/// the command channel. Both calls block for at most `timeout`.
pub trait Transport: Send {
    /// Write raw bytes, returning how many were accepted
    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize>;
    
    /// Read raw bytes into `buf`, returning how many arrived
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
    
    /// Endpoint kind
    fn port_kind(&self) -> PortKind;
    
    /// Human readable description for logs
    fn description(&self) -> String;
}
