//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Device not open")]
    NotOpen,
    
    #[error("Device not found (vendor 0x{vendor_id:04X}, product 0x{product_id:04X})")]
    NotFound {
        vendor_id: u16,
        product_id: u16,
    },
    
    #[error("Transfer timed out after {0:?}")]
    Timeout(std::time::Duration),
    
    #[error("Device disconnected")]
    Disconnected,
    
    #[error("Device error: {0}")]
    Device(String),
    
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Check if the transport is gone for good
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotOpen | Self::NotFound { .. } | Self::Disconnected)
    }
}
