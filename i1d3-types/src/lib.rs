//! Type definitions for i1d3

pub mod device_info;
pub mod error;
pub mod led;
pub mod measure;
pub mod variant;

pub use device_info::DeviceInfo;
pub use error::{Error, Result};
pub use led::{LedMode, LedPattern};
pub use measure::{
    CalibrationKind, CalibrationStatus, Channel, ChannelMask, Geometry, MeasureMode,
    RefreshEstimate,
};
pub use variant::{SubVariant, Variant};
