//! # i1d3
//!
//! Driver for i1Display Pro family USB colorimeters.
//!
//! ## Features
//!
//! - Blocking, thread-safe device facade with one exchange in flight
//! - Challenge/response unlock against a caller-supplied key table
//! - White and dark calibration tracking
//! - Refresh-rate detection for modulated displays
//! - Adaptive frequency/period measurement for dim and bright light
//!
//! ## Quick Start
//!
//! ```no_run
//! use i1d3::{CalibrationKind, Colorimeter, Geometry, MeasureMode, ScriptedTransport};
//!
//! fn main() -> i1d3::Result<()> {
//!     // Any `Transport` works; enable the `hid` feature for real hardware
//!     let colorimeter = Colorimeter::new(ScriptedTransport::new())
//!         .with_setup_prompt(|_: CalibrationKind| true);
//!
//!     let info = colorimeter.attach()?;
//!     println!("{}", info);
//!
//!     colorimeter.set_geometry(Geometry::Emissive);
//!     let hz = colorimeter.measure(MeasureMode::Adaptive)?;
//!     println!("R {:.2} Hz, G {:.2} Hz, B {:.2} Hz", hz[0], hz[1], hz[2]);
//!
//!     Ok(())
//! }
//! ```

pub mod adaptive;
pub mod channel;
pub mod device;
pub mod error;
pub mod hooks;
pub mod raw;
pub mod refresh;

#[cfg(test)]
mod fake;

// Re-exports
pub use adaptive::{MeasureConfig, RawSource, ReadingPlan, Stage};
pub use channel::CommandChannel;
pub use device::Colorimeter;
pub use error::{Error, Result};
pub use hooks::{BackgroundPoller, SetupPrompt};
pub use raw::{edge_target, frequency_clocks, FrequencySample, PeriodSample};

// Re-export lower layers
pub use i1d3_core::{Command, Packet, Session, UnlockEntry, UnlockKey, UnlockResponder, UnlockTable};
#[cfg(feature = "hid")]
pub use i1d3_transport::HidTransport;
pub use i1d3_transport::{PortKind, ScriptHandle, ScriptedTransport, Transport};
pub use i1d3_types::{
    CalibrationKind, CalibrationStatus, Channel, ChannelMask, DeviceInfo, Geometry, LedMode,
    LedPattern, MeasureMode, RefreshEstimate, SubVariant, Variant,
};
