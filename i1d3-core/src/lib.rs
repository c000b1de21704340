//! # i1d3-core
//!
//! Core protocol implementation for i1Display Pro family colorimeters.
//!
//! This crate provides the low-level protocol primitives:
//! - 64-byte request/response framing and validation
//! - Command definitions
//! - Fixed-width wire codec
//! - Session state (identity, calibration currency, refresh estimate)
//! - Unlock key table
//! - Refresh-rate analysis of timestamped sample streams

pub mod codec;
pub mod command;
pub mod constants;
pub mod error;
pub mod packet;
pub mod refresh;
pub mod session;
pub mod unlock;

pub use command::Command;
pub use error::{Error, Result};
pub use packet::{Packet, Response};
pub use refresh::RefreshSample;
pub use session::{QuietGuard, Session};
pub use unlock::{UnlockEntry, UnlockKey, UnlockResponder, UnlockTable};

/// Every request and response is exactly this long
pub const FRAME_SIZE: usize = 64;
