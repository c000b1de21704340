//! Session state for an attached instrument
//!
//! A session lives from attach to detach and tracks:
//! - Identity and the variant tags adopted from the accepted unlock key
//! - Integration times and the sensor clock
//! - Black level and white reference
//! - Refresh estimate of the current mode
//! - Which calibrations are outstanding
//! - Whether quiet mode (no per-exchange tracing) is engaged

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use i1d3_types::{
    CalibrationKind, CalibrationStatus, DeviceInfo, Geometry, RefreshEstimate, SubVariant,
    Variant,
};
use parking_lot::RwLock;
use tracing::debug;

use crate::constants::{integration, CLOCK_HZ, MAX_FREQUENCY_TIME};

/// Session manager
///
/// Thread-safe and can be cloned cheaply (Arc internally). Mutation is
/// last-writer-wins; the exchange lock that serializes traffic to the
/// instrument lives with the transport, not here.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    state: RwLock<SessionState>,

    /// Nesting depth of quiet mode
    quiet: AtomicUsize,

    unlocked: AtomicBool,
}

#[derive(Debug, Clone)]
struct SessionState {
    info: DeviceInfo,
    integration_time: f64,
    black_level: [f64; 3],
    white_reference: Option<[f64; 3]>,
    refresh: Option<RefreshEstimate>,
    calibration: CalibrationStatus,
    geometry: Geometry,
}

impl Session {
    /// Create a fresh session; both calibrations are outstanding
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: RwLock::new(SessionState {
                    info: DeviceInfo::new(String::new(), String::new()),
                    integration_time: integration::DEFAULT,
                    black_level: [0.0; 3],
                    white_reference: None,
                    refresh: None,
                    calibration: CalibrationStatus {
                        needs_white: true,
                        needs_dark: true,
                    },
                    geometry: Geometry::default(),
                }),
                quiet: AtomicUsize::new(0),
                unlocked: AtomicBool::new(false),
            }),
        }
    }

    /// Sensor reference clock in Hz
    pub fn clock_hz(&self) -> f64 {
        CLOCK_HZ
    }

    /// Identity as last queried
    pub fn device_info(&self) -> DeviceInfo {
        self.inner.state.read().info.clone()
    }

    /// Store identity strings, keeping variant tags already adopted
    pub fn set_device_info(&self, mut info: DeviceInfo) {
        let mut state = self.inner.state.write();
        info.variant = state.info.variant;
        info.sub_variant = state.info.sub_variant;
        state.info = info;
    }

    pub fn variant(&self) -> (Variant, SubVariant) {
        let state = self.inner.state.read();
        (state.info.variant, state.info.sub_variant)
    }

    /// Record a successful unlock
    ///
    /// Adopts the key's variant tags and re-arms both calibrations.
    pub fn mark_unlocked(&self, variant: Variant, sub_variant: SubVariant) {
        let mut state = self.inner.state.write();
        state.info.variant = variant;
        state.info.sub_variant = sub_variant;
        state.calibration = CalibrationStatus {
            needs_white: true,
            needs_dark: true,
        };
        self.inner.unlocked.store(true, Ordering::Release);
        debug!(%variant, %sub_variant, "session unlocked");
    }

    pub fn is_unlocked(&self) -> bool {
        self.inner.unlocked.load(Ordering::Acquire)
    }

    /// Current integration time (seconds)
    pub fn integration_time(&self) -> f64 {
        self.inner.state.read().integration_time
    }

    /// Set the integration time, clamped to [minimum, 20 s]
    ///
    /// Returns the value actually stored.
    pub fn set_integration_time(&self, seconds: f64) -> f64 {
        let clamped = seconds.clamp(self.min_integration_time(), MAX_FREQUENCY_TIME);
        self.inner.state.write().integration_time = clamped;
        clamped
    }

    /// Integration time a fresh session starts with
    pub fn default_integration_time(&self) -> f64 {
        integration::DEFAULT
    }

    /// Shortest integration time the sensor is driven at
    pub fn min_integration_time(&self) -> f64 {
        integration::MINIMUM
    }

    /// Per-channel black level in Hz
    pub fn black_level(&self) -> [f64; 3] {
        self.inner.state.read().black_level
    }

    pub fn set_black_level(&self, level: [f64; 3]) {
        self.inner.state.write().black_level = level;
    }

    /// Per-channel counts of the white reference, if calibrated
    pub fn white_reference(&self) -> Option<[f64; 3]> {
        self.inner.state.read().white_reference
    }

    pub fn set_white_reference(&self, counts: [f64; 3]) {
        self.inner.state.write().white_reference = Some(counts);
    }

    /// Refresh estimate of the current mode, if one was made
    pub fn refresh(&self) -> Option<RefreshEstimate> {
        self.inner.state.read().refresh
    }

    /// Quantization period of the current mode, if the display modulates
    pub fn refresh_quantization(&self) -> Option<f64> {
        self.refresh().and_then(|r| r.quantization)
    }

    /// Store the refresh estimate of the current mode
    ///
    /// The estimate is kept until the next mode change; a second store in
    /// the same mode is ignored.
    pub fn set_refresh(&self, estimate: RefreshEstimate) -> RefreshEstimate {
        let mut state = self.inner.state.write();
        *state.refresh.get_or_insert(estimate)
    }

    pub fn calibration_status(&self) -> CalibrationStatus {
        self.inner.state.read().calibration
    }

    /// Re-arm both calibrations
    pub fn request_calibration(&self) {
        self.inner.state.write().calibration = CalibrationStatus {
            needs_white: true,
            needs_dark: true,
        };
    }

    /// Mark a calibration as current
    pub fn calibration_done(&self, kind: CalibrationKind) {
        let mut state = self.inner.state.write();
        match kind {
            CalibrationKind::White => state.calibration.needs_white = false,
            CalibrationKind::Dark => state.calibration.needs_dark = false,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.inner.state.read().geometry
    }

    /// Switch measurement mode
    ///
    /// Invalidates the refresh estimate and re-arms both calibrations.
    pub fn set_geometry(&self, geometry: Geometry) {
        let mut state = self.inner.state.write();
        state.geometry = geometry;
        state.refresh = None;
        state.calibration = CalibrationStatus {
            needs_white: true,
            needs_dark: true,
        };
    }

    /// Engage quiet mode until the returned guard drops
    pub fn quiet(&self) -> QuietGuard {
        self.inner.quiet.fetch_add(1, Ordering::AcqRel);
        QuietGuard {
            session: self.clone(),
        }
    }

    /// Whether per-exchange tracing is suppressed
    pub fn is_quiet(&self) -> bool {
        self.inner.quiet.load(Ordering::Acquire) > 0
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps quiet mode engaged while alive
#[derive(Debug)]
pub struct QuietGuard {
    session: Session,
}

impl Drop for QuietGuard {
    fn drop(&mut self) {
        self.session.inner.quiet.fetch_sub(1, Ordering::AcqRel);
    }
}
