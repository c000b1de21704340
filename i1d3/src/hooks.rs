//! Caller-supplied hooks

use i1d3_types::CalibrationKind;

/// Asks a human to put the instrument into position for a calibration
///
/// Returns `true` once the white reference is in place (white) or the
/// sensor is capped (dark).
pub trait SetupPrompt: Send + Sync {
    fn confirm(&self, kind: CalibrationKind) -> bool;
}

impl<F> SetupPrompt for F
where
    F: Fn(CalibrationKind) -> bool + Send + Sync,
{
    fn confirm(&self, kind: CalibrationKind) -> bool {
        self(kind)
    }
}

/// Background activity that must stand still during timing-critical work
///
/// Paused while refresh-rate sampling runs, resumed afterwards on every
/// exit path.
pub trait BackgroundPoller: Send + Sync {
    fn pause(&self);
    fn resume(&self);
}
