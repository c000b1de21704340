//! Refresh-rate sampling
//!
//! Takes a burst of very short frequency samples with jittered integration
//! times and hands the timestamped stream to
//! [`i1d3_core::refresh::analyze`]. The jitter keeps the sample clock from
//! locking onto the display's refresh and aliasing it away.

use std::time::{Duration, Instant};

use i1d3_core::constants::{integration, refresh};
use i1d3_core::{QuietGuard, RefreshSample, Session};
use i1d3_types::RefreshEstimate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::device::Colorimeter;
use crate::error::{Error, Result};
use crate::hooks::BackgroundPoller;

/// Quiet mode for the duration of a sampling burst
///
/// Suppresses per-exchange tracing and pauses the background poller; both
/// are restored when dropped.
pub(crate) struct QuietMode<'a> {
    _guard: QuietGuard,
    poller: Option<&'a dyn BackgroundPoller>,
}

impl<'a> QuietMode<'a> {
    pub(crate) fn engage(session: &Session, poller: Option<&'a dyn BackgroundPoller>) -> Self {
        if let Some(poller) = poller {
            poller.pause();
        }
        Self {
            _guard: session.quiet(),
            poller,
        }
    }
}

impl Drop for QuietMode<'_> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller {
            poller.resume();
        }
    }
}

impl Colorimeter {
    /// Detect the display's refresh modulation
    ///
    /// The estimate is made once per measurement mode and cached in the
    /// session; later calls return the cached value until
    /// [`set_geometry`](Self::set_geometry) invalidates it.
    pub fn estimate_refresh(&self) -> Result<RefreshEstimate> {
        if let Some(estimate) = self.session().refresh() {
            return Ok(estimate);
        }

        self.ensure_unlocked()?;

        let samples = {
            let _quiet = QuietMode::engage(self.session(), self.poller());
            self.sample_refresh()?
        };

        let estimate = i1d3_core::refresh::analyze(&samples);
        info!(%estimate, samples = samples.len(), "refresh estimate");
        Ok(self.session().set_refresh(estimate))
    }

    fn sample_refresh(&self) -> Result<Vec<RefreshSample>> {
        let mut rng = StdRng::from_entropy();
        let limit = Duration::from_secs_f64(refresh::MAX_DURATION);
        let jitter = integration::REFRESH_JITTER;

        let mut samples = Vec::with_capacity(refresh::MAX_SAMPLES);
        let start = Instant::now();

        while samples.len() < refresh::MAX_SAMPLES && start.elapsed() < limit {
            if self.is_aborted() {
                return Err(Error::Aborted);
            }

            let target = integration::REFRESH_SAMPLE * (1.0 + rng.gen_range(-jitter..=jitter));

            let before = start.elapsed();
            let sample = self.measure_frequency(target)?;
            let after = start.elapsed();

            samples.push(RefreshSample {
                timestamp: (before + (after - before) / 2).as_secs_f64(),
                int_time: sample.actual_time,
                counts: sample.counts,
            });
        }

        debug!(
            samples = samples.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "refresh sampling done"
        );
        Ok(samples)
    }
}
