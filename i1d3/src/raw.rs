//! Raw measurement primitives
//!
//! The sensor converts light to edges. It can either count edges over a
//! fixed number of clock ticks (frequency mode) or count clock ticks until a
//! number of edges has been seen (period mode). Everything else is built on
//! these two exchanges.

use std::time::Duration;

use i1d3_core::codec::LittleEndian;
use i1d3_core::constants::{
    timeouts, COUNT_CORRECTION, MAX_FREQUENCY_TIME, MAX_PERIOD_EDGES, MIN_PERIOD_EDGES,
};
use i1d3_core::packet::RequestFrame;
use i1d3_core::Command;
use i1d3_types::{Channel, ChannelMask};
use tracing::debug;

use crate::device::Colorimeter;
use crate::error::Result;

/// Edges counted over a fixed integration time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencySample {
    /// Integration time actually used (seconds)
    pub actual_time: f64,

    /// Per-channel counts, reset bias already corrected
    pub counts: [f64; 3],
}

impl FrequencySample {
    /// Per-channel frequency
    ///
    /// A channel that counted no edges reads 0 Hz. The reset bias is only
    /// present once an edge has been seen, so the correction alone is not
    /// light.
    pub fn hz(&self) -> [f64; 3] {
        self.counts.map(|c| {
            if c <= COUNT_CORRECTION {
                0.0
            } else {
                c / self.actual_time
            }
        })
    }
}

/// Clock ticks counted while waiting for a number of edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodSample {
    /// Edges requested per channel (0 where masked out)
    pub edges: [u32; 3],

    ticks: [u32; 3],
}

impl PeriodSample {
    pub fn new(edges: [u32; 3], ticks: [u32; 3]) -> Self {
        Self { edges, ticks }
    }

    /// Ticks taken, or `None` if the channel saw no edges before the device
    /// gave up (or was not measured)
    pub fn ticks(&self, channel: Channel) -> Option<u32> {
        match self.ticks[channel.index()] {
            0 => None,
            t => Some(t),
        }
    }

    /// Channel frequency, if the channel completed
    pub fn hz(&self, channel: Channel, clock_hz: f64) -> Option<f64> {
        let edges = self.edges[channel.index()];
        self.ticks(channel)
            .filter(|_| edges > 0)
            .map(|t| edges as f64 * clock_hz / t as f64)
    }
}

/// Whole clock ticks for a frequency measurement of `target` seconds
///
/// The target is clamped to the firmware limit; at least one tick is
/// always requested.
pub fn frequency_clocks(target: f64, clock_hz: f64) -> u32 {
    let target = target.clamp(0.0, MAX_FREQUENCY_TIME);
    let clocks = (target * clock_hz).round();
    if clocks.is_nan() || clocks < 1.0 {
        1
    } else {
        clocks as u32
    }
}

/// Edge target the firmware will accept: within [2, 65534] and even
pub fn edge_target(edges: f64) -> u16 {
    if edges.is_nan() {
        return MIN_PERIOD_EDGES as u16;
    }
    let clamped = edges
        .floor()
        .clamp(MIN_PERIOD_EDGES as f64, MAX_PERIOD_EDGES as f64) as u16;
    clamped & !1
}

impl Colorimeter {
    /// Count edges on all channels for about `target` seconds
    pub fn measure_frequency(&self, target: f64) -> Result<FrequencySample> {
        let clock_hz = self.session().clock_hz();
        let clocks = frequency_clocks(target, clock_hz);
        let actual_time = clocks as f64 / clock_hz;

        let packet = RequestFrame::new(Command::MeasureFrequency)
            .u32::<LittleEndian>(1, clocks)?
            .build()?;
        let timeout = Duration::from_secs_f64(actual_time + timeouts::MEASURE_MARGIN);
        let response = self.exchange_with(&packet, timeout)?;

        let mut counts = [0.0; 3];
        for channel in Channel::ALL {
            let i = channel.index();
            counts[i] = response.u32::<LittleEndian>(2 + 4 * i)? as f64 + COUNT_CORRECTION;
        }

        if !self.session().is_quiet() {
            debug!(clocks, ?counts, "frequency sample");
        }

        Ok(FrequencySample {
            actual_time,
            counts,
        })
    }

    /// Count clock ticks until each selected channel has seen its edges
    ///
    /// Edge targets are clamped to [2, 65534] and rounded down to even.
    /// Channels outside `mask` are not measured.
    pub fn measure_period(&self, edges: [u32; 3], mask: ChannelMask) -> Result<PeriodSample> {
        let mut requested = [0u32; 3];
        let mut frame = RequestFrame::new(Command::MeasurePeriod);
        for channel in mask.channels() {
            let i = channel.index();
            let target = edge_target(edges[i] as f64);
            requested[i] = target as u32;
            frame = frame.u16::<LittleEndian>(1 + 2 * i, target)?;
        }
        let packet = frame.u8(7, mask.bits())?.build()?;

        let response = self.exchange_with(&packet, Duration::from_secs_f64(timeouts::PERIOD))?;

        let mut ticks = [0u32; 3];
        for channel in mask.channels() {
            let i = channel.index();
            ticks[i] = response.u32::<LittleEndian>(2 + 4 * i)?;
        }

        debug!(?requested, ?ticks, no_edges = response.is_no_edge_quirk(), "period sample");

        Ok(PeriodSample::new(requested, ticks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use i1d3_core::constants::CLOCK_HZ;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_frequency_clocks() {
        assert_eq!(frequency_clocks(0.2, CLOCK_HZ), 2_400_000);
        assert_eq!(frequency_clocks(0.0, CLOCK_HZ), 1);
        assert_eq!(frequency_clocks(-1.0, CLOCK_HZ), 1);
        assert_eq!(frequency_clocks(100.0, CLOCK_HZ), 240_000_000);
        assert_eq!(frequency_clocks(f64::NAN, CLOCK_HZ), 1);
    }

    #[test]
    fn test_edge_target() {
        assert_eq!(edge_target(0.0), 2);
        assert_eq!(edge_target(7.9), 6);
        assert_eq!(edge_target(8.0), 8);
        assert_eq!(edge_target(1e9), 65534);
        assert_eq!(edge_target(f64::NAN), 2);
    }

    #[test]
    fn test_period_sample_timeout_is_unknown() {
        let sample = PeriodSample::new([2, 100, 0], [0, 1_200_000, 0]);
        assert_eq!(sample.ticks(Channel::Red), None);
        assert_eq!(sample.hz(Channel::Red, CLOCK_HZ), None);
        assert_eq!(sample.hz(Channel::Green, CLOCK_HZ), Some(1000.0));
        assert_eq!(sample.hz(Channel::Blue, CLOCK_HZ), None);
    }

    #[test]
    fn test_frequency_sample_hz() {
        let sample = FrequencySample {
            actual_time: 0.5,
            counts: [100.5, 0.5, 50.5],
        };
        assert_eq!(sample.hz(), [201.0, 0.0, 101.0]);
    }

    #[test]
    fn test_no_edges_is_independent_of_integration_time() {
        for actual_time in [0.01, 0.2, 1.0] {
            let sample = FrequencySample {
                actual_time,
                counts: [COUNT_CORRECTION; 3],
            };
            assert_eq!(sample.hz(), [0.0; 3]);
        }
    }

    proptest! {
        #[test]
        fn prop_frequency_time_within_one_tick(target in 1e-6f64..=20.0) {
            let clocks = frequency_clocks(target, CLOCK_HZ);
            let actual = clocks as f64 / CLOCK_HZ;
            prop_assert!(clocks >= 1);
            prop_assert!(actual <= target + 1.0 / CLOCK_HZ);
            prop_assert!((actual - target).abs() <= 1.0 / CLOCK_HZ);
        }

        #[test]
        fn prop_edge_target_in_range_and_even(edges in -1e6f64..1e6) {
            let target = edge_target(edges) as u32;
            prop_assert!((MIN_PERIOD_EDGES..=MAX_PERIOD_EDGES).contains(&target));
            prop_assert_eq!(target % 2, 0);
            if edges >= MIN_PERIOD_EDGES as f64 {
                prop_assert!(target as f64 <= edges);
            }
        }
    }
}
