//! Adaptive measurement controller
//!
//! Turns raw frequency and period samples into one stable reading per
//! channel. Bright channels are served by a plain frequency sample. Dim
//! channels are pre-measured by period to learn roughly how fast they tick,
//! then measured again with edge targets sized to hit the target integration
//! time, stretched toward 8x for very dim light and aligned to the display's
//! refresh quantization.
//!
//! The controller is a state machine over [`Stage`]:
//!
//! ```text
//! Survey -> PreMeasure -> Tighten -> ComputeTargets -> FinalFrequency -> Finish
//!                                                   \-> FinalPeriod    -/
//! ```

use std::fmt;

use i1d3_core::constants::{integration, MAX_FREQUENCY_TIME, SATURATION_HZ};
use i1d3_types::{Channel, ChannelMask, MeasureMode};
use tracing::{debug, warn};

use crate::device::Colorimeter;
use crate::error::{Error, Result};
use crate::raw::{edge_target, FrequencySample, PeriodSample};

/// Source of raw samples
///
/// Implemented by [`Colorimeter`]; tests drive the controller with a
/// synthetic light source instead.
pub trait RawSource {
    fn measure_frequency(&self, target: f64) -> Result<FrequencySample>;

    fn measure_period(&self, edges: [u32; 3], mask: ChannelMask) -> Result<PeriodSample>;

    /// Sensor reference clock in Hz
    fn clock_hz(&self) -> f64;

    /// Whether the caller wants the reading abandoned
    fn aborted(&self) -> bool {
        false
    }
}

impl RawSource for Colorimeter {
    fn measure_frequency(&self, target: f64) -> Result<FrequencySample> {
        Colorimeter::measure_frequency(self, target)
    }

    fn measure_period(&self, edges: [u32; 3], mask: ChannelMask) -> Result<PeriodSample> {
        Colorimeter::measure_period(self, edges, mask)
    }

    fn clock_hz(&self) -> f64 {
        self.session().clock_hz()
    }

    fn aborted(&self) -> bool {
        self.is_aborted()
    }
}

/// Tunables of the adaptive controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureConfig {
    /// Integration time a dim channel's edge target aims for (seconds)
    pub target_time: f64,

    /// Target time multiplier on displays with refresh modulation
    pub refresh_time_factor: f64,

    /// Survey counts below which a channel is imprecise
    pub imprecise_counts: f64,

    /// Survey counts below which a channel needs a period pre-measurement
    pub premeasure_counts: f64,

    /// Largest edge target inflation for the dimmest channels
    pub max_inflation: f64,

    /// Edge targets at or above which a refresh-aligned frequency sample
    /// replaces period sampling
    pub frequency_edges: u32,

    /// Raw frequency above which a channel is saturated (Hz)
    pub saturation_hz: f64,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            target_time: integration::DEFAULT,
            refresh_time_factor: 2.0,
            imprecise_counts: 200.0,
            premeasure_counts: 10.0,
            max_inflation: 8.0,
            frequency_edges: 100,
            saturation_hz: SATURATION_HZ,
        }
    }
}

/// What one reading starts from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingPlan {
    pub mode: MeasureMode,

    /// Integration time of the survey sample (seconds)
    pub integration_time: f64,

    /// Refresh quantization period, if the display modulates
    pub quantization: Option<f64>,

    /// Per-channel black level to subtract (Hz)
    pub black_level: [f64; 3],
}

/// Controller stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Survey,
    PreMeasure,
    Tighten,
    ComputeTargets,
    FinalFrequency,
    FinalPeriod,
    Finish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Survey => "survey",
            Self::PreMeasure => "pre-measure",
            Self::Tighten => "tighten",
            Self::ComputeTargets => "compute-targets",
            Self::FinalFrequency => "final-frequency",
            Self::FinalPeriod => "final-period",
            Self::Finish => "finish",
        };
        f.write_str(name)
    }
}

/// Take one reading from `source`, returning black-corrected Hz per channel
pub fn measure<S: RawSource + ?Sized>(
    source: &S,
    config: &MeasureConfig,
    plan: &ReadingPlan,
) -> Result<[f64; 3]> {
    Controller::new(source, config, plan).run()
}

struct Controller<'a, S: ?Sized> {
    source: &'a S,
    config: &'a MeasureConfig,
    plan: &'a ReadingPlan,

    /// Best estimate so far (raw Hz)
    hz: [f64; 3],

    /// Survey counts
    counts: [f64; 3],

    /// Channels that need more than the survey
    flagged: ChannelMask,

    /// Edge count of each channel's most recent period sample
    last_edges: [u32; 3],

    /// Final edge targets
    targets: [u32; 3],

    /// Channels whose last period sample already meets its target
    reused: ChannelMask,
}

impl<'a, S: RawSource + ?Sized> Controller<'a, S> {
    fn new(source: &'a S, config: &'a MeasureConfig, plan: &'a ReadingPlan) -> Self {
        Self {
            source,
            config,
            plan,
            hz: [0.0; 3],
            counts: [0.0; 3],
            flagged: ChannelMask::NONE,
            last_edges: [0; 3],
            targets: [0; 3],
            reused: ChannelMask::NONE,
        }
    }

    fn run(mut self) -> Result<[f64; 3]> {
        let mut stage = match self.plan.mode {
            MeasureMode::PeriodOnly => {
                self.flagged = ChannelMask::ALL;
                Stage::PreMeasure
            }
            _ => Stage::Survey,
        };

        loop {
            if self.source.aborted() {
                debug!(%stage, "reading aborted");
                return Err(Error::Aborted);
            }

            debug!(%stage, flagged = self.flagged.bits(), "adaptive stage");

            stage = match stage {
                Stage::Survey => self.survey()?,
                Stage::PreMeasure => self.pre_measure()?,
                Stage::Tighten => self.tighten()?,
                Stage::ComputeTargets => self.compute_targets(),
                Stage::FinalFrequency => self.final_frequency()?,
                Stage::FinalPeriod => self.final_period()?,
                Stage::Finish => return self.finish(),
            };
        }
    }

    fn survey(&mut self) -> Result<Stage> {
        let sample = self.source.measure_frequency(self.plan.integration_time)?;
        self.counts = sample.counts;
        self.hz = sample.hz();

        if self.plan.mode == MeasureMode::FrequencyOnly || self.saturated().is_some() {
            return Ok(Stage::Finish);
        }

        for channel in Channel::ALL {
            if self.counts[channel.index()] < self.config.imprecise_counts {
                self.flagged = self.flagged.with(channel);
            }
        }

        Ok(if self.flagged.is_empty() {
            Stage::Finish
        } else {
            Stage::PreMeasure
        })
    }

    fn pre_measure(&mut self) -> Result<Stage> {
        let mask = self
            .flagged
            .channels()
            .filter(|c| self.counts[c.index()] < self.config.premeasure_counts)
            .fold(ChannelMask::NONE, ChannelMask::with);

        if !mask.is_empty() {
            let sample = self.source.measure_period([2; 3], mask)?;
            self.absorb(&sample, mask);
        }

        Ok(Stage::Tighten)
    }

    fn tighten(&mut self) -> Result<Stage> {
        let Some(q) = self.plan.quantization else {
            return Ok(Stage::ComputeTargets);
        };

        let mut edges = [0u32; 3];
        let mut mask = ChannelMask::NONE;
        for channel in self.flagged.channels() {
            let per_period = self.hz[channel.index()] * q;
            if per_period > 2.0 {
                edges[channel.index()] = edge_target(per_period) as u32;
                mask = mask.with(channel);
            }
        }

        if !mask.is_empty() {
            let sample = self.source.measure_period(edges, mask)?;
            self.absorb(&sample, mask);
        }

        Ok(Stage::ComputeTargets)
    }

    fn compute_targets(&mut self) -> Stage {
        let q = self.plan.quantization;
        let target_time = match q {
            Some(_) => self.config.target_time * self.config.refresh_time_factor,
            None => self.config.target_time,
        };

        let mut all_large = true;
        for channel in self.flagged.channels() {
            let i = channel.index();
            let hz = self.hz[i];

            let expected = hz * target_time;
            let mut edges = expected * self.inflation(expected);

            if let (Some(q), true) = (q, hz > 0.0) {
                let periods = (edges / hz / q).round().max(1.0);
                edges = periods * q * hz;
            }

            let target = edge_target(edges) as u32;
            self.targets[i] = target;
            if target == self.last_edges[i] {
                self.reused = self.reused.with(channel);
            }
            if target < self.config.frequency_edges {
                all_large = false;
            }
        }

        debug!(targets = ?self.targets, reused = self.reused.bits(), "edge targets");

        if all_large && q.is_some() {
            Stage::FinalFrequency
        } else {
            Stage::FinalPeriod
        }
    }

    fn final_frequency(&mut self) -> Result<Stage> {
        let q = self.plan.quantization.unwrap_or(self.plan.integration_time);

        let longest = self
            .flagged
            .channels()
            .map(|c| self.targets[c.index()] as f64 / self.hz[c.index()])
            .fold(self.plan.integration_time, f64::max);

        let mut time = (longest / q).round().max(1.0) * q;
        if time > MAX_FREQUENCY_TIME {
            time = (MAX_FREQUENCY_TIME / q).floor().max(1.0) * q;
        }

        let sample = self.source.measure_frequency(time)?;
        self.hz = sample.hz();
        Ok(Stage::Finish)
    }

    fn final_period(&mut self) -> Result<Stage> {
        let mut mask = ChannelMask::NONE;
        for channel in self.flagged.channels() {
            if !self.reused.contains(channel) {
                mask = mask.with(channel);
            }
        }

        if mask.is_empty() {
            return Ok(Stage::Finish);
        }

        let sample = self.source.measure_period(self.targets, mask)?;
        let clock_hz = self.source.clock_hz();
        for channel in mask.channels() {
            match sample.hz(channel, clock_hz) {
                Some(hz) => self.hz[channel.index()] = hz,
                None => warn!(
                    ?channel,
                    estimate = self.hz[channel.index()],
                    "no edges before timeout, keeping estimate"
                ),
            }
        }

        Ok(Stage::Finish)
    }

    fn finish(&self) -> Result<[f64; 3]> {
        if let Some(channel) = self.saturated() {
            return Err(Error::TooBright {
                channel,
                hz: self.hz[channel.index()],
            });
        }

        let black = self.plan.black_level;
        Ok(Channel::ALL.map(|c| (self.hz[c.index()] - black[c.index()]).max(0.0)))
    }

    /// Target inflation for a channel expected to see `count` edges
    fn inflation(&self, count: f64) -> f64 {
        let limit = self.config.imprecise_counts;
        if count >= limit {
            return 1.0;
        }
        let shortfall = 1.0 - count.max(0.0) / limit;
        1.0 + (self.config.max_inflation - 1.0) * shortfall * shortfall
    }

    fn absorb(&mut self, sample: &PeriodSample, mask: ChannelMask) {
        let clock_hz = self.source.clock_hz();
        for channel in mask.channels() {
            if let Some(hz) = sample.hz(channel, clock_hz) {
                let i = channel.index();
                self.hz[i] = hz;
                self.last_edges[i] = sample.edges[i];
            }
        }
    }

    fn saturated(&self) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|c| self.hz[c.index()] > self.config.saturation_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use i1d3_core::constants::{CLOCK_HZ, COUNT_CORRECTION};
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Frequency(f64),
        Period([u32; 3], u8),
    }

    /// Constant light source with an ideal sensor
    struct Synthetic {
        hz: [f64; 3],
        /// Period requests above this many edges time out
        edge_limit: Option<u32>,
        abort: Cell<bool>,
        calls: RefCell<Vec<Call>>,
    }

    impl Synthetic {
        fn new(hz: [f64; 3]) -> Self {
            Self {
                hz,
                edge_limit: None,
                abort: Cell::new(false),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        fn period_calls(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Period(..)))
                .count()
        }
    }

    impl RawSource for Synthetic {
        fn measure_frequency(&self, target: f64) -> Result<FrequencySample> {
            self.calls.borrow_mut().push(Call::Frequency(target));
            let actual_time = (target * CLOCK_HZ).round() / CLOCK_HZ;
            Ok(FrequencySample {
                actual_time,
                counts: self.hz.map(|hz| (hz * actual_time).floor() + COUNT_CORRECTION),
            })
        }

        fn measure_period(&self, edges: [u32; 3], mask: ChannelMask) -> Result<PeriodSample> {
            self.calls.borrow_mut().push(Call::Period(edges, mask.bits()));
            let mut requested = [0u32; 3];
            let mut ticks = [0u32; 3];
            for channel in mask.channels() {
                let i = channel.index();
                requested[i] = edge_target(edges[i] as f64) as u32;
                let timed_out = self.edge_limit.is_some_and(|limit| requested[i] > limit);
                if self.hz[i] > 0.0 && !timed_out {
                    ticks[i] = (requested[i] as f64 * CLOCK_HZ / self.hz[i]).round() as u32;
                }
            }
            Ok(PeriodSample::new(requested, ticks))
        }

        fn clock_hz(&self) -> f64 {
            CLOCK_HZ
        }

        fn aborted(&self) -> bool {
            self.abort.get()
        }
    }

    fn plan(mode: MeasureMode, quantization: Option<f64>) -> ReadingPlan {
        ReadingPlan {
            mode,
            integration_time: 0.2,
            quantization,
            black_level: [0.0; 3],
        }
    }

    fn close(actual: &[f64], expected: &[f64], tolerance: f64) -> bool {
        actual.len() == expected.len()
            && actual
                .iter()
                .zip(expected.iter())
                .all(|(a, e)| (a - e).abs() <= tolerance * e.max(1.0))
    }

    #[test]
    fn test_bright_light_needs_one_sample() {
        let source = Synthetic::new([5000.0, 6000.0, 7000.0]);
        let reading = measure(&source, &MeasureConfig::default(), &plan(MeasureMode::Adaptive, None)).unwrap();

        assert_eq!(source.calls(), vec![Call::Frequency(0.2)]);
        assert!(close(&reading, &[5000.0, 6000.0, 7000.0], 0.01));
    }

    #[test]
    fn test_saturation_is_too_bright() {
        let source = Synthetic::new([1000.0, 150_000.0, 1000.0]);
        let result = measure(&source, &MeasureConfig::default(), &plan(MeasureMode::Adaptive, None));

        assert!(matches!(
            result,
            Err(Error::TooBright { channel: Channel::Green, .. })
        ));
    }

    #[test]
    fn test_black_subtraction_never_negative() {
        let source = Synthetic::new([50.0, 500.0, 5000.0]);
        let mut plan = plan(MeasureMode::Adaptive, None);
        plan.black_level = [100.0, 100.0, 100.0];

        let reading = measure(&source, &MeasureConfig::default(), &plan).unwrap();
        assert!(reading.iter().all(|hz| *hz >= 0.0));
        assert_eq!(reading[0], 0.0);
        assert!(close(&[reading[2]], &[4900.0], 0.01));
    }

    #[test]
    fn test_dim_light_with_refresh_uses_aligned_frequency_sample() {
        let source = Synthetic::new([100.0, 100.0, 100.0]);
        let q = 1.0 / 15.0;
        let reading = measure(&source, &MeasureConfig::default(), &plan(MeasureMode::Adaptive, Some(q))).unwrap();

        let calls = source.calls();
        // survey, tighten, final frequency
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1], Call::Period([6, 6, 6], 0b111));
        let Call::Frequency(time) = calls[2] else {
            panic!("expected a final frequency sample, got {:?}", calls[2]);
        };
        let periods = time / q;
        assert!((periods - periods.round()).abs() < 1e-9);
        assert!(time > 0.2 && time <= MAX_FREQUENCY_TIME);

        assert!(close(&reading, &[100.0, 100.0, 100.0], 0.01));
    }

    #[test]
    fn test_very_dim_light_uses_period_sampling() {
        let source = Synthetic::new([20.0, 20.0, 20.0]);
        let reading = measure(&source, &MeasureConfig::default(), &plan(MeasureMode::Adaptive, None)).unwrap();

        let calls = source.calls();
        assert_eq!(calls[1], Call::Period([2, 2, 2], 0b111));
        match calls.last() {
            Some(Call::Period(edges, 0b111)) => {
                assert!(edges.iter().all(|e| *e > 2 && e % 2 == 0));
            }
            other => panic!("expected a final period sample, got {:?}", other),
        }
        assert!(close(&reading, &[20.0, 20.0, 20.0], 0.01));
    }

    #[test]
    fn test_matching_target_reuses_pre_measurement() {
        let source = Synthetic::new([0.5, 0.5, 0.5]);
        let reading = measure(&source, &MeasureConfig::default(), &plan(MeasureMode::Adaptive, None)).unwrap();

        assert_eq!(source.period_calls(), 1);
        assert!(close(&reading, &[0.5, 0.5, 0.5], 0.01));
    }

    #[test]
    fn test_zero_edge_timeout_falls_back_to_estimate() {
        let mut source = Synthetic::new([20.0, 20.0, 20.0]);
        source.edge_limit = Some(2);

        let reading = measure(&source, &MeasureConfig::default(), &plan(MeasureMode::Adaptive, None)).unwrap();

        assert_eq!(source.period_calls(), 2);
        assert!(close(&reading, &[20.0, 20.0, 20.0], 0.01));
    }

    #[test]
    fn test_frequency_only_takes_single_sample() {
        let source = Synthetic::new([20.0, 20.0, 20.0]);
        measure(&source, &MeasureConfig::default(), &plan(MeasureMode::FrequencyOnly, None)).unwrap();

        assert_eq!(source.calls(), vec![Call::Frequency(0.2)]);
    }

    #[test]
    fn test_period_only_skips_survey() {
        let source = Synthetic::new([3000.0, 3000.0, 3000.0]);
        let reading = measure(&source, &MeasureConfig::default(), &plan(MeasureMode::PeriodOnly, None)).unwrap();

        let calls = source.calls();
        assert!(calls.iter().all(|c| matches!(c, Call::Period(..))));
        assert_eq!(calls[0], Call::Period([2, 2, 2], 0b111));
        assert!(close(&reading, &[3000.0, 3000.0, 3000.0], 0.01));
    }

    #[test]
    fn test_abort_between_stages() {
        let source = Synthetic::new([20.0, 20.0, 20.0]);
        source.abort.set(true);

        let result = measure(&source, &MeasureConfig::default(), &plan(MeasureMode::Adaptive, None));
        assert!(matches!(result, Err(Error::Aborted)));
        assert!(source.calls().is_empty());
    }

    #[test]
    fn test_inflation_curve() {
        let source = Synthetic::new([0.0; 3]);
        let config = MeasureConfig::default();
        let plan = plan(MeasureMode::Adaptive, None);
        let controller = Controller::new(&source, &config, &plan);

        assert_eq!(controller.inflation(0.0), 8.0);
        assert_eq!(controller.inflation(200.0), 1.0);
        assert!((controller.inflation(100.0) - 2.75).abs() < 1e-12);
    }
}
