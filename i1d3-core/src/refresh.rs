//! Refresh-rate analysis
//!
//! Displays that refresh (CRTs, PWM-dimmed backlights, most OLEDs) modulate
//! their light output. A fixed-period reading that does not span a whole
//! number of modulation cycles picks up a beat error, so the driver needs to
//! know the modulation period.
//!
//! The instrument cannot observe the modulation directly. Instead the driver
//! takes a long run of very short frequency samples at jittered intervals,
//! timestamps each one, and this module looks for periodicity in that
//! irregularly spaced series:
//!
//! 1. Convert samples to rates and reject streams without enough energy.
//! 2. Build a normalized autocorrelation over lags of 25–200 ms (5–40 Hz)
//!    by binning every sample pair by its time difference.
//! 3. Smooth the bins with a symmetric triangular kernel.
//! 4. Reject flat correlations, then collect prominent peaks from the
//!    longest lag down and refine each by parabolic interpolation.
//! 5. One peak gives a quantization period of half its lag. Several peaks
//!    must share a common base period, which gives the refresh rate.

use i1d3_types::RefreshEstimate;
use tracing::{debug, trace};

use crate::constants::refresh::MIN_SAMPLES;

/// Shortest candidate modulation frequency (Hz)
const MIN_HZ: f64 = 5.0;

/// Longest candidate modulation frequency (Hz)
const MAX_HZ: f64 = 40.0;

/// Lag bin width (seconds)
const BIN: f64 = 0.0001;

/// Half width of the smoothing kernel (seconds)
const SMOOTH_HALF_WIDTH: f64 = 0.005;

/// Minimum peak-to-trough range of the normalized correlation
const MIN_RANGE: f64 = 0.1;

/// Minimum variance relative to the squared mean level
const MIN_RELATIVE_VARIANCE: f64 = 1e-6;

/// Most peaks collected
const MAX_PEAKS: usize = 20;

/// Minimum normalized correlation at a peak
const MIN_PEAK: f64 = 0.2;

/// Minimum rise of a peak above the lower of its two troughs
const MIN_PROMINENCE: f64 = 0.1;

/// Rise that ends a trough walk
const TROUGH_HYSTERESIS: f64 = 0.02;

/// Largest divisor tried when searching for a common base period
const MAX_DIVISOR: u32 = 20;

/// Allowed deviation from an integer multiple, relative to the base period
const MULTIPLE_TOLERANCE: f64 = 0.06;

/// Peaks needed before outliers are tolerated
const OUTLIER_MIN_PEAKS: usize = 6;

/// Outliers tolerated
const MAX_OUTLIERS: usize = 2;

/// Quantization periods are at least this long (at most 20 Hz)
const MIN_QUANTIZATION: f64 = 1.0 / 20.0;

/// One fast frequency sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshSample {
    /// Seconds since the first sample, taken at the middle of the exchange
    pub timestamp: f64,

    /// Integration time actually used (seconds)
    pub int_time: f64,

    /// Corrected per-channel counts
    pub counts: [f64; 3],
}

impl RefreshSample {
    /// Total light level in edges per second
    pub fn rate(&self) -> f64 {
        self.counts.iter().sum::<f64>() / self.int_time
    }
}

/// Estimate the refresh behaviour of a timestamped sample stream
///
/// Returns [`RefreshEstimate::NONE`] whenever the evidence is not conclusive;
/// a spurious rate is worse than none.
pub fn analyze(samples: &[RefreshSample]) -> RefreshEstimate {
    if samples.len() < MIN_SAMPLES {
        debug!(samples = samples.len(), "too few refresh samples");
        return RefreshEstimate::NONE;
    }

    let mut points: Vec<(f64, f64)> = samples
        .iter()
        .filter(|s| s.int_time > 0.0)
        .map(|s| (s.timestamp, s.rate()))
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n = points.len() as f64;
    let mean = points.iter().map(|p| p.1).sum::<f64>() / n;
    let variance = points.iter().map(|p| (p.1 - mean).powi(2)).sum::<f64>() / n;

    if !(mean > 0.0) || variance / (mean * mean) < MIN_RELATIVE_VARIANCE {
        debug!(mean, variance, "refresh signal energy too low");
        return RefreshEstimate::NONE;
    }

    let corr = autocorrelation(&points, mean, variance);
    let lo = lag_bin(1.0 / MAX_HZ);
    let hi = lag_bin(1.0 / MIN_HZ);

    let window = &corr[lo..=hi];
    let max = window.iter().copied().fold(f64::MIN, f64::max);
    let min = window.iter().copied().fold(f64::MAX, f64::min);
    trace!(max, min, "refresh correlation range");

    if max - min < MIN_RANGE {
        debug!(range = max - min, "refresh correlation too flat");
        return RefreshEstimate::NONE;
    }

    let peaks = find_peaks(&corr, lo, hi);
    debug!(peaks = ?peaks, "refresh correlation peaks");

    match peaks.len() {
        0 => RefreshEstimate::NONE,
        1 => RefreshEstimate {
            rate_hz: None,
            quantization: Some(peaks[0] / 2.0),
        },
        _ => match common_period(&peaks) {
            Some(period) => RefreshEstimate {
                rate_hz: Some(1.0 / period),
                quantization: Some(quantization_period(period)),
            },
            None => {
                debug!("refresh peaks share no common period");
                RefreshEstimate::NONE
            }
        },
    }
}

fn lag_bin(lag: f64) -> usize {
    (lag / BIN).round() as usize
}

/// Smoothed, normalized autocorrelation indexed by lag bin
///
/// Pairs are binned by their actual time difference, so irregular sample
/// spacing needs no resampling. Sums and pair counts are smoothed separately
/// so sparsely populated bins do not dominate.
fn autocorrelation(points: &[(f64, f64)], mean: f64, variance: f64) -> Vec<f64> {
    let half = lag_bin(SMOOTH_HALF_WIDTH);
    let last = lag_bin(1.0 / MIN_HZ) + half;
    let max_lag = last as f64 * BIN;

    let mut sums = vec![0.0; last + 1];
    let mut counts = vec![0.0; last + 1];

    for (i, &(ti, xi)) in points.iter().enumerate() {
        let di = xi - mean;
        for &(tj, xj) in &points[i + 1..] {
            let dt = tj - ti;
            if dt > max_lag {
                break;
            }
            let b = lag_bin(dt);
            if b <= last {
                sums[b] += di * (xj - mean);
                counts[b] += 1.0;
            }
        }
    }

    let mut corr = vec![0.0; last + 1];
    for (b, out) in corr.iter_mut().enumerate() {
        let mut s = 0.0;
        let mut c = 0.0;
        let from = b.saturating_sub(half);
        let to = (b + half).min(last);
        for k in from..=to {
            let w = (half + 1 - b.abs_diff(k)) as f64;
            s += w * sums[k];
            c += w * counts[k];
        }
        if c > 0.0 {
            *out = s / c / variance;
        }
    }
    corr
}

/// Prominent local maxima between bins `lo` and `hi`, longest lag first
fn find_peaks(corr: &[f64], lo: usize, hi: usize) -> Vec<f64> {
    let mut peaks = Vec::new();

    for b in (lo + 1..hi).rev() {
        if peaks.len() >= MAX_PEAKS {
            break;
        }
        let v = corr[b];
        if v < MIN_PEAK || !(v > corr[b - 1] && v >= corr[b + 1]) {
            continue;
        }

        let (Some(left), Some(right)) = (trough(corr, b, lo, hi, -1), trough(corr, b, lo, hi, 1))
        else {
            continue;
        };
        if v - left.max(right) < MIN_PROMINENCE {
            continue;
        }

        peaks.push(refine(corr, b) * BIN);
    }

    peaks
}

/// Lowest value reached walking away from the peak at `b`
///
/// The walk ends once the correlation climbs back above the running minimum
/// by the hysteresis, or at the edge of the window. `None` if higher ground
/// than the peak comes first, meaning `b` is a ripple on a larger peak's
/// flank.
fn trough(corr: &[f64], b: usize, lo: usize, hi: usize, step: isize) -> Option<f64> {
    let peak = corr[b];
    let mut min = peak;
    let mut i = b as isize;

    loop {
        i += step;
        if i < lo as isize || i > hi as isize {
            return Some(min);
        }
        let v = corr[i as usize];
        if v > peak {
            return None;
        }
        if v < min {
            min = v;
        } else if v > min + TROUGH_HYSTERESIS {
            return Some(min);
        }
    }
}

/// Fractional bin of the vertex of the parabola through `b - 1, b, b + 1`
fn refine(corr: &[f64], b: usize) -> f64 {
    let (y0, y1, y2) = (corr[b - 1], corr[b], corr[b + 1]);
    let denom = y0 - 2.0 * y1 + y2;
    if denom < 0.0 {
        b as f64 + 0.5 * (y0 - y2) / denom
    } else {
        b as f64
    }
}

/// Base period every peak is an integer multiple of
///
/// Tries divisors of the longest peak from 1 up, so the longest base period
/// that explains the peaks wins. The result is the multiple-weighted average
/// of the inlying peaks.
fn common_period(peaks: &[f64]) -> Option<f64> {
    let longest = peaks.iter().copied().fold(0.0, f64::max);
    let allowed = if peaks.len() >= OUTLIER_MIN_PEAKS {
        MAX_OUTLIERS
    } else {
        0
    };

    for divisor in 1..=MAX_DIVISOR {
        let base = longest / divisor as f64;
        let mut outliers = 0;
        let mut lag_sum = 0.0;
        let mut multiple_sum = 0.0;

        for &lag in peaks {
            let multiple = (lag / base).round();
            if multiple >= 1.0 && (lag - multiple * base).abs() <= MULTIPLE_TOLERANCE * base {
                lag_sum += lag;
                multiple_sum += multiple;
            } else {
                outliers += 1;
            }
        }

        if outliers <= allowed && multiple_sum > 0.0 {
            trace!(divisor, outliers, "common refresh period found");
            return Some(lag_sum / multiple_sum);
        }
    }

    None
}

/// Stretch a refresh period to a quantization period of at most 20 Hz
///
/// The multiple is rounded up to a multiple of 2, or of 4 once it reaches 8,
/// so the result never drops below 1/20 s.
pub fn quantization_period(period: f64) -> f64 {
    let mut multiple = ((MIN_QUANTIZATION / period) - 1e-9).ceil().max(1.0) as u32;
    if multiple > 1 {
        multiple = if multiple >= 8 {
            multiple.div_ceil(4) * 4
        } else {
            multiple.div_ceil(2) * 2
        };
    }
    period * multiple as f64
}
