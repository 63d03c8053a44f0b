//! FFT peak interpolation.
//!
//! Locates the dominant spectral line of a candidate window to sub-bin
//! precision. A pure tone concentrates essentially all of its energy in
//! one line, so the peak-to-mean power ratio separates FCCH bursts from
//! anything modulated.

use std::sync::Arc;

use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

/// Transform length for candidate windows.
pub const FFT_SIZE: usize = 1024;

/// Sinc interpolation window width in bins.
const INTERP_TAPS: usize = 21;

fn sinc(x: f32) -> f32 {
    if x <= -1e-4 || 1e-4 <= x {
        x.sin() / x
    } else {
        1.0
    }
}

/// Evaluate the spectrum at fractional index `s_i` by sinc interpolation
/// over up to [`INTERP_TAPS`] neighbors, clipped to the slice.
fn interpolate_point(s: &[Complex32], s_i: f32) -> Complex32 {
    let half = ((INTERP_TAPS - 1) / 2) as isize;
    let anchor = s_i.floor() as isize;
    let start = (anchor - half).max(0);
    let end = (anchor + half + 1).min(s.len() as isize - 1);

    let mut point = Complex32::new(0.0, 0.0);
    for i in start..=end {
        point += s[i as usize] * sinc(std::f32::consts::PI * (i as f32 - s_i));
    }
    point
}

/// Refined spectral peak.
pub(crate) struct Peak {
    /// Fractional bin index of the maximum.
    pub index: f32,
    /// Interpolated value at the maximum.
    pub value: Complex32,
    /// Average power of the non-peak bins.
    pub avg_power: f32,
}

/// Find the dominant bin and refine it by bisection.
///
/// Starting one bin on either side of the integer maximum, the early
/// point moves toward whichever neighbor carries more power, halving the
/// step from 0.5 down to 1/1024; the two probes stay two bins apart so
/// the refined maximum is their midpoint.
pub(crate) fn peak_detect(s: &[Complex32]) -> Peak {
    debug_assert!(s.len() > 1);

    let mut sum_power = 0.0f32;
    let mut max = -1.0f32;
    let mut max_i = 0usize;
    for (i, v) in s.iter().enumerate() {
        let power = v.norm_sqr();
        sum_power += power;
        if power > max {
            max = power;
            max_i = i;
        }
    }

    let mut early = if max_i >= 1 { (max_i - 1) as f32 } else { 0.0 };
    let mut late = if max_i + 1 < s.len() {
        (max_i + 1) as f32
    } else {
        (s.len() - 1) as f32
    };

    let mut step = 0.5f32;
    while step > 1.0 / 1024.0 {
        let early_p = interpolate_point(s, early).norm_sqr();
        let late_p = interpolate_point(s, late).norm_sqr();
        if early_p < late_p {
            early += step;
        } else if early_p > late_p {
            early -= step;
        } else {
            break;
        }
        step /= 2.0;
        late = early + 2.0;
    }

    let index = early + 1.0;
    let value = interpolate_point(s, index);
    let avg_power = (sum_power - value.norm_sqr()) / (s.len() - 1) as f32;

    Peak {
        index,
        value,
        avg_power,
    }
}

/// Frequency estimator for candidate windows.
///
/// Owns one forward plan of [`FFT_SIZE`] and its working buffer; windows
/// shorter than the transform are zero padded, longer ones truncated.
pub(crate) struct FreqDetector {
    fft: Arc<dyn Fft<f32>>,
    buf: Vec<Complex32>,
}

impl FreqDetector {
    pub(crate) fn new() -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(FFT_SIZE),
            buf: vec![Complex32::new(0.0, 0.0); FFT_SIZE],
        }
    }

    /// Frequency of the strongest spectral line and its peak-to-mean
    /// power ratio.
    ///
    /// The returned frequency is the fractional bin index times the
    /// resolution, i.e. the positive alias relative to DC. The FCCH tone
    /// sits near +sample_rate/4, so no negative mapping is needed.
    pub(crate) fn freq_detect(&mut self, s: &[Complex32], sample_rate: f64) -> (f32, f32) {
        let len = s.len().min(FFT_SIZE);
        self.buf[..len].copy_from_slice(&s[..len]);
        self.buf[len..].fill(Complex32::new(0.0, 0.0));

        self.fft.process(&mut self.buf);

        let peak = peak_detect(&self.buf);
        let peak_to_mean = if peak.avg_power > f32::EPSILON {
            peak.value.norm_sqr() / peak.avg_power
        } else {
            0.0
        };
        let freq = peak.index * (sample_rate as f32 / FFT_SIZE as f32);
        (freq, peak_to_mean)
    }
}
