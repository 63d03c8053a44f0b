//! Adaptive prediction-error filter.
//!
//! A normalized LMS predictor: each step predicts a reference sample
//! `delay` ahead of a 17-tap window and adapts the taps against the
//! prediction error. On a pure sinusoid the predictor converges within a
//! few samples and the error collapses, so a sustained low-error region
//! marks a tone of that duration. The emitted error is smoothed and
//! normalized by the window energy, which makes the detection threshold
//! amplitude independent.
//!
//! ```text
//! y[n]      = Σ w*[i] x[n-i]               (prediction)
//! e[n]      = x[n+delay] - y[n]            (error)
//! w[i]     += G e* x[n-i]                  (tap update)
//! s[n]      = (1-p) s[n-1] + p |e[n]|²     (smoothing)
//! out[n]    = s[n] / (E / w_len)           (normalization)
//! ```
//!
//! `G` is clamped to `1/E` whenever it reaches `2/E`, the stability
//! bound for the current window energy `E`.

use num_complex::Complex32;

/// Taps on either side of the center tap.
pub(crate) const FILTER_DELAY: usize = 8;

/// Tap count.
pub(crate) const W_LEN: usize = 2 * FILTER_DELAY + 1;

/// Default reference-sample delay.
pub(crate) const DEFAULT_REFERENCE_DELAY: usize = 8;

/// Default error smoothing coefficient.
pub(crate) const DEFAULT_SMOOTHING: f32 = 1.0 / 32.0;

/// Default adaptation gain before clamping.
pub(crate) const DEFAULT_GAIN: f32 = 1.0 / 12.5;

pub(crate) struct AdaptiveFilter {
    taps: [Complex32; W_LEN],
    delay: usize,
    smoothing: f32,
    gain: f32,
    e_smooth: f32,
}

impl AdaptiveFilter {
    pub(crate) fn new(delay: usize, smoothing: f32, gain: f32) -> Self {
        Self {
            taps: [Complex32::new(0.0, 0.0); W_LEN],
            delay,
            smoothing,
            gain,
            e_smooth: 0.0,
        }
    }

    pub(crate) fn delay(&self) -> usize {
        self.delay
    }

    /// Number of buffered samples one step consumes from the front of
    /// the window.
    pub(crate) fn window_len(&self) -> usize {
        W_LEN + self.delay
    }

    /// One filter step over the oldest `window_len()` samples; returns
    /// the smoothed normalized error.
    ///
    /// A zero-energy window skips the gain clamp and the normalization
    /// (the smoothed error is returned as is) so degenerate input never
    /// produces a NaN.
    pub(crate) fn update(&mut self, x: &[Complex32]) -> f32 {
        debug_assert!(x.len() >= self.window_len());

        let n = W_LEN - 1;
        let energy: f32 = x[..W_LEN].iter().map(|v| v.norm_sqr()).sum();

        if energy > 0.0 && self.gain >= 2.0 / energy {
            self.gain = 1.0 / energy;
        }

        let mut predicted = Complex32::new(0.0, 0.0);
        for i in 0..W_LEN {
            predicted += self.taps[i].conj() * x[n - i];
        }

        let err = x[n + self.delay] - predicted;

        let gain = self.gain;
        for i in 0..W_LEN {
            self.taps[i] += err.conj() * x[n - i] * gain;
        }

        self.e_smooth = (1.0 - self.smoothing) * self.e_smooth + self.smoothing * err.norm_sqr();

        if energy > 0.0 {
            self.e_smooth / (energy / W_LEN as f32)
        } else {
            self.e_smooth
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::tone;

    fn run(filter: &mut AdaptiveFilter, samples: &[Complex32]) -> Vec<f32> {
        let need = filter.window_len();
        (0..=samples.len() - need)
            .map(|i| filter.update(&samples[i..i + need]))
            .collect()
    }

    fn default_filter() -> AdaptiveFilter {
        AdaptiveFilter::new(DEFAULT_REFERENCE_DELAY, DEFAULT_SMOOTHING, DEFAULT_GAIN)
    }

    #[test]
    fn error_collapses_on_a_pure_tone() {
        let samples = tone(67_708.3, 270_833.002, 256.0, 4000);
        let mut filter = default_filter();
        let errors = run(&mut filter, &samples);

        let head: f32 = errors[..32].iter().sum::<f32>() / 32.0;
        let tail: f32 = errors[errors.len() - 32..].iter().sum::<f32>() / 32.0;
        assert!(
            tail < head * 1e-3,
            "error did not collapse: head {head} tail {tail}"
        );
    }

    #[test]
    fn one_error_per_consumed_sample() {
        let samples = tone(60_000.0, 270_833.002, 256.0, 500);
        let mut filter = default_filter();
        let errors = run(&mut filter, &samples);
        // a window is consumed one sample at a time with a fixed lag
        assert_eq!(errors.len(), 500 - filter.window_len() + 1);
        assert_eq!(filter.window_len(), W_LEN + DEFAULT_REFERENCE_DELAY);
    }

    #[test]
    fn normalized_error_is_amplitude_invariant_once_clamped() {
        // at RTL-SDR sample scaling the clamp engages immediately, and
        // from there the whole recursion scales with the input
        let base = tone(67_708.3, 270_833.002, 256.0, 2000);
        let scaled: Vec<Complex32> = base.iter().map(|&v| v * 8.0).collect();

        let mut f1 = default_filter();
        let mut f2 = default_filter();
        let e1 = run(&mut f1, &base);
        let e2 = run(&mut f2, &scaled);

        for (i, (a, b)) in e1.iter().zip(&e2).enumerate() {
            let scale = a.abs().max(1e-12);
            assert!(
                (a - b).abs() / scale < 1e-3,
                "sequences diverge at {i}: {a} vs {b}"
            );
        }
    }

    #[test]
    fn amplitude_step_stays_bounded_and_recovers() {
        let fs = 270_833.002;
        let mut samples = tone(67_708.3, fs, 2.0, 2000);
        samples.extend(tone(67_708.3, fs, 200.0, 2000));

        let mut filter = default_filter();
        let errors = run(&mut filter, &samples);

        assert!(errors.iter().all(|e| e.is_finite()));

        // the spike at the step must decay within ten filter lengths
        let step = 2000 - filter.window_len() + 1;
        let spike = errors[step..step + W_LEN]
            .iter()
            .fold(0.0f32, |m, &e| m.max(e));
        let settled = errors[step + W_LEN * 10];
        assert!(
            settled < spike / 10.0 || settled < 1e-3,
            "spike {spike} settled {settled}"
        );
    }

    #[test]
    fn zero_input_emits_finite_errors() {
        let samples = vec![Complex32::new(0.0, 0.0); 200];
        let mut filter = default_filter();
        for e in run(&mut filter, &samples) {
            assert!(e.is_finite());
            assert_eq!(e, 0.0);
        }
    }
}
