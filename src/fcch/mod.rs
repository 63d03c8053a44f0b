//! FCCH burst detection.
//!
//! Finds the GSM Frequency Correction Channel burst, a pure tone at
//! +GSM_RATE/4 relative to the carrier, in a complex baseband stream.
//!
//! **Algorithm** (Varma, Sahu and Prabhu Charan, "Robust Frequency Burst
//! Detection Algorithm for GSM / GPRS"):
//! 1. Run every sample through an adaptive prediction-error filter; the
//!    normalized error collapses while the input is a pure tone.
//! 2. Find low-error regions no shorter than 100 symbols against a
//!    threshold of 0.7 times the mean error.
//! 3. Validate each candidate region with an FFT: a pure tone puts
//!    essentially all of its energy in one spectral line, so require a
//!    peak-to-mean power ratio above 50.
//! 4. Report the interpolated frequency of the first region that passes.
//!
//! **Module organization**:
//! - `adaptive` - the normalized LMS prediction-error filter
//! - `spectrum` - FFT peak interpolation and the peak-to-mean test

mod adaptive;
mod spectrum;

use num_complex::Complex32;
use snafu::{ensure, ResultExt, Snafu};
use tracing::{debug, instrument, trace};

use crate::buffer::{BufferError, ContiguousRing};
use adaptive::{
    AdaptiveFilter, DEFAULT_GAIN, DEFAULT_REFERENCE_DELAY, DEFAULT_SMOOTHING, W_LEN,
};
use spectrum::FreqDetector;

pub use spectrum::FFT_SIZE;

/// GSM symbol rate in Hz.
pub const GSM_RATE: f64 = 1_625_000.0 / 6.0;

/// Minimum FFT peak-to-mean power ratio for a candidate to count as a
/// pure tone.
const MIN_PEAK_TO_MEAN: f32 = 50.0;

/// Fraction of the mean error below which a sample counts as low.
const ERROR_THRESHOLD_FACTOR: f64 = 0.7;

/// FCCH burst length in symbols.
const FCCH_BURST_SYMBOLS: f64 = 148.0;

/// Minimum sustained low-error run in symbols.
const MIN_RUN_SYMBOLS: f64 = 100.0;

const X_RING_LEN: usize = 8192;
const Y_RING_LEN: usize = 8192;
const E_RING_LEN: usize = 1_015_808;

#[derive(Debug, Snafu)]
pub enum FcchError {
    #[snafu(display("sample rate must be positive, got {rate}"))]
    InvalidSampleRate { rate: f64 },

    #[snafu(display("ring allocation failed: {source}"))]
    RingAllocation { source: BufferError },
}

/// Outcome of one scan over a sample buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanResult {
    /// Frequency in Hz of the accepted burst tone, if one was found.
    /// Callers subtract `GSM_RATE / 4` to obtain the FCCH offset.
    pub offset: Option<f32>,
    /// Samples consumed from the caller's buffer.
    pub consumed: usize,
}

/// One adaptive-filter step either yields an error sample or asks for
/// more input.
enum Step {
    Error(f32),
    NeedSamples(usize),
}

#[derive(Clone, Copy, PartialEq)]
enum Region {
    Low,
    High,
}

/// Run-length tracker over the error stream. A fresh one is used for
/// every scan.
struct RunTracker {
    state: Region,
    count: usize,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            state: Region::High,
            count: 0,
        }
    }

    /// Feed one error sample. Returns the length of a low run when the
    /// stream transitions back above the limit; the run covers the
    /// samples preceding the current one.
    fn step(&mut self, error: f32, limit: f32) -> Option<usize> {
        let mut finished = None;
        if error > limit {
            if self.state == Region::Low {
                finished = Some(self.count);
                self.state = Region::High;
                self.count = 0;
            }
        } else if self.state == Region::High {
            self.state = Region::Low;
            self.count = 0;
        }
        self.count += 1;
        finished
    }

    /// Length of a low run still open when the stream ends.
    fn pending(&self) -> Option<usize> {
        (self.state == Region::Low).then_some(self.count)
    }
}

/// FCCH burst detector over a complex baseband stream.
pub struct FcchDetector {
    sample_rate: f64,
    fcch_burst_len: usize,
    min_run_len: usize,
    filter: AdaptiveFilter,
    x: ContiguousRing<Complex32>,
    y: ContiguousRing<Complex32>,
    e: ContiguousRing<f32>,
    freq: FreqDetector,
}

impl FcchDetector {
    /// Detector with the published filter parameters.
    pub fn new(sample_rate: f64) -> Result<Self, FcchError> {
        Self::with_params(
            sample_rate,
            DEFAULT_REFERENCE_DELAY,
            DEFAULT_SMOOTHING,
            DEFAULT_GAIN,
        )
    }

    /// Detector with explicit reference delay, smoothing coefficient and
    /// initial adaptation gain.
    pub fn with_params(
        sample_rate: f64,
        delay: usize,
        smoothing: f32,
        gain: f32,
    ) -> Result<Self, FcchError> {
        ensure!(sample_rate > 0.0, InvalidSampleRateSnafu { rate: sample_rate });

        let sps = sample_rate / GSM_RATE;
        Ok(Self {
            sample_rate,
            fcch_burst_len: (FCCH_BURST_SYMBOLS * sps).round() as usize,
            min_run_len: (MIN_RUN_SYMBOLS * sps).round() as usize,
            filter: AdaptiveFilter::new(delay, smoothing, gain),
            x: ContiguousRing::new(X_RING_LEN, false).context(RingAllocationSnafu)?,
            y: ContiguousRing::new(Y_RING_LEN, true).context(RingAllocationSnafu)?,
            e: ContiguousRing::new(E_RING_LEN, false).context(RingAllocationSnafu)?,
            freq: FreqDetector::new(),
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Fixed lag between a sample entering the filter and its error
    /// sample coming out.
    pub fn group_delay(&self) -> usize {
        W_LEN - 1 + self.filter.delay()
    }

    /// Search `samples` for an FCCH burst.
    ///
    /// 1. Compute the normalized prediction error for every sample.
    /// 2. Threshold at 0.7 times the mean error over the whole buffer.
    /// 3. For each low-error run of at least 100 symbols, validate with
    ///    the FFT peak-to-mean test; the first run that passes wins.
    ///
    /// Not finding a burst is a normal outcome; callers iterate over
    /// fresh buffers.
    #[instrument(skip(self, samples), fields(len = samples.len()))]
    pub fn scan(&mut self, samples: &[Complex32]) -> ScanResult {
        // the candidate arithmetic below equates error indices with
        // sample indices, which needs an empty error ring at entry
        self.e.flush();

        let mut sum = 0.0f64;
        let mut fed = 0usize;
        while fed < samples.len() {
            fed += self.x.write(&samples[fed..fed + 1]);
            if let Step::Error(error) = self.next_norm_error() {
                self.e.write(&[error]);
                sum += f64::from(error);
            }
        }

        let offset = self.find_burst(samples, sum);

        self.x.flush();
        self.y.flush();
        self.e.flush();

        ScanResult {
            offset,
            consumed: fed,
        }
    }

    /// Region scan over the buffered error stream.
    fn find_burst(&mut self, samples: &[Complex32], sum: f64) -> Option<f32> {
        let Self {
            e,
            freq,
            sample_rate,
            fcch_burst_len,
            min_run_len,
            ..
        } = self;

        let errors = e.peek();
        if errors.is_empty() {
            return None;
        }
        let limit = (ERROR_THRESHOLD_FACTOR * sum / errors.len() as f64) as f32;
        debug!(limit, errors = errors.len(), "error limit");

        let mut tracker = RunTracker::new();
        for (i, &error) in errors.iter().enumerate() {
            if let Some(run) = tracker.step(error, limit) {
                if let Some(hit) = candidate_tone(
                    freq,
                    *sample_rate,
                    samples,
                    i,
                    run,
                    *fcch_burst_len,
                    *min_run_len,
                ) {
                    return Some(hit);
                }
            }
        }

        // a burst running to the end of the buffer never transitions
        // back above the limit, so test the open run as well
        tracker.pending().and_then(|run| {
            candidate_tone(
                freq,
                *sample_rate,
                samples,
                errors.len(),
                run,
                *fcch_burst_len,
                *min_run_len,
            )
        })
    }

    /// One adaptive-filter step against the input ring.
    fn next_norm_error(&mut self) -> Step {
        let Self { x, y, filter, .. } = self;
        let needed = filter.window_len();

        let error = {
            let window = x.peek();
            if window.len() < needed {
                return Step::NeedSamples(needed - window.len());
            }
            let error = filter.update(&window);
            // the delayed reference sample is recorded, not the filter
            // output
            y.write(&window[needed - 1..needed]);
            error
        };
        self.x.purge(1);

        Step::Error(error)
    }
}

/// Peak-to-mean test of one low-error run ending at error index `index`.
fn candidate_tone(
    freq: &mut FreqDetector,
    sample_rate: f64,
    samples: &[Complex32],
    index: usize,
    run: usize,
    fcch_burst_len: usize,
    min_run_len: usize,
) -> Option<f32> {
    if run < min_run_len {
        return None;
    }

    let start = index - run;
    let len = run.min(fcch_burst_len);
    let end = (start + len).min(samples.len());
    let (offset, peak_to_mean) = freq.freq_detect(&samples[start..end], sample_rate);

    trace!(run, peak_to_mean, offset, "candidate run");
    (peak_to_mean > MIN_PEAK_TO_MEAN).then_some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::tone;

    const FS: f64 = 270_833.002;

    #[test]
    fn run_tracker_emits_on_rising_edge() {
        let mut tracker = RunTracker::new();
        let limit = 1.0;
        for _ in 0..3 {
            assert_eq!(tracker.step(2.0, limit), None);
        }
        for _ in 0..5 {
            assert_eq!(tracker.step(0.5, limit), None);
        }
        assert_eq!(tracker.step(2.0, limit), Some(5));
        assert_eq!(tracker.pending(), None);
    }

    #[test]
    fn run_tracker_reports_open_run_at_stream_end() {
        let mut tracker = RunTracker::new();
        tracker.step(2.0, 1.0);
        for _ in 0..7 {
            tracker.step(0.1, 1.0);
        }
        assert_eq!(tracker.pending(), Some(7));
    }

    #[test]
    fn rejects_nonpositive_sample_rate() {
        assert!(matches!(
            FcchDetector::new(0.0),
            Err(FcchError::InvalidSampleRate { .. })
        ));
    }

    #[test]
    fn derived_lengths_follow_the_sample_rate() {
        let det = FcchDetector::new(FS).unwrap();
        assert_eq!(det.fcch_burst_len, 148);
        assert_eq!(det.min_run_len, 100);
        assert_eq!(det.group_delay(), 24);

        let det2 = FcchDetector::new(2.0 * GSM_RATE).unwrap();
        assert_eq!(det2.fcch_burst_len, 296);
        assert_eq!(det2.min_run_len, 200);
    }

    #[test]
    fn errors_lag_input_by_the_group_delay() {
        // one error per sample past the priming window
        let mut det = FcchDetector::new(FS).unwrap();
        let samples = tone(60_000.0, FS, 256.0, 100);
        det.x.write(&samples);
        let mut emitted = 0;
        while let Step::Error(_) = det.next_norm_error() {
            emitted += 1;
        }
        assert_eq!(emitted, samples.len() - det.group_delay());
    }

    #[test]
    fn scan_consumes_the_whole_buffer() {
        let mut det = FcchDetector::new(FS).unwrap();
        let samples = tone(GSM_RATE / 4.0, FS, 256.0, 5000);
        let result = det.scan(&samples);
        assert_eq!(result.consumed, 5000);
    }

    #[test]
    fn scan_finds_an_embedded_tone() {
        use crate::simulation::{complex_noise, mix_tone};

        let mut det = FcchDetector::new(FS).unwrap();
        let mut samples = complex_noise(8000, 1.0, 7);
        mix_tone(&mut samples[3000..3300], GSM_RATE / 4.0, FS, 64.0);

        let result = det.scan(&samples);
        let offset = result.offset.expect("tone not found");
        assert!(
            (f64::from(offset) - GSM_RATE / 4.0).abs() < 60.0,
            "offset {offset}"
        );
    }

    #[test]
    fn scan_state_is_reset_between_calls() {
        let mut det = FcchDetector::new(FS).unwrap();
        let noise = crate::simulation::complex_noise(4000, 1.0, 11);
        assert_eq!(det.scan(&noise).offset, None);
        assert_eq!(det.x.data_available(), 0);
        assert_eq!(det.e.data_available(), 0);

        let burst = tone(GSM_RATE / 4.0, FS, 256.0, 4000);
        assert!(det.scan(&burst).offset.is_some());
    }
}
