//! Clock-offset measurement over a mock sample source
//!
//! Exercises the fill/peek/scan/purge cycle and the trimmed statistics
//! without hardware: the source replays noise with embedded FCCH bursts
//! at a known offset.


use num_complex::Complex32;
use rustykal::buffer::ContiguousRing;
use rustykal::scan::offset_detect;
use rustykal::simulation::{complex_noise, mix_tone};
use rustykal::source::{SampleSource, SourceError};
use rustykal::GSM_RATE;

const FS: f64 = 270_833.002;
const CENTER_FREQ: f64 = 940.0e6;

/// Replays a fixed pattern of noise with a burst every 2000 samples.
struct BurstSource {
    ring: ContiguousRing<Complex32>,
    pattern: Vec<Complex32>,
    pos: usize,
    center_freq: f64,
}

impl BurstSource {
    fn new(offset_hz: f64) -> Self {
        let mut pattern = complex_noise(10_000, 1.0, 99);
        let mut start = 600;
        while start + 200 < pattern.len() {
            mix_tone(
                &mut pattern[start..start + 200],
                GSM_RATE / 4.0 + offset_hz,
                FS,
                64.0,
            );
            start += 2000;
        }
        Self {
            ring: ContiguousRing::new(65_536, false).unwrap(),
            pattern,
            pos: 0,
            center_freq: CENTER_FREQ,
        }
    }
}

impl SampleSource for BurstSource {
    fn sample_rate(&self) -> f64 {
        FS
    }

    fn center_freq(&self) -> f64 {
        self.center_freq
    }

    fn freq_correction(&self) -> i32 {
        0
    }

    fn tune(&mut self, freq: f64) -> Result<(), SourceError> {
        self.center_freq = freq;
        Ok(())
    }

    fn fill(&mut self, min_samples: usize) -> Result<u32, SourceError> {
        while self.ring.data_available() < min_samples && self.ring.space_available() > 0 {
            let take = (self.pattern.len() - self.pos).min(4096);
            let wrote = self.ring.write(&self.pattern[self.pos..self.pos + take]);
            if wrote == 0 {
                break;
            }
            self.pos = (self.pos + wrote) % self.pattern.len();
        }
        Ok(0)
    }

    fn buffer(&self) -> &ContiguousRing<Complex32> {
        &self.ring
    }

    fn start(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn flush(&mut self, _packets: usize) -> Result<(), SourceError> {
        self.ring.flush();
        Ok(())
    }
}

#[test]
fn offset_run_recovers_the_injected_error() {
    test_utils::init_test_tracing();

    let injected = 300.0;
    let mut source = BurstSource::new(injected);
    let report = offset_detect(&mut source, 0.0, 0.0).expect("offset run failed");

    assert!(
        (report.average - injected).abs() < 100.0,
        "average {} expected near {injected}",
        report.average
    );
    assert!(f64::from(report.min) <= report.average && report.average <= f64::from(report.max));
    assert_eq!(report.overruns, 0);

    // ppm follows directly from the average against the tuned carrier
    let expected_ppm = -report.average / CENTER_FREQ * 1e6;
    assert!(
        (report.ppm - expected_ppm).abs() < 1e-9,
        "ppm {} expected {expected_ppm}",
        report.ppm
    );
}

#[test]
fn tuner_error_is_subtracted_from_the_measurement() {
    test_utils::init_test_tracing();

    let mut source = BurstSource::new(250.0);
    // pretend the tuner reported landing 100 Hz high
    let report = offset_detect(&mut source, 0.0, 100.0).expect("offset run failed");

    assert!(
        (report.average - 150.0).abs() < 100.0,
        "average {} expected near 150",
        report.average
    );
}
