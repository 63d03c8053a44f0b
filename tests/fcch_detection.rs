//! End-to-end FCCH detection scenarios
//!
//! Feeds synthetic complex baseband buffers through the full scan path:
//! adaptive error filter, region detection, FFT validation.


use rustykal::simulation::{complex_noise, mix_tone, tone};
use rustykal::{FcchDetector, GSM_RATE};

/// The rate the RTL2832 actually produces when asked for one sample per
/// GSM symbol.
const FS: f64 = 270_833.002;

/// FFT bin width is FS/1024; the interpolator resolves well below half
/// a bin.
const HALF_BIN: f64 = FS / 2048.0;

#[test]
fn pure_tone_at_nominal_offset_is_found() {
    test_utils::init_test_tracing();

    let samples = tone(GSM_RATE / 4.0, FS, 1.0, 50_000);
    let mut detector = FcchDetector::new(FS).unwrap();

    let result = detector.scan(&samples);
    assert_eq!(result.consumed, 50_000);

    let offset = f64::from(result.offset.expect("tone not found"));
    assert!(
        (offset - GSM_RATE / 4.0).abs() < 50.0,
        "offset {offset}, expected {}",
        GSM_RATE / 4.0
    );
}

#[test]
fn tone_frequency_is_recovered_within_the_fft_resolution() {
    test_utils::init_test_tracing();

    for freq in [60_000.0, 67_000.0, 70_500.0] {
        let samples = tone(freq, FS, 256.0, 50_000);
        let mut detector = FcchDetector::new(FS).unwrap();

        let offset = detector.scan(&samples).offset.expect("tone not found");
        assert!(
            (f64::from(offset) - freq).abs() <= HALF_BIN,
            "offset {offset}, expected {freq}"
        );
    }
}

#[test]
fn noise_only_finds_nothing() {
    test_utils::init_test_tracing();

    // unit total variance, split across I and Q
    let samples = complex_noise(50_000, std::f32::consts::FRAC_1_SQRT_2, 4711);
    let mut detector = FcchDetector::new(FS).unwrap();

    let result = detector.scan(&samples);
    assert_eq!(result.offset, None);
    assert_eq!(result.consumed, 50_000);
}

#[test]
fn burst_in_noise_is_found_with_its_offset() {
    test_utils::init_test_tracing();

    // 20k samples of noise, then a tone 137 Hz above nominal at +20 dB
    let offset_hz = 137.0;
    let mut samples = complex_noise(170_000, std::f32::consts::FRAC_1_SQRT_2, 1234);
    mix_tone(
        &mut samples[20_000..],
        GSM_RATE / 4.0 + offset_hz,
        FS,
        10.0,
    );

    let mut detector = FcchDetector::new(FS).unwrap();
    let result = detector.scan(&samples);

    let found = f64::from(result.offset.expect("burst not found")) - GSM_RATE / 4.0;
    assert!(
        (77.0..=197.0).contains(&found),
        "offset {found}, expected near {offset_hz}"
    );
}

#[test]
fn finite_burst_between_noise_segments_is_found() {
    test_utils::init_test_tracing();

    // a realistic burst: bounded on both sides by modulated-looking noise
    let mut samples = complex_noise(40_000, 1.0, 77);
    mix_tone(
        &mut samples[12_000..12_000 + 148],
        GSM_RATE / 4.0,
        FS,
        64.0,
    );

    let mut detector = FcchDetector::new(FS).unwrap();
    let result = detector.scan(&samples);

    let offset = f64::from(result.offset.expect("burst not found"));
    assert!(
        (offset - GSM_RATE / 4.0).abs() < 100.0,
        "offset {offset}"
    );
}

#[test]
fn detector_is_reusable_across_buffers() {
    test_utils::init_test_tracing();

    let mut detector = FcchDetector::new(FS).unwrap();

    let noise = complex_noise(30_000, 1.0, 9);
    assert_eq!(detector.scan(&noise).offset, None);

    let burst = tone(GSM_RATE / 4.0, FS, 256.0, 30_000);
    assert!(detector.scan(&burst).offset.is_some());

    let more_noise = complex_noise(30_000, 1.0, 10);
    assert_eq!(detector.scan(&more_noise).offset, None);
}
