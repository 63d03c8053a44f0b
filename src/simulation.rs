//! Synthetic complex-baseband signals.
//!
//! Deterministic tone and noise builders for tests and offline
//! experiments with the detector.

use std::f64::consts::TAU;

use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Complex exponential `A * exp(j 2π f k / fs)`.
pub fn tone(freq: f64, sample_rate: f64, amplitude: f32, len: usize) -> Vec<Complex32> {
    (0..len)
        .map(|k| {
            let phase = TAU * freq * k as f64 / sample_rate;
            Complex32::new(
                amplitude * phase.cos() as f32,
                amplitude * phase.sin() as f32,
            )
        })
        .collect()
}

/// Circularly symmetric Gaussian noise; `sigma` is the per-component
/// standard deviation (unit total variance is `1/sqrt(2)`). Seeded so
/// tests are repeatable.
pub fn complex_noise(len: usize, sigma: f32, seed: u64) -> Vec<Complex32> {
    let normal = Normal::new(0.0f32, sigma).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| Complex32::new(normal.sample(&mut rng), normal.sample(&mut rng)))
        .collect()
}

/// Add a tone on top of an existing segment, phase zero at the segment
/// start.
pub fn mix_tone(samples: &mut [Complex32], freq: f64, sample_rate: f64, amplitude: f32) {
    for (k, sample) in samples.iter_mut().enumerate() {
        let phase = TAU * freq * k as f64 / sample_rate;
        *sample += Complex32::new(
            amplitude * phase.cos() as f32,
            amplitude * phase.sin() as f32,
        );
    }
}
