//! Sample sources.
//!
//! The detector layers never reach a device directly; they read complex
//! baseband samples out of the ring a source exposes. A source may fill
//! that ring from its own thread, the ring's lock is the only shared
//! state.

pub mod rtlsdr;

use num_complex::Complex32;
use snafu::Snafu;

use crate::buffer::ContiguousRing;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SourceError {
    #[snafu(display("librtlsdr could not be loaded; install the rtl-sdr package"))]
    LibraryNotFound,

    #[snafu(display("no RTL-SDR device at index {index}"))]
    DeviceNotFound { index: u32 },

    #[snafu(display("device operation {op} failed with code {code}"))]
    DeviceOperation { op: &'static str, code: i32 },

    #[snafu(display("sample ring allocation failed: {source}"))]
    SampleRing { source: crate::buffer::BufferError },
}

/// A producer of complex baseband samples at a known rate.
pub trait SampleSource {
    /// Sample rate of the stream in Hz.
    fn sample_rate(&self) -> f64;

    /// Center frequency the device last reported after tuning, in Hz.
    fn center_freq(&self) -> f64;

    /// Frequency correction currently applied to the device, in ppm.
    fn freq_correction(&self) -> i32;

    /// Retune the device.
    fn tune(&mut self, freq: f64) -> Result<(), SourceError>;

    /// Block until at least `min_samples` are buffered (or the ring is
    /// full); returns the number of producer-side overruns observed.
    fn fill(&mut self, min_samples: usize) -> Result<u32, SourceError>;

    /// The ring the source fills.
    fn buffer(&self) -> &ContiguousRing<Complex32>;

    fn start(&mut self) -> Result<(), SourceError>;

    fn stop(&mut self);

    /// Drop buffered samples, let `packets` packets of stale device data
    /// drain, and drop those too.
    fn flush(&mut self, packets: usize) -> Result<(), SourceError>;
}
