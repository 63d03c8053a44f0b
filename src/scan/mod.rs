//! Top-level calibration operations.
//!
//! - [`offset_detect`] - measure the receiver clock error against one
//!   known base station carrier.
//! - [`band_scan`] - sweep a GSM band for base stations.

mod c0;
mod offset;

pub use c0::{band_scan, ChannelHit};
pub use offset::{offset_detect, OffsetReport};

use snafu::Snafu;

/// Packets drained per flush so the tuner settles before a measurement.
pub(crate) const FLUSH_COUNT: usize = 10;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ScanError {
    #[snafu(display("sample source failed: {source}"))]
    Source { source: crate::source::SourceError },

    #[snafu(display("detector setup failed: {source}"))]
    Detector { source: crate::fcch::FcchError },

    #[snafu(display("channel arithmetic failed: {source}"))]
    Channel { source: crate::band::BandError },
}
