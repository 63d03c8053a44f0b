//! GSM receiver calibration.
//!
//! An SDR receiver tuned to a GSM base station can calibrate its own
//! clock: the Frequency Correction Channel is a pure tone at exactly
//! +1625000/24 Hz from the carrier, and a base station holds its carrier
//! to better than 0.05 ppm. Measuring where the tone actually lands
//! gives the receiver's frequency error directly.
//!
//! Two operations build on that:
//! - [`offset_detect`] - measure the clock offset against one known
//!   carrier and report it in Hz and ppm.
//! - [`band_scan`] - sweep a whole GSM band, find the channels carrying
//!   a base station, and report each station's offset.
//!
//! The detection core is [`FcchDetector`]: an adaptive prediction-error
//! filter flags sustained low-error regions (a pure tone is perfectly
//! predictable), and an FFT peak-to-mean test confirms them. Samples
//! flow through [`buffer::ContiguousRing`], a double-mapped ring whose
//! readable region is always one contiguous slice.

pub mod band;
pub mod buffer;
pub mod fcch;
pub mod scan;
pub mod simulation;
pub mod source;
pub mod tracing_init;
pub mod util;

pub use band::Band;
pub use buffer::ContiguousRing;
pub use fcch::{FcchDetector, ScanResult, GSM_RATE};
pub use scan::{band_scan, offset_detect, ChannelHit, OffsetReport};
pub use source::SampleSource;
