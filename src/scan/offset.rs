//! Clock-offset measurement against one C0 carrier.

use snafu::ResultExt;
use tracing::{debug, info, instrument};

use super::{DetectorSnafu, ScanError, SourceSnafu, FLUSH_COUNT};
use crate::fcch::{FcchDetector, GSM_RATE};
use crate::source::SampleSource;
use crate::util;

/// Accepted FCCH offsets per measurement run.
const AVG_COUNT: usize = 100;

/// Samples trimmed from each end before averaging.
const AVG_THRESHOLD: usize = AVG_COUNT / 10;

/// Sanity bound on a single offset in Hz.
const OFFSET_MAX: f32 = 40e3;

/// Summary of one clock-offset measurement run.
#[derive(Debug, Clone)]
pub struct OffsetReport {
    /// Trimmed mean of the measured FCCH offsets in Hz.
    pub average: f64,
    /// Smallest and largest offset kept after trimming.
    pub min: f32,
    pub max: f32,
    /// Standard deviation of the kept offsets.
    pub stddev: f64,
    /// Producer-side overruns observed while filling.
    pub overruns: u32,
    /// Buffers scanned without finding a burst.
    pub not_found: u32,
    /// Absolute receiver clock error in ppm.
    pub ppm: f64,
}

/// Measure the receiver clock offset against the tuned carrier.
///
/// Collects [`AVG_COUNT`] FCCH offsets, each from a buffer of 12 frames
/// plus one burst (guaranteed to contain at least one FCCH burst), then
/// drops the [`AVG_THRESHOLD`] smallest and largest before averaging.
/// `hz_adjust` is a manual frequency adjustment applied at tune time;
/// `tuner_error` is the deviation the tuner reported when it was tuned.
#[instrument(skip(source))]
pub fn offset_detect(
    source: &mut dyn SampleSource,
    hz_adjust: f64,
    tuner_error: f64,
) -> Result<OffsetReport, ScanError> {
    let mut detector = FcchDetector::new(source.sample_rate()).context(DetectorSnafu)?;

    let sps = source.sample_rate() / GSM_RATE;
    let buffer_len = ((12.0 * 8.0 * 156.25 + 156.25) * sps).ceil() as usize;

    let mut offsets: Vec<f32> = Vec::with_capacity(AVG_COUNT);
    let mut overruns = 0u32;
    let mut not_found = 0u32;

    source.start().context(SourceSnafu)?;
    source.flush(FLUSH_COUNT).context(SourceSnafu)?;

    while offsets.len() < AVG_COUNT {
        // refill until a buffer arrives without producer overruns
        loop {
            let new = source.fill(buffer_len).context(SourceSnafu)?;
            if new == 0 {
                break;
            }
            overruns += new;
            source.flush(FLUSH_COUNT).context(SourceSnafu)?;
        }

        let consumed = {
            let samples = source.buffer().peek();
            let result = detector.scan(&samples);

            match result.offset {
                Some(raw) => {
                    // the FCCH tone sits at +GSM_RATE/4 from the carrier
                    let offset = raw - (GSM_RATE / 4.0) as f32 - tuner_error as f32;
                    if offset.abs() < OFFSET_MAX {
                        offsets.push(offset);
                        debug!(n = offsets.len(), offset, "fcch offset");
                    }
                }
                None => not_found += 1,
            }
            result.consumed
        };
        source.buffer().purge(consumed);
    }

    source.stop();

    offsets.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let kept = &offsets[AVG_THRESHOLD..AVG_COUNT - AVG_THRESHOLD];
    let (average, stddev) = util::mean_stddev(kept);
    let ppm =
        f64::from(source.freq_correction()) - ((average + hz_adjust) / source.center_freq()) * 1e6;

    info!(average, stddev, ppm, "offset run complete");

    Ok(OffsetReport {
        average,
        min: kept[0],
        max: kept[kept.len() - 1],
        stddev,
        overruns,
        not_found,
        ppm,
    })
}
