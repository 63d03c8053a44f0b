//! Base-station scan across one GSM band.

use snafu::ResultExt;
use tracing::{debug, info, instrument};

use super::{ChannelSnafu, DetectorSnafu, ScanError, SourceSnafu, FLUSH_COUNT};
use crate::band::{arfcn_to_freq, Band};
use crate::fcch::{FcchDetector, GSM_RATE};
use crate::source::SampleSource;

/// Attempts before a strong channel is written off as FCCH-free.
const NOTFOUND_MAX: u32 = 10;

/// Sanity bound on the FCCH offset in Hz.
const OFFSET_MAX: f32 = 40e3;

/// A channel found to carry a base station.
#[derive(Debug, Clone, Copy)]
pub struct ChannelHit {
    pub arfcn: u16,
    /// Downlink center frequency in Hz.
    pub freq: f64,
    /// FCCH deviation from the nominal +GSM_RATE/4 tone, in Hz.
    pub offset: f32,
    /// Received power from the first pass.
    pub power: f64,
}

/// Sweep `band` for base stations.
///
/// Pass 1 records the received power of every channel. Channels above
/// the mean of the quietest 60% (some channels carry non-GSM noise and
/// would skew a plain average) get an FCCH pass with up to
/// [`NOTFOUND_MAX`] attempts each. `on_hit` fires as each station is
/// confirmed; the full list is also returned.
#[instrument(skip(source, on_hit))]
pub fn band_scan(
    source: &mut dyn SampleSource,
    band: Band,
    mut on_hit: impl FnMut(&ChannelHit),
) -> Result<Vec<ChannelHit>, ScanError> {
    let mut detector = FcchDetector::new(source.sample_rate()).context(DetectorSnafu)?;

    let sps = source.sample_rate() / GSM_RATE;
    let buffer_len = ((12.0 * 8.0 * 156.25 + 156.25) * sps).ceil() as usize;

    source.start().context(SourceSnafu)?;

    // pass 1: received power per channel
    let mut powers: Vec<(u16, f64)> = Vec::new();
    for arfcn in band.arfcns() {
        let (freq, _) = arfcn_to_freq(arfcn, Some(band)).context(ChannelSnafu)?;
        source.tune(freq).context(SourceSnafu)?;
        fill_clean(source, buffer_len)?;

        let power = {
            let samples = source.buffer().peek();
            samples
                .iter()
                .take(buffer_len)
                .map(|v| f64::from(v.norm_sqr()))
                .sum::<f64>()
                .sqrt()
        };
        debug!(arfcn, freq, power, "channel power");
        powers.push((arfcn, power));
    }

    let mut sorted: Vec<f64> = powers.iter().map(|&(_, p)| p).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let keep = sorted.len() - 4 * sorted.len() / 10;
    let threshold = sorted[..keep].iter().sum::<f64>() / keep as f64;
    info!(threshold, "channel detect threshold");

    // pass 2: FCCH on the strong channels
    let mut hits = Vec::new();
    for &(arfcn, power) in &powers {
        if power <= threshold {
            continue;
        }
        let (freq, _) = arfcn_to_freq(arfcn, Some(band)).context(ChannelSnafu)?;
        source.tune(freq).context(SourceSnafu)?;

        let mut not_found = 0u32;
        while not_found < NOTFOUND_MAX {
            fill_clean(source, buffer_len)?;

            let found = {
                let samples = source.buffer().peek();
                detector.scan(&samples).offset
            };
            match found {
                Some(raw) if (raw - (GSM_RATE / 4.0) as f32).abs() < OFFSET_MAX => {
                    let hit = ChannelHit {
                        arfcn,
                        freq,
                        offset: raw - (GSM_RATE / 4.0) as f32,
                        power,
                    };
                    on_hit(&hit);
                    hits.push(hit);
                    break;
                }
                _ => not_found += 1,
            }
        }
    }

    source.stop();
    Ok(hits)
}

/// Refill until a buffer arrives without producer overruns.
fn fill_clean(source: &mut dyn SampleSource, min_samples: usize) -> Result<(), ScanError> {
    loop {
        source.flush(FLUSH_COUNT).context(SourceSnafu)?;
        if source.fill(min_samples).context(SourceSnafu)? == 0 {
            return Ok(());
        }
    }
}
