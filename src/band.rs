//! GSM band and ARFCN arithmetic.
//!
//! Maps Absolute Radio-Frequency Channel Numbers to downlink center
//! frequencies and back, and walks the channels of a band in scan order.
//! ARFCNs 512-810 are shared between DCS-1800 and PCS-1900 and need a
//! band hint to resolve.

use std::fmt;
use std::str::FromStr;

use snafu::Snafu;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Gsm850,
    GsmR900,
    Gsm900,
    EGsm900,
    Dcs1800,
    Pcs1900,
}

#[derive(Debug, Snafu, PartialEq)]
pub enum BandError {
    #[snafu(display("unknown band indicator `{name}`"))]
    UnknownBand { name: String },

    #[snafu(display("ARFCN {arfcn} is not in any supported band"))]
    BadArfcn { arfcn: u16 },

    #[snafu(display("ARFCN {arfcn} needs a band hint (DCS-1800 or PCS-1900)"))]
    AmbiguousArfcn { arfcn: u16 },

    #[snafu(display("{freq} Hz is not in any supported band"))]
    BadFrequency { freq: f64 },
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Band::Gsm850 => "GSM-850",
            Band::GsmR900 => "GSM-R-900",
            Band::Gsm900 => "GSM-900",
            Band::EGsm900 => "E-GSM-900",
            Band::Dcs1800 => "DCS-1800",
            Band::Pcs1900 => "PCS-1900",
        };
        f.write_str(name)
    }
}

impl FromStr for Band {
    type Err = BandError;

    fn from_str(s: &str) -> Result<Self, BandError> {
        match s {
            "GSM850" | "GSM-850" | "850" => Ok(Band::Gsm850),
            "GSM-R" | "R-GSM" | "GSM-R-900" => Ok(Band::GsmR900),
            "GSM900" | "GSM-900" | "900" => Ok(Band::Gsm900),
            "EGSM" | "E-GSM" | "EGSM900" | "E-GSM900" | "E-GSM-900" => Ok(Band::EGsm900),
            "DCS" | "DCS1800" | "DCS-1800" | "1800" => Ok(Band::Dcs1800),
            "PCS" | "PCS1900" | "PCS-1900" | "1900" => Ok(Band::Pcs1900),
            _ => UnknownBandSnafu { name: s }.fail(),
        }
    }
}

impl Band {
    /// First ARFCN in scan order.
    pub fn first_arfcn(self) -> u16 {
        match self {
            Band::Gsm850 => 128,
            Band::GsmR900 => 955,
            Band::Gsm900 => 1,
            Band::EGsm900 => 0,
            Band::Dcs1800 | Band::Pcs1900 => 512,
        }
    }

    /// Next ARFCN in scan order, if any. E-GSM runs 0-124 and then
    /// continues at 975-1023.
    pub fn next_arfcn(self, arfcn: u16) -> Option<u16> {
        match self {
            Band::Gsm850 => (128..251).contains(&arfcn).then(|| arfcn + 1),
            Band::GsmR900 => (955..974).contains(&arfcn).then(|| arfcn + 1),
            Band::Gsm900 => (1..124).contains(&arfcn).then(|| arfcn + 1),
            Band::EGsm900 => match arfcn {
                0..=123 => Some(arfcn + 1),
                124 => Some(975),
                975..=1022 => Some(arfcn + 1),
                _ => None,
            },
            Band::Dcs1800 => (512..885).contains(&arfcn).then(|| arfcn + 1),
            Band::Pcs1900 => (512..810).contains(&arfcn).then(|| arfcn + 1),
        }
    }

    /// All channels of the band in scan order.
    pub fn arfcns(self) -> impl Iterator<Item = u16> {
        std::iter::successors(Some(self.first_arfcn()), move |&c| self.next_arfcn(c))
    }
}

/// Downlink center frequency of `arfcn` and the band it resolved to.
pub fn arfcn_to_freq(arfcn: u16, hint: Option<Band>) -> Result<(f64, Band), BandError> {
    match arfcn {
        128..=251 => Ok((
            824.2e6 + 0.2e6 * f64::from(arfcn - 128) + 45.0e6,
            Band::Gsm850,
        )),
        1..=124 => {
            let band = if hint == Some(Band::EGsm900) {
                Band::EGsm900
            } else {
                Band::Gsm900
            };
            Ok((890.0e6 + 0.2e6 * f64::from(arfcn) + 45.0e6, band))
        }
        0 => Ok((935.0e6, Band::EGsm900)),
        955..=1023 => {
            let band = if arfcn >= 975 {
                Band::EGsm900
            } else {
                Band::GsmR900
            };
            Ok((890.0e6 + 0.2e6 * (f64::from(arfcn) - 1024.0) + 45.0e6, band))
        }
        512..=810 => match hint {
            Some(Band::Dcs1800) => Ok((
                1710.2e6 + 0.2e6 * f64::from(arfcn - 512) + 95.0e6,
                Band::Dcs1800,
            )),
            Some(Band::Pcs1900) => Ok((
                1850.2e6 + 0.2e6 * f64::from(arfcn - 512) + 80.0e6,
                Band::Pcs1900,
            )),
            _ => AmbiguousArfcnSnafu { arfcn }.fail(),
        },
        811..=885 => Ok((
            1710.2e6 + 0.2e6 * f64::from(arfcn - 512) + 95.0e6,
            Band::Dcs1800,
        )),
        _ => BadArfcnSnafu { arfcn }.fail(),
    }
}

/// ARFCN whose downlink channel contains `freq`, and its band.
pub fn freq_to_arfcn(freq: f64) -> Result<(u16, Band), BandError> {
    if (869.2e6..=893.8e6).contains(&freq) {
        return Ok((((freq - 869.2e6) / 0.2e6) as u16 + 128, Band::Gsm850));
    }
    if (921.2e6..=925.0e6).contains(&freq) {
        // truncate toward zero before applying the 1024 offset; the two
        // orders disagree by one for off-grid frequencies
        return Ok((
            (((freq - 935.0e6) / 0.2e6) as i32 + 1024) as u16,
            Band::GsmR900,
        ));
    }
    if (935.2e6..=959.8e6).contains(&freq) {
        return Ok((((freq - 935.0e6) / 0.2e6) as u16, Band::Gsm900));
    }
    if freq == 935.0e6 {
        return Ok((0, Band::EGsm900));
    }
    if (925.2e6..=934.8e6).contains(&freq) {
        return Ok((
            (((freq - 935.0e6) / 0.2e6) as i32 + 1024) as u16,
            Band::EGsm900,
        ));
    }
    if (1805.2e6..=1879.8e6).contains(&freq) {
        return Ok((((freq - 1805.2e6) / 0.2e6) as u16 + 512, Band::Dcs1800));
    }
    if (1930.2e6..=1989.8e6).contains(&freq) {
        return Ok((((freq - 1930.2e6) / 0.2e6) as u16 + 512, Band::Pcs1900));
    }
    BadFrequencySnafu { freq }.fail()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_edges_resolve() {
        assert_eq!(
            arfcn_to_freq(128, None).unwrap(),
            (869.2e6, Band::Gsm850)
        );
        assert_eq!(arfcn_to_freq(1, None).unwrap(), (935.2e6, Band::Gsm900));
        assert_eq!(arfcn_to_freq(0, None).unwrap(), (935.0e6, Band::EGsm900));
        assert_eq!(
            arfcn_to_freq(512, Some(Band::Dcs1800)).unwrap(),
            (1805.2e6, Band::Dcs1800)
        );
        assert_eq!(
            arfcn_to_freq(512, Some(Band::Pcs1900)).unwrap(),
            (1930.2e6, Band::Pcs1900)
        );
    }

    #[test]
    fn overlap_needs_a_hint() {
        assert_eq!(
            arfcn_to_freq(600, None),
            Err(BandError::AmbiguousArfcn { arfcn: 600 })
        );
        assert!(arfcn_to_freq(600, Some(Band::Gsm900)).is_err());
        // 811-885 is DCS-1800 only
        assert_eq!(
            arfcn_to_freq(811, None).unwrap().1,
            Band::Dcs1800
        );
    }

    #[test]
    fn round_trips_through_frequency() {
        for (arfcn, band) in [
            (128u16, Band::Gsm850),
            (200, Band::Gsm850),
            (1, Band::Gsm900),
            (62, Band::Gsm900),
            (700, Band::Dcs1800),
            (700, Band::Pcs1900),
            (960, Band::GsmR900),
        ] {
            let (freq, _) = arfcn_to_freq(arfcn, Some(band)).unwrap();
            let (back, back_band) = freq_to_arfcn(freq).unwrap();
            assert_eq!(back, arfcn, "{band} arfcn {arfcn} via {freq}");
            assert_eq!(back_band, band);
        }
    }

    #[test]
    fn off_grid_frequencies_truncate_toward_zero() {
        // halfway between ARFCNs 975 and 976; truncation of the negative
        // bin offset must happen before the 1024 wrap is applied
        assert_eq!(
            freq_to_arfcn(925.3e6).unwrap(),
            (976, Band::EGsm900)
        );
        assert_eq!(
            freq_to_arfcn(921.3e6).unwrap(),
            (956, Band::GsmR900)
        );
        // positive side for comparison: plain floor
        assert_eq!(freq_to_arfcn(935.3e6).unwrap(), (1, Band::Gsm900));
    }

    #[test]
    fn channel_walks_cover_the_band() {
        assert_eq!(Band::Gsm900.arfcns().count(), 124);
        assert_eq!(Band::Gsm850.arfcns().count(), 124);
        assert_eq!(Band::EGsm900.arfcns().count(), 174);
        assert_eq!(Band::Dcs1800.arfcns().count(), 374);
        assert_eq!(Band::Pcs1900.arfcns().count(), 299);
        assert_eq!(Band::GsmR900.arfcns().count(), 20);

        // E-GSM jumps from 124 to 975
        let chans: Vec<u16> = Band::EGsm900.arfcns().collect();
        assert_eq!(chans[124], 124);
        assert_eq!(chans[125], 975);
    }

    #[test]
    fn band_names_parse_in_all_spellings() {
        for s in ["GSM900", "GSM-900", "900"] {
            assert_eq!(s.parse::<Band>().unwrap(), Band::Gsm900);
        }
        assert_eq!("EGSM".parse::<Band>().unwrap(), Band::EGsm900);
        assert_eq!("GSM-R".parse::<Band>().unwrap(), Band::GsmR900);
        assert!("FM".parse::<Band>().is_err());
        assert_eq!(Band::Pcs1900.to_string(), "PCS-1900");
    }
}
