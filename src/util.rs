//! Formatting and statistics helpers for scan reports.

/// Human-readable frequency with an explicit sign, scaled to the
/// largest fitting unit.
pub fn format_freq(freq: f64) -> String {
    let (sign, f) = if freq >= 0.0 {
        ('+', freq)
    } else {
        ('-', -freq)
    };

    if f >= 1e9 {
        format!("{sign} {:.3}GHz", f / 1e9)
    } else if f >= 1e6 {
        format!("{sign} {:.1}MHz", f / 1e6)
    } else if f >= 1e3 {
        format!("{sign} {:.3}kHz", f / 1e3)
    } else {
        format!("{sign} {f:.0}Hz")
    }
}

/// Arithmetic mean; zero for an empty set.
pub fn mean(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
}

/// Mean and population standard deviation.
pub fn mean_stddev(values: &[f32]) -> (f64, f64) {
    let avg = mean(values);
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let var = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - avg;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    (avg, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_magnitude() {
        assert_eq!(format_freq(945.8e6), "+ 945.8MHz");
        assert_eq!(format_freq(-1.8e9), "- 1.800GHz");
        assert_eq!(format_freq(1500.0), "+ 1.500kHz");
        assert_eq!(format_freq(-42.0), "- 42Hz");
        assert_eq!(format_freq(0.0), "+ 0Hz");
    }

    #[test]
    fn stats_on_a_known_set() {
        let values = [2.0f32, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let (avg, dev) = mean_stddev(&values);
        assert!((avg - 5.0).abs() < 1e-9);
        assert!((dev - 2.0).abs() < 1e-9);
    }

    #[test]
    fn stats_on_empty_input() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean_stddev(&[]), (0.0, 0.0));
    }
}
