//! rustykal - GSM base station scanner and receiver clock calibrator.
//!
//! **Usage**:
//! ```bash
//! rustykal -s GSM900            # scan a band for base stations
//! rustykal -c 17 -b GSM900      # measure clock offset against chan 17
//! rustykal -f 938.6e6           # same, by frequency
//! ```

use std::env;
use std::process;

use rustykal::band::{arfcn_to_freq, freq_to_arfcn, Band};
use rustykal::scan::{band_scan, offset_detect};
use rustykal::source::rtlsdr::RtlSdrSource;
use rustykal::source::SampleSource;
use rustykal::tracing_init::init_tracing;
use rustykal::util::format_freq;

struct Options {
    freq: Option<f64>,
    chan: Option<u16>,
    scan_band: Option<Band>,
    band_hint: Option<Band>,
    gain_db: Option<f32>,
    device: u32,
    ppm: i32,
    hz_adjust: f64,
    verbosity: u8,
}

fn usage(prog: &str) -> ! {
    println!("rustykal, GSM receiver calibration for rtl-sdr devices");
    println!();
    println!("Usage:");
    println!("\tGSM Base Station Scan:");
    println!("\t\t{prog} -s <band> [options]");
    println!();
    println!("\tClock Offset Calculation:");
    println!("\t\t{prog} <-f frequency | -c channel> [options]");
    println!();
    println!("Where options are:");
    println!("\t-s\tband to scan (GSM850, GSM-R, GSM900, EGSM, DCS, PCS)");
    println!("\t-f\tfrequency of nearby GSM base station");
    println!("\t-c\tchannel of nearby GSM base station");
    println!("\t-b\tband indicator (GSM850, GSM-R, GSM900, EGSM, DCS, PCS)");
    println!("\t-g\tgain in dB");
    println!("\t-d\trtl-sdr device index");
    println!("\t-e\tinitial frequency error in ppm");
    println!("\t-E\tmanual frequency offset in hz");
    println!("\t-v\tverbose (repeat for more)");
    println!("\t-D\tenable debug messages");
    println!("\t-h\thelp");
    process::exit(1);
}

fn parse_band(prog: &str, value: &str) -> Band {
    value.parse().unwrap_or_else(|_| {
        eprintln!("error: bad band indicator: ``{value}''");
        usage(prog);
    })
}

fn flag_value<'a>(args: &'a [String], i: &mut usize) -> &'a str {
    *i += 1;
    if *i >= args.len() {
        eprintln!("error: option {} needs a value", args[*i - 1]);
        usage(&args[0]);
    }
    &args[*i]
}

fn parse_args(args: &[String]) -> Options {
    let prog = &args[0];
    let mut opts = Options {
        freq: None,
        chan: None,
        scan_band: None,
        band_hint: None,
        gain_db: None,
        device: 0,
        ppm: 0,
        hz_adjust: 0.0,
        verbosity: 0,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-f" => opts.freq = flag_value(args, &mut i).parse().ok(),
            "-c" => opts.chan = flag_value(args, &mut i).parse().ok(),
            "-s" => opts.scan_band = Some(parse_band(prog, flag_value(args, &mut i))),
            "-b" => opts.band_hint = Some(parse_band(prog, flag_value(args, &mut i))),
            "-g" => opts.gain_db = flag_value(args, &mut i).parse().ok(),
            "-d" => opts.device = flag_value(args, &mut i).parse().unwrap_or(0),
            "-e" => opts.ppm = flag_value(args, &mut i).parse().unwrap_or(0),
            "-E" => opts.hz_adjust = flag_value(args, &mut i).parse().unwrap_or(0.0),
            "-v" => opts.verbosity += 1,
            "-D" => opts.verbosity = opts.verbosity.max(3),
            _ => usage(prog),
        }
        i += 1;
    }

    opts
}

fn open_source(opts: &Options) -> RtlSdrSource {
    RtlSdrSource::open(opts.device, opts.gain_db, opts.ppm).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    })
}

fn run_offset(prog: &str, opts: Options) {
    // resolve channel and frequency against each other
    let (freq, chan, band) = match (opts.freq, opts.chan) {
        (Some(freq), _) => match freq_to_arfcn(freq) {
            Ok((chan, band)) => (freq, chan, band),
            Err(e) => {
                eprintln!("error: {e}");
                usage(prog);
            }
        },
        (None, Some(chan)) => match arfcn_to_freq(chan, opts.band_hint) {
            Ok((freq, band)) => (freq, chan, band),
            Err(e) => {
                eprintln!("error: {e}");
                usage(prog);
            }
        },
        (None, None) => {
            eprintln!("error: must enter channel or frequency");
            usage(prog);
        }
    };
    if !(869e6..=2e9).contains(&freq) {
        eprintln!("error: bad frequency: {freq}");
        usage(prog);
    }

    let mut source = open_source(&opts);
    if let Err(e) = source.tune(freq + opts.hz_adjust) {
        eprintln!("error: {e}");
        process::exit(1);
    }
    let tuner_error = source.center_freq() - freq;

    eprintln!("{prog}: Calculating clock frequency offset.");
    eprintln!("Using {band} channel {chan} ({:.1}MHz)", freq / 1e6);
    eprintln!(
        "Tuned to {:.6}MHz (reported tuner error: {:.0}Hz)",
        source.center_freq() / 1e6,
        tuner_error
    );

    match offset_detect(&mut source, opts.hz_adjust, tuner_error) {
        Ok(report) => {
            println!("average\t\t[min, max]\t(range, stddev)");
            println!(
                "{}\t\t[{}, {}]\t({}, {:.6})",
                format_freq(report.average),
                report.min.round() as i64,
                report.max.round() as i64,
                (report.max - report.min).round() as i64,
                report.stddev
            );
            println!("overruns: {}", report.overruns);
            println!("not found: {}", report.not_found);
            println!("average absolute error: {:.3} ppm", report.ppm);
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

fn run_scan(prog: &str, band: Band, opts: Options) {
    let mut source = open_source(&opts);

    eprintln!("{prog}: Scanning for {band} base stations.");
    println!("{band}:");

    let result = band_scan(&mut source, band, |hit| {
        println!(
            "\tchan: {} ({:.1}MHz {})\tpower: {:10.2}",
            hit.arfcn,
            hit.freq / 1e6,
            format_freq(f64::from(hit.offset)),
            hit.power
        );
    });
    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let opts = parse_args(&args);
    init_tracing(opts.verbosity);

    match opts.scan_band {
        Some(band) => run_scan(&args[0], band, opts),
        None => run_offset(&args[0], opts),
    }
}
