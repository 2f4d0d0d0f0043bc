// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use softuart_config::{StopReason, TestAssertion, TestScript, TransmitterConfig};
use softuart_core::decoder::{decode_levels, decode_trace};
use softuart_core::metrics::MetricsSnapshot;
use softuart_core::snapshot::McuSnapshot;
use softuart_core::system::Mcu;
use softuart_core::timing::TIMER0_PRESCALERS;
use softuart_core::trace::{BitLogPin, LineRecorder};
use softuart_core::{BitTiming, SoftUartTx};

mod vcd_trace;

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

/// Cycle budget for `send` when none is given.
const DEFAULT_MAX_CYCLES: u64 = 100_000_000;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Timer-driven software UART transmitter on a simulated AVR",
    long_about = None
)]
struct Cli {
    /// Enable per-frame and per-bit tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transmit text on the simulated MCU and decode what reached the pin.
    Send(SendArgs),

    /// Print OCR0, effective baud and error for a clock/baud pair.
    Timing(TimingArgs),

    /// Transmit in real time on a host timer thread.
    Live(LiveArgs),

    /// Deterministic, CI-friendly run driven by a test script (YAML).
    Test(TestArgs),
}

#[derive(Parser, Debug)]
struct SendArgs {
    /// Transmitter config (YAML). Built-in 8 MHz / 9600 baud on PB0 when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Text to transmit
    #[arg(long)]
    text: String,

    /// Write the TX line as a VCD waveform
    #[arg(long)]
    vcd: Option<PathBuf>,

    /// Print a JSON report instead of text
    #[arg(long)]
    json: bool,

    /// Give up after this many CPU cycles
    #[arg(long, default_value_t = DEFAULT_MAX_CYCLES)]
    max_cycles: u64,
}

#[derive(Parser, Debug)]
struct TimingArgs {
    /// CPU clock in Hz
    #[arg(long)]
    clock: u32,

    /// Target baud rate
    #[arg(long)]
    baud: u32,

    /// Timer0 prescaler; every prescaler is listed when omitted
    #[arg(long)]
    prescaler: Option<u16>,
}

#[derive(Parser, Debug)]
struct LiveArgs {
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    #[arg(long)]
    text: String,
}

#[derive(Parser, Debug)]
struct TestArgs {
    /// Path to the test script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Override the script's cycle budget
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Directory to write test artifacts (result.json, decoded.log)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Write the TX line as a VCD waveform
    #[arg(long)]
    vcd: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SendReport {
    name: String,
    stop_reason: StopReason,
    sent: String,
    decoded: String,
    frames: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    decode_error: Option<String>,
    cycles: u64,
    actual_baud: f64,
    error_percent: f64,
    snapshot: McuSnapshot,
}

#[derive(Debug, Serialize)]
struct TestResult {
    result_schema_version: String,
    status: String,
    stop_reason: StopReason,
    cycles: u64,
    max_cycles: u64,
    frames: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    assertions: Vec<AssertionResult>,
    metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
struct AssertionResult {
    assertion: TestAssertion,
    passed: bool,
}

/// Outcome of one simulated transmission.
struct Transmission {
    stop_reason: StopReason,
    decoded: Vec<u8>,
    decode_error: Option<String>,
    snapshot: McuSnapshot,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with appropriate level based on --trace flag
    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Send(args) => run_send(args),
        Commands::Timing(args) => run_timing(args),
        Commands::Live(args) => run_live(args),
        Commands::Test(args) => run_test(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TransmitterConfig> {
    match path {
        Some(p) => {
            info!("Loading transmitter config: {:?}", p);
            TransmitterConfig::from_file(p)
        }
        None => {
            info!("Using default transmitter configuration");
            Ok(TransmitterConfig::default())
        }
    }
}

fn transmit(
    mut mcu: Mcu,
    payload: &[u8],
    max_cycles: u64,
    vcd: Option<&Path>,
) -> anyhow::Result<Transmission> {
    let recorder = Arc::new(LineRecorder::new());
    mcu.add_observer(recorder.clone());
    if let Some(path) = vcd {
        info!("Writing VCD trace to {:?}", path);
        let observer = vcd_trace::VcdObserver::new(path.to_path_buf(), mcu.timing().clock_hz)?;
        mcu.add_observer(Arc::new(observer));
    }

    mcu.init()?;
    let stop_reason = mcu.send(payload, max_cycles);
    mcu.finish();

    let (decoded, decode_error) =
        match decode_trace(&recorder.trace(), mcu.timing().cycles_per_bit()) {
            Ok(frames) => (frames.iter().map(|f| f.byte).collect(), None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

    Ok(Transmission {
        stop_reason,
        decoded,
        decode_error,
        snapshot: mcu.snapshot(),
    })
}

fn run_send(args: SendArgs) -> ExitCode {
    let config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let mcu = match Mcu::from_config(&config) {
        Ok(m) => m,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let timing = *mcu.timing();

    let started = Instant::now();
    let tx = match transmit(mcu, args.text.as_bytes(), args.max_cycles, args.vcd.as_deref()) {
        Ok(t) => t,
        Err(e) => {
            error!("Simulation error: {:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };
    info!(
        "Simulated {} cycles in {:?}",
        tx.snapshot.cycles,
        started.elapsed()
    );

    let report = SendReport {
        name: config.name.clone(),
        stop_reason: tx.stop_reason,
        sent: args.text.clone(),
        decoded: String::from_utf8_lossy(&tx.decoded).into_owned(),
        frames: tx.decoded.len(),
        decode_error: tx.decode_error.clone(),
        cycles: tx.snapshot.cycles,
        actual_baud: timing.actual_baud(),
        error_percent: timing.error_percent(),
        snapshot: tx.snapshot,
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    } else {
        println!("{}", report.decoded);
        println!("---");
        println!("Frames: {}", report.frames);
        println!("Cycles: {}", report.cycles);
        println!(
            "Baud: {} target, {:.1} actual ({:+.2}%)",
            timing.baud_rate, report.actual_baud, report.error_percent
        );
        println!(
            "Timer0: OCR0={} prescaler {}",
            timing.compare_value, timing.prescaler
        );
    }

    if let Some(e) = &report.decode_error {
        error!("Line did not decode cleanly: {}", e);
        return ExitCode::from(EXIT_ASSERT_FAIL);
    }
    if report.stop_reason != StopReason::Completed {
        error!("Cycle budget of {} exhausted", args.max_cycles);
        return ExitCode::from(EXIT_RUNTIME_ERROR);
    }
    if tx.decoded != args.text.as_bytes() {
        error!("Decoded output differs from the text sent");
        return ExitCode::from(EXIT_ASSERT_FAIL);
    }
    ExitCode::from(EXIT_PASS)
}

fn run_timing(args: TimingArgs) -> ExitCode {
    let prescalers: Vec<u16> = match args.prescaler {
        Some(p) => vec![p],
        None => TIMER0_PRESCALERS.to_vec(),
    };

    println!(
        "{:>9} {:>5} {:>14} {:>8}",
        "prescaler", "OCR0", "actual baud", "error"
    );
    let mut any_ok = false;
    for prescaler in prescalers {
        match BitTiming::new(args.clock, prescaler, args.baud) {
            Ok(t) => {
                any_ok = true;
                println!(
                    "{:>9} {:>5} {:>14.2} {:>+7.2}%",
                    prescaler,
                    t.compare_value,
                    t.actual_baud(),
                    t.error_percent()
                );
            }
            Err(e) => println!("{:>9} {:>5} ({})", prescaler, "-", e),
        }
    }

    if args.prescaler.is_none() {
        match BitTiming::auto(args.clock, args.baud) {
            Ok(t) => println!("auto: prescaler {} OCR0={}", t.prescaler, t.compare_value),
            Err(e) => println!("auto: {}", e),
        }
    }

    if any_ok {
        ExitCode::from(EXIT_PASS)
    } else {
        ExitCode::from(EXIT_CONFIG_ERROR)
    }
}

fn run_live(args: LiveArgs) -> ExitCode {
    if args.baud == 0 {
        error!("Baud rate must be greater than zero");
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }
    let period = Duration::from_nanos(1_000_000_000 / args.baud as u64);

    let tx = match SoftUartTx::threaded(BitLogPin::new(), period) {
        Ok(tx) => tx,
        Err(e) => {
            error!("Failed to start timer thread: {}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    info!("Live transmit at {} baud ({:?} per bit)", args.baud, period);
    let started = Instant::now();
    tx.transmit_str(&args.text);
    let elapsed = started.elapsed();

    let decoded = match decode_levels(tx.pin().take_log(), 1) {
        Ok(frames) => frames.iter().map(|f| f.byte).collect::<Vec<u8>>(),
        Err(e) => {
            error!("Line did not decode cleanly: {}", e);
            return ExitCode::from(EXIT_ASSERT_FAIL);
        }
    };

    println!("{}", String::from_utf8_lossy(&decoded));
    println!("---");
    println!(
        "Frames: {} in {:?} (nominal {:?})",
        tx.metrics().get_frames_completed(),
        elapsed,
        period * 10 * args.text.len() as u32
    );

    if decoded != args.text.as_bytes() {
        error!("Decoded output differs from the text sent");
        return ExitCode::from(EXIT_ASSERT_FAIL);
    }
    ExitCode::from(EXIT_PASS)
}

fn run_test(args: TestArgs) -> ExitCode {
    let script = match TestScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let config_path = script
        .config_path()
        .filter(|s| !s.trim().is_empty())
        .map(|s| resolve_script_path(&args.script, s));
    let mcu = match load_config(config_path.as_deref()).and_then(|c| Mcu::from_config(&c)) {
        Ok(m) => m,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let max_cycles = args.max_cycles.unwrap_or(script.limits.max_cycles);
    let payload = script.payload();
    let tx = match transmit(mcu, &payload, max_cycles, args.vcd.as_deref()) {
        Ok(t) => t,
        Err(e) => {
            let msg = format!("Simulation error: {:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, msg);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    let decoded_text = String::from_utf8_lossy(&tx.decoded).into_owned();

    let mut assertion_results = Vec::new();
    let mut all_passed = true;
    let mut expected_stop_reason_matched = false;

    for assertion in &script.assertions {
        let passed = match assertion {
            TestAssertion::DecodedContains(a) => decoded_text.contains(&a.decoded_contains),
            TestAssertion::DecodedEquals(a) => decoded_text == a.decoded_equals,
            TestAssertion::ExpectedStopReason(a) => a.expected_stop_reason == tx.stop_reason,
        };

        if matches!(assertion, TestAssertion::ExpectedStopReason(_)) && passed {
            expected_stop_reason_matched = true;
        }

        if !passed {
            all_passed = false;
            error!(
                "Assertion failed: {:?} (decoded len={})",
                assertion,
                decoded_text.len()
            );
        }

        assertion_results.push(AssertionResult {
            assertion: assertion.clone(),
            passed,
        });
    }

    // Running out of cycles only passes when the script asked for it.
    let stop_requires_assertion = tx.stop_reason == StopReason::MaxCycles;
    let decode_failed = tx.decode_error.is_some() && tx.stop_reason == StopReason::Completed;

    let (status, code) =
        if !all_passed || (stop_requires_assertion && !expected_stop_reason_matched) {
            ("fail", EXIT_ASSERT_FAIL)
        } else if decode_failed {
            ("error", EXIT_RUNTIME_ERROR)
        } else {
            ("pass", EXIT_PASS)
        };
    info!("Test {}: {} frames decoded", status, tx.decoded.len());

    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        stop_reason: tx.stop_reason,
        cycles: tx.snapshot.cycles,
        max_cycles,
        frames: tx.decoded.len(),
        message: tx.decode_error.clone(),
        assertions: assertion_results,
        metrics: tx.snapshot.metrics,
    };
    write_outputs(&args, &result, Some(&decoded_text));

    ExitCode::from(code)
}

fn write_outputs(args: &TestArgs, result: &TestResult, decoded: Option<&str>) {
    let Some(output_dir) = &args.output_dir else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {:?}: {}", output_dir, e);
        return;
    }

    let result_path = output_dir.join("result.json");
    match std::fs::File::create(&result_path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, result) {
                error!("Failed to write result.json: {}", e);
            }
        }
        Err(e) => error!("Failed to create result.json: {}", e),
    }

    if let Some(text) = decoded {
        let decoded_path = output_dir.join("decoded.log");
        if let Err(e) = std::fs::write(&decoded_path, text) {
            error!("Failed to write decoded.log: {}", e);
        }
    }
}

fn write_config_error_outputs(args: &TestArgs, message: String) {
    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        stop_reason: StopReason::Completed,
        cycles: 0,
        max_cycles: args.max_cycles.unwrap_or(0),
        frames: 0,
        message: Some(message),
        assertions: Vec::new(),
        metrics: MetricsSnapshot::default(),
    };
    write_outputs(args, &result, None);
}

fn resolve_script_path(script_path: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() {
        return p;
    }
    script_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(p)
}
