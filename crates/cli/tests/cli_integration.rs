// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;
use std::process::Command;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_softuart"))
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn temp_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("softuart-cli-tests");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{}-{}", std::process::id(), name))
}

#[test]
fn test_send_default_round_trip() {
    let output = bin()
        .args(["send", "--text", "Hello World 2022."])
        .output()
        .expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stdout: {}", stdout);
    assert!(stdout.starts_with("Hello World 2022.\n"));
    assert!(stdout.contains("Frames: 17"));
    assert!(stdout.contains("OCR0=103 prescaler 8"));
}

#[test]
fn test_send_json_report() {
    let output = bin()
        .args(["send", "--json", "--text", "AB", "--config"])
        .arg(fixture("atmega32-pd1.yaml"))
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Failed to parse JSON");
    assert_eq!(json["name"], "atmega32-pd1");
    assert_eq!(json["decoded"], "AB");
    assert_eq!(json["stop_reason"], "completed");
    assert_eq!(json["snapshot"]["tx_state"]["state"], "idle");
    assert_eq!(json["snapshot"]["metrics"]["frames_completed"], 2);
    // 16 MHz / 8 / 19200 = 104.17 ticks.
    assert_eq!(json["snapshot"]["timing"]["compare_value"], 103);
}

#[test]
fn test_send_writes_vcd() {
    let vcd_path = temp_path("send.vcd");
    let output = bin()
        .args(["send", "--text", "U", "--vcd"])
        .arg(&vcd_path)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let content = std::fs::read_to_string(&vcd_path).expect("Failed to read VCD");
    assert!(content.contains("$timescale"), "VCD header missing");
    assert!(content.contains("$var wire 1"), "VCD signal definitions missing");
    assert!(content.contains(" tx "));
    // Start bit of the first frame, one bit period (832 cycles at 125 ns) in.
    assert!(content.contains("#104000000"));

    std::fs::remove_file(vcd_path).ok();
}

#[test]
fn test_send_config_error_exit_code() {
    let output = bin()
        .args(["send", "--text", "x", "--config"])
        .arg(fixture("bad-baud.yaml"))
        .output()
        .expect("Failed to execute command");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_timing_table() {
    let output = bin()
        .args(["timing", "--clock", "8000000", "--baud", "9600"])
        .output()
        .expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("103"));
    assert!(stdout.contains("9615.38"));
    assert!(stdout.contains("auto: prescaler 8 OCR0=103"));
}

#[test]
fn test_timing_unsupported_prescaler() {
    let output = bin()
        .args(["timing", "--clock", "8000000", "--baud", "9600", "--prescaler", "32"])
        .output()
        .expect("Failed to execute command");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_live_round_trip() {
    let output = bin()
        .args(["live", "--baud", "19200", "--text", "live!"])
        .output()
        .expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {}", stdout);
    assert!(stdout.starts_with("live!\n"));
}

#[test]
fn test_script_pass_writes_outputs() {
    let out_dir = temp_path("hello-out");
    let output = bin()
        .arg("test")
        .arg("--script")
        .arg(fixture("hello.yaml"))
        .arg("--output-dir")
        .arg(&out_dir)
        .output()
        .expect("Failed to execute command");
    assert_eq!(output.status.code(), Some(0));

    let result: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(out_dir.join("result.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(result["status"], "pass");
    assert_eq!(result["frames"], 38);
    assert_eq!(result["assertions"].as_array().unwrap().len(), 3);

    let decoded = std::fs::read_to_string(out_dir.join("decoded.log")).unwrap();
    assert_eq!(decoded, "\tHello World 2022.\n\tHello World 2022.\n");

    std::fs::remove_dir_all(out_dir).ok();
}

#[test]
fn test_script_expected_budget_stop() {
    let output = bin()
        .args(["test", "--script"])
        .arg(fixture("budget.yaml"))
        .output()
        .expect("Failed to execute command");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_script_assertion_failure() {
    let output = bin()
        .args(["test", "--script"])
        .arg(fixture("wrong-text.yaml"))
        .output()
        .expect("Failed to execute command");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_script_missing_file() {
    let output = bin()
        .args(["test", "--script", "/nonexistent/script.yaml"])
        .output()
        .expect("Failed to execute command");
    assert_eq!(output.status.code(), Some(2));
}
