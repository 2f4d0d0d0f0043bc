// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use softuart_config::{PinRef, StopReason, TestAssertion, TestScript, TransmitterConfig};
use std::time::{SystemTime, UNIX_EPOCH};

fn write_temp_file(prefix: &str, contents: &str) -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("softuart-config-tests");
    let _ = std::fs::create_dir_all(&dir);

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = dir.join(format!("{}-{}.yaml", prefix, nonce));
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

#[test]
fn test_full_config_from_file() {
    let path = write_temp_file(
        "full",
        r#"
schema_version: "1.0"
name: "atmega32-softuart"
clock_hz: 8000000
baud_rate: 9600
prescaler: 8
tx_pin: { port: "D", pin: 5 }
max_baud_error_percent: 2.5
"#,
    );

    let cfg = TransmitterConfig::from_file(&path).unwrap();
    assert_eq!(cfg.name, "atmega32-softuart");
    assert_eq!(cfg.prescaler, Some(8));
    assert_eq!(cfg.tx_pin, PinRef { port: 'D', pin: 5 });
    assert_eq!(cfg.max_baud_error_percent, 2.5);
}

#[test]
fn test_missing_file_reports_path() {
    let err = TransmitterConfig::from_file("/nonexistent/softuart.yaml").unwrap_err();
    assert!(err.to_string().contains("softuart.yaml"));
}

#[test]
fn test_missing_required_field() {
    let err = TransmitterConfig::from_yaml("clock_hz: 8000000\n").unwrap_err();
    assert!(format!("{:#}", err).contains("baud_rate"));
}

#[test]
fn test_script_from_file() {
    let path = write_temp_file(
        "script",
        r#"
schema_version: "1.0"
inputs:
  config: "board.yaml"
messages:
  - "\tHello World 2022.\n"
limits:
  max_cycles: 2000000
assertions:
  - decoded_contains: "Hello"
  - expected_stop_reason: completed
"#,
    );

    let script = TestScript::from_file(&path).unwrap();
    assert_eq!(script.config_path(), Some("board.yaml"));
    assert_eq!(script.repeat, 1);
    assert_eq!(script.payload(), b"\tHello World 2022.\n".to_vec());
    assert!(matches!(
        script.assertions[0],
        TestAssertion::DecodedContains(_)
    ));
    match &script.assertions[1] {
        TestAssertion::ExpectedStopReason(a) => {
            assert_eq!(a.expected_stop_reason, StopReason::Completed)
        }
        other => panic!("unexpected assertion {:?}", other),
    }
}

#[test]
fn test_script_rejects_zero_limits() {
    let path = write_temp_file(
        "zero-limit",
        r#"
schema_version: "1.0"
messages: ["x"]
limits:
  max_cycles: 0
"#,
    );
    let err = TestScript::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("max_cycles"));
}
