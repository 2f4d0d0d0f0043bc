// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_name() -> String {
    "softuart".to_string()
}

fn default_max_baud_error() -> f64 {
    5.0
}

fn default_repeat() -> u32 {
    1
}

/// Clock dividers selectable through the Timer0 CS0[2:0] bits, in encoding
/// order (CS0 = 1 selects the first).
pub const TIMER0_PRESCALERS: [u16; 5] = [1, 8, 64, 256, 1024];

/// I/O ports present on the ATmega16/32.
pub const DEVICE_PORTS: [char; 4] = ['A', 'B', 'C', 'D'];

/// Port letter and bit of the TX line, e.g. PB0.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PinRef {
    pub port: char,
    pub pin: u8,
}

impl Default for PinRef {
    fn default() -> Self {
        Self { port: 'B', pin: 0 }
    }
}

impl std::fmt::Display for PinRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}{}", self.port, self.pin)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransmitterConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default = "default_name")]
    pub name: String,
    /// CPU clock feeding the Timer0 prescaler.
    pub clock_hz: u32,
    pub baud_rate: u32,
    /// Timer0 prescaler. Picked automatically when omitted.
    #[serde(default)]
    pub prescaler: Option<u16>,
    #[serde(default)]
    pub tx_pin: PinRef,
    /// Largest tolerated deviation of the effective baud rate.
    #[serde(default = "default_max_baud_error")]
    pub max_baud_error_percent: f64,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: default_name(),
            clock_hz: 8_000_000,
            baud_rate: 9600,
            prescaler: Some(8),
            tx_pin: PinRef::default(),
            max_baud_error_percent: default_max_baud_error(),
        }
    }
}

impl TransmitterConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read transmitter config at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Transmitter Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }
        if self.clock_hz == 0 {
            anyhow::bail!("'clock_hz' must be greater than zero");
        }
        if self.baud_rate == 0 {
            anyhow::bail!("'baud_rate' must be greater than zero");
        }
        if let Some(prescaler) = self.prescaler {
            if !TIMER0_PRESCALERS.contains(&prescaler) {
                anyhow::bail!(
                    "Unsupported prescaler {}; supported: {:?}",
                    prescaler,
                    TIMER0_PRESCALERS
                );
            }
        }
        if !DEVICE_PORTS.contains(&self.tx_pin.port.to_ascii_uppercase()) {
            anyhow::bail!(
                "'tx_pin.port' must be one of {:?}, got '{}'",
                DEVICE_PORTS,
                self.tx_pin.port
            );
        }
        if self.tx_pin.pin > 7 {
            anyhow::bail!("'tx_pin.pin' must be in 0..=7, got {}", self.tx_pin.pin);
        }
        if self.max_baud_error_percent.is_nan() || self.max_baud_error_percent <= 0.0 {
            anyhow::bail!("'max_baud_error_percent' must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every message was sent and the line returned to idle.
    Completed,
    MaxCycles,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestInputs {
    /// Transmitter config, relative to the script. Built-in defaults when
    /// omitted.
    #[serde(default)]
    pub config: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TestLimits {
    pub max_cycles: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DecodedContainsAssertion {
    pub decoded_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DecodedEqualsAssertion {
    pub decoded_equals: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopReasonAssertion {
    pub expected_stop_reason: StopReason,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TestAssertion {
    DecodedContains(DecodedContainsAssertion),
    DecodedEquals(DecodedEqualsAssertion),
    ExpectedStopReason(StopReasonAssertion),
}

/// Scripted transmission run: messages sent in order, `repeat` times over,
/// then checked against the decoded line.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    #[serde(default)]
    pub inputs: Option<TestInputs>,
    pub messages: Vec<String>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    pub limits: TestLimits,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open test script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }
        if self.messages.is_empty() {
            anyhow::bail!("'messages' must contain at least one entry");
        }
        if self.repeat == 0 {
            anyhow::bail!("'repeat' must be greater than zero");
        }
        if self.limits.max_cycles == 0 {
            anyhow::bail!("Limit 'max_cycles' must be greater than zero");
        }
        Ok(())
    }

    /// Bytes in transmission order.
    pub fn payload(&self) -> Vec<u8> {
        let once: Vec<u8> = self.messages.iter().flat_map(|m| m.bytes()).collect();
        once.repeat(self.repeat as usize)
    }

    pub fn config_path(&self) -> Option<&str> {
        self.inputs.as_ref().and_then(|i| i.config.as_deref())
    }
}
