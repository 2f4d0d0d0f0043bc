// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl DigitalLevel {
    /// Level for bit 0 of `bits`: set means high (mark), clear means low (space).
    pub fn from_lsb(bits: u16) -> Self {
        Self::from(bits & 0x01 != 0)
    }

    pub fn as_bit(self) -> u8 {
        match self {
            DigitalLevel::High => 1,
            DigitalLevel::Low => 0,
        }
    }
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}
