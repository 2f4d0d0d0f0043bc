// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::metrics::MetricsSnapshot;
use crate::shift_register::TxState;
use crate::signals::DigitalLevel;
use crate::timing::BitTiming;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Serialize, Debug, Clone)]
pub struct McuSnapshot {
    pub cycles: u64,
    pub sreg: u8,
    pub line: DigitalLevel,
    pub tx_state: TxState,
    pub shift_register: u16,
    pub timing: BitTiming,
    pub metrics: MetricsSnapshot,
    pub peripherals: HashMap<String, serde_json::Value>,
}
