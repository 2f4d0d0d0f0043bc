// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use softuart_core::signals::DigitalLevel;
use softuart_core::SimulationObserver;
use std::fs::File;
use std::io::BufWriter;
use std::sync::Mutex;
use vcd::{IdCode, TimescaleUnit, Value, Writer};

/// Streams the TX line and compare-match interrupts to a VCD file.
pub struct VcdObserver {
    state: Mutex<VcdState>,
    ids: VcdIds,
    /// VCD time units (ps) per CPU cycle.
    ps_per_cycle: u64,
}

struct VcdIds {
    tx: IdCode,
    isr: IdCode,
}

struct VcdState {
    writer: Writer<BufWriter<File>>,
    current_time: u64,
    isr_high: bool,
}

fn level_value(level: DigitalLevel) -> Value {
    match level {
        DigitalLevel::High => Value::V1,
        DigitalLevel::Low => Value::V0,
    }
}

impl VcdObserver {
    pub fn new(path: std::path::PathBuf, clock_hz: u32) -> anyhow::Result<Self> {
        if clock_hz == 0 {
            anyhow::bail!("VCD output needs a non-zero clock");
        }
        let file = File::create(&path)?;
        let buf = BufWriter::new(file);
        let mut writer = Writer::new(buf);

        writer.timescale(1, TimescaleUnit::PS)?;
        writer.add_module("softuart")?;
        let tx = writer.add_wire(1, "tx")?;
        let isr = writer.add_wire(1, "timer0_comp")?;
        writer.upscope()?;
        writer.enddefinitions()?;

        writer.timestamp(0)?;
        writer.change_scalar(tx, Value::V1)?;
        writer.change_scalar(isr, Value::V0)?;

        Ok(Self {
            state: Mutex::new(VcdState {
                writer,
                current_time: 0,
                isr_high: false,
            }),
            ids: VcdIds { tx, isr },
            ps_per_cycle: 1_000_000_000_000 / clock_hz as u64,
        })
    }

    fn advance(&self, state: &mut VcdState, cycle: u64) {
        let time = cycle * self.ps_per_cycle;
        if time <= state.current_time {
            return;
        }
        // The interrupt marker is a one-cycle pulse.
        if state.isr_high {
            state.isr_high = false;
            let end = state.current_time + self.ps_per_cycle;
            let _ = state.writer.timestamp(end);
            let _ = state.writer.change_scalar(self.ids.isr, Value::V0);
            state.current_time = end;
            if time == end {
                return;
            }
        }
        state.current_time = time;
        let _ = state.writer.timestamp(time);
    }
}

impl core::fmt::Debug for VcdObserver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "VcdObserver")
    }
}

impl SimulationObserver for VcdObserver {
    fn on_simulation_start(&self, initial: DigitalLevel) {
        if let Ok(mut state) = self.state.lock() {
            let _ = state.writer.change_scalar(self.ids.tx, level_value(initial));
        }
    }

    fn on_simulation_stop(&self, cycle: u64) {
        if let Ok(mut state) = self.state.lock() {
            self.advance(&mut state, cycle);
        }
    }

    fn on_line_change(&self, cycle: u64, level: DigitalLevel) {
        if let Ok(mut state) = self.state.lock() {
            self.advance(&mut state, cycle);
            let _ = state.writer.change_scalar(self.ids.tx, level_value(level));
        }
    }

    fn on_interrupt(&self, cycle: u64) {
        if let Ok(mut state) = self.state.lock() {
            self.advance(&mut state, cycle);
            state.isr_high = true;
            let _ = state.writer.change_scalar(self.ids.isr, Value::V1);
        }
    }
}
