// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{Peripheral, SimResult, SimulationError};
use std::sync::Arc;

pub struct PeripheralEntry {
    pub name: String,
    pub base: u16,
    pub size: u16,
    /// Interrupt vector number raised when the peripheral signals an IRQ.
    pub irq: Option<u8>,
    pub dev: Arc<dyn Peripheral>,
}

impl PeripheralEntry {
    fn contains(&self, addr: u16) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

/// Data-space I/O register file.
#[derive(Default)]
pub struct IoBus {
    pub peripherals: Vec<PeripheralEntry>,
}

impl IoBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(
        &mut self,
        name: &str,
        base: u16,
        size: u16,
        irq: Option<u8>,
        dev: Arc<dyn Peripheral>,
    ) -> SimResult<()> {
        let overlaps = self.peripherals.iter().any(|p| {
            base < p.base.saturating_add(p.size) && p.base < base.saturating_add(size)
        });
        if overlaps {
            return Err(SimulationError::OverlappingMapping {
                name: name.to_string(),
                base,
            });
        }
        self.peripherals.push(PeripheralEntry {
            name: name.to_string(),
            base,
            size,
            irq,
            dev,
        });
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&PeripheralEntry> {
        self.peripherals.iter().find(|p| p.name == name)
    }

    fn entry_for(&self, addr: u16) -> SimResult<&PeripheralEntry> {
        self.peripherals
            .iter()
            .find(|p| p.contains(addr))
            .ok_or(SimulationError::UnmappedIo(addr))
    }

    pub fn read_u8(&self, addr: u16) -> SimResult<u8> {
        let entry = self.entry_for(addr)?;
        entry.dev.read(addr - entry.base)
    }

    pub fn write_u8(&self, addr: u16, value: u8) -> SimResult<()> {
        let entry = self.entry_for(addr)?;
        entry.dev.write(addr - entry.base, value)
    }

    /// `*addr |= mask`
    pub fn set_bits(&self, addr: u16, mask: u8) -> SimResult<()> {
        let value = self.read_u8(addr)?;
        self.write_u8(addr, value | mask)
    }

    /// `*addr &= !mask`
    pub fn clear_bits(&self, addr: u16, mask: u8) -> SimResult<()> {
        let value = self.read_u8(addr)?;
        self.write_u8(addr, value & !mask)
    }

    /// Ticks every peripheral once and returns the vectors with a pending IRQ,
    /// lowest vector (highest priority) first.
    pub fn tick_peripherals(&self) -> Vec<u8> {
        let mut pending: Vec<u8> = self
            .peripherals
            .iter()
            .filter_map(|p| {
                let res = p.dev.tick();
                if res.irq {
                    p.irq
                } else {
                    None
                }
            })
            .collect();
        pending.sort_unstable();
        pending
    }
}
