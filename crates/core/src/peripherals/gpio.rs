// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::DigitalLevel;
use crate::{SimResult, TxPin};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

// Offsets from the PINx data-space address.
pub const PIN: u16 = 0x00;
pub const DDR: u16 = 0x01;
pub const PORT: u16 = 0x02;

/// AVR 8-bit I/O port (PINx, DDRx, PORTx).
#[derive(Debug, Default)]
pub struct GpioPort {
    ddr: AtomicU8,
    port: AtomicU8,
    /// Levels applied from outside the chip to pins configured as inputs.
    external: AtomicU8,
}

#[derive(Debug, serde::Serialize)]
struct GpioSnapshot {
    pin: u8,
    ddr: u8,
    port: u8,
}

impl GpioPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level seen on pin `n`. Outputs follow PORTx; inputs with PORTx set
    /// are pulled up; floating inputs read the externally applied level.
    pub fn pin_level(&self, n: u8) -> DigitalLevel {
        let mask = 1u8 << (n & 0x07);
        let ddr = self.ddr.load(Ordering::SeqCst);
        let port = self.port.load(Ordering::SeqCst);
        if ddr & mask != 0 || port & mask != 0 {
            DigitalLevel::from(port & mask != 0)
        } else {
            DigitalLevel::from(self.external.load(Ordering::SeqCst) & mask != 0)
        }
    }

    pub fn set_external(&self, n: u8, level: DigitalLevel) {
        let mask = 1u8 << (n & 0x07);
        match level {
            DigitalLevel::High => self.external.fetch_or(mask, Ordering::SeqCst),
            DigitalLevel::Low => self.external.fetch_and(!mask, Ordering::SeqCst),
        };
    }

    fn pin_register(&self) -> u8 {
        let ddr = self.ddr.load(Ordering::SeqCst);
        (self.port.load(Ordering::SeqCst) & ddr) | (self.external.load(Ordering::SeqCst) & !ddr)
    }

    fn read_reg(&self, offset: u16) -> u8 {
        match offset {
            PIN => self.pin_register(),
            DDR => self.ddr.load(Ordering::SeqCst),
            PORT => self.port.load(Ordering::SeqCst),
            _ => 0,
        }
    }

    fn write_reg(&self, offset: u16, value: u8) {
        match offset {
            // Writing a one to PINx toggles the matching PORTx bit.
            PIN => {
                self.port.fetch_xor(value, Ordering::SeqCst);
            }
            DDR => self.ddr.store(value, Ordering::SeqCst),
            PORT => self.port.store(value, Ordering::SeqCst),
            _ => {}
        }
    }
}

impl crate::Peripheral for GpioPort {
    fn read(&self, offset: u16) -> SimResult<u8> {
        Ok(self.read_reg(offset))
    }

    fn write(&self, offset: u16, value: u8) -> SimResult<()> {
        self.write_reg(offset, value);
        Ok(())
    }

    fn snapshot(&self) -> serde_json::Value {
        let snap = GpioSnapshot {
            pin: self.read_reg(PIN),
            ddr: self.read_reg(DDR),
            port: self.read_reg(PORT),
        };
        serde_json::to_value(snap).unwrap_or(serde_json::Value::Null)
    }
}

/// One pin of a shared [`GpioPort`], driven through PORTx set/clear.
#[derive(Debug, Clone)]
pub struct PortPin {
    port: Arc<GpioPort>,
    pin: u8,
}

impl PortPin {
    pub fn new(port: Arc<GpioPort>, pin: u8) -> Self {
        Self {
            port,
            pin: pin & 0x07,
        }
    }

    pub fn index(&self) -> u8 {
        self.pin
    }
}

impl TxPin for PortPin {
    fn set_level(&self, level: DigitalLevel) {
        let mask = 1u8 << self.pin;
        match level {
            DigitalLevel::High => self.port.port.fetch_or(mask, Ordering::SeqCst),
            DigitalLevel::Low => self.port.port.fetch_and(!mask, Ordering::SeqCst),
        };
    }

    fn level(&self) -> DigitalLevel {
        self.port.pin_level(self.pin)
    }
}
