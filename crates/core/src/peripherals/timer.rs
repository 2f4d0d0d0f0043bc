// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::timing::TIMER0_PRESCALERS;
use crate::{PeripheralTickResult, SimResult, TimingSource};
use bitflags::bitflags;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

// Offsets from the TCNT0 data-space address (0x52 on ATmega16/32).
pub const TCNT0: u16 = 0x00;
pub const TCCR0: u16 = 0x01;
pub const TIFR: u16 = 0x06;
pub const TIMSK: u16 = 0x07;
pub const OCR0: u16 = 0x0A;

bitflags! {
    /// Timer/Counter0 control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tccr0: u8 {
        const CS00 = 1 << 0;
        const CS01 = 1 << 1;
        const CS02 = 1 << 2;
        const WGM01 = 1 << 3;
        const COM00 = 1 << 4;
        const COM01 = 1 << 5;
        const WGM00 = 1 << 6;
        const FOC0 = 1 << 7;

        const CLOCK_SELECT = Self::CS00.bits() | Self::CS01.bits() | Self::CS02.bits();
    }

    /// Timer0 bits of the shared interrupt mask register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Timsk: u8 {
        const TOIE0 = 1 << 0;
        const OCIE0 = 1 << 1;
    }

    /// Timer0 bits of the shared interrupt flag register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tifr: u8 {
        const TOV0 = 1 << 0;
        const OCF0 = 1 << 1;
    }
}

impl Tccr0 {
    /// CS0[2:0] encoding for an internal clock divider.
    pub fn clock_select(prescaler: u16) -> Option<Self> {
        let index = TIMER0_PRESCALERS.iter().position(|&p| p == prescaler)?;
        Some(Self::from_bits_truncate(index as u8 + 1))
    }

    /// Divider currently selected, `None` when stopped or clocked externally.
    pub fn divider(self) -> Option<u32> {
        let cs = (self & Self::CLOCK_SELECT).bits() as usize;
        cs.checked_sub(1)
            .and_then(|index| TIMER0_PRESCALERS.get(index))
            .map(|&p| p as u32)
    }
}

/// ATmega-style 8-bit Timer/Counter0 with normal and CTC modes.
///
/// Registers live in atomics so the driver can arm and disarm the timer from
/// foreground and interrupt context while the bus ticks it.
#[derive(Debug, Default)]
pub struct Timer0 {
    tccr0: AtomicU8,
    tcnt0: AtomicU8,
    ocr0: AtomicU8,
    timsk: AtomicU8,
    tifr: AtomicU8,

    // Internal state
    psc_cnt: AtomicU32,
    /// Divider applied by `TimingSource::enable`.
    prescaler: AtomicU16,
}

#[derive(Debug, serde::Serialize)]
struct Timer0Snapshot {
    tccr0: u8,
    tcnt0: u8,
    ocr0: u8,
    timsk: u8,
    tifr: u8,
    prescaler: u16,
}

impl Timer0 {
    pub fn new() -> Self {
        Self {
            prescaler: AtomicU16::new(8),
            ..Default::default()
        }
    }

    /// Sets the divider the timer runs at once armed. Unsupported values are
    /// ignored.
    pub fn select_prescaler(&self, prescaler: u16) {
        if Tccr0::clock_select(prescaler).is_some() {
            self.prescaler.store(prescaler, Ordering::SeqCst);
        } else {
            tracing::warn!("Timer0: ignoring unsupported prescaler {}", prescaler);
        }
    }

    pub fn control(&self) -> Tccr0 {
        Tccr0::from_bits_retain(self.tccr0.load(Ordering::SeqCst))
    }

    pub fn counter(&self) -> u8 {
        self.tcnt0.load(Ordering::SeqCst)
    }

    pub fn compare(&self) -> u8 {
        self.ocr0.load(Ordering::SeqCst)
    }

    pub fn interrupt_mask(&self) -> Timsk {
        Timsk::from_bits_retain(self.timsk.load(Ordering::SeqCst))
    }

    pub fn flags(&self) -> Tifr {
        Tifr::from_bits_retain(self.tifr.load(Ordering::SeqCst))
    }

    /// Clears OCF0 the way the hardware does when it vectors to TIMER0_COMP.
    pub fn acknowledge_compare(&self) {
        self.tifr.fetch_and(!Tifr::OCF0.bits(), Ordering::SeqCst);
    }

    fn compare_irq_pending(&self) -> bool {
        self.flags().contains(Tifr::OCF0) && self.interrupt_mask().contains(Timsk::OCIE0)
    }

    fn read_reg(&self, offset: u16) -> u8 {
        match offset {
            TCNT0 => self.tcnt0.load(Ordering::SeqCst),
            TCCR0 => self.tccr0.load(Ordering::SeqCst),
            TIFR => self.tifr.load(Ordering::SeqCst),
            TIMSK => self.timsk.load(Ordering::SeqCst),
            OCR0 => self.ocr0.load(Ordering::SeqCst),
            _ => 0,
        }
    }

    fn write_reg(&self, offset: u16, value: u8) {
        match offset {
            TCNT0 => self.tcnt0.store(value, Ordering::SeqCst),
            // FOC0 is a strobe and always reads as zero.
            TCCR0 => self
                .tccr0
                .store(value & !Tccr0::FOC0.bits(), Ordering::SeqCst),
            // Flags are cleared by writing a logical one.
            TIFR => {
                self.tifr.fetch_and(!value, Ordering::SeqCst);
            }
            TIMSK => self.timsk.store(value, Ordering::SeqCst),
            OCR0 => self.ocr0.store(value, Ordering::SeqCst),
            _ => {}
        }
    }

    fn count(&self) {
        let ctc = self.control().contains(Tccr0::WGM01);
        let cnt = self.tcnt0.load(Ordering::SeqCst);

        if ctc && cnt == self.ocr0.load(Ordering::SeqCst) {
            self.tcnt0.store(0, Ordering::SeqCst);
            self.tifr.fetch_or(Tifr::OCF0.bits(), Ordering::SeqCst);
            return;
        }

        let next = cnt.wrapping_add(1);
        self.tcnt0.store(next, Ordering::SeqCst);
        if next == 0 {
            self.tifr.fetch_or(Tifr::TOV0.bits(), Ordering::SeqCst);
        }
    }
}

impl crate::Peripheral for Timer0 {
    fn read(&self, offset: u16) -> SimResult<u8> {
        Ok(self.read_reg(offset))
    }

    fn write(&self, offset: u16, value: u8) -> SimResult<()> {
        self.write_reg(offset, value);
        Ok(())
    }

    fn tick(&self) -> PeripheralTickResult {
        // Keep IRQ level high while OCF0 is latched and OCIE0 is enabled.
        if self.compare_irq_pending() {
            return PeripheralTickResult { irq: true };
        }

        let Some(divider) = self.control().divider() else {
            return PeripheralTickResult::default();
        };

        let psc = self.psc_cnt.load(Ordering::SeqCst) + 1;
        if psc >= divider {
            self.psc_cnt.store(0, Ordering::SeqCst);
            self.count();
        } else {
            self.psc_cnt.store(psc, Ordering::SeqCst);
        }

        PeripheralTickResult {
            irq: self.compare_irq_pending(),
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        let snap = Timer0Snapshot {
            tccr0: self.read_reg(TCCR0),
            tcnt0: self.read_reg(TCNT0),
            ocr0: self.read_reg(OCR0),
            timsk: self.read_reg(TIMSK),
            tifr: self.read_reg(TIFR),
            prescaler: self.prescaler.load(Ordering::SeqCst),
        };
        serde_json::to_value(snap).unwrap_or(serde_json::Value::Null)
    }
}

/// Restores OCIE0 to its previous state when dropped.
#[derive(Debug)]
pub struct CompareMaskGuard<'a> {
    timer: &'a Timer0,
    was_enabled: bool,
}

impl Drop for CompareMaskGuard<'_> {
    fn drop(&mut self) {
        if self.was_enabled {
            self.timer
                .timsk
                .fetch_or(Timsk::OCIE0.bits(), Ordering::SeqCst);
        }
    }
}

impl TimingSource for Arc<Timer0> {
    type Guard<'a> = CompareMaskGuard<'a>;

    fn enable(&self) {
        let prescaler = self.prescaler.load(Ordering::SeqCst);
        if let Some(cs) = Tccr0::clock_select(prescaler) {
            self.tccr0.fetch_or(cs.bits(), Ordering::SeqCst);
        }
    }

    fn disable(&self) {
        self.tccr0
            .fetch_and(!Tccr0::CLOCK_SELECT.bits(), Ordering::SeqCst);
        self.tcnt0.store(0, Ordering::SeqCst);
        self.psc_cnt.store(0, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.control().divider().is_some()
    }

    fn mask(&self) -> CompareMaskGuard<'_> {
        let prev = self
            .timsk
            .fetch_and(!Timsk::OCIE0.bits(), Ordering::SeqCst);
        CompareMaskGuard {
            timer: self,
            was_enabled: prev & Timsk::OCIE0.bits() != 0,
        }
    }
}
