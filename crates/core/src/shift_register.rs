// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The transmit shift register shared by the Frame Loader and the Bit Emitter.
//!
//! Bit 0 always holds the next bit to put on the line. A loaded frame is
//! `start(0) | data[0..8] | stop(1)`, so after ten right shifts the register
//! reaches zero, which doubles as the idle marker. There is no separate bit
//! counter to keep in sync.

use std::sync::atomic::{AtomicU16, Ordering};

use crate::signals::DigitalLevel;

/// Number of data bits per frame.
pub const DATA_BITS: u32 = 8;
/// Stop bit position in a loaded frame.
pub const STOP_BIT: u16 = 1 << (DATA_BITS + 1);

/// Builds the register value for `byte`. The start bit is the zero already
/// sitting in bit 0 after the shift.
pub const fn frame(byte: u8) -> u16 {
    ((byte as u16) << 1) | STOP_BIT
}

/// Tagged view of the raw register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TxState {
    Idle,
    Sending { remaining_bits: u8, pending: u16 },
}

impl TxState {
    pub fn from_raw(raw: u16) -> Self {
        if raw == 0 {
            TxState::Idle
        } else {
            TxState::Sending {
                remaining_bits: (u16::BITS - raw.leading_zeros()) as u8,
                pending: raw,
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TxState::Idle)
    }
}

/// Single-slot register holding the not-yet-sent bits of the frame in flight.
///
/// Writers alternate: the loader only writes while the register is zero and
/// the emitter masked, the emitter only runs while a frame is armed.
#[derive(Debug, Default)]
pub struct ShiftRegister {
    bits: AtomicU16,
}

impl ShiftRegister {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU16::new(0),
        }
    }

    pub fn raw(&self) -> u16 {
        self.bits.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.raw() == 0
    }

    pub fn state(&self) -> TxState {
        TxState::from_raw(self.raw())
    }

    /// Loads `byte` if the register is idle. Returns `false` and leaves the
    /// register untouched when a frame is still in flight.
    pub fn try_load(&self, byte: u8) -> bool {
        self.bits
            .compare_exchange(0, frame(byte), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Pops bit 0 and returns its line level together with the remaining
    /// register value.
    ///
    /// An empty register yields a high level: the line must stay at mark
    /// while idle.
    pub fn shift_out(&self) -> (DigitalLevel, u16) {
        let mut level = DigitalLevel::High;
        let remaining = self.shift_out_with(|l| level = l);
        (level, remaining)
    }

    /// Hands bit 0 to `drive` and only then publishes the shifted value, so
    /// a reader that sees the register drain also sees the stop bit on the
    /// line.
    pub fn shift_out_with<F>(&self, drive: F) -> u16
    where
        F: FnOnce(DigitalLevel),
    {
        let current = self.bits.load(Ordering::Acquire);
        if current == 0 {
            drive(DigitalLevel::High);
            return 0;
        }
        drive(DigitalLevel::from_lsb(current));
        let remaining = current >> 1;
        self.bits.store(remaining, Ordering::Release);
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        assert_eq!(frame(0x00), 0b10_0000_0000);
        assert_eq!(frame(0xFF), 0b11_1111_1110);
        assert_eq!(frame(b'A'), (0x41 << 1) | 0x200);
        // Start bit is always clear, stop bit always set.
        for c in 0..=u8::MAX {
            assert_eq!(frame(c) & 0x01, 0);
            assert_eq!(frame(c) & STOP_BIT, STOP_BIT);
        }
    }

    #[test]
    fn test_try_load_rejects_when_busy() {
        let reg = ShiftRegister::new();
        assert!(reg.try_load(b'x'));
        assert_eq!(reg.raw(), frame(b'x'));

        assert!(!reg.try_load(b'y'));
        assert_eq!(reg.raw(), frame(b'x'));
    }

    #[test]
    fn test_shift_out_drains_in_ten_steps() {
        let reg = ShiftRegister::new();
        assert!(reg.try_load(0x5A));

        let mut bits = Vec::new();
        while !reg.is_idle() {
            let (level, _) = reg.shift_out();
            bits.push(level.as_bit());
        }
        assert_eq!(bits, vec![0, 0, 1, 0, 1, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_shift_out_on_idle_keeps_mark() {
        let reg = ShiftRegister::new();
        assert_eq!(reg.shift_out(), (DigitalLevel::High, 0));
        assert!(reg.is_idle());
    }

    #[test]
    fn test_state_view() {
        let reg = ShiftRegister::new();
        assert_eq!(reg.state(), TxState::Idle);

        reg.try_load(0x00);
        assert_eq!(
            reg.state(),
            TxState::Sending {
                remaining_bits: 10,
                pending: 0x200
            }
        );

        reg.shift_out();
        assert_eq!(
            reg.state(),
            TxState::Sending {
                remaining_bits: 9,
                pending: 0x100
            }
        );
    }
}
