// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Frame Loader and Bit Emitter.
//!
//! Frames on the line are 8N1: one low start bit, eight data bits LSB
//! first, one high stop bit. The loader is non-blocking and single-slot: a
//! request made while a frame is in flight is rejected, never queued.

use crate::metrics::TxMetrics;
use crate::shift_register::{frame, ShiftRegister, TxState};
use crate::signals::DigitalLevel;
use crate::{TimingSource, TxPin};

pub struct SoftUartTx<P, T> {
    shift: ShiftRegister,
    pin: P,
    timer: T,
    metrics: TxMetrics,
}

impl<P, T> std::fmt::Debug for SoftUartTx<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftUartTx")
            .field("state", &self.shift.state())
            .finish()
    }
}

impl<P: TxPin, T: TimingSource> SoftUartTx<P, T> {
    /// Takes ownership of an output pin and a timing source configured for
    /// the bit period. The line is driven to its idle (mark) level.
    pub fn new(pin: P, timer: T) -> Self {
        pin.set_level(DigitalLevel::High);
        Self {
            shift: ShiftRegister::new(),
            pin,
            timer,
            metrics: TxMetrics::new(),
        }
    }

    /// Queues `byte` for transmission if no frame is in flight and arms the
    /// timing source. Returns `false` without side effects when busy; the
    /// caller decides whether to retry.
    pub fn transmit(&self, byte: u8) -> bool {
        let accepted = {
            let _masked = self.timer.mask();
            let loaded = self.shift.try_load(byte);
            if loaded {
                self.timer.enable();
            }
            loaded
        };

        self.metrics.record_request(accepted);
        if accepted {
            tracing::debug!("TX load {:#04x} -> frame {:#05x}", byte, frame(byte));
        } else {
            tracing::trace!("TX busy, dropped {:#04x}", byte);
        }
        accepted
    }

    /// Sends every byte in order, blocking until each frame has fully left
    /// the pin before loading the next.
    ///
    /// This busy-waits with a spin hint and never times out: the caller is
    /// serialized with the line for about ten bit periods per byte. Only
    /// call it where the compare-match handler can run concurrently.
    pub fn transmit_bytes(&self, bytes: &[u8]) {
        self.transmit_bytes_with(bytes, std::hint::spin_loop);
    }

    pub fn transmit_str(&self, s: &str) {
        self.transmit_bytes(s.as_bytes());
    }

    /// Same busy-wait composition as [`transmit_bytes`](Self::transmit_bytes)
    /// but calls `poll` on every wait iteration. A rejected byte is retried
    /// until it is accepted.
    pub fn transmit_bytes_with<F>(&self, bytes: &[u8], mut poll: F)
    where
        F: FnMut(),
    {
        self.transmit_bytes_while(bytes, || {
            poll();
            true
        });
    }

    /// Like [`transmit_bytes_with`](Self::transmit_bytes_with), but stops
    /// waiting as soon as `poll` returns `false`. Returns `true` once the last
    /// byte has drained, `false` if the wait was abandoned. A frame already
    /// loaded keeps going out on the timing source.
    pub fn transmit_bytes_while<F>(&self, bytes: &[u8], mut poll: F) -> bool
    where
        F: FnMut() -> bool,
    {
        for &byte in bytes {
            while !self.transmit(byte) {
                if !poll() {
                    return false;
                }
            }
            while !self.shift.is_idle() {
                if !poll() {
                    return false;
                }
            }
        }
        true
    }

    /// Compare-match handler. Puts bit 0 on the pin, shifts, and disarms the
    /// timing source once the stop bit is out. Runs in bounded time and never
    /// touches the loader.
    pub fn on_compare_match(&self) {
        if self.shift.is_idle() {
            // Spurious tick: keep the line at mark and make sure we stop.
            self.pin.set_level(DigitalLevel::High);
            self.timer.disable();
            self.metrics.record_idle_tick();
            return;
        }

        let mut level = DigitalLevel::High;
        let remaining = self.shift.shift_out_with(|bit| {
            self.pin.set_level(bit);
            level = bit;
        });

        let done = remaining == 0;
        if done {
            self.timer.disable();
        }
        self.metrics.record_bit(done);
        tracing::trace!("TX bit {} remaining {:#05x}", level.as_bit(), remaining);
        if done {
            tracing::debug!("TX frame complete");
        }
    }

    pub fn is_idle(&self) -> bool {
        self.shift.is_idle()
    }

    pub fn state(&self) -> TxState {
        self.shift.state()
    }

    pub fn shift_register(&self) -> u16 {
        self.shift.raw()
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn metrics(&self) -> &TxMetrics {
        &self.metrics
    }
}
