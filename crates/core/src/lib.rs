// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bus;
pub mod decoder;
pub mod metrics;
pub mod peripherals;
pub mod shift_register;
pub mod signals;
pub mod snapshot;
pub mod system;
pub mod timing;
pub mod trace;
pub mod transmitter;

use signals::DigitalLevel;


pub use shift_register::{frame, ShiftRegister, TxState, STOP_BIT};
pub use timing::{BitTiming, TimingError};
pub use transmitter::SoftUartTx;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("I/O access to unmapped register at {0:#04x}")]
    UnmappedIo(u16),
    #[error("Peripheral '{name}' overlaps an existing mapping at {base:#04x}")]
    OverlappingMapping { name: String, base: u16 },
    #[error("No I/O port '{0}' on this device")]
    UnknownPort(char),
    #[error("Pin {0} does not exist; ports are 8 bits wide")]
    InvalidPin(u8),
}

pub type SimResult<T> = Result<T, SimulationError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeripheralTickResult {
    pub irq: bool,
}

/// Trait for observing simulation events in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self, _initial: DigitalLevel) {}
    fn on_simulation_stop(&self, _cycle: u64) {}
    fn on_line_change(&self, _cycle: u64, _level: DigitalLevel) {}
    fn on_interrupt(&self, _cycle: u64) {}
}

/// Trait representing a memory-mapped I/O peripheral.
///
/// Peripherals are shared between the I/O bus and the driver handles that
/// touch them from foreground and interrupt context, so every access goes
/// through `&self`.
pub trait Peripheral: std::fmt::Debug + Send + Sync {
    fn read(&self, offset: u16) -> SimResult<u8>;
    fn write(&self, offset: u16, value: u8) -> SimResult<()>;
    fn tick(&self) -> PeripheralTickResult {
        PeripheralTickResult::default()
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// The output line the Bit Emitter drives.
pub trait TxPin {
    fn set_level(&self, level: DigitalLevel);
    fn level(&self) -> DigitalLevel;
}

/// A periodic event generator that fires the Bit Emitter once per bit period
/// while enabled.
pub trait TimingSource {
    /// Scoped suppression of the compare-match handler. Dropping the guard
    /// restores the previous handler state.
    type Guard<'a>
    where
        Self: 'a;

    /// Start generating ticks. The first tick arrives one full period later.
    fn enable(&self);
    /// Stop generating ticks and reset the counter phase.
    fn disable(&self);
    fn is_enabled(&self) -> bool;
    fn mask(&self) -> Self::Guard<'_>;
}
