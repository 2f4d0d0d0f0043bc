// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! ATmega16/32 style microcontroller: four GPIO ports, Timer/Counter0 and
//! the status register, clocked one CPU cycle per step, with the soft UART
//! transmitter wired to TIMER0_COMP.

use crate::bus::IoBus;
use crate::peripherals::gpio::{self, GpioPort, PortPin};
use crate::peripherals::timer::{self, Tccr0, Timer0, Timsk};
use crate::signals::DigitalLevel;
use crate::snapshot::McuSnapshot;
use crate::timing::BitTiming;
use crate::transmitter::SoftUartTx;
use crate::{SimResult, SimulationError, SimulationObserver, TxPin};
use softuart_config::{StopReason, TransmitterConfig, DEVICE_PORTS};
use std::sync::Arc;

pub const SREG: u16 = 0x5F;
/// Global interrupt enable.
pub const SREG_I: u8 = 1 << 7;

pub const TIMER0_BASE: u16 = 0x52;
/// TCNT0 (0x52) through OCR0 (0x5C).
pub const TIMER0_SIZE: u16 = 0x0B;
pub const TIMER0_COMP_VECTOR: u8 = 11;

/// PINA address. Each following port sits one PIN/DDR/PORT block lower.
const PORTA_BASE: u16 = 0x39;
const PORT_SIZE: u16 = 3;

/// PINx base address of `port`, if the device has it.
pub fn port_base(port: char) -> Option<u16> {
    DEVICE_PORTS
        .iter()
        .position(|&name| name == port.to_ascii_uppercase())
        .map(|index| PORTA_BASE - PORT_SIZE * index as u16)
}

/// Rounding error above which a bit timing is reported even when accepted.
pub const BAUD_ERROR_WARN_PERCENT: f64 = 2.0;

pub type Transmitter = SoftUartTx<PortPin, Arc<Timer0>>;

pub struct Mcu {
    pub bus: IoBus,
    pub observers: Vec<Arc<dyn SimulationObserver>>,
    timer0: Arc<Timer0>,
    tx: Arc<Transmitter>,
    timing: BitTiming,
    port_base: u16,
    sreg: u8,
    cycles: u64,
    line: DigitalLevel,
}

impl std::fmt::Debug for Mcu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mcu")
            .field("cycles", &self.cycles)
            .field("sreg", &self.sreg)
            .field("line", &self.line)
            .field("tx", &self.tx)
            .finish()
    }
}

impl Mcu {
    /// Builds the device with the TX line on `port`/`pin`. Nothing is
    /// configured until [`init`](Self::init).
    pub fn new(timing: BitTiming, port: char, pin: u8) -> SimResult<Self> {
        let port = port.to_ascii_uppercase();
        let tx_base = port_base(port).ok_or(SimulationError::UnknownPort(port))?;
        if pin > 7 {
            return Err(SimulationError::InvalidPin(pin));
        }

        let mut bus = IoBus::new();
        let mut tx_port = None;
        for (name, base) in DEVICE_PORTS.into_iter().filter_map(|n| Some((n, port_base(n)?))) {
            let dev = Arc::new(GpioPort::new());
            bus.map(
                &format!("port{}", name.to_ascii_lowercase()),
                base,
                PORT_SIZE,
                None,
                dev.clone(),
            )?;
            if base == tx_base {
                tx_port = Some(dev);
            }
        }
        let tx_port = tx_port.ok_or(SimulationError::UnknownPort(port))?;

        let timer0 = Arc::new(Timer0::new());
        timer0.select_prescaler(timing.prescaler);
        bus.map(
            "timer0",
            TIMER0_BASE,
            TIMER0_SIZE,
            Some(TIMER0_COMP_VECTOR),
            timer0.clone(),
        )?;

        let tx = Arc::new(SoftUartTx::new(
            PortPin::new(tx_port, pin),
            timer0.clone(),
        ));
        let line = tx.pin().level();

        Ok(Self {
            bus,
            observers: Vec::new(),
            timer0,
            tx,
            timing,
            port_base: tx_base,
            sreg: 0,
            cycles: 0,
            line,
        })
    }

    pub fn from_config(config: &TransmitterConfig) -> anyhow::Result<Self> {
        let timing = match config.prescaler {
            Some(prescaler) => BitTiming::new(config.clock_hz, prescaler, config.baud_rate)?,
            None => BitTiming::auto(config.clock_hz, config.baud_rate)?,
        };

        let error = timing.error_percent();
        if error.abs() > BAUD_ERROR_WARN_PERCENT {
            tracing::warn!(
                "{} baud from {} Hz is off by {:.2}% (OCR0={}, prescaler {})",
                timing.baud_rate,
                timing.clock_hz,
                error,
                timing.compare_value,
                timing.prescaler
            );
        }
        timing.check_error(config.max_baud_error_percent)?;

        let mcu = Self::new(timing, config.tx_pin.port, config.tx_pin.pin)?;
        tracing::info!(
            "{}: TX on {} at {} baud (actual {:.1}), OCR0={} prescaler {}",
            config.name,
            config.tx_pin,
            timing.baud_rate,
            timing.actual_baud(),
            timing.compare_value,
            timing.prescaler
        );
        Ok(mcu)
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    /// Configures the TX pin as an output at mark, puts Timer0 in CTC mode
    /// with the bit period in OCR0, unmasks the compare interrupt and
    /// enables interrupts globally. The timer stays stopped until a frame is
    /// loaded.
    pub fn init(&mut self) -> SimResult<()> {
        let mask = 1u8 << self.tx.pin().index();
        self.bus.set_bits(self.port_base + gpio::DDR, mask)?;
        self.bus.set_bits(self.port_base + gpio::PORT, mask)?;

        self.bus
            .set_bits(TIMER0_BASE + timer::TCCR0, Tccr0::WGM01.bits())?;
        self.bus
            .write_u8(TIMER0_BASE + timer::OCR0, self.timing.compare_value)?;
        self.bus
            .set_bits(TIMER0_BASE + timer::TIMSK, Timsk::OCIE0.bits())?;
        self.sei();

        self.line = self.tx.pin().level();
        for observer in &self.observers {
            observer.on_simulation_start(self.line);
        }
        tracing::debug!(
            "init: OCR0={} TCCR0={:#04x} TIMSK={:#04x}",
            self.timing.compare_value,
            self.timer0.control().bits(),
            self.timer0.interrupt_mask().bits()
        );
        Ok(())
    }

    /// Advances one CPU cycle and services TIMER0_COMP if it is pending and
    /// interrupts are enabled.
    pub fn step(&mut self) {
        self.cycles += 1;

        for vector in self.bus.tick_peripherals() {
            if !self.interrupts_enabled() {
                break;
            }
            match vector {
                TIMER0_COMP_VECTOR => self.service_compare_match(),
                other => tracing::warn!("No handler for interrupt vector {}", other),
            }
        }

        let level = self.tx.pin().level();
        if level != self.line {
            self.line = level;
            for observer in &self.observers {
                observer.on_line_change(self.cycles, level);
            }
        }
    }

    fn service_compare_match(&mut self) {
        // Hardware clears I on entry and RETI sets it again.
        self.sreg &= !SREG_I;
        self.timer0.acknowledge_compare();
        for observer in &self.observers {
            observer.on_interrupt(self.cycles);
        }
        self.tx.on_compare_match();
        self.sreg |= SREG_I;
    }

    pub fn run_cycles(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.step();
        }
    }

    /// Steps until the transmitter is idle or `max_cycles` have elapsed.
    pub fn run_until_idle(&mut self, max_cycles: u64) -> StopReason {
        let limit = self.cycles.saturating_add(max_cycles);
        while !self.tx.is_idle() {
            if self.cycles >= limit {
                return StopReason::MaxCycles;
            }
            self.step();
        }
        StopReason::Completed
    }

    /// Frame Loader entry point from foreground code.
    pub fn transmit(&self, byte: u8) -> bool {
        self.tx.transmit(byte)
    }

    /// Blocking send: each byte is loaded once the previous frame has left
    /// the pin, stepping the device while waiting. Never returns if the
    /// compare interrupt cannot fire, e.g. before [`init`](Self::init).
    pub fn transmit_bytes(&mut self, bytes: &[u8]) {
        let tx = self.tx.clone();
        tx.transmit_bytes_with(bytes, || self.step());
    }

    pub fn transmit_str(&mut self, s: &str) {
        self.transmit_bytes(s.as_bytes());
    }

    /// Same ordering as [`transmit_bytes`](Self::transmit_bytes), but gives
    /// up once `max_cycles` have elapsed.
    pub fn send(&mut self, bytes: &[u8], max_cycles: u64) -> StopReason {
        let limit = self.cycles.saturating_add(max_cycles);
        let tx = self.tx.clone();
        let completed = tx.transmit_bytes_while(bytes, || {
            if self.cycles >= limit {
                return false;
            }
            self.step();
            true
        });
        if completed {
            StopReason::Completed
        } else {
            StopReason::MaxCycles
        }
    }

    /// Holds the line for one more bit period so the last stop bit is
    /// complete on the wire, then closes the observers.
    pub fn finish(&mut self) {
        self.run_cycles(self.timing.cycles_per_bit());
        for observer in &self.observers {
            observer.on_simulation_stop(self.cycles);
        }
    }

    pub fn sei(&mut self) {
        self.sreg |= SREG_I;
    }

    pub fn cli(&mut self) {
        self.sreg &= !SREG_I;
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.sreg & SREG_I != 0
    }

    pub fn read_io(&self, addr: u16) -> SimResult<u8> {
        if addr == SREG {
            return Ok(self.sreg);
        }
        self.bus.read_u8(addr)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn line(&self) -> DigitalLevel {
        self.line
    }

    pub fn timing(&self) -> &BitTiming {
        &self.timing
    }

    pub fn timer0(&self) -> &Arc<Timer0> {
        &self.timer0
    }

    pub fn tx(&self) -> &Arc<Transmitter> {
        &self.tx
    }

    pub fn snapshot(&self) -> McuSnapshot {
        McuSnapshot {
            cycles: self.cycles,
            sreg: self.sreg,
            line: self.line,
            tx_state: self.tx.state(),
            shift_register: self.tx.shift_register(),
            timing: self.timing,
            metrics: self.tx.metrics().snapshot(),
            peripherals: self
                .bus
                .peripherals
                .iter()
                .map(|p| (p.name.clone(), p.dev.snapshot()))
                .collect(),
        }
    }

    pub fn peek_peripheral(&self, name: &str) -> Option<serde_json::Value> {
        self.bus.find(name).map(|p| p.dev.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimingSource;

    fn mcu() -> Mcu {
        let timing = BitTiming::new(8_000_000, 8, 9600).unwrap();
        Mcu::new(timing, 'B', 0).unwrap()
    }

    #[test]
    fn test_init_register_sequence() {
        let mut mcu = mcu();
        mcu.init().unwrap();

        assert_eq!(mcu.read_io(0x37).unwrap() & 0x01, 0x01); // DDRB
        assert_eq!(mcu.read_io(0x38).unwrap() & 0x01, 0x01); // PORTB
        assert_eq!(mcu.read_io(0x5C).unwrap(), 103); // OCR0
        let tccr0 = Tccr0::from_bits_retain(mcu.read_io(0x53).unwrap());
        assert!(tccr0.contains(Tccr0::WGM01));
        assert_eq!(tccr0.divider(), None);
        assert!(Timsk::from_bits_retain(mcu.read_io(0x59).unwrap()).contains(Timsk::OCIE0));
        assert_eq!(mcu.read_io(SREG).unwrap() & SREG_I, SREG_I);
        assert_eq!(mcu.line(), DigitalLevel::High);
    }

    #[test]
    fn test_rejects_unknown_port_and_pin() {
        let timing = BitTiming::new(8_000_000, 8, 9600).unwrap();
        assert_eq!(
            Mcu::new(timing, 'Q', 0).unwrap_err(),
            SimulationError::UnknownPort('Q')
        );
        assert_eq!(
            Mcu::new(timing, 'd', 8).unwrap_err(),
            SimulationError::InvalidPin(8)
        );
        assert!(Mcu::new(timing, 'd', 7).is_ok());
    }

    #[test]
    fn test_every_configurable_port_is_mapped() {
        assert_eq!(port_base('A'), Some(0x39));
        assert_eq!(port_base('b'), Some(0x36));
        assert_eq!(port_base('D'), Some(0x30));
        assert_eq!(port_base('E'), None);

        let timing = BitTiming::new(8_000_000, 8, 9600).unwrap();
        for port in DEVICE_PORTS {
            let mut mcu = Mcu::new(timing, port, 3).unwrap();
            mcu.init().unwrap();
            let base = port_base(port).unwrap();
            assert_eq!(mcu.read_io(base + gpio::DDR).unwrap(), 0x08, "port {}", port);
        }
    }

    #[test]
    fn test_first_bit_one_period_after_load() {
        let mut mcu = mcu();
        mcu.init().unwrap();
        assert!(mcu.transmit(0x00));
        assert!(mcu.timer0().is_enabled());

        mcu.run_cycles(831);
        assert_eq!(mcu.line(), DigitalLevel::High);
        mcu.step();
        assert_eq!(mcu.line(), DigitalLevel::Low);
    }

    #[test]
    fn test_no_interrupt_while_cli() {
        let mut mcu = mcu();
        mcu.init().unwrap();
        mcu.cli();
        assert!(mcu.transmit(b'x'));
        mcu.run_cycles(5000);
        assert_eq!(mcu.line(), DigitalLevel::High);
        assert!(!mcu.tx().is_idle());

        mcu.sei();
        assert_eq!(mcu.run_until_idle(10 * 832), StopReason::Completed);
    }

    #[test]
    fn test_run_until_idle_reports_limit() {
        let mut mcu = mcu();
        mcu.init().unwrap();
        assert!(mcu.transmit(b'x'));
        assert_eq!(mcu.run_until_idle(100), StopReason::MaxCycles);
        assert_eq!(mcu.cycles(), 100);
    }

    #[test]
    fn test_snapshot_lists_peripherals() {
        let mut mcu = mcu();
        mcu.init().unwrap();
        let snap = mcu.snapshot();
        assert_eq!(snap.peripherals.len(), 5);
        assert_eq!(snap.peripherals["timer0"]["ocr0"], 103);
        assert_eq!(snap.sreg, SREG_I);
        assert!(mcu.peek_peripheral("portb").is_some());
    }
}
