// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::time::Duration;

pub use softuart_config::TIMER0_PRESCALERS;

/// Timer0 counts 0..=OCR0 in CTC mode, so one period spans at most 256 ticks.
pub const MAX_TICKS_PER_BIT: u64 = 256;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimingError {
    #[error("baud rate must be non-zero")]
    ZeroBaudRate,
    #[error("clock frequency must be non-zero")]
    ZeroClock,
    #[error("unsupported Timer0 prescaler {0}; supported: {:?}", TIMER0_PRESCALERS)]
    UnsupportedPrescaler(u16),
    #[error("bit period of {ticks} timer ticks does not fit Timer0 (1..={max})")]
    CompareOutOfRange { ticks: u64, max: u64 },
    #[error("no Timer0 prescaler reaches {baud_rate} baud from a {clock_hz} Hz clock")]
    NoPrescalerFits { clock_hz: u32, baud_rate: u32 },
    #[error("effective baud rate is off by {error_percent:.2}% (limit {limit_percent:.2}%)")]
    BaudErrorTooHigh {
        error_percent: f64,
        limit_percent: f64,
    },
}

/// Bit clock derived from the CPU clock, the Timer0 prescaler and the target
/// baud rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BitTiming {
    pub clock_hz: u32,
    pub prescaler: u16,
    pub baud_rate: u32,
    /// Value programmed into OCR0.
    pub compare_value: u8,
}

impl BitTiming {
    /// Rounds `clock / (prescaler * baud)` to the nearest whole tick count.
    pub fn new(clock_hz: u32, prescaler: u16, baud_rate: u32) -> Result<Self, TimingError> {
        if baud_rate == 0 {
            return Err(TimingError::ZeroBaudRate);
        }
        if clock_hz == 0 {
            return Err(TimingError::ZeroClock);
        }
        if !TIMER0_PRESCALERS.contains(&prescaler) {
            return Err(TimingError::UnsupportedPrescaler(prescaler));
        }

        let divisor = prescaler as u64 * baud_rate as u64;
        let ticks = (clock_hz as u64 + divisor / 2) / divisor;
        if ticks == 0 || ticks > MAX_TICKS_PER_BIT {
            return Err(TimingError::CompareOutOfRange {
                ticks,
                max: MAX_TICKS_PER_BIT,
            });
        }

        Ok(Self {
            clock_hz,
            prescaler,
            baud_rate,
            compare_value: (ticks - 1) as u8,
        })
    }

    /// Picks the smallest prescaler whose tick count fits the 8-bit counter.
    /// Smaller prescalers give finer compare steps and thus less rounding error.
    pub fn auto(clock_hz: u32, baud_rate: u32) -> Result<Self, TimingError> {
        for prescaler in TIMER0_PRESCALERS {
            match Self::new(clock_hz, prescaler, baud_rate) {
                Ok(timing) => return Ok(timing),
                Err(TimingError::CompareOutOfRange { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(TimingError::NoPrescalerFits {
            clock_hz,
            baud_rate,
        })
    }

    /// Timer ticks per bit (OCR0 + 1).
    pub fn ticks_per_bit(&self) -> u32 {
        self.compare_value as u32 + 1
    }

    /// CPU clock cycles per bit.
    pub fn cycles_per_bit(&self) -> u64 {
        self.ticks_per_bit() as u64 * self.prescaler as u64
    }

    pub fn actual_baud(&self) -> f64 {
        self.clock_hz as f64 / self.cycles_per_bit() as f64
    }

    /// Signed deviation of the effective baud rate from the target, in percent.
    pub fn error_percent(&self) -> f64 {
        (self.actual_baud() - self.baud_rate as f64) / self.baud_rate as f64 * 100.0
    }

    pub fn check_error(&self, limit_percent: f64) -> Result<(), TimingError> {
        let error_percent = self.error_percent();
        if error_percent.abs() > limit_percent {
            return Err(TimingError::BaudErrorTooHigh {
                error_percent,
                limit_percent,
            });
        }
        Ok(())
    }

    /// Wall-clock duration of one bit at the effective baud rate.
    pub fn bit_period(&self) -> Duration {
        Duration::from_nanos(self.cycles_per_bit() * 1_000_000_000 / self.clock_hz as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_8mhz_9600() {
        let t = BitTiming::new(8_000_000, 8, 9600).unwrap();
        assert_eq!(t.compare_value, 103);
        assert_eq!(t.ticks_per_bit(), 104);
        assert_eq!(t.cycles_per_bit(), 832);
        assert!((t.actual_baud() - 9615.38).abs() < 0.01);
        assert!((t.error_percent() - 0.16).abs() < 0.01);
        assert!(t.check_error(1.0).is_ok());
        assert_eq!(t.bit_period(), Duration::from_nanos(104_000));
    }

    #[test]
    fn test_rounds_to_nearest_tick() {
        // 16 MHz / 8 / 115200 = 17.36 ticks
        let t = BitTiming::new(16_000_000, 8, 115_200).unwrap();
        assert_eq!(t.ticks_per_bit(), 17);
        // 1 MHz / 1 / 9600 = 104.17 ticks
        let t = BitTiming::new(1_000_000, 1, 9600).unwrap();
        assert_eq!(t.ticks_per_bit(), 104);
        // 8 MHz / 8 / 38400 = 26.04 ticks
        let t = BitTiming::new(8_000_000, 8, 38_400).unwrap();
        assert_eq!(t.ticks_per_bit(), 26);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert_eq!(
            BitTiming::new(8_000_000, 8, 0),
            Err(TimingError::ZeroBaudRate)
        );
        assert_eq!(BitTiming::new(0, 8, 9600), Err(TimingError::ZeroClock));
        assert_eq!(
            BitTiming::new(8_000_000, 16, 9600),
            Err(TimingError::UnsupportedPrescaler(16))
        );
        // 8 MHz / 1 / 9600 = 833 ticks, too many for an 8-bit counter.
        assert!(matches!(
            BitTiming::new(8_000_000, 1, 9600),
            Err(TimingError::CompareOutOfRange { ticks: 833, .. })
        ));
        // Baud far above the clock rounds to zero ticks.
        assert!(matches!(
            BitTiming::new(1_000_000, 1024, 115_200),
            Err(TimingError::CompareOutOfRange { ticks: 0, .. })
        ));
    }

    #[test]
    fn test_auto_picks_smallest_fitting_prescaler() {
        let t = BitTiming::auto(8_000_000, 9600).unwrap();
        assert_eq!(t.prescaler, 8);
        assert_eq!(t.compare_value, 103);

        let t = BitTiming::auto(1_000_000, 9600).unwrap();
        assert_eq!(t.prescaler, 1);

        let t = BitTiming::auto(16_000_000, 300).unwrap();
        assert_eq!(t.prescaler, 256);

        assert_eq!(
            BitTiming::auto(16_000_000, 10),
            Err(TimingError::NoPrescalerFits {
                clock_hz: 16_000_000,
                baud_rate: 10
            })
        );
    }

    #[test]
    fn test_error_limit() {
        // 16 MHz / 8 / 115200 -> 17 ticks -> 117647 baud, +2.12%
        let t = BitTiming::new(16_000_000, 8, 115_200).unwrap();
        assert!(t.check_error(5.0).is_ok());
        assert!(matches!(
            t.check_error(2.0),
            Err(TimingError::BaudErrorTooHigh { .. })
        ));
    }
}
