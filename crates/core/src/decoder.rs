// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! 8N1 UART receiver over a sampled line, used to check what the emitter
//! actually put on the wire.

use crate::signals::DigitalLevel;
use crate::trace::LineTrace;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("samples per bit must be non-zero")]
    ZeroPeriod,
    #[error("framing error at sample {at}: stop bit low after {byte:#04x}")]
    Framing { byte: u8, at: u64 },
    #[error("break condition at sample {at}")]
    Break { at: u64 },
    #[error("line ended inside a frame that started at sample {at}")]
    Truncated { at: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DecodedFrame {
    pub byte: u8,
    /// Sample index of the start bit's falling edge.
    pub start: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Shift,
    /// Waiting for the line to return to mark after a bad frame.
    Recover,
}

/// Mid-bit sampling receiver fed one line sample at a time.
#[derive(Debug, Clone)]
pub struct UartDecoder {
    period: u64,
    mode: Mode,
    reg: u8,
    bit: u32,
    skip: u64,
    samples: u64,
    frame_start: u64,
}

impl UartDecoder {
    /// `period` is the number of samples per bit.
    pub fn new(period: u64) -> Result<Self, DecodeError> {
        if period == 0 {
            return Err(DecodeError::ZeroPeriod);
        }
        Ok(Self {
            period,
            mode: Mode::Idle,
            reg: 0,
            bit: 0,
            skip: 0,
            samples: 0,
            frame_start: 0,
        })
    }

    /// True while a frame has started but its stop bit has not been sampled.
    pub fn in_frame(&self) -> bool {
        self.mode == Mode::Shift
    }

    pub fn feed(&mut self, level: DigitalLevel) -> Option<Result<DecodedFrame, DecodeError>> {
        let index = self.samples;
        self.samples += 1;

        match self.mode {
            Mode::Idle => {
                if level == DigitalLevel::Low {
                    self.mode = Mode::Shift;
                    self.frame_start = index;
                    self.bit = 0;
                    self.reg = 0;
                    self.skip = self.period / 2;
                    if self.skip == 0 {
                        return self.sample(level, index);
                    }
                }
                None
            }
            Mode::Shift => {
                self.skip -= 1;
                if self.skip == 0 {
                    self.sample(level, index)
                } else {
                    None
                }
            }
            Mode::Recover => {
                if level == DigitalLevel::High {
                    self.mode = Mode::Idle;
                }
                None
            }
        }
    }

    fn sample(&mut self, level: DigitalLevel, index: u64) -> Option<Result<DecodedFrame, DecodeError>> {
        match self.bit {
            0 => {
                // A start bit that is gone by mid-bit was a glitch.
                if level == DigitalLevel::High {
                    self.mode = Mode::Idle;
                    return None;
                }
            }
            1..=8 => {
                self.reg |= level.as_bit() << (self.bit - 1);
            }
            _ => {
                if level == DigitalLevel::High {
                    self.mode = Mode::Idle;
                    return Some(Ok(DecodedFrame {
                        byte: self.reg,
                        start: self.frame_start,
                    }));
                }
                self.mode = Mode::Recover;
                return Some(Err(if self.reg == 0 {
                    DecodeError::Break { at: index }
                } else {
                    DecodeError::Framing {
                        byte: self.reg,
                        at: index,
                    }
                }));
            }
        }
        self.bit += 1;
        self.skip = self.period;
        None
    }
}

/// Decodes a stream of line samples taken `period` samples per bit.
pub fn decode_levels<I>(levels: I, period: u64) -> Result<Vec<DecodedFrame>, DecodeError>
where
    I: IntoIterator<Item = DigitalLevel>,
{
    let mut decoder = UartDecoder::new(period)?;
    let mut frames = Vec::new();
    for level in levels {
        if let Some(result) = decoder.feed(level) {
            frames.push(result?);
        }
    }
    if decoder.in_frame() {
        return Err(DecodeError::Truncated {
            at: decoder.frame_start,
        });
    }
    Ok(frames)
}

/// Decodes a cycle-stamped trace with one bit every `cycles_per_bit` cycles.
pub fn decode_trace(trace: &LineTrace, cycles_per_bit: u64) -> Result<Vec<DecodedFrame>, DecodeError> {
    decode_levels(trace.samples(), cycles_per_bit)
}
