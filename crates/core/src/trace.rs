// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::DigitalLevel;
use crate::{SimulationObserver, TxPin};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Edge {
    pub cycle: u64,
    pub level: DigitalLevel,
}

/// Level history of a single line, stored as edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LineTrace {
    initial: DigitalLevel,
    edges: Vec<Edge>,
    end_cycle: u64,
}

impl LineTrace {
    pub fn new(initial: DigitalLevel) -> Self {
        Self {
            initial,
            edges: Vec::new(),
            end_cycle: 0,
        }
    }

    /// Records `level` at `cycle`. Repeated levels are not edges and are
    /// dropped.
    pub fn record(&mut self, cycle: u64, level: DigitalLevel) {
        self.end_cycle = self.end_cycle.max(cycle);
        if level != self.last_level() {
            self.edges.push(Edge { cycle, level });
        }
    }

    /// Extends the trace to `cycle` without changing the level.
    pub fn finish(&mut self, cycle: u64) {
        self.end_cycle = self.end_cycle.max(cycle);
    }

    pub fn initial(&self) -> DigitalLevel {
        self.initial
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn end_cycle(&self) -> u64 {
        self.end_cycle
    }

    pub fn last_level(&self) -> DigitalLevel {
        self.edges.last().map_or(self.initial, |e| e.level)
    }

    pub fn level_at(&self, cycle: u64) -> DigitalLevel {
        match self.edges.partition_point(|e| e.cycle <= cycle) {
            0 => self.initial,
            n => self.edges[n - 1].level,
        }
    }

    /// One level per cycle from 0 through the end of the trace.
    pub fn samples(&self) -> impl Iterator<Item = DigitalLevel> + '_ {
        let mut next_edge = 0;
        let mut level = self.initial;
        (0..=self.end_cycle).map(move |cycle| {
            while next_edge < self.edges.len() && self.edges[next_edge].cycle <= cycle {
                level = self.edges[next_edge].level;
                next_edge += 1;
            }
            level
        })
    }
}

/// Observer that captures the TX line of a running simulation.
#[derive(Debug, Default)]
pub struct LineRecorder {
    trace: Mutex<LineTrace>,
}

impl LineRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&self) -> LineTrace {
        self.trace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SimulationObserver for LineRecorder {
    fn on_simulation_start(&self, initial: DigitalLevel) {
        if let Ok(mut trace) = self.trace.lock() {
            *trace = LineTrace::new(initial);
        }
    }

    fn on_simulation_stop(&self, cycle: u64) {
        if let Ok(mut trace) = self.trace.lock() {
            trace.finish(cycle);
        }
    }

    fn on_line_change(&self, cycle: u64, level: DigitalLevel) {
        if let Ok(mut trace) = self.trace.lock() {
            trace.record(cycle, level);
        }
    }
}

/// Output pin that logs every level the emitter drives, one entry per call.
///
/// With one call per bit period the log is the bit stream itself, which
/// makes it usable with timing sources that have no cycle counter.
#[derive(Debug)]
pub struct BitLogPin {
    level: AtomicBool,
    log: Mutex<Vec<DigitalLevel>>,
}

impl Default for BitLogPin {
    fn default() -> Self {
        Self::new()
    }
}

impl BitLogPin {
    pub fn new() -> Self {
        Self {
            level: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn take_log(&self) -> Vec<DigitalLevel> {
        std::mem::take(&mut *self.log.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl TxPin for BitLogPin {
    fn set_level(&self, level: DigitalLevel) {
        self.level.store(level.into(), Ordering::SeqCst);
        if let Ok(mut log) = self.log.lock() {
            log.push(level);
        }
    }

    fn level(&self) -> DigitalLevel {
        DigitalLevel::from(self.level.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DigitalLevel::{High, Low};

    #[test]
    fn test_record_drops_repeated_levels() {
        let mut trace = LineTrace::new(High);
        trace.record(5, High);
        trace.record(10, Low);
        trace.record(12, Low);
        trace.record(20, High);
        assert_eq!(
            trace.edges(),
            &[
                Edge {
                    cycle: 10,
                    level: Low
                },
                Edge {
                    cycle: 20,
                    level: High
                }
            ]
        );
        assert_eq!(trace.end_cycle(), 20);
    }

    #[test]
    fn test_level_at_and_samples_agree() {
        let mut trace = LineTrace::new(High);
        trace.record(3, Low);
        trace.record(6, High);
        trace.finish(8);

        assert_eq!(trace.level_at(0), High);
        assert_eq!(trace.level_at(3), Low);
        assert_eq!(trace.level_at(5), Low);
        assert_eq!(trace.level_at(6), High);

        let samples: Vec<_> = trace.samples().collect();
        assert_eq!(samples.len(), 9);
        for (cycle, level) in samples.iter().enumerate() {
            assert_eq!(*level, trace.level_at(cycle as u64));
        }
    }

    #[test]
    fn test_bit_log_pin() {
        let pin = BitLogPin::new();
        pin.set_level(High);
        pin.set_level(Low);
        assert_eq!(pin.level(), Low);
        assert_eq!(pin.take_log(), vec![High, Low]);
        assert!(pin.take_log().is_empty());
    }
}
