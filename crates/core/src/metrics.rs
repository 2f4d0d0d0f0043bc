// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the Frame Loader and the Bit Emitter.
#[derive(Debug, Default)]
pub struct TxMetrics {
    frames_accepted: AtomicU64,
    requests_rejected: AtomicU64,
    bits_emitted: AtomicU64,
    frames_completed: AtomicU64,
    idle_ticks: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub frames_accepted: u64,
    pub requests_rejected: u64,
    pub bits_emitted: u64,
    pub frames_completed: u64,
    pub idle_ticks: u64,
}

impl TxMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.frames_accepted.store(0, Ordering::SeqCst);
        self.requests_rejected.store(0, Ordering::SeqCst);
        self.bits_emitted.store(0, Ordering::SeqCst);
        self.frames_completed.store(0, Ordering::SeqCst);
        self.idle_ticks.store(0, Ordering::SeqCst);
    }

    pub(crate) fn record_request(&self, accepted: bool) {
        if accepted {
            self.frames_accepted.fetch_add(1, Ordering::SeqCst);
        } else {
            self.requests_rejected.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn record_bit(&self, frame_done: bool) {
        self.bits_emitted.fetch_add(1, Ordering::SeqCst);
        if frame_done {
            self.frames_completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// A tick that found nothing to send.
    pub(crate) fn record_idle_tick(&self) {
        self.idle_ticks.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get_frames_accepted(&self) -> u64 {
        self.frames_accepted.load(Ordering::SeqCst)
    }

    pub fn get_requests_rejected(&self) -> u64 {
        self.requests_rejected.load(Ordering::SeqCst)
    }

    pub fn get_bits_emitted(&self) -> u64 {
        self.bits_emitted.load(Ordering::SeqCst)
    }

    pub fn get_frames_completed(&self) -> u64 {
        self.frames_completed.load(Ordering::SeqCst)
    }

    pub fn get_idle_ticks(&self) -> u64 {
        self.idle_ticks.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_accepted: self.get_frames_accepted(),
            requests_rejected: self.get_requests_rejected(),
            bits_emitted: self.get_bits_emitted(),
            frames_completed: self.get_frames_completed(),
            idle_ticks: self.get_idle_ticks(),
        }
    }
}
