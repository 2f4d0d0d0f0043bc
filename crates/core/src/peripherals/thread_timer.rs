// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Host timing source: a dedicated thread that fires a handler once per
//! period while armed.

use crate::transmitter::SoftUartTx;
use crate::{TimingSource, TxPin};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Handler = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Default)]
struct TimerState {
    armed: bool,
    /// Bumped on every enable so a re-arm restarts the period.
    generation: u64,
    shutdown: bool,
}

struct Shared {
    period: Duration,
    state: Mutex<TimerState>,
    wake: Condvar,
    /// Held while the handler runs; `mask` takes it to keep the handler out.
    /// Reentrant so masked sections nest on the foreground thread.
    gate: ReentrantMutex<()>,
    handler: OnceLock<Handler>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ThreadedTimer {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ThreadedTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedTimer")
            .field("period", &self.shared.period)
            .field("armed", &self.shared.lock_state().armed)
            .finish()
    }
}

impl ThreadedTimer {
    pub fn new(period: Duration) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            period,
            state: Mutex::new(TimerState::default()),
            wake: Condvar::new(),
            gate: ReentrantMutex::new(()),
            handler: OnceLock::new(),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("softuart-timer".to_string())
            .spawn(move || run(&worker_shared))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Installs the tick handler. Only the first call takes effect.
    pub fn set_handler<F>(&self, handler: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.handler.set(Box::new(handler)).is_ok()
    }
}

impl<P> SoftUartTx<P, ThreadedTimer>
where
    P: TxPin + Send + Sync + 'static,
{
    /// Builds a transmitter whose Bit Emitter runs on its own timer thread,
    /// one tick per `bit_period`.
    pub fn threaded(pin: P, bit_period: Duration) -> std::io::Result<Arc<Self>> {
        let tx = Arc::new(Self::new(pin, ThreadedTimer::new(bit_period)?));
        let weak = Arc::downgrade(&tx);
        tx.timer().set_handler(move || {
            if let Some(tx) = weak.upgrade() {
                tx.on_compare_match();
            }
        });
        tracing::debug!("threaded transmitter, bit period {:?}", bit_period);
        Ok(tx)
    }
}

fn run(shared: &Shared) {
    let mut state = shared.lock_state();
    loop {
        if state.shutdown {
            return;
        }
        if !state.armed {
            state = shared
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            continue;
        }

        let generation = state.generation;
        let mut deadline = Instant::now() + shared.period;
        loop {
            let now = Instant::now();
            if now < deadline {
                let (guard, _) = shared
                    .wake
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
            } else {
                // The handler may disarm us, so the state lock must be free.
                drop(state);
                {
                    let _gate = shared.gate.lock();
                    if let Some(handler) = shared.handler.get() {
                        handler();
                    }
                }
                // Fixed-rate schedule: late ticks do not push later ones back.
                deadline += shared.period;
                state = shared.lock_state();
            }

            if state.shutdown || !state.armed || state.generation != generation {
                break;
            }
        }
    }
}

impl TimingSource for ThreadedTimer {
    type Guard<'a> = ReentrantMutexGuard<'a, ()>;

    fn enable(&self) {
        let mut state = self.shared.lock_state();
        state.armed = true;
        state.generation = state.generation.wrapping_add(1);
        self.shared.wake.notify_all();
    }

    fn disable(&self) {
        let mut state = self.shared.lock_state();
        state.armed = false;
        self.shared.wake.notify_all();
    }

    fn is_enabled(&self) -> bool {
        self.shared.lock_state().armed
    }

    fn mask(&self) -> ReentrantMutexGuard<'_, ()> {
        self.shared.gate.lock()
    }
}

impl Drop for ThreadedTimer {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock_state();
            state.shutdown = true;
            state.armed = false;
            self.shared.wake.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            // The last owner may be dropped from inside the handler.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}
