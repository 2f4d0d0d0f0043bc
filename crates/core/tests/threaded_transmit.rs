// SoftUART - Timer-Driven Software UART Transmitter
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use softuart_core::decoder::decode_levels;
use softuart_core::signals::DigitalLevel;
use softuart_core::trace::BitLogPin;
use softuart_core::{frame, SoftUartTx, TimingSource};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

fn decoded(pin: &BitLogPin) -> Vec<u8> {
    decode_levels(pin.take_log(), 1)
        .unwrap()
        .iter()
        .map(|f| f.byte)
        .collect()
}

#[test]
fn test_threaded_string_arrives_intact() {
    let tx = SoftUartTx::threaded(BitLogPin::new(), Duration::from_micros(50)).unwrap();
    tx.transmit_str("Hello World 2022.\n");

    assert!(tx.is_idle());
    // Holding the mask waits out a handler that is still disarming.
    drop(tx.timer().mask());
    assert!(!tx.timer().is_enabled());
    assert_eq!(decoded(tx.pin()), b"Hello World 2022.\n");
    assert_eq!(tx.metrics().get_frames_completed(), 18);
}

#[test]
fn test_threaded_reject_while_busy() {
    let tx = SoftUartTx::threaded(BitLogPin::new(), Duration::from_micros(50)).unwrap();
    {
        // No bit can go out while masked, so the frame is still in flight.
        let _masked = tx.timer().mask();
        assert!(tx.transmit(b'a'));
        assert!(!tx.transmit(b'b'));
        assert_eq!(tx.shift_register(), frame(b'a'));
    }

    while !tx.is_idle() {
        thread::yield_now();
    }
    assert_eq!(decoded(tx.pin()), b"a");
    assert_eq!(tx.metrics().get_requests_rejected(), 1);
}

#[test]
fn test_concurrent_senders_never_interleave_bits() {
    let tx = SoftUartTx::threaded(BitLogPin::new(), Duration::from_micros(50)).unwrap();

    let handles: Vec<_> = [b"xxxx", b"yyyy"]
        .into_iter()
        .map(|msg| {
            let tx = Arc::clone(&tx);
            thread::spawn(move || tx.transmit_bytes(msg))
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    while !tx.is_idle() {
        thread::yield_now();
    }

    let mut bytes = decoded(tx.pin());
    bytes.sort_unstable();
    assert_eq!(bytes, b"xxxxyyyy");
}

#[test]
fn test_first_level_is_idle_mark() {
    let tx = SoftUartTx::threaded(BitLogPin::new(), Duration::from_micros(100)).unwrap();
    assert_eq!(tx.pin().take_log(), vec![DigitalLevel::High]);
}

#[test]
fn test_drop_mid_frame_returns() {
    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        for _ in 0..50 {
            let tx = SoftUartTx::threaded(BitLogPin::new(), Duration::from_micros(20)).unwrap();
            assert!(tx.transmit(0x55));
            thread::sleep(Duration::from_micros(70));
            drop(tx);
        }
        let _ = done_tx.send(());
    });
    done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("dropping a busy transmitter hung");
}

#[test]
fn test_dropped_transmitter_releases_its_timer() {
    let tx = SoftUartTx::threaded(BitLogPin::new(), Duration::from_micros(50)).unwrap();
    tx.transmit_str("ab");
    drop(tx.timer().mask());
    assert!(!tx.timer().is_enabled());

    // The timer thread only holds a weak handle, so this drop is the last
    // one and joins the thread before returning.
    let weak = Arc::downgrade(&tx);
    drop(tx);
    assert!(weak.upgrade().is_none());
}
