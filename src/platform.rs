//! Hardware collaborators consumed by the core
//!
//! The protocol core never touches registers. Every board (the ESP32 build
//! in [`esp`], or a simulated board in tests) implements these traits.
//!
//! All waiting in the core is cooperative: it polls a `try_*` call and, when
//! nothing is ready, yields through [`Clock::sleep_until_event`].

use std::sync::{Mutex, PoisonError};

use crate::config::RX_BUFFER_SIZE;

#[cfg(target_os = "espidf")]
pub mod esp;

/// Byte-oriented host link
pub trait Transport {
    /// Next received byte, without blocking
    fn try_read_byte(&mut self) -> Option<u8>;

    /// Queue one byte for transmission (fire-and-forget)
    fn write_byte(&mut self, byte: u8);

    fn write_all(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_byte(byte);
        }
    }
}

/// Millisecond time base
pub trait Clock {
    /// Milliseconds since an arbitrary origin; wraps at `u32::MAX`
    fn elapsed_ms(&self) -> u32;

    /// Idle until a byte arrives or the next tick elapses
    fn sleep_until_event(&mut self);
}

/// Consent button and status LED
pub trait UserInterface {
    /// Raw button level, no debouncing
    fn button_pressed(&mut self) -> bool;

    /// LED intensity, 0 = off
    fn set_indicator(&mut self, intensity: u8);
}

/// One weak physical noise source
pub trait NoiseSource {
    /// One noisy byte if a sample is ready, `None` if the source has not
    /// produced one yet. Callers bound how often they poll.
    fn try_sample(&mut self) -> Option<u8>;
}

/// Everything the dispatcher needs from the board itself
pub trait Board: Transport + Clock + UserInterface {}

impl<T: Transport + Clock + UserInterface> Board for T {}

/// State shared with an asynchronous producer
///
/// The value is only reachable inside [`Exclusive::with`], which holds the
/// producer off for the duration of the closure, so a multi-field read can
/// never observe a torn update.
#[derive(Debug, Default)]
pub struct Exclusive<T> {
    inner: Mutex<T>,
}

impl<T> Exclusive<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        // A producer that panicked mid-update cannot leave the plain-data
        // values kept here in an unusable state
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// Fixed-capacity receive queue
///
/// When full, a push drops the oldest byte so the most recent host data
/// survives.
#[derive(Debug)]
pub struct RingBuffer {
    buf: [u8; RX_BUFFER_SIZE],
    head: usize,
    tail: usize,
}

impl RingBuffer {
    pub const fn new() -> Self {
        Self {
            buf: [0; RX_BUFFER_SIZE],
            head: 0,
            tail: 0,
        }
    }

    pub fn push(&mut self, byte: u8) {
        let next_head = (self.head + 1) % RX_BUFFER_SIZE;
        if next_head == self.tail {
            self.tail = (self.tail + 1) % RX_BUFFER_SIZE;
        }
        self.buf[self.head] = byte;
        self.head = next_head;
    }

    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.buf[self.tail];
        self.tail = (self.tail + 1) % RX_BUFFER_SIZE;
        Some(byte)
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
