// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Countdown timers
//!
//! A [`Timer`] answers "has the time I was given run out yet?".  It holds nothing but the absolute
//! tick at which it expires, so it is a plain value: it can be copied, reset and dropped freely,
//! and embedded in C structures (it is `#[repr(C)]`).  Every operation reads the kernel's tick
//! counter, using the interrupt safe read when called from an interrupt handler.
//!
//! # Wraparound
//!
//! The tick counter is 32 bits wide and wraps.  The expiry comparison is a plain unsigned
//! `end_tick <= now`, not modular arithmetic.  When `now + duration` wraps past zero, the timer
//! instead expires at tick `duration`, as if it had been started at tick zero.  Close to the wrap
//! this makes a timer expire early (or late); protocol code built on this layer relies on exactly
//! this behavior, so it is kept.

use crate::kernel::Kernel;
use crate::sys;
use crate::time::{ms_to_ticks, ticks_to_ms, Duration, Instant, Tick};

/// A countdown timer.
///
/// A new timer is already expired.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timer {
    end_tick: Tick,
}

impl Timer {
    /// A timer that has already expired.
    pub const fn new() -> Timer {
        Timer { end_tick: 0 }
    }

    /// Reset the timer to the expired state.
    pub fn init(&mut self) {
        self.end_tick = 0;
    }

    /// The tick at which this timer expires.
    pub const fn end_tick(&self) -> Tick {
        self.end_tick
    }

    /// The expiry tick as an [`Instant`].
    pub const fn deadline(&self) -> Instant {
        Instant::from_ticks(self.end_tick)
    }

    /// Start counting down `duration` from now.
    pub fn start<K: Kernel>(&mut self, kernel: &K, duration: Duration) {
        let now = sys::tick_count(kernel);
        let ticks = duration.ticks();
        let end_tick = now.wrapping_add(ticks);
        self.end_tick = if end_tick < now { ticks } else { end_tick };
    }

    /// Start counting down `timeout` milliseconds, rounded down to whole ticks.
    pub fn start_ms<K: Kernel>(&mut self, kernel: &K, timeout: u32) {
        self.start(kernel, Duration::from_ticks(ms_to_ticks(timeout)));
    }

    /// Start counting down `timeout` seconds.
    ///
    /// The conversion to milliseconds is 32-bit and wraps for timeouts over about 49 days.
    pub fn start_sec<K: Kernel>(&mut self, kernel: &K, timeout: u32) {
        self.start_ms(kernel, timeout.wrapping_mul(1000));
    }

    /// Has the timer run out?
    pub fn is_expired<K: Kernel>(&self, kernel: &K) -> bool {
        self.end_tick <= sys::tick_count(kernel)
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining<K: Kernel>(&self, kernel: &K) -> Duration {
        let now = sys::tick_count(kernel);
        if self.end_tick > now {
            Duration::from_ticks(self.end_tick - now)
        } else {
            Duration::from_ticks(0)
        }
    }

    /// Milliseconds left before expiry, zero once expired.
    pub fn remaining_ms<K: Kernel>(&self, kernel: &K) -> u32 {
        ticks_to_ms(self.remaining(kernel).ticks())
    }
}

/// Suspend the calling task for at least `milliseconds`, rounded down to whole ticks.
///
/// This goes straight to the kernel's task delay.  From interrupt context, where nothing may
/// sleep, it returns immediately.
pub fn delay<K: Kernel>(kernel: &K, milliseconds: u32) {
    sys::sleep(kernel, Duration::from_ticks(ms_to_ticks(milliseconds)));
}
