// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Time types for the platform layer.
//!
//! The kernel counts time in ticks, held in a 32-bit counter that wraps around.  The tick rate is
//! a build time setting (`CONFIG_TICK_RATE_HZ`), and must evenly divide 1000 so that a tick is a
//! whole number of milliseconds.  Conversions between milliseconds and ticks round down, the way
//! the kernel's own `pdMS_TO_TICKS` style macros do.
//!
//! Typed durations and instants come from the [`fugit`] crate, parameterized by the tick rate.
//! Anything that waits on the kernel takes a [`Timeout`], which can be built from a [`Duration`],
//! or from the [`Forever`] and [`NoWait`] markers.

use crate::kconfig;

/// The kernel's tick counter.  Wraps around after `Tick::MAX`.
pub type Tick = u32;

/// The rate, in Hz, of the kernel's tick.
pub const TICK_RATE_HZ: u32 = kconfig::CONFIG_TICK_RATE_HZ;

const _: () = assert!(
    TICK_RATE_HZ > 0 && TICK_RATE_HZ <= 1000 && 1000 % TICK_RATE_HZ == 0,
    "CONFIG_TICK_RATE_HZ must evenly divide 1000"
);

/// Length of one tick, in milliseconds.
pub const TICK_PERIOD_MS: Tick = 1000 / TICK_RATE_HZ;

/// A duration measured in kernel ticks.
pub type Duration = fugit::Duration<Tick, 1, TICK_RATE_HZ>;

/// A point in (wrapping) tick space.
pub type Instant = fugit::Instant<Tick, 1, TICK_RATE_HZ>;

/// The tick count the kernel treats as "wait forever".
pub const MAX_DELAY: Tick = Tick::MAX;

/// Convert milliseconds to ticks, rounding down.
#[inline]
pub const fn ms_to_ticks(ms: u32) -> Tick {
    ms / TICK_PERIOD_MS
}

/// Convert ticks to milliseconds.
///
/// Wraps on overflow, as the 32-bit arithmetic in the kernel does.
#[inline]
pub const fn ticks_to_ms(ticks: Tick) -> u32 {
    ticks.wrapping_mul(TICK_PERIOD_MS)
}

/// How long a kernel call may wait.
///
/// This is the tick count handed to the kernel.  A value of [`MAX_DELAY`] waits forever, zero
/// does not wait at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeout(pub Tick);

impl Timeout {
    /// Does this timeout wait without limit?
    pub const fn is_forever(self) -> bool {
        self.0 == MAX_DELAY
    }

    /// The number of ticks to wait.
    pub const fn ticks(self) -> Tick {
        self.0
    }
}

/// Wait as long as necessary.
#[derive(Clone, Copy, Debug)]
pub struct Forever;

/// Do not wait.
#[derive(Clone, Copy, Debug)]
pub struct NoWait;

impl From<Forever> for Timeout {
    fn from(_: Forever) -> Timeout {
        Timeout(MAX_DELAY)
    }
}

impl From<NoWait> for Timeout {
    fn from(_: NoWait) -> Timeout {
        Timeout(0)
    }
}

impl From<Duration> for Timeout {
    fn from(value: Duration) -> Timeout {
        Timeout(value.ticks())
    }
}

/// The wait used by every task context mutex acquisition.
///
/// Set through `CONFIG_MUTEX_WAIT_TICKS`.  This is a single process wide value; it can not be
/// changed per call.
pub const MUTEX_WAIT: Timeout = Timeout(kconfig::CONFIG_MUTEX_WAIT_TICKS);
