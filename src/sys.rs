// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Platform 'sys' module.
//!
//! The [`Kernel`] trait exposes the raw kernel entry points, with separate task and interrupt
//! flavors.  This module contains thin wrappers over them that ask the port which context the
//! caller is in, and pick the matching entry point, so callers never have to.

use log::warn;

use crate::kernel::{ExecContext, Kernel};
use crate::time::{Duration, Instant, Tick};

pub mod sync;

/// Read the kernel's tick count, from any context.
///
/// Inside an interrupt handler this uses the interrupt safe read.
#[inline]
pub fn tick_count<K: Kernel>(kernel: &K) -> Tick {
    match kernel.current_context() {
        ExecContext::Task => kernel.tick_count(),
        ExecContext::Interrupt => kernel.tick_count_from_isr(),
    }
}

/// The current tick count as an [`Instant`].
pub fn now<K: Kernel>(kernel: &K) -> Instant {
    Instant::from_ticks(tick_count(kernel))
}

/// Suspend the calling task for at least `duration`.
///
/// Returns `false`, without waiting, when called from interrupt context, where nothing may sleep.
pub fn sleep<K: Kernel>(kernel: &K, duration: Duration) -> bool {
    match kernel.current_context() {
        ExecContext::Task => {
            kernel.delay(duration.ticks());
            true
        }
        ExecContext::Interrupt => {
            warn!("sleep of {} ticks requested from interrupt context", duration.ticks());
            false
        }
    }
}
