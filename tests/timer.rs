// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

#![cfg(feature = "std")]

use iot_platform::port::host::{run_in_isr, HostKernel};
use iot_platform::time::{ms_to_ticks, Duration, Tick, TICK_PERIOD_MS};
use iot_platform::timer::{delay, Timer};
use rand::Rng;
use rand_pcg::Pcg32;

// Test the countdown timer against the simulated kernel.  There are a few things this tries to
// test:
// 1. Right after starting, a timer reports about the time it was given.
// 2. It expires once that many ticks pass, and not before.
// 3. The tick counter wrapping follows the restart-at-zero rule.
// 4. A real, wall clock, delay expires a timer.

#[test]
fn random_countdowns() {
    let mut rng = Pcg32::new(1, 1);
    let kernel = HostKernel::with_manual_clock();

    for _ in 0..200 {
        // Keep well clear of the wrap for this part.
        kernel.set_tick_count(rng.gen_range(0..1_000_000));
        let duration_ms: u32 = rng.gen_range(1..60_000);

        let mut timer = Timer::new();
        timer.start_ms(&kernel, duration_ms);

        let left = timer.remaining_ms(&kernel);
        assert!(left <= duration_ms);
        assert!(duration_ms - left < TICK_PERIOD_MS);

        let ticks = ms_to_ticks(duration_ms);
        if ticks > 0 {
            assert!(!timer.is_expired(&kernel));
            kernel.advance(ticks - 1);
            assert!(!timer.is_expired(&kernel));
        }
        kernel.advance(1);
        assert!(timer.is_expired(&kernel));
        assert_eq!(timer.remaining_ms(&kernel), 0);
    }
}

#[test]
fn random_wraps() {
    let mut rng = Pcg32::new(7, 3);
    let kernel = HostKernel::with_manual_clock();

    for _ in 0..100 {
        let before_wrap: Tick = rng.gen_range(0..1000);
        let ticks: Tick = rng.gen_range(before_wrap + 1..before_wrap + 5000);
        kernel.set_tick_count(Tick::MAX - before_wrap);

        let mut timer = Timer::new();
        timer.start(&kernel, Duration::from_ticks(ticks));
        assert_eq!(timer.end_tick(), ticks);
    }
}

#[test]
fn seconds_countdown() {
    let kernel = HostKernel::with_manual_clock();
    let mut timer = Timer::new();
    timer.start_sec(&kernel, 2);
    assert_eq!(timer.remaining_ms(&kernel), ms_to_ticks(2000) * TICK_PERIOD_MS);
    kernel.advance(ms_to_ticks(2000));
    assert!(timer.is_expired(&kernel));
}

#[test]
fn isr_reads_use_the_interrupt_path() {
    let kernel = HostKernel::with_manual_clock();
    kernel.advance(500);
    let mut timer = Timer::new();
    timer.start_ms(&kernel, 100 * TICK_PERIOD_MS);

    run_in_isr(|| {
        assert!(!timer.is_expired(&kernel));
        assert_eq!(timer.remaining_ms(&kernel), 100 * TICK_PERIOD_MS);
    });
}

#[test]
fn wall_clock_delay_expires_timer() {
    let kernel = HostKernel::new();
    let mut timer = Timer::new();
    timer.start_ms(&kernel, 20);
    delay(&kernel, 40);
    assert!(timer.is_expired(&kernel));
    assert_eq!(timer.remaining_ms(&kernel), 0);
}
