// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

#![cfg(feature = "std")]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use iot_platform::port::host::{run_in_isr, HostKernel};
use iot_platform::sys::sync::Mutex;
use iot_platform::{sync, Error, Kernel};
use rand::Rng;
use rand_pcg::Pcg32;

// Test the context aware mutex with real threads standing in for tasks.  There are a few things
// this tries to test:
// 1. Task context lockers never hold the mutex at the same time.
// 2. A second locker waits for the holder to unlock.
// 3. Interrupt context never waits.
// 4. Nothing works on a destroyed mutex.

const WORKERS: usize = 6;
const ROUNDS: usize = 50;

#[test]
fn lockers_are_exclusive() {
    let kernel = HostKernel::new();
    let mut mutex = Mutex::new(kernel.clone());
    mutex.init().unwrap();
    let mutex = Arc::new(mutex);

    let inside = Arc::new(AtomicBool::new(false));
    let total = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..WORKERS)
        .map(|id| {
            let mutex = mutex.clone();
            let inside = inside.clone();
            let total = total.clone();
            thread::spawn(move || {
                let mut rng = Pcg32::new(id as u64 + 1, 1);
                for _ in 0..ROUNDS {
                    mutex.lock().unwrap();
                    assert!(!inside.swap(true, Ordering::AcqRel), "two holders at once");
                    thread::sleep(Duration::from_micros(rng.gen_range(0..200)));
                    total.fetch_add(1, Ordering::Relaxed);
                    inside.store(false, Ordering::Release);
                    mutex.unlock().unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(total.load(Ordering::Relaxed), WORKERS * ROUNDS);
}

#[test]
fn guarded_counter() {
    let kernel = HostKernel::new();
    let counter = Arc::new(sync::Mutex::new(0usize, kernel.clone()).unwrap());

    let workers: Vec<_> = (0..WORKERS)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    *counter.lock().unwrap() += 1;
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(*counter.lock().unwrap(), WORKERS * ROUNDS);
}

#[test]
fn second_locker_waits_for_unlock() {
    let kernel = HostKernel::new();
    let mut mutex = Mutex::new(kernel.clone());
    mutex.init().unwrap();
    let mut mutex = Arc::new(mutex);

    mutex.lock().unwrap();

    let (tx, rx) = mpsc::channel();
    let waiter = {
        let mutex = mutex.clone();
        thread::spawn(move || {
            let result = mutex.lock();
            tx.send(result).unwrap();
            mutex.unlock().unwrap();
        })
    };

    // Still held, the waiter must not get through.
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    mutex.unlock().unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok(()));
    waiter.join().unwrap();

    let mutex = Arc::get_mut(&mut mutex).unwrap();
    assert_eq!(mutex.destroy(), Ok(()));
    assert_eq!(mutex.lock(), Err(Error::Lock));
    assert_eq!(mutex.unlock(), Err(Error::Unlock));
    assert_eq!(mutex.destroy(), Err(Error::Destroy));
    assert_eq!(kernel.live_objects(), 0);
}

#[test]
fn trylock_does_not_wait() {
    let kernel = HostKernel::new();
    let mut mutex = Mutex::new(kernel.clone());
    mutex.init().unwrap();
    let mutex = Arc::new(mutex);

    mutex.lock().unwrap();
    let other = mutex.clone();
    let start = Instant::now();
    let result = thread::spawn(move || other.trylock()).join().unwrap();
    assert_eq!(result, Err(Error::Lock));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn isr_lock_never_waits() {
    let kernel = HostKernel::new();
    let mut mutex = Mutex::new(kernel.clone());
    mutex.init().unwrap();
    mutex.lock().unwrap();

    // With the default forever wait, a task lock here would hang.
    let start = Instant::now();
    assert_eq!(run_in_isr(|| mutex.lock()), Err(Error::Lock));
    assert!(start.elapsed() < Duration::from_secs(1));

    mutex.unlock().unwrap();
    assert_eq!(run_in_isr(|| mutex.lock()), Ok(()));
    assert_eq!(run_in_isr(|| mutex.unlock()), Ok(()));
}

#[test]
fn isr_created_mutex_across_threads() {
    let kernel = HostKernel::new();
    let mut mutex = Mutex::new(kernel.clone());
    run_in_isr(|| mutex.init()).unwrap();
    assert!(mutex.is_static());
    let mutex = Arc::new(mutex);

    mutex.lock().unwrap();
    let other = mutex.clone();
    let result = thread::spawn(move || run_in_isr(|| other.trylock())).join().unwrap();
    assert_eq!(result, Err(Error::Lock));
    mutex.unlock().unwrap();

    drop(mutex);
    assert!(!kernel.shared_static_storage().is_claimed());
}
