// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Host port.
//!
//! A simulated kernel built on std threads, so the platform layer can be exercised without a
//! target.  Threads stand in for tasks, and a thread local flag stands in for the processor's
//! "handling an interrupt" state: code run through [`run_in_isr`] sees [`ExecContext::Interrupt`].
//!
//! The tick counter is derived from one of two clocks:
//!
//! - a wall clock ([`HostKernel::new`]), where ticks follow real time, and
//! - a manual clock ([`HostKernel::with_manual_clock`]), where ticks only move when the test calls
//!   [`HostKernel::advance`], or a task calls `delay`.
//!
//! Both can be moved to any point in tick space with [`HostKernel::set_tick_count`], which is how
//! the wraparound behavior is tested.
//!
//! Mutexes are binary semaphores built from a std mutex and condition variable.  Blocking waits
//! always use real time, converted from ticks with the configured tick period.

use core::fmt;
use core::mem::MaybeUninit;
use core::ops::Deref;
use std::boxed::Box;
use std::cell::Cell;
use std::sync::{
    Arc, Condvar, Mutex as StdMutex, MutexGuard as StdMutexGuard, OnceLock, PoisonError,
};
use std::thread;
use std::time::{Duration as StdDuration, Instant as StdInstant};

use portable_atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::kernel::{ContextProvider, ExecContext, Kernel};
use crate::object::StaticKernelObject;
use crate::time::{Tick, Timeout, TICK_PERIOD_MS};

std::thread_local! {
    static IN_ISR: Cell<bool> = const { Cell::new(false) };
}

/// Run `f` on this thread as if it were an interrupt handler.
///
/// Nesting is allowed; the previous state is restored when `f` returns (or unwinds).
pub fn run_in_isr<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(bool);

    impl Drop for Restore {
        fn drop(&mut self) {
            IN_ISR.with(|flag| flag.set(self.0));
        }
    }

    let _restore = Restore(IN_ISR.with(|flag| flag.replace(true)));
    f()
}

/// Is this thread currently simulating an interrupt handler?
pub fn in_isr() -> bool {
    IN_ISR.with(|flag| flag.get())
}

/// A binary semaphore, used as the host's kernel mutex object.
pub struct HostSemaphore {
    taken: StdMutex<bool>,
    released: Condvar,
}

impl HostSemaphore {
    /// A new semaphore, available to be taken.
    pub const fn new() -> HostSemaphore {
        HostSemaphore {
            taken: StdMutex::new(false),
            released: Condvar::new(),
        }
    }

    // A panicking test thread must not wedge every other user of the semaphore.
    fn state(&self) -> StdMutexGuard<'_, bool> {
        self.taken.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the semaphore, waiting up to `wait`, or forever if `None`.
    fn take(&self, wait: Option<StdDuration>) -> bool {
        let guard = self.state();
        let mut guard = match wait {
            None => self
                .released
                .wait_while(guard, |taken| *taken)
                .unwrap_or_else(PoisonError::into_inner),
            Some(wait) => {
                self.released
                    .wait_timeout_while(guard, wait, |taken| *taken)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        if *guard {
            return false;
        }
        *guard = true;
        true
    }

    fn try_take(&self) -> bool {
        let mut taken = self.state();
        if *taken {
            false
        } else {
            *taken = true;
            true
        }
    }

    fn give(&self) -> bool {
        let mut taken = self.state();
        if !*taken {
            return false;
        }
        *taken = false;
        drop(taken);
        self.released.notify_one();
        true
    }

    /// Is the semaphore currently held?
    pub fn is_taken(&self) -> bool {
        *self.state()
    }
}

impl Default for HostSemaphore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostSemaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostSemaphore {{ taken: {} }}", self.is_taken())
    }
}

/// An owned host mutex object.
#[derive(Debug)]
pub enum HostHandle {
    /// Created with `mutex_create`.
    Dynamic(Arc<HostSemaphore>),
    /// Created inside static storage with `mutex_create_static`.
    Static(&'static HostSemaphore),
}

impl HostHandle {
    /// Was this object created inside static storage?
    pub fn is_static(&self) -> bool {
        matches!(self, HostHandle::Static(_))
    }
}

impl Deref for HostHandle {
    type Target = HostSemaphore;

    fn deref(&self) -> &HostSemaphore {
        match self {
            HostHandle::Dynamic(sem) => sem,
            HostHandle::Static(sem) => sem,
        }
    }
}

/// Number of kernels that can hold pooled shared storage at the same time.
const STORAGE_POOL_SIZE: usize = 64;

static STORAGE_POOL: [StaticKernelObject<HostSemaphore>; STORAGE_POOL_SIZE] =
    [const { StaticKernelObject::new() }; STORAGE_POOL_SIZE];
static STORAGE_IN_USE: [AtomicBool; STORAGE_POOL_SIZE] =
    [const { AtomicBool::new(false) }; STORAGE_POOL_SIZE];
static STORAGE_LEAKED: AtomicUsize = AtomicUsize::new(0);

/// A kernel's shared static storage.
enum SharedStorage {
    /// A pool slot, returned when the kernel is dropped.
    Pooled(usize),
    /// Allocated because the pool was exhausted.  Never freed.
    Leaked(&'static StaticKernelObject<HostSemaphore>),
}

impl SharedStorage {
    fn acquire() -> SharedStorage {
        for (index, in_use) in STORAGE_IN_USE.iter().enumerate() {
            if in_use
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return SharedStorage::Pooled(index);
            }
        }
        STORAGE_LEAKED.fetch_add(1, Ordering::AcqRel);
        SharedStorage::Leaked(Box::leak(Box::new(StaticKernelObject::new())))
    }

    fn get(&self) -> &'static StaticKernelObject<HostSemaphore> {
        match self {
            SharedStorage::Pooled(index) => &STORAGE_POOL[*index],
            SharedStorage::Leaked(storage) => storage,
        }
    }
}

impl Drop for SharedStorage {
    fn drop(&mut self) {
        // A slot still claimed here belongs to a forgotten mutex, and is never reused.
        if let SharedStorage::Pooled(index) = *self {
            if !STORAGE_POOL[index].is_claimed() {
                STORAGE_IN_USE[index].store(false, Ordering::Release);
            }
        }
    }
}

struct Inner {
    epoch: StdInstant,
    manual: bool,
    offset: AtomicU32,
    shared: SharedStorage,
    live: AtomicU32,
    fail_create: AtomicBool,
}

/// The simulated kernel.
///
/// Cloning gives another handle on the same kernel.  Separate `HostKernel::new` calls give
/// independent kernels, each with its own clock and shared static storage, which keeps tests
/// apart from each other.
#[derive(Clone)]
pub struct HostKernel {
    inner: Arc<Inner>,
}

impl HostKernel {
    /// A kernel whose tick follows real time, starting at tick 0.
    pub fn new() -> HostKernel {
        Self::build(false)
    }

    /// A kernel whose tick only moves through [`advance`] and `delay`.
    ///
    /// [`advance`]: Self::advance
    pub fn with_manual_clock() -> HostKernel {
        Self::build(true)
    }

    fn build(manual: bool) -> HostKernel {
        HostKernel {
            inner: Arc::new(Inner {
                epoch: StdInstant::now(),
                manual,
                offset: AtomicU32::new(0),
                shared: SharedStorage::acquire(),
                live: AtomicU32::new(0),
                fail_create: AtomicBool::new(false),
            }),
        }
    }

    /// The process wide kernel used by the C surface on host builds.
    pub fn system() -> &'static HostKernel {
        static SYSTEM: OnceLock<HostKernel> = OnceLock::new();
        SYSTEM.get_or_init(HostKernel::new)
    }

    fn elapsed_ticks(&self) -> Tick {
        if self.inner.manual {
            return 0;
        }
        let ms = self.inner.epoch.elapsed().as_millis() as u64;
        (ms / TICK_PERIOD_MS as u64) as Tick
    }

    fn now(&self) -> Tick {
        self.inner.offset.load(Ordering::Acquire).wrapping_add(self.elapsed_ticks())
    }

    /// Move the tick counter forward, wrapping at `Tick::MAX`.
    pub fn advance(&self, ticks: Tick) {
        // Wrapping add; `fetch_add` on the atomic wraps the same way.
        self.inner.offset.fetch_add(ticks, Ordering::AcqRel);
    }

    /// Move the tick counter so that it currently reads `tick`.
    pub fn set_tick_count(&self, tick: Tick) {
        let offset = tick.wrapping_sub(self.elapsed_ticks());
        self.inner.offset.store(offset, Ordering::Release);
    }

    /// Number of mutex objects created and not yet deleted.
    pub fn live_objects(&self) -> u32 {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Make the next mutex creation fail, as if the kernel were out of memory.
    pub fn fail_next_create(&self) {
        self.inner.fail_create.store(true, Ordering::Release);
    }

    fn creation_allowed(&self) -> bool {
        !self.inner.fail_create.swap(false, Ordering::AcqRel)
    }
}

impl Default for HostKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostKernel {{ tick: {}, manual: {} }}", self.now(), self.inner.manual)
    }
}

impl ContextProvider for HostKernel {
    fn current_context(&self) -> ExecContext {
        if in_isr() {
            ExecContext::Interrupt
        } else {
            ExecContext::Task
        }
    }
}

impl Kernel for HostKernel {
    type Handle = HostHandle;
    type StaticStorage = HostSemaphore;

    fn tick_count(&self) -> Tick {
        debug_assert!(!in_isr(), "task tick read from interrupt context");
        self.now()
    }

    fn tick_count_from_isr(&self) -> Tick {
        self.now()
    }

    fn delay(&self, ticks: Tick) {
        if self.inner.manual {
            self.advance(ticks);
            thread::yield_now();
        } else {
            thread::sleep(StdDuration::from_millis(ticks as u64 * TICK_PERIOD_MS as u64));
        }
    }

    fn mutex_create(&self) -> Option<HostHandle> {
        if !self.creation_allowed() {
            return None;
        }
        self.inner.live.fetch_add(1, Ordering::AcqRel);
        Some(HostHandle::Dynamic(Arc::new(HostSemaphore::new())))
    }

    fn mutex_create_static(
        &self,
        storage: &'static mut MaybeUninit<HostSemaphore>,
    ) -> Option<HostHandle> {
        if !self.creation_allowed() {
            return None;
        }
        self.inner.live.fetch_add(1, Ordering::AcqRel);
        Some(HostHandle::Static(storage.write(HostSemaphore::new())))
    }

    fn mutex_take(&self, handle: &HostHandle, timeout: Timeout) -> bool {
        debug_assert!(!in_isr(), "blocking take from interrupt context");
        if timeout.is_forever() {
            handle.take(None)
        } else {
            let ms = timeout.ticks() as u64 * TICK_PERIOD_MS as u64;
            handle.take(Some(StdDuration::from_millis(ms)))
        }
    }

    fn mutex_take_from_isr(&self, handle: &HostHandle) -> bool {
        handle.try_take()
    }

    fn mutex_give(&self, handle: &HostHandle) -> bool {
        handle.give()
    }

    fn mutex_give_from_isr(&self, handle: &HostHandle) -> bool {
        handle.give()
    }

    fn mutex_delete(&self, handle: HostHandle) {
        self.inner.live.fetch_sub(1, Ordering::AcqRel);
        drop(handle);
    }

    fn shared_static_storage(&self) -> &'static StaticKernelObject<HostSemaphore> {
        self.inner.shared.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isr_flag_is_scoped() {
        let kernel = HostKernel::with_manual_clock();
        assert_eq!(kernel.current_context(), ExecContext::Task);
        run_in_isr(|| {
            assert_eq!(kernel.current_context(), ExecContext::Interrupt);
            run_in_isr(|| assert!(in_isr()));
            assert!(in_isr());
        });
        assert_eq!(kernel.current_context(), ExecContext::Task);
    }

    #[test]
    fn manual_clock_wraps() {
        let kernel = HostKernel::with_manual_clock();
        assert_eq!(kernel.tick_count(), 0);
        kernel.set_tick_count(Tick::MAX - 1);
        kernel.advance(3);
        assert_eq!(kernel.tick_count(), 1);
        kernel.delay(10);
        assert_eq!(kernel.tick_count(), 11);
    }

    #[test]
    fn semaphore_take_give() {
        let sem = HostSemaphore::new();
        assert!(sem.try_take());
        assert!(!sem.try_take());
        assert!(!sem.take(Some(StdDuration::from_millis(5))));
        assert!(sem.give());
        assert!(!sem.give());
        assert!(sem.take(None));
    }

    #[test]
    fn shared_storage_is_recycled() {
        let leaked = STORAGE_LEAKED.load(Ordering::Acquire);
        for _ in 0..STORAGE_POOL_SIZE * 3 {
            let kernel = HostKernel::with_manual_clock();
            let slot = kernel.mutex_create_static(
                kernel.shared_static_storage().claim().expect("fresh storage"),
            );
            kernel.mutex_delete(slot.expect("static create"));
            kernel.shared_static_storage().release();
        }
        assert_eq!(STORAGE_LEAKED.load(Ordering::Acquire), leaked);
    }

    #[test]
    fn injected_create_failure() {
        let kernel = HostKernel::with_manual_clock();
        kernel.fail_next_create();
        assert!(kernel.mutex_create().is_none());
        let handle = kernel.mutex_create().expect("second create");
        assert_eq!(kernel.live_objects(), 1);
        kernel.mutex_delete(handle);
        assert_eq!(kernel.live_objects(), 0);
    }
}
