// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Higher level Mutex type.
//!
//! This is modeled after
//! [`std::sync::Mutex`](https://doc.rust-lang.org/stable/std/sync/struct.Mutex.html), built on the
//! context aware [`sys::sync::Mutex`](crate::sys::sync::Mutex).  The explicit lock/unlock calls
//! become a guard that unlocks when it goes out of scope.

use core::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

use log::warn;

use crate::error::Result;
use crate::kernel::Kernel;
use crate::sys::sync as sys;

/// The return type from [`Mutex::try_lock`].
pub type TryLockResult<Guard> = core::result::Result<Guard, TryLockError>;

/// The reason [`Mutex::try_lock`] failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TryLockError {
    /// The lock could not be acquired at this time because the operation would otherwise block.
    WouldBlock,
}

/// A mutual exclusion primitive useful for protecting shared data.
///
/// Differences from `std::sync::Mutex`:
/// - Poisoning: not implemented.
/// - Failure: the kernel mutex can time out, (see [`MUTEX_WAIT`]), or fail to be taken from
///   interrupt context, so [`lock`] returns the platform [`Error`].
///
/// [`MUTEX_WAIT`]: crate::time::MUTEX_WAIT
/// [`lock`]: Mutex::lock
/// [`Error`]: crate::Error
pub struct Mutex<T: ?Sized, K: Kernel> {
    inner: sys::Mutex<K>,
    data: UnsafeCell<T>,
}

// At least if correctly done, the Mutex provides for Send and Sync as long as the inner data
// supports Send.
unsafe impl<T: ?Sized + Send, K: Kernel> Send for Mutex<T, K> where sys::Mutex<K>: Send {}
unsafe impl<T: ?Sized + Send, K: Kernel> Sync for Mutex<T, K> where sys::Mutex<K>: Sync {}

impl<T, K: Kernel> fmt::Debug for Mutex<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mutex {:?}", self.inner)
    }
}

/// An RAII implementation of a "scoped lock" of a mutex.  When this structure is dropped (falls
/// out of scope), the lock will be unlocked.
///
/// The data protected by the mutex can be accessed through this guard via its [`Deref`] and
/// [`DerefMut`] implementations.
///
/// This structure is created by the [`lock`] and [`try_lock`] methods on [`Mutex`].
///
/// The guard can not be sent to another task: the kernel mutex must be released by the task
/// that took it.
///
/// ```compile_fail
/// use iot_platform::port::host::HostKernel;
/// use iot_platform::sync::Mutex;
///
/// fn assert_send<T: Send>(_: &T) {}
///
/// let mutex = Mutex::new(0u32, HostKernel::new()).unwrap();
/// let guard = mutex.lock().unwrap();
/// assert_send(&guard);
/// ```
///
/// [`lock`]: Mutex::lock
/// [`try_lock`]: Mutex::try_lock
pub struct MutexGuard<'a, T: ?Sized + 'a, K: Kernel> {
    lock: &'a Mutex<T, K>,
    // Raw pointers are not Send.
    _nosend: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync, K: Kernel> Sync for MutexGuard<'_, T, K> {}

impl<T, K: Kernel> Mutex<T, K> {
    /// Construct a new Mutex, creating its kernel mutex on `kernel`.
    pub fn new(t: T, kernel: K) -> Result<Mutex<T, K>> {
        let mut inner = sys::Mutex::new(kernel);
        inner.init()?;
        Ok(Mutex::new_from(t, inner))
    }

    /// Construct a new wrapped Mutex, using an already initialized sys mutex.
    pub const fn new_from(t: T, raw_mutex: sys::Mutex<K>) -> Mutex<T, K> {
        Mutex {
            inner: raw_mutex,
            data: UnsafeCell::new(t),
        }
    }

    /// Consume the mutex, returning the data.
    ///
    /// The kernel mutex is destroyed.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized, K: Kernel> Mutex<T, K> {
    /// Acquires the mutex, blocking the current task until it is able to do so.
    ///
    /// Upon returning, the task is the only one with the lock held.  When the returned guard goes
    /// out of scope, the mutex will be unlocked.  In interrupt context this does not block, and
    /// fails if the mutex is held.
    pub fn lock(&self) -> Result<MutexGuard<'_, T, K>> {
        self.inner.lock()?;
        unsafe { Ok(MutexGuard::new(self)) }
    }

    /// Attempts to acquire this lock.
    ///
    /// This function does not block.
    pub fn try_lock(&self) -> TryLockResult<MutexGuard<'_, T, K>> {
        match self.inner.trylock() {
            Ok(()) => unsafe { Ok(MutexGuard::new(self)) },
            Err(_) => Err(TryLockError::WouldBlock),
        }
    }

    /// Mutable access to the data, statically guaranteed to be unshared.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<'mutex, T: ?Sized, K: Kernel> MutexGuard<'mutex, T, K> {
    unsafe fn new(lock: &'mutex Mutex<T, K>) -> MutexGuard<'mutex, T, K> {
        MutexGuard {
            lock,
            _nosend: PhantomData,
        }
    }
}

impl<T: ?Sized, K: Kernel> Deref for MutexGuard<'_, T, K> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized, K: Kernel> DerefMut for MutexGuard<'_, T, K> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized, K: Kernel> Drop for MutexGuard<'_, T, K> {
    #[inline]
    fn drop(&mut self) {
        if self.lock.inner.unlock().is_err() {
            warn!("guard could not release its mutex");
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::port::host::{run_in_isr, HostKernel};
    use crate::Error;

    #[test]
    fn guard_unlocks_on_drop() {
        let kernel = HostKernel::with_manual_clock();
        let mutex = Mutex::new(5u32, kernel.clone()).unwrap();
        {
            let mut guard = mutex.lock().unwrap();
            *guard += 1;
            assert_eq!(mutex.try_lock().err(), Some(TryLockError::WouldBlock));
        }
        assert_eq!(*mutex.try_lock().unwrap(), 6);
    }

    #[test]
    fn guard_released_by_owning_thread() {
        let kernel = HostKernel::new();
        let mutex = Mutex::new(0u32, kernel.clone()).unwrap();
        std::thread::scope(|s| {
            s.spawn(|| {
                let mut guard = mutex.lock().unwrap();
                *guard += 1;
                // Dropped here, on the thread that locked.
            });
        });
        assert_eq!(*mutex.try_lock().unwrap(), 1);
    }

    #[test]
    fn isr_lock_fails_while_held() {
        let kernel = HostKernel::with_manual_clock();
        let mutex = Mutex::new((), kernel.clone()).unwrap();
        let _guard = mutex.lock().unwrap();
        assert_eq!(run_in_isr(|| mutex.lock().err()), Some(Error::Lock));
    }

    #[test]
    fn creation_failure_is_init_error() {
        let kernel = HostKernel::with_manual_clock();
        kernel.fail_next_create();
        assert_eq!(Mutex::new(0u8, kernel.clone()).err(), Some(Error::Init));
    }

    #[test]
    fn into_inner_destroys_kernel_mutex() {
        let kernel = HostKernel::with_manual_clock();
        let mut mutex = Mutex::new(1u8, kernel.clone()).unwrap();
        *mutex.get_mut() = 2;
        assert_eq!(kernel.live_objects(), 1);
        assert_eq!(mutex.into_inner(), 2);
        assert_eq!(kernel.live_objects(), 0);
    }
}
