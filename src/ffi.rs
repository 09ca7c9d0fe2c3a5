// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! C surface.
//!
//! The protocol stack above this layer is written in C, and calls these functions on records it
//! owns: a [`Timer`] (a plain `uint32_t` end tick) and an [`IotMutex`], whose size is reported by
//! [`iot_mutex_size`].  All of them run on the [`DefaultKernel`].
//!
//! With the `export-symbols` feature the functions are exported under their own names, otherwise
//! they are ordinary Rust functions with the C calling convention.
//!
//! Null record pointers are never dereferenced.  The mutex calls report them as their own error,
//! timer calls do nothing and report an expired timer.

use core::ptr;

use crate::error::{Error, Result};
use crate::port::{default_kernel, DefaultKernel};
use crate::sys::sync::Mutex;
use crate::timer::{self, Timer};

/// Status codes returned by the mutex calls.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IotError {
    /// The operation completed.
    Success = 0,
    /// The mutex could not be created.
    MutexInitError = -1,
    /// The mutex could not be acquired.
    MutexLockError = -2,
    /// The mutex could not be released.
    MutexUnlockError = -3,
    /// The mutex could not be destroyed.
    MutexDestroyError = -4,
}

impl From<Error> for IotError {
    fn from(err: Error) -> IotError {
        match err {
            Error::Init => IotError::MutexInitError,
            Error::Lock => IotError::MutexLockError,
            Error::Unlock => IotError::MutexUnlockError,
            Error::Destroy => IotError::MutexDestroyError,
        }
    }
}

impl From<Result<()>> for IotError {
    fn from(result: Result<()>) -> IotError {
        match result {
            Ok(()) => IotError::Success,
            Err(err) => err.into(),
        }
    }
}

/// The mutex record handed across the C boundary.
///
/// The C side treats this as opaque storage of [`iot_mutex_size`] bytes.
pub struct IotMutex {
    inner: Mutex<DefaultKernel>,
}

impl IotMutex {
    /// An uninitialized record.
    pub fn new() -> IotMutex {
        IotMutex {
            inner: Mutex::new(default_kernel()),
        }
    }

    /// The mutex inside the record.
    pub fn mutex(&self) -> &Mutex<DefaultKernel> {
        &self.inner
    }
}

impl Default for IotMutex {
    fn default() -> IotMutex {
        IotMutex::new()
    }
}

/// Number of bytes the C side must reserve for an [`IotMutex`].
#[cfg_attr(feature = "export-symbols", no_mangle)]
pub extern "C" fn iot_mutex_size() -> usize {
    core::mem::size_of::<IotMutex>()
}

/// Create the mutex in `mutex`.
///
/// The storage is treated as uninitialized and overwritten.  Initializing a record that still
/// holds a live mutex leaks that mutex.
///
/// # Safety
///
/// `mutex` must be null, or valid for writes of an [`IotMutex`] and not in use by another task.
#[cfg_attr(feature = "export-symbols", no_mangle)]
pub unsafe extern "C" fn iot_mutex_init(mutex: *mut IotMutex) -> IotError {
    if mutex.is_null() {
        return IotError::MutexInitError;
    }
    ptr::write(mutex, IotMutex::new());
    (*mutex).inner.init().into()
}

/// Lock the mutex, waiting in task context.
///
/// # Safety
///
/// `mutex` must be null, or point to a record written by [`iot_mutex_init`].
#[cfg_attr(feature = "export-symbols", no_mangle)]
pub unsafe extern "C" fn iot_mutex_lock(mutex: *mut IotMutex) -> IotError {
    match mutex.as_ref() {
        Some(mutex) => mutex.inner.lock().into(),
        None => IotError::MutexLockError,
    }
}

/// Lock the mutex only if it is free right now.
///
/// # Safety
///
/// `mutex` must be null, or point to a record written by [`iot_mutex_init`].
#[cfg_attr(feature = "export-symbols", no_mangle)]
pub unsafe extern "C" fn iot_mutex_trylock(mutex: *mut IotMutex) -> IotError {
    match mutex.as_ref() {
        Some(mutex) => mutex.inner.trylock().into(),
        None => IotError::MutexLockError,
    }
}

/// Unlock the mutex.
///
/// # Safety
///
/// `mutex` must be null, or point to a record written by [`iot_mutex_init`].
#[cfg_attr(feature = "export-symbols", no_mangle)]
pub unsafe extern "C" fn iot_mutex_unlock(mutex: *mut IotMutex) -> IotError {
    match mutex.as_ref() {
        Some(mutex) => mutex.inner.unlock().into(),
        None => IotError::MutexUnlockError,
    }
}

/// Destroy the mutex.  The record may be initialized again afterwards.
///
/// # Safety
///
/// `mutex` must be null, or point to a record written by [`iot_mutex_init`], with no other task
/// using it.
#[cfg_attr(feature = "export-symbols", no_mangle)]
pub unsafe extern "C" fn iot_mutex_destroy(mutex: *mut IotMutex) -> IotError {
    match mutex.as_mut() {
        Some(mutex) => mutex.inner.destroy().into(),
        None => IotError::MutexDestroyError,
    }
}

/// Put `timer` in the expired state.
///
/// # Safety
///
/// `timer` must be null or valid for writes.
#[cfg_attr(feature = "export-symbols", no_mangle)]
pub unsafe extern "C" fn init_timer(timer: *mut Timer) {
    if let Some(timer) = timer.as_mut() {
        timer.init();
    }
}

/// Start `timer` counting down `timeout` milliseconds.
///
/// # Safety
///
/// `timer` must be null or valid for writes.
#[cfg_attr(feature = "export-symbols", no_mangle)]
pub unsafe extern "C" fn countdown_ms(timer: *mut Timer, timeout: u32) {
    if let Some(timer) = timer.as_mut() {
        timer.start_ms(&default_kernel(), timeout);
    }
}

/// Start `timer` counting down `timeout` seconds.
///
/// # Safety
///
/// `timer` must be null or valid for writes.
#[cfg_attr(feature = "export-symbols", no_mangle)]
pub unsafe extern "C" fn countdown_sec(timer: *mut Timer, timeout: u32) {
    if let Some(timer) = timer.as_mut() {
        timer.start_sec(&default_kernel(), timeout);
    }
}

/// Milliseconds until `timer` expires, zero for a null timer.
///
/// # Safety
///
/// `timer` must be null or valid for reads.
#[cfg_attr(feature = "export-symbols", no_mangle)]
pub unsafe extern "C" fn left_ms(timer: *const Timer) -> u32 {
    match timer.as_ref() {
        Some(timer) => timer.remaining_ms(&default_kernel()),
        None => 0,
    }
}

/// Has `timer` expired?  A null timer counts as expired.
///
/// # Safety
///
/// `timer` must be null or valid for reads.
#[cfg_attr(feature = "export-symbols", no_mangle)]
pub unsafe extern "C" fn has_timer_expired(timer: *const Timer) -> bool {
    match timer.as_ref() {
        Some(timer) => timer.is_expired(&default_kernel()),
        None => true,
    }
}

/// Suspend the calling task for `milliseconds`.
#[cfg_attr(feature = "export-symbols", no_mangle)]
pub extern "C" fn delay(milliseconds: u32) {
    timer::delay(&default_kernel(), milliseconds);
}
