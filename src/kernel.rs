// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # The kernel port
//!
//! Everything this layer needs from the underlying RTOS is listed in the [`Kernel`] trait: the
//! tick counter, the task delay, and the mutex primitives.  Most of these come in two flavors,
//! one for normal task context, and one that is safe to call from an interrupt handler.  The
//! interrupt flavors never block.
//!
//! Which flavor to use is decided by asking the port for the current [`ExecContext`].  That query
//! is part of the [`ContextProvider`] capability, so that tests can run code "in an interrupt"
//! without any hardware.
//!
//! The methods here are thin, and map one to one to kernel entry points.  They are not meant to be
//! called directly by applications: the [`timer`] and [`sys::sync`] modules resolve the context and
//! select the right entry point.
//!
//! [`timer`]: crate::timer
//! [`sys::sync`]: crate::sys::sync

use crate::object::StaticKernelObject;
use crate::time::{Tick, Timeout};

/// Where the caller is currently executing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecContext {
    /// Normal, preemptible task context.  Blocking calls are allowed.
    Task,
    /// Inside an interrupt service routine.  Must not block, sleep, or allocate.
    Interrupt,
}

impl ExecContext {
    /// Is this interrupt context?
    pub const fn is_interrupt(self) -> bool {
        matches!(self, ExecContext::Interrupt)
    }
}

/// The "am I in an interrupt?" query.
///
/// Implementations must be cheap, and safe to call from any context, including from inside an
/// interrupt handler.
pub trait ContextProvider {
    /// Return the context the caller is running in.
    fn current_context(&self) -> ExecContext;
}

/// The kernel primitives consumed by this layer.
///
/// A `Kernel` value is a handle on the kernel, not the kernel itself.  It is cloned into each
/// mutex that uses it, so ports are expected to make it cheap to clone (typically a zero sized
/// type).
pub trait Kernel: ContextProvider + Clone {
    /// An owned kernel mutex object.
    ///
    /// Not `Clone`: a handle is owned by exactly one [`Mutex`], and given back to the
    /// kernel through [`delete`].
    ///
    /// [`Mutex`]: crate::sys::sync::Mutex
    /// [`delete`]: Self::mutex_delete
    type Handle;

    /// The memory a statically created mutex lives in.
    type StaticStorage: Send + 'static;

    /// Read the tick count.  Task context only.
    fn tick_count(&self) -> Tick;

    /// Read the tick count from an interrupt handler.
    fn tick_count_from_isr(&self) -> Tick;

    /// Suspend the calling task for (at least) the given number of ticks.  Task context only.
    fn delay(&self, ticks: Tick);

    /// Create a mutex with kernel allocated memory.  Returns `None` if the kernel could not
    /// create it.
    fn mutex_create(&self) -> Option<Self::Handle>;

    /// Create a mutex inside the given storage, without allocating.
    ///
    /// The storage stays in use until the returned handle is passed to [`delete`].
    ///
    /// [`delete`]: Self::mutex_delete
    fn mutex_create_static(
        &self,
        storage: &'static mut core::mem::MaybeUninit<Self::StaticStorage>,
    ) -> Option<Self::Handle>;

    /// Acquire the mutex, waiting up to `timeout`.  Task context only.  Returns whether the mutex
    /// was acquired.
    fn mutex_take(&self, handle: &Self::Handle, timeout: Timeout) -> bool;

    /// Try to acquire the mutex from an interrupt handler.  Never blocks.
    fn mutex_take_from_isr(&self, handle: &Self::Handle) -> bool;

    /// Release the mutex.  Task context only.
    fn mutex_give(&self, handle: &Self::Handle) -> bool;

    /// Release the mutex from an interrupt handler.  Never blocks.
    fn mutex_give_from_isr(&self, handle: &Self::Handle) -> bool;

    /// Give the mutex object back to the kernel.
    fn mutex_delete(&self, handle: Self::Handle);

    /// The port's shared storage for mutexes created in interrupt context.
    fn shared_static_storage(&self) -> &'static StaticKernelObject<Self::StaticStorage>;
}

// A shared reference to a kernel is itself a kernel.  This lets a process wide kernel be used as
// `&'static K`.

impl<K: ContextProvider + ?Sized> ContextProvider for &K {
    fn current_context(&self) -> ExecContext {
        (**self).current_context()
    }
}

impl<K: Kernel> Kernel for &K {
    type Handle = K::Handle;
    type StaticStorage = K::StaticStorage;

    fn tick_count(&self) -> Tick {
        (**self).tick_count()
    }

    fn tick_count_from_isr(&self) -> Tick {
        (**self).tick_count_from_isr()
    }

    fn delay(&self, ticks: Tick) {
        (**self).delay(ticks)
    }

    fn mutex_create(&self) -> Option<Self::Handle> {
        (**self).mutex_create()
    }

    fn mutex_create_static(
        &self,
        storage: &'static mut core::mem::MaybeUninit<Self::StaticStorage>,
    ) -> Option<Self::Handle> {
        (**self).mutex_create_static(storage)
    }

    fn mutex_take(&self, handle: &Self::Handle, timeout: Timeout) -> bool {
        (**self).mutex_take(handle, timeout)
    }

    fn mutex_take_from_isr(&self, handle: &Self::Handle) -> bool {
        (**self).mutex_take_from_isr(handle)
    }

    fn mutex_give(&self, handle: &Self::Handle) -> bool {
        (**self).mutex_give(handle)
    }

    fn mutex_give_from_isr(&self, handle: &Self::Handle) -> bool {
        (**self).mutex_give_from_isr(handle)
    }

    fn mutex_delete(&self, handle: Self::Handle) {
        (**self).mutex_delete(handle)
    }

    fn shared_static_storage(&self) -> &'static StaticKernelObject<Self::StaticStorage> {
        (**self).shared_static_storage()
    }
}
