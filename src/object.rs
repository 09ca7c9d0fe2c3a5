// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Statically allocated kernel object storage
//!
//! Interrupt context can not allocate, so a mutex created from an ISR is built inside memory
//! that already exists: a [`StaticKernelObject`].  The storage is handed to the kernel's static
//! creation entry point, and belongs to the kernel object until that object is deleted.
//!
//! A `StaticKernelObject` can back one live kernel object at a time.  Before its storage is
//! handed out it must be claimed; a second claim while the first is live fails instead of letting
//! two kernel objects share the memory.  The claim is taken inside a critical section, so it is
//! safe to claim from both task and interrupt context.
//!
//! Each kernel port owns one shared `StaticKernelObject`, used when a mutex is initialized from
//! interrupt context.  A caller that needs more than one ISR created mutex can declare its own
//! storage and pass it to [`Mutex::init_static`].
//!
//! [`Mutex::init_static`]: crate::sys::sync::Mutex::init_static

use core::cell::{Cell, UnsafeCell};
use core::fmt;
use core::mem::MaybeUninit;

use critical_section::Mutex as CsMutex;

/// Storage for one statically allocated kernel object of type `S`.
pub struct StaticKernelObject<S> {
    claimed: CsMutex<Cell<bool>>,
    value: UnsafeCell<MaybeUninit<S>>,
}

// SAFETY: The storage is only reachable through `claim`, which hands out at most one reference at
// a time.
unsafe impl<S: Send> Sync for StaticKernelObject<S> {}

impl<S> StaticKernelObject<S> {
    /// Construct empty, unclaimed storage.
    pub const fn new() -> StaticKernelObject<S> {
        StaticKernelObject {
            claimed: CsMutex::new(Cell::new(false)),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Is the storage currently backing a kernel object?
    pub fn is_claimed(&self) -> bool {
        critical_section::with(|cs| self.claimed.borrow(cs).get())
    }

    /// Claim the storage.
    ///
    /// Returns `None` if it is already claimed.  The returned reference stays valid until
    /// [`release`] is called, after which it must no longer be used.
    ///
    /// [`release`]: Self::release
    pub(crate) fn claim(&'static self) -> Option<&'static mut MaybeUninit<S>> {
        let was_claimed = critical_section::with(|cs| self.claimed.borrow(cs).replace(true));
        if was_claimed {
            return None;
        }
        // SAFETY: The flag was clear, so no other reference to the storage exists, and none will
        // be handed out until it is released.
        Some(unsafe { &mut *self.value.get() })
    }

    /// Give the storage back, once the kernel object living in it has been deleted.
    pub(crate) fn release(&'static self) {
        critical_section::with(|cs| self.claimed.borrow(cs).set(false));
    }
}

impl<S> Default for StaticKernelObject<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for StaticKernelObject<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StaticKernelObject {{ claimed: {} }}", self.is_claimed())
    }
}
