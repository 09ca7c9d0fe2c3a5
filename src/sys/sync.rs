// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Low-level synchronization primitives.
//!
//! The [`Mutex`] here is a direct, explicit lock/unlock interface to a kernel mutex, usable from
//! both task and interrupt context.  It does not protect any data by itself; the higher level
//! [`sync::Mutex`] wraps it to do that with Rust's borrowing rules.
//!
//! # Kernel objects
//!
//! The kernel object behind a `Mutex` is created by [`Mutex::init`] and given back by
//! [`Mutex::destroy`] (or when the `Mutex` is dropped).  Task context creation lets the kernel
//! allocate the object.  Interrupt context can not allocate, so there the object is built inside
//! statically allocated storage, see [`object`].
//!
//! [`sync::Mutex`]: crate::sync::Mutex
//! [`object`]: crate::object

pub mod mutex;

pub use mutex::Mutex;
