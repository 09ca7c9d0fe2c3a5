// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! RTOS platform layer for protocol stacks
//!
//! This crate provides the two kernel services an IoT protocol stack needs from the platform
//! beneath it:
//!
//! - [`timer`]: countdown timers on the kernel's wrapping tick counter, and a task delay.
//! - [`sys::sync::Mutex`]: a mutex that may be used from both task and interrupt context, picking
//!   the blocking or interrupt safe kernel call for the caller.  [`sync::Mutex`] wraps it around
//!   the data it protects.
//!
//! The kernel itself sits behind the [`Kernel`] trait, implemented by the ports in [`port`].  The
//! [`ffi`] module exports the whole layer to C.

#![no_std]
#![deny(missing_docs)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod error;
#[cfg(any(feature = "std", feature = "freertos"))]
pub mod ffi;
pub mod kernel;
pub mod logging;
pub mod object;
pub mod port;
pub mod sync;
pub mod sys;
pub mod time;
pub mod timer;

pub use error::{Error, Result};
pub use kernel::{ContextProvider, ExecContext, Kernel};
pub use logging::set_logger;
pub use timer::Timer;

// Bring in the generated kconfig module
pub mod kconfig {
    //! Build configuration values.
    //!
    //! This module contains an auto-generated set of constants, from the defaults in `build.rs`,
    //! the file named by `IOT_PLATFORM_DOTCONFIG`, and `CONFIG_*` environment variables.
    //!
    //! **Note**: Unless you are viewing docs generated for a specific build, the values below are
    //! unlikely to directly correspond to those in a given build.

    #![allow(missing_docs)]

    include!(concat!(env!("OUT_DIR"), "/kconfig.rs"));
}
