// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Logging from the platform layer
//!
//! All messages from this crate go through the [`log`] crate: `warn` for operations that fail
//! because of how they were called (an uninitialized mutex, a sleep from interrupt context), and
//! `debug` for expected failures such as a lock that was not available.
//!
//! Nothing is printed until a logger is installed.  An application that already installs its own
//! `log` handler needs nothing from here.  Otherwise [`set_logger`] installs a simple one for the
//! port:
//!
//! - `std`: each message becomes one line on stderr.
//! - otherwise: there is nowhere to send messages, so `set_logger` does nothing.
//!
//! The maximum level comes from `CONFIG_LOG_LEVEL` (`off`, `error`, `warn`, `info`, `debug` or
//! `trace`), defaulting to `info`.

use core::str::FromStr;

use log::{LevelFilter, Log, SetLoggerError};

use crate::kconfig;

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        mod impl_stderr;
        pub use impl_stderr::set_logger;
    } else {
        /// No logging is possible, provide an empty handler that does nothing.
        ///
        /// # Safety
        ///
        /// Always safe, it is unsafe to match the other backends.
        pub unsafe fn set_logger() -> Result<(), SetLoggerError> {
            Ok(())
        }
    }
}

/// The level filter configured by `CONFIG_LOG_LEVEL`.
pub fn configured_level() -> LevelFilter {
    LevelFilter::from_str(kconfig::CONFIG_LOG_LEVEL).unwrap_or(LevelFilter::Info)
}

// The log crate has different entry points based on whether or not the target has atomic
// pointers.  The safety has to do with initialization order, and as long as this is called before
// any other tasks run, it is safe.
cfg_if::cfg_if! {
    if #[cfg(target_has_atomic = "ptr")] {
        #[allow(dead_code)]
        unsafe fn set_logger_internal(logger: &'static dyn Log) -> Result<(), SetLoggerError> {
            log::set_logger(logger)?;
            log::set_max_level(configured_level());
            Ok(())
        }
    } else {
        #[allow(dead_code)]
        unsafe fn set_logger_internal(logger: &'static dyn Log) -> Result<(), SetLoggerError> {
            log::set_logger_racy(logger)?;
            log::set_max_level_racy(configured_level());
            Ok(())
        }
    }
}
