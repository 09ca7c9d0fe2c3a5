// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Logging to stderr on the host port.

use std::eprintln;

use log::{Log, Metadata, Record, SetLoggerError};

use crate::port::host::in_isr;

struct StderrLogger;

impl Log for StderrLogger {
    // Filtering is done through the global max level.
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let context = if in_isr() { " (isr)" } else { "" };
        eprintln!(
            "{}:{}{}: {}",
            record.level(),
            record.target(),
            context,
            record.args()
        );
    }

    fn flush(&self) {}
}

static STDERR_LOGGER: StderrLogger = StderrLogger;

/// Set the log handler to print messages on stderr.
///
/// # Safety
///
/// This is unsafe due to racy issues in the log framework on targets that do not support atomic
/// pointers.  As long as this is called ever by a single thread, it is safe to use.
pub unsafe fn set_logger() -> Result<(), SetLoggerError> {
    super::set_logger_internal(&STDERR_LOGGER)
}
