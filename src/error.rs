// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Platform errors
//!
//! This module contains an `Error` and `Result` type for the platform layer.  The kernel entry
//! points report success as a boolean status; each operation on a [`Mutex`] maps a failed status
//! (or a misuse, such as locking a destroyed mutex) to the error named after that operation.
//!
//! Errors are always returned to the caller of the failing operation.  Nothing in this layer
//! retries, and nothing panics on a kernel failure.
//!
//! [`Mutex`]: crate::sys::sync::Mutex

use core::fmt;

/// A platform error.
///
/// One variant per mutex operation.  The variant says which operation failed, not why; the
/// reason is logged at the point of failure.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// The mutex record is missing, already initialized, or the kernel could not create the
    /// underlying object.
    Init,
    /// The mutex record is missing or not initialized, or the kernel acquire failed or timed out.
    Lock,
    /// The mutex record is missing or not initialized, or the kernel release failed.
    Unlock,
    /// The mutex record is missing or not initialized.
    Destroy,
}

impl core::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            Error::Init => "mutex init",
            Error::Lock => "mutex lock",
            Error::Unlock => "mutex unlock",
            Error::Destroy => "mutex destroy",
        };
        write!(f, "platform error: {} failed", what)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Init => write!(f, "InitError"),
            Error::Lock => write!(f, "LockError"),
            Error::Unlock => write!(f, "UnlockError"),
            Error::Destroy => write!(f, "DestroyError"),
        }
    }
}

/// Wraps a value with a possible platform error.
pub type Result<T> = core::result::Result<T, Error>;

/// Map a kernel status into a Result.
///
/// `false` from the kernel becomes the given error.
#[inline(always)]
pub fn to_result_void(status: bool, err: Error) -> Result<()> {
    if status {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use std::string::ToString;

    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(to_result_void(true, Error::Lock), Ok(()));
        assert_eq!(to_result_void(false, Error::Unlock), Err(Error::Unlock));
    }

    #[test]
    fn display_names_operation() {
        assert_eq!(Error::Destroy.to_string(), "platform error: mutex destroy failed");
        assert_eq!(std::format!("{:?}", Error::Init), "InitError");
    }
}
