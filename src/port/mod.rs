// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Kernel ports.
//!
//! Each port implements [`Kernel`] for one RTOS.  The port is selected with Cargo features:
//!
//! - `freertos`: FreeRTOS on Cortex-M.  Build with `--no-default-features --features freertos`.
//! - `std` (default): a simulated kernel on host threads, for testing.
//!
//! [`DefaultKernel`] names the port the C surface uses: FreeRTOS when enabled, the host kernel
//! otherwise.
//!
//! [`Kernel`]: crate::Kernel

#[cfg(feature = "std")]
pub mod host;

#[cfg(feature = "freertos")]
pub mod freertos;

cfg_if::cfg_if! {
    if #[cfg(feature = "freertos")] {
        /// The kernel used by the C surface.
        pub type DefaultKernel = freertos::FreeRtos;

        /// Get the kernel used by the C surface.
        pub fn default_kernel() -> DefaultKernel {
            freertos::FreeRtos
        }
    } else if #[cfg(feature = "std")] {
        /// The kernel used by the C surface.
        pub type DefaultKernel = &'static host::HostKernel;

        /// Get the kernel used by the C surface.
        pub fn default_kernel() -> DefaultKernel {
            host::HostKernel::system()
        }
    }
}
