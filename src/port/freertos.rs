// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! FreeRTOS port.
//!
//! Binds the [`Kernel`] trait to the FreeRTOS C API on Cortex-M.  The application links the
//! FreeRTOS kernel, built with `configSUPPORT_STATIC_ALLOCATION` and
//! `configSUPPORT_DYNAMIC_ALLOCATION` enabled, a 32-bit `TickType_t`, and `configTICK_RATE_HZ`
//! matching `CONFIG_TICK_RATE_HZ`.
//!
//! The kernel object behind a mutex is a binary semaphore, not a FreeRTOS mutex.  FreeRTOS
//! mutexes record the holding task, and assert when they are given from an interrupt while a task
//! holds them, so a lock taken by a task could never be released by a handler.  The price is that
//! there is no priority inheritance.
//!
//! Many of the FreeRTOS semaphore calls are C macros (`xSemaphoreCreateBinary`, `xSemaphoreTake`,
//! ...), which do not exist as symbols.  The [`raw`] module declares the queue functions those
//! macros expand to.
//!
//! Interrupt context is detected from the active exception number (the IPSR/VECTACTIVE field):
//! thread mode means task context, anything else is a handler.

use core::ffi::c_void;
use core::fmt;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

use cortex_m::peripheral::scb::VectActive;
use cortex_m::peripheral::SCB;

use crate::kconfig;
use crate::kernel::{ContextProvider, ExecContext, Kernel};
use crate::object::StaticKernelObject;
use crate::time::{Tick, Timeout};

pub mod raw {
    //! Direct declarations of the FreeRTOS entry points used by this port.
    //!
    //! All of these are unsafe, and follow the FreeRTOS naming.

    #![allow(non_camel_case_types)]
    #![allow(non_snake_case)]
    #![allow(non_upper_case_globals)]
    #![allow(missing_docs)]

    use core::ffi::c_void;

    use super::StaticSemaphore;

    pub type BaseType_t = i32;
    pub type UBaseType_t = u32;
    pub type TickType_t = u32;
    pub type QueueHandle_t = *mut c_void;

    pub const pdTRUE: BaseType_t = 1;
    pub const pdFALSE: BaseType_t = 0;
    pub const queueQUEUE_TYPE_BINARY_SEMAPHORE: u8 = 3;
    pub const semBINARY_SEMAPHORE_QUEUE_LENGTH: UBaseType_t = 1;
    pub const semSEMAPHORE_QUEUE_ITEM_LENGTH: UBaseType_t = 0;
    pub const queueSEND_TO_BACK: BaseType_t = 0;
    pub const semGIVE_BLOCK_TIME: TickType_t = 0;

    extern "C" {
        pub fn xTaskGetTickCount() -> TickType_t;
        pub fn xTaskGetTickCountFromISR() -> TickType_t;
        pub fn vTaskDelay(xTicksToDelay: TickType_t);

        pub fn xQueueGenericCreate(
            uxQueueLength: UBaseType_t,
            uxItemSize: UBaseType_t,
            ucQueueType: u8,
        ) -> QueueHandle_t;
        pub fn xQueueGenericCreateStatic(
            uxQueueLength: UBaseType_t,
            uxItemSize: UBaseType_t,
            pucQueueStorage: *mut u8,
            pxStaticQueue: *mut StaticSemaphore,
            ucQueueType: u8,
        ) -> QueueHandle_t;
        pub fn xQueueSemaphoreTake(xQueue: QueueHandle_t, xTicksToWait: TickType_t) -> BaseType_t;
        pub fn xQueueReceiveFromISR(
            xQueue: QueueHandle_t,
            pvBuffer: *mut c_void,
            pxHigherPriorityTaskWoken: *mut BaseType_t,
        ) -> BaseType_t;
        pub fn xQueueGenericSend(
            xQueue: QueueHandle_t,
            pvItemToQueue: *const c_void,
            xTicksToWait: TickType_t,
            xCopyPosition: BaseType_t,
        ) -> BaseType_t;
        pub fn xQueueGiveFromISR(
            xQueue: QueueHandle_t,
            pxHigherPriorityTaskWoken: *mut BaseType_t,
        ) -> BaseType_t;
        pub fn vQueueDelete(xQueue: QueueHandle_t);
    }
}

/// Opaque storage matching FreeRTOS's `StaticSemaphore_t`.
///
/// The size is set by `CONFIG_STATIC_SEMAPHORE_SIZE`, and must be at least
/// `sizeof(StaticSemaphore_t)` for the FreeRTOS build being linked.
#[repr(C, align(8))]
pub struct StaticSemaphore {
    _opaque: [u8; kconfig::CONFIG_STATIC_SEMAPHORE_SIZE],
}

/// An owned FreeRTOS `SemaphoreHandle_t`.
pub struct SemaphoreHandle(NonNull<c_void>);

// SAFETY: FreeRTOS semaphores may be used from any task, and (through the FromISR calls) from
// interrupt handlers.
unsafe impl Send for SemaphoreHandle {}
unsafe impl Sync for SemaphoreHandle {}

impl SemaphoreHandle {
    fn raw(&self) -> raw::QueueHandle_t {
        self.0.as_ptr()
    }
}

impl fmt::Debug for SemaphoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SemaphoreHandle {:?}", self.0)
    }
}

static SHARED_STORAGE: StaticKernelObject<StaticSemaphore> = StaticKernelObject::new();

/// The FreeRTOS kernel.
#[derive(Clone, Copy, Debug, Default)]
pub struct FreeRtos;

/// Request a context switch on interrupt exit, if a FromISR call woke a higher priority task.
///
/// This is `portYIELD_FROM_ISR` on Cortex-M: pend the PendSV exception.
fn yield_from_isr(woken: raw::BaseType_t) {
    if woken != raw::pdFALSE {
        SCB::set_pendsv();
    }
}

impl FreeRtos {
    /// A binary semaphore starts out taken.  Give it once so the first lock succeeds.
    ///
    /// Giving from an interrupt is fine here: the semaphore is not shared yet.
    fn make_available(&self, handle: SemaphoreHandle) -> Option<SemaphoreHandle> {
        let given = match self.current_context() {
            ExecContext::Task => self.mutex_give(&handle),
            ExecContext::Interrupt => self.mutex_give_from_isr(&handle),
        };
        if given {
            Some(handle)
        } else {
            self.mutex_delete(handle);
            None
        }
    }
}

impl ContextProvider for FreeRtos {
    fn current_context(&self) -> ExecContext {
        match SCB::vect_active() {
            VectActive::ThreadMode => ExecContext::Task,
            _ => ExecContext::Interrupt,
        }
    }
}

impl Kernel for FreeRtos {
    type Handle = SemaphoreHandle;
    type StaticStorage = StaticSemaphore;

    fn tick_count(&self) -> Tick {
        unsafe { raw::xTaskGetTickCount() }
    }

    fn tick_count_from_isr(&self) -> Tick {
        unsafe { raw::xTaskGetTickCountFromISR() }
    }

    fn delay(&self, ticks: Tick) {
        unsafe { raw::vTaskDelay(ticks) }
    }

    fn mutex_create(&self) -> Option<SemaphoreHandle> {
        let handle = unsafe {
            raw::xQueueGenericCreate(
                raw::semBINARY_SEMAPHORE_QUEUE_LENGTH,
                raw::semSEMAPHORE_QUEUE_ITEM_LENGTH,
                raw::queueQUEUE_TYPE_BINARY_SEMAPHORE,
            )
        };
        NonNull::new(handle).map(SemaphoreHandle).and_then(|h| self.make_available(h))
    }

    fn mutex_create_static(
        &self,
        storage: &'static mut MaybeUninit<StaticSemaphore>,
    ) -> Option<SemaphoreHandle> {
        let handle = unsafe {
            // SAFETY: The storage is exclusively ours until the handle is deleted.  FreeRTOS
            // initializes it.  A zero item size needs no queue storage.
            raw::xQueueGenericCreateStatic(
                raw::semBINARY_SEMAPHORE_QUEUE_LENGTH,
                raw::semSEMAPHORE_QUEUE_ITEM_LENGTH,
                ptr::null_mut(),
                storage.as_mut_ptr(),
                raw::queueQUEUE_TYPE_BINARY_SEMAPHORE,
            )
        };
        NonNull::new(handle).map(SemaphoreHandle).and_then(|h| self.make_available(h))
    }

    fn mutex_take(&self, handle: &SemaphoreHandle, timeout: Timeout) -> bool {
        unsafe { raw::xQueueSemaphoreTake(handle.raw(), timeout.ticks()) == raw::pdTRUE }
    }

    fn mutex_take_from_isr(&self, handle: &SemaphoreHandle) -> bool {
        let mut woken = raw::pdFALSE;
        let taken = unsafe {
            raw::xQueueReceiveFromISR(handle.raw(), ptr::null_mut(), &mut woken) == raw::pdTRUE
        };
        yield_from_isr(woken);
        taken
    }

    fn mutex_give(&self, handle: &SemaphoreHandle) -> bool {
        unsafe {
            raw::xQueueGenericSend(
                handle.raw(),
                ptr::null(),
                raw::semGIVE_BLOCK_TIME,
                raw::queueSEND_TO_BACK,
            ) == raw::pdTRUE
        }
    }

    fn mutex_give_from_isr(&self, handle: &SemaphoreHandle) -> bool {
        let mut woken = raw::pdFALSE;
        let given = unsafe { raw::xQueueGiveFromISR(handle.raw(), &mut woken) == raw::pdTRUE };
        yield_from_isr(woken);
        given
    }

    fn mutex_delete(&self, handle: SemaphoreHandle) {
        unsafe { raw::vQueueDelete(handle.raw()) }
    }

    fn shared_static_storage(&self) -> &'static StaticKernelObject<StaticSemaphore> {
        &SHARED_STORAGE
    }
}
