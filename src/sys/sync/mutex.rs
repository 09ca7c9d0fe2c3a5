// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Context aware kernel mutex.
//!
//! Every operation asks the kernel port once which context it is running in, and then routes to
//! the blocking task entry point, or the non-blocking interrupt one:
//!
//! | operation   | task context                     | interrupt context         |
//! |-------------|----------------------------------|---------------------------|
//! | `init`      | kernel allocated object          | shared static storage     |
//! | `lock`      | take, waiting [`MUTEX_WAIT`]     | take from ISR             |
//! | `trylock`   | take, not waiting                | take from ISR             |
//! | `unlock`    | give                             | give from ISR             |
//! | `destroy`   | delete                           | delete                    |
//!
//! Interrupt context never waits: a lock that is not immediately available fails.
//!
//! [`MUTEX_WAIT`]: crate::time::MUTEX_WAIT

use core::fmt;
use core::mem;

use log::{debug, warn};

use crate::error::{to_result_void, Error, Result};
use crate::kernel::{ExecContext, Kernel};
use crate::object::StaticKernelObject;
use crate::time::{NoWait, Timeout, MUTEX_WAIT};

/// Where the kernel object of an initialized mutex lives.
enum Backing<S: 'static> {
    /// Allocated by the kernel.
    Kernel,
    /// Built inside claimed static storage, released again on destroy.
    Static(&'static StaticKernelObject<S>),
}

enum State<K: Kernel> {
    Uninitialized,
    Initialized {
        handle: K::Handle,
        backing: Backing<K::StaticStorage>,
    },
    Destroyed,
}

/// A kernel mutex usable from both task and interrupt context.
///
/// A `Mutex` starts out uninitialized.  [`init`] creates the kernel object, [`destroy`] gives it
/// back.  Locking or unlocking a mutex that is not initialized fails, and never touches the
/// kernel.  A destroyed mutex may be initialized again.
///
/// The kernel object is owned by this value alone.  Dropping an initialized `Mutex` destroys it.
///
/// Note that this is safe in the sense that memory safety is guaranteed.  Nothing stops one task
/// from unlocking a mutex another task locked, and recursive locking from the same task will
/// deadlock (or time out).
///
/// [`init`]: Mutex::init
/// [`destroy`]: Mutex::destroy
pub struct Mutex<K: Kernel> {
    kernel: K,
    state: State<K>,
}

impl<K: Kernel> Mutex<K> {
    /// Construct an uninitialized mutex on the given kernel.
    pub const fn new(kernel: K) -> Mutex<K> {
        Mutex {
            kernel,
            state: State::Uninitialized,
        }
    }

    /// The kernel this mutex lives on.
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Does this mutex currently own a kernel object?
    pub fn is_initialized(&self) -> bool {
        matches!(self.state, State::Initialized { .. })
    }

    /// Was the kernel object built in static storage?
    pub fn is_static(&self) -> bool {
        matches!(
            self.state,
            State::Initialized {
                backing: Backing::Static(_),
                ..
            }
        )
    }

    /// Create the kernel object.
    ///
    /// From task context the kernel allocates it.  From interrupt context it is built in the
    /// port's shared static storage, which can back a single mutex at a time: while that mutex is
    /// alive, a further `init` from interrupt context fails.
    ///
    /// Fails with [`Error::Init`] if the mutex is already initialized, the shared storage is in
    /// use, or the kernel can not create the object.
    pub fn init(&mut self) -> Result<()> {
        if self.is_initialized() {
            warn!("init of an already initialized mutex");
            return Err(Error::Init);
        }

        match self.kernel.current_context() {
            ExecContext::Task => {
                let handle = self.kernel.mutex_create().ok_or_else(|| {
                    warn!("kernel could not create mutex");
                    Error::Init
                })?;
                self.state = State::Initialized {
                    handle,
                    backing: Backing::Kernel,
                };
                Ok(())
            }
            ExecContext::Interrupt => {
                let storage = self.kernel.shared_static_storage();
                self.create_in(storage)
            }
        }
    }

    /// Create the kernel object inside caller supplied static storage.
    ///
    /// Works from any context.  The storage is claimed until the mutex is destroyed; giving
    /// storage that already backs another mutex fails with [`Error::Init`].
    pub fn init_static(
        &mut self,
        storage: &'static StaticKernelObject<K::StaticStorage>,
    ) -> Result<()> {
        if self.is_initialized() {
            warn!("init of an already initialized mutex");
            return Err(Error::Init);
        }
        self.create_in(storage)
    }

    fn create_in(&mut self, storage: &'static StaticKernelObject<K::StaticStorage>) -> Result<()> {
        let slot = storage.claim().ok_or_else(|| {
            warn!("static mutex storage already in use");
            Error::Init
        })?;

        match self.kernel.mutex_create_static(slot) {
            Some(handle) => {
                self.state = State::Initialized {
                    handle,
                    backing: Backing::Static(storage),
                };
                Ok(())
            }
            None => {
                storage.release();
                warn!("kernel could not create static mutex");
                Err(Error::Init)
            }
        }
    }

    fn handle(&self, err: Error) -> Result<&K::Handle> {
        match &self.state {
            State::Initialized { handle, .. } => Ok(handle),
            State::Uninitialized => {
                warn!("{:?}: mutex not initialized", err);
                Err(err)
            }
            State::Destroyed => {
                warn!("{:?}: mutex already destroyed", err);
                Err(err)
            }
        }
    }

    /// Acquire the mutex.
    ///
    /// From task context, waits for up to the configured [`MUTEX_WAIT`] (which may be forever).
    /// From interrupt context, fails immediately if the mutex is not available.
    pub fn lock(&self) -> Result<()> {
        self.acquire(MUTEX_WAIT)
    }

    /// Acquire the mutex only if it is available right now.
    ///
    /// Never waits, in either context.
    pub fn trylock(&self) -> Result<()> {
        self.acquire(NoWait.into())
    }

    fn acquire(&self, timeout: Timeout) -> Result<()> {
        let handle = self.handle(Error::Lock)?;
        let context = self.kernel.current_context();
        let taken = match context {
            ExecContext::Task => self.kernel.mutex_take(handle, timeout),
            ExecContext::Interrupt => self.kernel.mutex_take_from_isr(handle),
        };
        if !taken {
            debug!("mutex not acquired ({:?}, wait {} ticks)", context, timeout.ticks());
        }
        to_result_void(taken, Error::Lock)
    }

    /// Release the mutex.
    ///
    /// Uses the interrupt safe release from interrupt context.  Fails with [`Error::Unlock`] if
    /// the kernel refuses the release, for instance because the mutex is not held.
    pub fn unlock(&self) -> Result<()> {
        let handle = self.handle(Error::Unlock)?;
        let given = match self.kernel.current_context() {
            ExecContext::Task => self.kernel.mutex_give(handle),
            ExecContext::Interrupt => self.kernel.mutex_give_from_isr(handle),
        };
        if !given {
            debug!("mutex release refused by kernel");
        }
        to_result_void(given, Error::Unlock)
    }

    /// Give the kernel object back.
    ///
    /// Afterwards lock and unlock fail until the mutex is initialized again.  Destroying a mutex
    /// that is not initialized fails with [`Error::Destroy`].
    pub fn destroy(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, State::Destroyed) {
            State::Initialized { handle, backing } => {
                self.kernel.mutex_delete(handle);
                if let Backing::Static(storage) = backing {
                    storage.release();
                }
                Ok(())
            }
            previous => {
                warn!("destroy of a mutex that is not initialized");
                self.state = previous;
                Err(Error::Destroy)
            }
        }
    }
}

impl<K: Kernel> Drop for Mutex<K> {
    fn drop(&mut self) {
        if self.is_initialized() {
            let _ = self.destroy();
        }
    }
}

impl<K: Kernel> fmt::Debug for Mutex<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Uninitialized => "uninitialized",
            State::Initialized {
                backing: Backing::Kernel,
                ..
            } => "initialized",
            State::Initialized {
                backing: Backing::Static(_),
                ..
            } => "initialized (static)",
            State::Destroyed => "destroyed",
        };
        write!(f, "sys::Mutex {}", state)
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::port::host::{run_in_isr, HostKernel, HostSemaphore};

    fn initialized(kernel: &HostKernel) -> Mutex<HostKernel> {
        let mut mutex = Mutex::new(kernel.clone());
        mutex.init().expect("init");
        mutex
    }

    #[test]
    fn lock_unlock_from_task() {
        let kernel = HostKernel::with_manual_clock();
        let mutex = initialized(&kernel);
        assert!(!mutex.is_static());

        assert_eq!(mutex.lock(), Ok(()));
        assert_eq!(mutex.trylock(), Err(Error::Lock));
        assert_eq!(mutex.unlock(), Ok(()));
        assert_eq!(mutex.unlock(), Err(Error::Unlock));
        assert_eq!(mutex.trylock(), Ok(()));
    }

    #[test]
    fn operations_before_init_fail() {
        let kernel = HostKernel::with_manual_clock();
        let mut mutex = Mutex::new(kernel.clone());
        assert_eq!(mutex.lock(), Err(Error::Lock));
        assert_eq!(mutex.trylock(), Err(Error::Lock));
        assert_eq!(mutex.unlock(), Err(Error::Unlock));
        assert_eq!(mutex.destroy(), Err(Error::Destroy));
        assert_eq!(kernel.live_objects(), 0);
    }

    #[test]
    fn init_twice_is_rejected() {
        let kernel = HostKernel::with_manual_clock();
        let mut mutex = initialized(&kernel);
        assert_eq!(mutex.init(), Err(Error::Init));
        assert_eq!(kernel.live_objects(), 1);
    }

    #[test]
    fn kernel_create_failure() {
        let kernel = HostKernel::with_manual_clock();
        let mut mutex = Mutex::new(kernel.clone());
        kernel.fail_next_create();
        assert_eq!(mutex.init(), Err(Error::Init));
        assert!(!mutex.is_initialized());
        assert_eq!(mutex.init(), Ok(()));
    }

    #[test]
    fn destroy_then_reinit() {
        let kernel = HostKernel::with_manual_clock();
        let mut mutex = initialized(&kernel);
        mutex.lock().unwrap();

        assert_eq!(mutex.destroy(), Ok(()));
        assert_eq!(kernel.live_objects(), 0);
        assert_eq!(mutex.destroy(), Err(Error::Destroy));
        assert_eq!(mutex.lock(), Err(Error::Lock));
        assert_eq!(mutex.unlock(), Err(Error::Unlock));

        assert_eq!(mutex.init(), Ok(()));
        assert_eq!(mutex.lock(), Ok(()));
    }

    #[test]
    fn drop_deletes_kernel_object() {
        let kernel = HostKernel::with_manual_clock();
        {
            let _mutex = initialized(&kernel);
            assert_eq!(kernel.live_objects(), 1);
        }
        assert_eq!(kernel.live_objects(), 0);
    }

    #[test]
    fn isr_lock_does_not_wait() {
        let kernel = HostKernel::new();
        let mutex = initialized(&kernel);
        mutex.lock().unwrap();

        // Held by "a task": the ISR attempt must fail right away rather than wait forever.
        assert_eq!(run_in_isr(|| mutex.lock()), Err(Error::Lock));
        assert_eq!(run_in_isr(|| mutex.trylock()), Err(Error::Lock));

        mutex.unlock().unwrap();
        assert_eq!(run_in_isr(|| mutex.lock()), Ok(()));
    }

    #[test]
    fn isr_unlock_releases() {
        let kernel = HostKernel::with_manual_clock();
        let mutex = initialized(&kernel);
        run_in_isr(|| {
            assert_eq!(mutex.lock(), Ok(()));
            assert_eq!(mutex.unlock(), Ok(()));
            // A second release of a free mutex is refused, not turned into an acquire.
            assert_eq!(mutex.unlock(), Err(Error::Unlock));
        });
        assert_eq!(mutex.trylock(), Ok(()));
    }

    #[test]
    fn isr_releases_task_held_lock() {
        let kernel = HostKernel::new();
        let mutex = initialized(&kernel);
        let mut static_mutex = Mutex::new(kernel.clone());
        run_in_isr(|| static_mutex.init()).unwrap();

        for mutex in [&mutex, &static_mutex] {
            assert_eq!(mutex.lock(), Ok(()));
            assert_eq!(run_in_isr(|| mutex.unlock()), Ok(()));
            assert_eq!(mutex.trylock(), Ok(()));
            assert_eq!(mutex.unlock(), Ok(()));
        }
    }

    #[test]
    fn isr_init_uses_shared_storage() {
        let kernel = HostKernel::with_manual_clock();
        let shared = kernel.shared_static_storage();

        let mut first = Mutex::new(kernel.clone());
        let mut second = Mutex::new(kernel.clone());

        run_in_isr(|| {
            assert_eq!(first.init(), Ok(()));
            assert!(first.is_static());
            assert!(shared.is_claimed());
            assert_eq!(second.init(), Err(Error::Init));
        });

        first.destroy().unwrap();
        assert!(!shared.is_claimed());
        assert_eq!(run_in_isr(|| second.init()), Ok(()));
    }

    #[test]
    fn per_instance_static_storage() {
        static STORAGE: StaticKernelObject<HostSemaphore> = StaticKernelObject::new();

        let kernel = HostKernel::with_manual_clock();
        let mut mutex = Mutex::new(kernel.clone());
        let mut other = Mutex::new(kernel.clone());

        assert_eq!(mutex.init_static(&STORAGE), Ok(()));
        assert_eq!(other.init_static(&STORAGE), Err(Error::Init));
        assert_eq!(mutex.lock(), Ok(()));
        assert_eq!(mutex.unlock(), Ok(()));

        drop(mutex);
        assert!(!STORAGE.is_claimed());
    }

    #[test]
    fn static_create_failure_releases_storage() {
        let kernel = HostKernel::with_manual_clock();
        let mut mutex = Mutex::new(kernel.clone());
        kernel.fail_next_create();
        assert_eq!(run_in_isr(|| mutex.init()), Err(Error::Init));
        assert!(!kernel.shared_static_storage().is_claimed());
    }
}
