use super::{NodeRef, Pending};
use crate::error::{PoolError, Result};
use crate::scheduler::ThreadPoolBuilder;

use windows_sys::Win32::System::Threading::{
    CloseThreadpool, CloseThreadpoolWork, CreateThreadpool, CreateThreadpoolWork,
    PTP_CALLBACK_INSTANCE, PTP_POOL, PTP_WORK, SetThreadpoolThreadMaximum,
    SetThreadpoolThreadMinimum, SubmitThreadpoolWork, TP_CALLBACK_ENVIRON_V3,
    TP_CALLBACK_PRIORITY_NORMAL,
};

use std::cell::Cell;
use std::ffi::c_void;
use std::io;
use std::mem;
use std::ptr;
use std::sync::Arc;

/// Returns `true` for a null handle.
///
/// Handle types are plain integers or raw pointers depending on the
/// bindings; both are pointer sized.
fn is_null<T: Copy>(handle: T) -> bool {
    debug_assert_eq!(mem::size_of::<T>(), mem::size_of::<usize>());
    // Safety: `T` is a pointer-sized handle.
    unsafe { mem::transmute_copy::<T, usize>(&handle) == 0 }
}

thread_local! {
    /// Set while a work callback runs on this thread.
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// Context handed to a work callback.
struct Work {
    node: NodeRef,
    pending: Arc<Pending>,
}

/// A private pool of the native Windows thread pool API.
///
/// Every scheduled node becomes one work object; the callback resumes the
/// node and releases the work object.
pub(crate) struct NativePool {
    pool: PTP_POOL,

    /// Binds work objects to `pool`. Boxed so its address stays stable.
    environment: Box<TP_CALLBACK_ENVIRON_V3>,

    pending: Arc<Pending>,
}

// Safety: the pool handle and the environment are only read after
// construction, and the thread pool API is thread safe.
unsafe impl Send for NativePool {}
unsafe impl Sync for NativePool {}

impl NativePool {
    pub(crate) fn start(builder: &ThreadPoolBuilder, pending: Arc<Pending>) -> Result<Self> {
        // Safety: the reserved parameter must be null.
        let pool = unsafe { CreateThreadpool(ptr::null()) };
        if is_null(pool) {
            return Err(PoolError::NativePool(io::Error::last_os_error()));
        }

        let threads = u32::try_from(builder.worker_threads).unwrap_or(u32::MAX);

        // Safety: `pool` is a live pool handle.
        unsafe { SetThreadpoolThreadMaximum(pool, threads) };
        if unsafe { SetThreadpoolThreadMinimum(pool, threads) } == 0 {
            let error = io::Error::last_os_error();
            unsafe { CloseThreadpool(pool) };
            return Err(PoolError::NativePool(error));
        }

        // Equivalent of `InitializeThreadpoolEnvironment` followed by
        // `SetThreadpoolCallbackPool`, which are inline functions.
        // Safety: the environment is plain data; all-zero is a valid start.
        let mut environment: Box<TP_CALLBACK_ENVIRON_V3> = Box::new(unsafe { mem::zeroed() });
        environment.Version = 3;
        environment.Pool = pool;
        environment.CallbackPriority = TP_CALLBACK_PRIORITY_NORMAL;
        environment.Size = mem::size_of::<TP_CALLBACK_ENVIRON_V3>() as u32;

        Ok(Self {
            pool,
            environment,
            pending,
        })
    }

    pub(crate) fn submit(&self, node: NodeRef) {
        let context = Box::into_raw(Box::new(Work {
            node,
            pending: self.pending.clone(),
        }));

        // Safety: the environment outlives every work object, see `shutdown`.
        let work = unsafe {
            CreateThreadpoolWork(
                Some(trampoline),
                context as *mut c_void,
                &*self.environment,
            )
        };

        if is_null(work) {
            tracing::error!(
                error = %io::Error::last_os_error(),
                "failed to create thread pool work, resuming inline"
            );

            // Safety: the callback will never run; the context is ours again.
            let context = unsafe { Box::from_raw(context) };
            context.node.run(&context.pending);
            return;
        }

        // Safety: `work` was just created.
        unsafe { SubmitThreadpoolWork(work) };
    }

    /// Waits for every submitted node, then releases the native pool.
    pub(crate) fn shutdown(&mut self) {
        // Dropped from a callback: that callback is still counted.
        let allowance = usize::from(IN_CALLBACK.with(Cell::get));
        self.pending.wait_idle(allowance);

        // Safety: no work object refers to the pool anymore.
        unsafe { CloseThreadpool(self.pool) };
    }
}

/// Work callback: resumes the node and releases the work object.
unsafe extern "system" fn trampoline(
    _instance: PTP_CALLBACK_INSTANCE,
    context: *mut c_void,
    work: PTP_WORK,
) {
    // Safety: `context` comes from `Box::into_raw` in `submit` and the
    // callback runs exactly once per work object.
    let context = unsafe { Box::from_raw(context as *mut Work) };
    let Work { node, pending } = *context;

    // Panics are contained by `run`; nothing unwinds across this frame.
    IN_CALLBACK.with(|flag| flag.set(true));
    node.run(&pending);
    IN_CALLBACK.with(|flag| flag.set(false));

    // Safety: the work object is not used after this call.
    unsafe { CloseThreadpoolWork(work) };
}
