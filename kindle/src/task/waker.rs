use super::detached::Detached;

use std::mem;
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Vtable of wakers backed by an `Arc<Detached>`.
///
/// Waking resumes the detached computation on the waking thread.
static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw);

/// Creates a [`Waker`] that resumes `detached` when woken.
///
/// The pointer stored inside the `RawWaker` comes from `Arc::into_raw` and
/// owns one strong reference.
pub(crate) fn make_waker(detached: Arc<Detached>) -> Waker {
    // Safety: the vtable functions below follow `Arc` reference counting.
    unsafe { Waker::from_raw(RawWaker::new(Arc::into_raw(detached) as *const (), &VTABLE)) }
}

fn clone_raw(ptr: *const ()) -> RawWaker {
    let arc = unsafe { Arc::from_raw(ptr as *const Detached) };
    let cloned = arc.clone();
    mem::forget(arc);

    RawWaker::new(Arc::into_raw(cloned) as *const (), &VTABLE)
}

fn wake_raw(ptr: *const ()) {
    let arc = unsafe { Arc::from_raw(ptr as *const Detached) };
    arc.wake();
}

fn wake_by_ref_raw(ptr: *const ()) {
    let arc = unsafe { Arc::from_raw(ptr as *const Detached) };
    arc.clone().wake();
    mem::forget(arc);
}

fn drop_raw(ptr: *const ()) {
    unsafe { drop(Arc::from_raw(ptr as *const Detached)) };
}
