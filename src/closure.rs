//! Fixed-capacity, type-erased storage for job bodies.
//!
//! Submitting a job must not touch the heap, so the body is stored inline in
//! a fixed-size buffer with a pair of function pointers for invoke and drop.
//! A body too large (or over-aligned) for the buffer is rejected when the
//! constructor is monomorphized, i.e. at compile time.

use crate::context::JobContext;
use std::mem::{self, ManuallyDrop, MaybeUninit};
use std::ptr;

/// Inline storage available for a job body's captures, in bytes.
pub const JOB_CLOSURE_CAPACITY: usize = 128;

/// Maximum alignment of a stored body.
pub const JOB_CLOSURE_ALIGN: usize = 16;

#[repr(C, align(16))]
struct Storage([MaybeUninit<u8>; JOB_CLOSURE_CAPACITY]);

/// A job body: an `FnOnce(&JobContext)` held inline, no allocation.
pub struct JobClosure {
    storage: Storage,
    invoke: unsafe fn(*mut u8, &JobContext),
    drop: unsafe fn(*mut u8),
}

// SAFETY: construction requires the stored callable to be Send.
unsafe impl Send for JobClosure {}

impl JobClosure {
    /// Wraps `body` for deferred invocation.
    ///
    /// Fails to compile if `body`'s captures exceed
    /// [`JOB_CLOSURE_CAPACITY`] bytes or [`JOB_CLOSURE_ALIGN`] alignment.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        const {
            assert!(
                mem::size_of::<F>() <= JOB_CLOSURE_CAPACITY,
                "job body captures exceed the inline closure capacity"
            );
            assert!(
                mem::align_of::<F>() <= JOB_CLOSURE_ALIGN,
                "job body alignment exceeds the inline closure alignment"
            );
        }

        let mut storage = Storage([MaybeUninit::uninit(); JOB_CLOSURE_CAPACITY]);
        // SAFETY: size and alignment were checked at compile time above.
        unsafe { ptr::write(storage.0.as_mut_ptr().cast::<F>(), body) };

        JobClosure {
            storage,
            invoke: invoke_erased::<F>,
            drop: drop_erased::<F>,
        }
    }

    /// Calls the stored body, consuming it.
    pub(crate) fn invoke(self, ctx: &JobContext) {
        // The callable is read out of the buffer exactly once; ManuallyDrop
        // keeps the destructor from running a second time afterwards.
        let mut this = ManuallyDrop::new(self);
        // SAFETY: the buffer holds a live callable matching `invoke`'s
        // monomorphization, and it is never touched again.
        unsafe { (this.invoke)(this.storage.0.as_mut_ptr().cast(), ctx) };
    }
}

impl Drop for JobClosure {
    fn drop(&mut self) {
        // Runs only when the closure was never invoked.
        // SAFETY: the buffer still holds the live callable.
        unsafe { (self.drop)(self.storage.0.as_mut_ptr().cast()) };
    }
}

unsafe fn invoke_erased<F: FnOnce(&JobContext)>(slot: *mut u8, ctx: &JobContext) {
    // SAFETY: the caller guarantees `slot` holds a live `F` and will not
    // read it again.
    let body = unsafe { ptr::read(slot.cast::<F>()) };
    body(ctx);
}

unsafe fn drop_erased<F>(slot: *mut u8) {
    // SAFETY: the caller guarantees `slot` holds a live `F`.
    unsafe { ptr::drop_in_place(slot.cast::<F>()) };
}
