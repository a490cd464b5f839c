//! Resolution of the opaque environment handle passed to the callbacks.
//!
//! Every `execute` pushes a [`Frame`] onto a thread-local stack under a fresh,
//! process-unique token and hands the token to the engine as its `EvmEnv`
//! pointer. Callbacks look the token up again. Nested executions (started from
//! inside `Environment::call`) push on top and pop on return, so the outer
//! registration is intact when control comes back. Because the stack is
//! per-thread, concurrent executions on different threads never observe each
//! other.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::callbacks::{Callback, CallbackFault};
use crate::environment::Environment;
use crate::ffi::EvmEnv;

// Token 0 would turn into a null handle.
static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static ACTIVE: RefCell<Vec<Entry>> = const { RefCell::new(Vec::new()) };
}

struct Entry {
    token: usize,
    frame: *const Frame<'static>,
}

/// Per-execution state: the environment plus everything the callbacks need to
/// keep alive or report until `execute` returns.
pub(crate) struct Frame<'a> {
    env: NonNull<dyn Environment + 'a>,
    busy: Cell<bool>,
    retained: RefCell<Vec<Box<[u8]>>>,
    faults: RefCell<Vec<CallbackFault>>,
    _env: PhantomData<&'a mut (dyn Environment + 'a)>,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(env: &'a mut (dyn Environment + 'a)) -> Self {
        Frame {
            env: NonNull::from(env),
            busy: Cell::new(false),
            retained: RefCell::new(Vec::new()),
            faults: RefCell::new(Vec::new()),
            _env: PhantomData,
        }
    }

    /// Exclusive access to the environment for one callback. `None` when the
    /// environment is already servicing a callback further down the stack.
    pub(crate) fn enter(&self) -> Option<EnvGuard<'_, 'a>> {
        if self.busy.replace(true) {
            return None;
        }
        Some(EnvGuard { frame: self })
    }

    /// Keep `bytes` alive until the execution finishes and return the
    /// pointer/length pair handed to the engine. Empty buffers become null.
    pub(crate) fn retain(&self, bytes: Vec<u8>) -> (*const u8, usize) {
        if bytes.is_empty() {
            return (ptr::null(), 0);
        }
        let boxed = bytes.into_boxed_slice();
        let out = (boxed.as_ptr(), boxed.len());
        self.retained.borrow_mut().push(boxed);
        out
    }

    pub(crate) fn record_fault(&self, callback: Callback, reason: String) {
        tracing::warn!(?callback, %reason, "callback fault converted to failure");
        self.faults
            .borrow_mut()
            .push(CallbackFault { callback, reason });
    }

    pub(crate) fn into_faults(self) -> Vec<CallbackFault> {
        self.faults.into_inner()
    }
}

pub(crate) struct EnvGuard<'f, 'a> {
    frame: &'f Frame<'a>,
}

impl<'a> EnvGuard<'_, 'a> {
    pub(crate) fn env(&mut self) -> &mut (dyn Environment + 'a) {
        // SAFETY: the busy flag grants this guard the only live reference,
        // and the frame never outlives the `&'a mut` it was built from.
        unsafe { &mut *self.frame.env.as_ptr() }
    }
}

impl Drop for EnvGuard<'_, '_> {
    fn drop(&mut self) {
        self.frame.busy.set(false);
    }
}

/// Scoped registration of a frame. Dropping it (normally or during unwind)
/// removes the entry.
pub(crate) struct Registration<'f> {
    token: usize,
    _frame: PhantomData<&'f ()>,
}

impl<'f> Registration<'f> {
    pub(crate) fn new(frame: &'f Frame<'_>) -> Self {
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        let frame = frame as *const Frame<'_> as *const Frame<'static>;
        ACTIVE.with(|stack| stack.borrow_mut().push(Entry { token, frame }));
        Registration {
            token,
            _frame: PhantomData,
        }
    }

    /// The opaque value the engine passes back to every callback.
    pub(crate) fn handle(&self) -> *mut EvmEnv {
        self.token as *mut EvmEnv
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let token = self.token;
        // Ignore failures during thread teardown; nothing is left to resolve.
        let _ = ACTIVE.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|e| e.token == token) {
                stack.remove(pos);
            }
        });
    }
}

/// Run `f` against the frame registered under `handle` on this thread.
/// Returns `None` for handles that are not (or no longer) registered here.
pub(crate) fn with_frame<R>(handle: *mut EvmEnv, f: impl FnOnce(&Frame<'_>) -> R) -> Option<R> {
    let token = handle as usize;
    let frame = ACTIVE
        .try_with(|stack| {
            stack
                .borrow()
                .iter()
                .rev()
                .find(|e| e.token == token)
                .map(|e| e.frame)
        })
        .ok()
        .flatten()?;
    // The stack borrow is released above, so `f` may register nested frames.
    // SAFETY: an entry only exists while its `Registration` lives, and the
    // registration borrows the frame.
    Some(f(unsafe { &*frame }))
}

#[cfg(test)]
pub(crate) fn depth() -> usize {
    ACTIVE.with(|stack| stack.borrow().len())
}
