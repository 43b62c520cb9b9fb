//! Condition variable (spec §4.7 "cond_wait/cond_signal").
//!
//! Single-waiter by design: every call site already serializes waiters by
//! a mutex or by structural argument (a child signals its own parent, a
//! committed line signals the one reader `READLINE_LOCK` admitted), so
//! broadcasting to several queued waiters is never needed — it is modelled
//! instead by serial per-waiter signaling at each site. There is no
//! associated external mutex parameter, unlike a textbook Mesa-style
//! condvar: callers are expected to do their own check-then-wait under the
//! scheduler's quick-lock (see `process::wait` for the canonical example),
//! the same way `sched`'s sleep queues work.

use spin::Mutex;

use crate::{ids::Tid, sched};

pub struct KCondvar {
    waiter: Mutex<Option<Tid>>,
}

impl KCondvar {
    pub const fn new() -> Self {
        Self {
            waiter: Mutex::new(None),
        }
    }

    /// Records the current thread as the waiter and blocks it. The caller
    /// must have already established, under a quick-lock held since the
    /// predicate check, that the wakeup condition still doesn't hold, and
    /// must not call this while another thread is already waiting (the
    /// single-waiter contract every call site in this kernel upholds).
    pub fn wait(&self) {
        let _guard = sched::quick_lock();
        debug_assert!(self.waiter.lock().is_none(), "KCondvar has only one waiter slot");
        *self.waiter.lock() = Some(sched::current_tid());
        sched::block_current();
    }

    pub fn signal(&self) {
        let _guard = sched::quick_lock();
        if let Some(tid) = self.waiter.lock().take() {
            sched::make_runnable(tid);
        }
    }
}

impl Default for KCondvar {
    fn default() -> Self {
        Self::new()
    }
}
