//! FIFO kernel mutex (spec §4.7 "mutex_lock/mutex_unlock", newest revision
//! per `DESIGN.md`'s Open Question resolution: a single `locked` flag plus
//! a strict FIFO wait queue, no reader/writer distinction).

use alloc::collections::VecDeque;
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

use spin::Mutex as SpinMutex;

use crate::{ids::Tid, sched};

pub struct KMutex<T> {
    locked: AtomicBool,
    waiters: SpinMutex<VecDeque<Tid>>,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for KMutex<T> {}
unsafe impl<T: Send> Send for KMutex<T> {}

impl<T> KMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            waiters: SpinMutex::new(VecDeque::new()),
            data: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> KMutexGuard<'_, T> {
        let _guard = sched::quick_lock();
        if !self.locked.swap(true, Ordering::Acquire) {
            return KMutexGuard { mutex: self };
        }
        // Someone else holds it: queue up and block. `unlock` hands
        // ownership to the head of `waiters` directly and leaves `locked`
        // set while doing so, so once we're woken we already own the
        // mutex — retrying the swap here would see `locked` still true
        // (nobody cleared it) and re-enqueue us forever.
        self.waiters.lock().push_back(sched::current_tid());
        sched::block_current();
        KMutexGuard { mutex: self }
    }

    fn unlock(&self) {
        let _guard = sched::quick_lock();
        let next_owner = self.waiters.lock().pop_front();
        match next_owner {
            Some(tid) => {
                // Ownership passes directly to `tid` without clearing
                // `locked`, preserving FIFO order against a third thread
                // that races into `lock()` right now: it sees `locked`
                // still set and queues up behind the thread we just woke
                // instead of stealing the lock ahead of it.
                sched::make_runnable(tid);
            }
            None => {
                self.locked.store(false, Ordering::Release);
            }
        }
    }
}

pub struct KMutexGuard<'a, T> {
    mutex: &'a KMutex<T>,
}

impl<T> Deref for KMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for KMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for KMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
