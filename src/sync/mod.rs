//! Kernel-internal synchronization primitives built on the scheduler's
//! block/unblock primitives (spec §4.7).

pub mod condvar;
pub mod mutex;
