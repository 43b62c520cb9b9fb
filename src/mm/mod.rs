//! Memory management: physical frames, kernel-virtual allocation, page
//! tables, per-task regions, and the safe user/kernel copy built on top of
//! them (spec §4.1-§4.5).

pub mod copy;
pub mod fault;
pub mod frame_allocator;
pub mod kvm;
pub mod page_table;
pub mod region;
pub mod vmm;
