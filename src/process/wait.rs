//! `wait`: reap one zombie child, blocking until one exists if none has
//! exited yet (spec §4.9).

use crate::{
    error::{KernelError, Result},
    ids::Pid,
    process,
};

/// Returns the reaped child's pid and exit status, or `Child` if the
/// calling task has neither a living child nor a zombie one to reap.
pub fn wait_for_any_child() -> Result<(Pid, i32)> {
    let pcb = process::current_pcb();
    loop {
        if let Some(zombie) = pcb.reap_any_zombie() {
            return Ok((zombie.pid, zombie.exit_status));
        }
        if !pcb.has_children_or_zombies() {
            return Err(KernelError::Child);
        }
        pcb.wait_signal.wait();
    }
}
