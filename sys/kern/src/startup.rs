// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel startup and the kernel state singleton.

use crate::device::{Devices, IrqControl, Timer, Uart};
use crate::proc::{Pcb, ProcTable};
use crate::shmem::ShmTable;
use crate::stack::StackArena;
use abi::{Pid, ProcStatus, UserContext, INITIAL_CPSR};

/// Timer period: 2^20 machine ticks, roughly one second on the target
/// board.
pub const TICK_PERIOD: u32 = 1 << 20;

/// Externally supplied address-space facts. On the target these come from
/// linker symbols; the simulator fabricates them from owned buffers.
#[derive(Copy, Clone, Debug)]
pub struct MemoryMap {
    /// Highest address of the process-stack arena.
    pub stack_top: usize,
    /// Highest address of the shared-memory arena.
    pub shmem_top: usize,
}

/// All mutable kernel state, in one place.
///
/// Exactly one of these exists per boot. A trap handler borrows it mutably
/// for its whole activation; handlers run with IRQs masked and never
/// suspend, so the borrow is never contended.
pub struct Kernel {
    pub procs: ProcTable,
    pub shm: ShmTable,
    pub stacks: StackArena,
}

impl Kernel {
    pub const fn new(map: MemoryMap) -> Self {
        Self {
            procs: ProcTable::new(),
            shm: ShmTable::new(map.shmem_top),
            stacks: StackArena::new(map.stack_top),
        }
    }
}

/// The reset handler, entered exactly once at boot with the context that the
/// trampoline will resume into user mode.
///
/// Brings up the tick interrupt, creates the bootstrap process around
/// `entry_point`, and installs it as the executing process. The caller (the
/// arch layer) enables CPU-level IRQs once this returns.
pub fn handle_reset<T: Timer, I: IrqControl, U: Uart>(
    kernel: &mut Kernel,
    dev: &mut Devices<T, I, U>,
    ctx: &mut UserContext,
    entry_point: usize,
) {
    dev.timer.configure(TICK_PERIOD);
    dev.irq.enable();
    ktrace!(&mut dev.uart, b'R');

    // Bootstrap process: pid 1, priority 0 so the console is the most
    // frequently scheduled thing in the system.
    let sp = kernel.stacks.stack_top(0);
    let p0 = &mut kernel.procs.slots[0];
    *p0 = Pcb::UNUSED;
    p0.pid = Pid::BOOTSTRAP;
    p0.status = ProcStatus::Ready;
    p0.ctx.cpsr = INITIAL_CPSR;
    p0.ctx.pc = entry_point;
    p0.ctx.sp = sp;

    *ctx = p0.ctx;
    p0.status = ProcStatus::Executing;
    kernel.procs.executing = 0;
    kernel.procs.population = 1;
}
