// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture-independent supervisor-call implementation.
//!
//! # Syscall implementations
//!
//! Syscalls are implemented by functions shaped like
//!
//! ```ignore
//! fn syscall(kernel: &mut Kernel, ctx: &mut UserContext)
//!     -> Result<NextProc, UserError>;
//! ```
//!
//! `ctx` is the live trapped context: arguments are read from its first
//! three general-purpose registers, the return value is written to the
//! first. On success a `NextProc` carries the scheduling consequence; on
//! failure a `UserError` carries the code to report. A common arm of the
//! dispatcher discharges both, so no individual syscall touches the
//! error-reporting or rescheduling machinery.

use core::convert::TryFrom;

use crate::device::{Devices, IrqControl, Timer, Uart};
use crate::err::UserError;
use crate::proc::{self, NextProc, Pcb};
use crate::shmem::ShmGet;
use crate::startup::Kernel;
use crate::umem::USlice;
use abi::{
    Pid, ProcStatus, SvcNum, UserContext, MAX_PROCS, SVC_INSTRUCTION_BYTES,
};

/// Entry point for the supervisor-call trap. `nr` is the operation number
/// the trampoline decoded from the trap instruction's immediate.
pub fn handle_svc<T: Timer, I: IrqControl, U: Uart>(
    kernel: &mut Kernel,
    dev: &mut Devices<T, I, U>,
    ctx: &mut UserContext,
    nr: usize,
) {
    let res = match SvcNum::try_from(nr) {
        Ok(SvcNum::Yield) => Ok(NextProc::Other),
        Ok(SvcNum::Write) => write(&mut dev.uart, ctx),
        Ok(SvcNum::Read) => read(&mut dev.uart, ctx),
        Ok(SvcNum::Fork) => fork(kernel, ctx),
        Ok(SvcNum::Exit) => Ok(exit(kernel)),
        Ok(SvcNum::Exec) => Ok(exec(kernel, &mut dev.uart, ctx)),
        Ok(SvcNum::Kill) => Ok(kill(kernel, &mut dev.uart, ctx)),
        Ok(SvcNum::ShmGet) => shmget(kernel, ctx),
        Ok(SvcNum::ShmDetach) => Ok(shmdt(kernel, ctx)),
        // Unknown operation numbers are a silent no-op.
        Err(()) => Ok(NextProc::Same),
    };

    let hint = match res {
        Ok(hint) => hint,
        Err(e) => {
            ctx.ret0(e.code);
            e.hint
        }
    };
    match hint {
        NextProc::Same => (),
        NextProc::Other => proc::reschedule(&mut kernel.procs, ctx),
    }
}

/// write(fd, buf, n): emits `n` bytes from `buf`. The descriptor is
/// accepted but ignored; every write goes to the console UART.
fn write<U: Uart>(
    uart: &mut U,
    ctx: &mut UserContext,
) -> Result<NextProc, UserError> {
    let _fd = ctx.arg0();
    let buf = USlice::<u8>::from_raw(ctx.arg1(), ctx.arg2())?;
    // Safety: no memory protection in this system; user pointers are taken
    // at face value. The shape has been checked and the kernel holds no
    // other reference into user memory here.
    let bytes = unsafe { buf.assume_readable() };
    for &b in bytes {
        uart.put(b);
    }
    ctx.ret0(bytes.len());
    Ok(NextProc::Same)
}

/// read(fd, buf, n): fills `buf` with `n` bytes from the console UART,
/// descriptor ignored. Blocks in kernel context until every byte has
/// arrived; nothing else runs in the meantime.
fn read<U: Uart>(
    uart: &mut U,
    ctx: &mut UserContext,
) -> Result<NextProc, UserError> {
    let _fd = ctx.arg0();
    let mut buf = USlice::<u8>::from_raw(ctx.arg1(), ctx.arg2())?;
    // Safety: as in `write`; additionally this is the only live reference
    // into the destination.
    let bytes = unsafe { buf.assume_writable() };
    for b in bytes.iter_mut() {
        *b = uart.get();
    }
    ctx.ret0(bytes.len());
    Ok(NextProc::Same)
}

/// fork(): duplicates the executing process into the next table slot.
///
/// The child gets a verbatim copy of the parent's PCB and stack. Copying
/// the stack whole keeps every frame-relative offset valid, so the only
/// register that needs rebasing is SP, moved to the same depth within the
/// child's stack. Registers holding *absolute* addresses of parent stack
/// locations are not rewritten; the contract is that both processes resume
/// from the syscall return, where SP is the only stack reference that
/// matters.
///
/// Parent sees the child's pid; child sees zero.
fn fork(
    kernel: &mut Kernel,
    ctx: &mut UserContext,
) -> Result<NextProc, UserError> {
    let p = kernel.procs.executing;
    let c = kernel.procs.population;
    if c == MAX_PROCS {
        return Err(UserError::failure());
    }

    // Save the live context first so the child inherits the resume point.
    kernel.procs.slots[p].ctx = *ctx;

    let mut child = kernel.procs.slots[p];
    child.pid = Pid::for_slot(c);
    child.status = ProcStatus::Ready;
    child.age = 0;

    let parent_top = kernel.stacks.stack_top(p);
    uassert!(ctx.sp <= parent_top);
    uassert!(ctx.sp > kernel.stacks.stack_base(p));
    let depth = parent_top - ctx.sp;

    // Safety: `c` has never been assigned, so slots `p` and `c` are
    // distinct and both stacks lie in the arena; no references are live
    // into either.
    unsafe { kernel.stacks.duplicate(p, c) };
    child.ctx.sp = kernel.stacks.stack_top(c) - depth;
    child.ctx.gpr[0] = 0;

    kernel.procs.slots[c] = child;
    kernel.procs.population = c + 1;

    ctx.ret0(child.pid.0 as usize);
    Ok(NextProc::Same)
}

/// exit(): terminates the executing process. The slot is zeroed and marked
/// Terminated; the switch-out path knows not to save a Terminated slot's
/// context, which is defunct from this point on.
fn exit(kernel: &mut Kernel) -> NextProc {
    let cur = kernel.procs.executing;
    kernel.procs.slots[cur] = Pcb::UNUSED;
    kernel.procs.slots[cur].status = ProcStatus::Terminated;
    NextProc::Other
}

/// exec(entry): restarts the executing process at `entry` on a pristine
/// stack. The process keeps its slot, pid, and priority.
fn exec<U: Uart>(
    kernel: &mut Kernel,
    uart: &mut U,
    ctx: &mut UserContext,
) -> NextProc {
    ktrace!(uart, b'E');
    let cur = kernel.procs.executing;
    // Safety: the executing slot's stack is arena-backed, and the process
    // is abandoning every frame on it.
    unsafe { kernel.stacks.zero(cur) };
    ctx.pc = ctx.arg0();
    ctx.sp = kernel.stacks.stack_top(cur);
    NextProc::Same
}

/// kill(pid): terminates the first live process with a matching pid.
/// Unknown pids are a silent no-op, which also makes kill idempotent.
/// A process killing itself is switched away from immediately.
fn kill<U: Uart>(
    kernel: &mut Kernel,
    uart: &mut U,
    ctx: &mut UserContext,
) -> NextProc {
    let pid = Pid(ctx.arg0() as u32);
    let Some(victim) = proc::lookup_pid(&kernel.procs, pid) else {
        return NextProc::Same;
    };
    ktrace!(uart, b'K');
    kernel.procs.slots[victim] = Pcb::UNUSED;
    kernel.procs.slots[victim].status = ProcStatus::Terminated;
    if victim == kernel.procs.executing {
        NextProc::Other
    } else {
        NextProc::Same
    }
}

/// shmget(id): attaches the named shared region, allocating it on first
/// use, and takes its advisory lock. Returns the region address.
///
/// If the lock is held, the saved PC is rewound over the trap instruction
/// and the caller is rescheduled: it will re-issue the identical call the
/// next time it runs, with its argument registers untouched in the saved
/// context. Spinning therefore costs the contender its time slice rather
/// than stalling the holder.
fn shmget(
    kernel: &mut Kernel,
    ctx: &mut UserContext,
) -> Result<NextProc, UserError> {
    match kernel.shm.get(ctx.arg0()) {
        ShmGet::Acquired(tos) => {
            ctx.ret0(tos);
            Ok(NextProc::Same)
        }
        ShmGet::Busy => {
            ctx.pc -= SVC_INSTRUCTION_BYTES;
            Ok(NextProc::Other)
        }
        ShmGet::Full => Err(UserError::failure()),
    }
}

/// shmdt(id): releases the advisory lock on the named region. No ownership
/// check; unknown ids are a no-op.
fn shmdt(kernel: &mut Kernel, ctx: &mut UserContext) -> NextProc {
    kernel.shm.detach(ctx.arg0());
    NextProc::Same
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::fake::Sim;
    use abi::{FAILURE_CODE, STACK_SIZE, STDOUT_FD};

    const ENTRY: usize = 0x8000;

    fn svc(sim: &mut Sim, nr: SvcNum, args: [usize; 3]) {
        sim.ctx.gpr[0] = args[0];
        sim.ctx.gpr[1] = args[1];
        sim.ctx.gpr[2] = args[2];
        sim.svc(nr as usize);
    }

    #[test]
    fn write_drains_user_buffer_to_uart() {
        let mut sim = Sim::booted(ENTRY);
        let msg = b"hello";
        svc(
            &mut sim,
            SvcNum::Write,
            [STDOUT_FD, msg.as_ptr() as usize, msg.len()],
        );
        assert_eq!(sim.ctx.gpr[0], msg.len());
        assert!(sim.dev.uart.tx.ends_with(msg));
    }

    #[test]
    fn read_blocks_bytes_into_user_buffer() {
        let mut sim = Sim::booted(ENTRY);
        sim.dev.uart.rx.extend(b"ok\r");
        let mut buf = [0u8; 3];
        svc(
            &mut sim,
            SvcNum::Read,
            [abi::STDIN_FD, buf.as_mut_ptr() as usize, buf.len()],
        );
        assert_eq!(sim.ctx.gpr[0], 3);
        assert_eq!(&buf, b"ok\r");
    }

    #[test]
    fn write_rejects_wrapping_buffer() {
        let mut sim = Sim::booted(ENTRY);
        svc(&mut sim, SvcNum::Write, [STDOUT_FD, usize::MAX, 2]);
        assert_eq!(sim.ctx.gpr[0], FAILURE_CODE);
    }

    #[test]
    fn fork_duplicates_process_and_stack() {
        let mut sim = Sim::booted(ENTRY);

        // Give the parent a live stack frame and a mid-stack SP.
        let depth = 64;
        let sp = sim.kernel.stacks.stack_top(0) - depth;
        sim.ctx.sp = sp;
        sim.write_stack(0, depth, b"frame");

        svc(&mut sim, SvcNum::Fork, [0, 0, 0]);

        assert_eq!(sim.kernel.procs.population, 2);
        let child = &sim.kernel.procs.slots[1];
        assert_eq!(child.pid, Pid(2));
        assert_eq!(child.status, ProcStatus::Ready);
        // Parent's return register holds the child pid; the child's saved
        // return register holds zero.
        assert_eq!(sim.ctx.gpr[0], 2);
        assert_eq!(child.ctx.gpr[0], 0);
        // SP sits at the same depth in the child's stack.
        assert_eq!(sim.kernel.stacks.stack_top(1) - child.ctx.sp, depth);
        // The stacks are byte-identical.
        assert_eq!(sim.stack_bytes(0), sim.stack_bytes(1));
        // Priority is inherited.
        assert_eq!(child.base_priority, sim.kernel.procs.slots[0].base_priority);
    }

    #[test]
    fn fork_child_inherits_resume_point() {
        let mut sim = Sim::booted(ENTRY);
        sim.ctx.pc = 0x8044;
        sim.ctx.sp = sim.kernel.stacks.stack_top(0) - 8;
        svc(&mut sim, SvcNum::Fork, [0, 0, 0]);
        assert_eq!(sim.kernel.procs.slots[1].ctx.pc, 0x8044);
    }

    #[test]
    fn fork_fails_cleanly_when_table_is_full() {
        let mut sim = Sim::booted(ENTRY);
        sim.ctx.sp = sim.kernel.stacks.stack_top(0) - 8;
        for _ in 1..MAX_PROCS {
            svc(&mut sim, SvcNum::Fork, [0, 0, 0]);
            assert_ne!(sim.ctx.gpr[0], FAILURE_CODE);
        }
        assert_eq!(sim.kernel.procs.population, MAX_PROCS);

        svc(&mut sim, SvcNum::Fork, [0, 0, 0]);
        assert_eq!(sim.ctx.gpr[0], FAILURE_CODE);
        assert_eq!(sim.kernel.procs.population, MAX_PROCS);
    }

    #[test]
    fn exited_process_is_never_scheduled_again() {
        let mut sim = Sim::booted(ENTRY);
        sim.ctx.sp = sim.kernel.stacks.stack_top(0) - 8;
        svc(&mut sim, SvcNum::Fork, [0, 0, 0]);

        // Switch to the child, then have it exit.
        sim.svc(SvcNum::Yield as usize);
        assert_eq!(sim.kernel.procs.executing, 1);
        sim.svc(SvcNum::Exit as usize);

        assert_eq!(sim.kernel.procs.slots[1].status, ProcStatus::Terminated);
        assert_eq!(sim.kernel.procs.executing, 0);
        // Many ticks later, the dead slot still never runs.
        for _ in 0..10 {
            sim.tick();
            assert_eq!(sim.kernel.procs.executing, 0);
        }
    }

    #[test]
    fn exec_resets_stack_and_jumps() {
        let mut sim = Sim::booted(ENTRY);
        let depth = 128;
        sim.ctx.sp = sim.kernel.stacks.stack_top(0) - depth;
        sim.write_stack(0, depth, b"old frames");
        let pid_before = sim.kernel.procs.slots[0].pid;

        svc(&mut sim, SvcNum::Exec, [0x9000, 0, 0]);

        assert_eq!(sim.ctx.pc, 0x9000);
        assert_eq!(sim.ctx.sp, sim.kernel.stacks.stack_top(0));
        assert!(sim.stack_bytes(0).iter().all(|&b| b == 0));
        // Identity and priority survive.
        assert_eq!(sim.kernel.procs.slots[0].pid, pid_before);
        assert_eq!(sim.kernel.procs.slots[0].base_priority, 0);
    }

    #[test]
    fn kill_by_pid_terminates_first_match() {
        let mut sim = Sim::booted(ENTRY);
        sim.ctx.sp = sim.kernel.stacks.stack_top(0) - 8;
        svc(&mut sim, SvcNum::Fork, [0, 0, 0]); // pid 2
        svc(&mut sim, SvcNum::Fork, [0, 0, 0]); // pid 3

        svc(&mut sim, SvcNum::Kill, [2, 0, 0]);
        assert_eq!(sim.kernel.procs.slots[1].status, ProcStatus::Terminated);
        // The killer keeps running.
        assert_eq!(sim.kernel.procs.executing, 0);
        // Scheduler scans skip the dead slot: one tick moves us to pid 3.
        sim.tick();
        assert_eq!(sim.kernel.procs.executing, 2);
    }

    #[test]
    fn kill_is_idempotent_and_ignores_unknown_pids() {
        let mut sim = Sim::booted(ENTRY);
        sim.ctx.sp = sim.kernel.stacks.stack_top(0) - 8;
        svc(&mut sim, SvcNum::Fork, [0, 0, 0]);

        svc(&mut sim, SvcNum::Kill, [2, 0, 0]);
        let after_first = sim.kernel.procs.slots[1];
        svc(&mut sim, SvcNum::Kill, [2, 0, 0]);
        let after_second = sim.kernel.procs.slots[1];
        assert_eq!(after_first.status, after_second.status);
        assert_eq!(after_first.pid, after_second.pid);

        // Unknown pid: nothing changes anywhere.
        svc(&mut sim, SvcNum::Kill, [99, 0, 0]);
        assert_eq!(sim.kernel.procs.population, 2);
        assert_eq!(sim.kernel.procs.executing, 0);
    }

    #[test]
    fn self_kill_switches_away_immediately() {
        let mut sim = Sim::booted(ENTRY);
        sim.ctx.sp = sim.kernel.stacks.stack_top(0) - 8;
        svc(&mut sim, SvcNum::Fork, [0, 0, 0]);
        sim.svc(SvcNum::Yield as usize);
        assert_eq!(sim.kernel.procs.executing, 1);

        // pid 2 kills itself; the bootstrap process must be back on the CPU
        // before we return to user mode.
        svc(&mut sim, SvcNum::Kill, [2, 0, 0]);
        assert_eq!(sim.kernel.procs.slots[1].status, ProcStatus::Terminated);
        assert_eq!(sim.kernel.procs.executing, 0);
    }

    #[test]
    fn shmget_contention_rewinds_and_reschedules() {
        let mut sim = Sim::booted(ENTRY);
        sim.ctx.sp = sim.kernel.stacks.stack_top(0) - 8;
        svc(&mut sim, SvcNum::Fork, [0, 0, 0]);

        // Bootstrap process takes the lock.
        svc(&mut sim, SvcNum::ShmGet, [7, 0, 0]);
        let region = sim.ctx.gpr[0];
        assert_ne!(region, FAILURE_CODE);

        // Switch to the child and contend. The child's PC is rewound over
        // the trap instruction and the CPU goes back to the holder.
        sim.svc(SvcNum::Yield as usize);
        assert_eq!(sim.kernel.procs.executing, 1);
        let pc_at_trap = 0x8100;
        sim.ctx.pc = pc_at_trap;
        svc(&mut sim, SvcNum::ShmGet, [7, 0, 0]);
        assert_eq!(sim.kernel.procs.executing, 0);
        let child = &sim.kernel.procs.slots[1];
        assert_eq!(child.ctx.pc, pc_at_trap - SVC_INSTRUCTION_BYTES);
        // The retry's argument register is intact in the saved context.
        assert_eq!(child.ctx.gpr[0], 7);

        // Holder releases; the child's retry acquires the same region.
        svc(&mut sim, SvcNum::ShmDetach, [7, 0, 0]);
        sim.svc(SvcNum::Yield as usize);
        assert_eq!(sim.kernel.procs.executing, 1);
        svc(&mut sim, SvcNum::ShmGet, [7, 0, 0]);
        assert_eq!(sim.ctx.gpr[0], region);
    }

    #[test]
    fn shmget_exhaustion_reports_failure() {
        let mut sim = Sim::booted(ENTRY);
        for id in 0..abi::MAX_SHRM {
            svc(&mut sim, SvcNum::ShmGet, [id + 100, 0, 0]);
            assert_ne!(sim.ctx.gpr[0], FAILURE_CODE);
        }
        svc(&mut sim, SvcNum::ShmGet, [999, 0, 0]);
        assert_eq!(sim.ctx.gpr[0], FAILURE_CODE);
    }

    #[test]
    fn unknown_opcode_is_a_silent_noop() {
        let mut sim = Sim::booted(ENTRY);
        sim.ctx.gpr[0] = 0x1234;
        sim.svc(0x07); // reserved
        sim.svc(0x7f);
        assert_eq!(sim.ctx.gpr[0], 0x1234);
        assert_eq!(sim.kernel.procs.executing, 0);
        assert_eq!(sim.kernel.procs.population, 1);
    }

    #[test]
    fn yield_with_no_peer_continues() {
        let mut sim = Sim::booted(ENTRY);
        sim.svc(SvcNum::Yield as usize);
        assert_eq!(sim.kernel.procs.executing, 0);
        assert_eq!(
            sim.kernel.procs.slots[0].status,
            ProcStatus::Executing
        );
    }

    #[test]
    fn stack_depth_bounds_are_enforced_on_fork() {
        let mut sim = Sim::booted(ENTRY);
        // An SP below the parent's stack base would make the depth math lie.
        sim.ctx.sp =
            sim.kernel.stacks.stack_top(0) - STACK_SIZE - 16;
        let r = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            svc(&mut sim, SvcNum::Fork, [0, 0, 0]);
        }));
        assert!(r.is_err());
    }
}
