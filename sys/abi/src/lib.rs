// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel ABI definitions, shared between the kernel and user programs.
//!
//! Everything in here is part of the contract with the assembly trampolines
//! and the user-side syscall stubs: the saved-context layout, the supervisor
//! call numbers, and the memory-layout constants. Changing any of it changes
//! the ABI.

#![no_std]

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Number of slots in the process table. Slots are assigned in fork order and
/// never reused, so this bounds the total number of processes over the life
/// of a boot, not just the number alive at once.
pub const MAX_PROCS: usize = 32;

/// Number of slots in the shared-memory table. Slots are never freed.
pub const MAX_SHRM: usize = 16;

/// Size of one per-process stack, in bytes. The stack arena is carved into
/// `MAX_PROCS` of these, growing downward from the arena top.
pub const STACK_SIZE: usize = 4096;

/// Size of one named shared-memory region, in bytes.
pub const SHM_REGION_SIZE: usize = 1024;

/// Initial PSR for a user process: USR mode, IRQs enabled, FIQs masked.
pub const INITIAL_CPSR: usize = 0x50;

/// Size of the trap-inducing instruction in bytes (A32 encoding). Rewinding
/// the saved PC by this much makes the trap restartable.
pub const SVC_INSTRUCTION_BYTES: usize = 4;

/// Conventional exit status codes. The kernel does not interpret exit
/// status; these exist so user programs agree on the words.
pub const EXIT_SUCCESS: usize = 0;
pub const EXIT_FAILURE: usize = 1;

/// File descriptor conventionally attached to the console for reads.
pub const STDIN_FD: usize = 0;
/// File descriptor conventionally attached to the console for writes.
pub const STDOUT_FD: usize = 1;

/// Response code written to the return-value register when a supervisor call
/// cannot be satisfied: table exhaustion, or a buffer description the kernel
/// refuses to touch. Reads back as -1 in user code.
pub const FAILURE_CODE: usize = !0;

/// Names a process. Pids are dense positive integers handed out in fork
/// order; the bootstrap process is pid 1. A pid is never reassigned after
/// its process terminates.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
#[repr(transparent)]
pub struct Pid(pub u32);

impl Pid {
    /// The bootstrap process, created at reset.
    pub const BOOTSTRAP: Self = Self(1);

    /// Pid assigned to the process occupying table slot `slot`.
    pub const fn for_slot(slot: usize) -> Self {
        Self(slot as u32 + 1)
    }
}

/// Scheduling status of a process-table slot.
///
/// A zeroed slot reads as `Unused`, which is load-bearing: resetting a PCB is
/// a zero-fill.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ProcStatus {
    /// Slot has never held a process.
    #[default]
    Unused,
    /// Process can be scheduled.
    Ready,
    /// Process is the one currently on the CPU. At most one slot is in this
    /// state at any time the kernel is about to return to user mode.
    Executing,
    /// Process has exited or been killed. The slot keeps its index but is
    /// otherwise zeroed, and the scheduler never selects it.
    Terminated,
}

/// Saved user-mode register file, captured by the trap trampolines on every
/// exception entry and reloaded on exit.
///
/// The trampolines address this structure by field offset, so the layout is
/// frozen: the general-purpose registers r0..r12 in index order, then sp
/// (r13), lr (r14), the faulting/return pc, and the saved CPSR. Each field is
/// one machine word; on the 32-bit target that is exactly one register.
///
/// Whatever address the trampoline hands the kernel holds the context that
/// will execute when the trap returns -- the kernel mutates it in place to
/// set return values or to switch processes.
#[derive(
    Copy, Clone, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
#[repr(C)]
pub struct UserContext {
    pub gpr: [usize; 13],
    pub sp: usize,
    pub lr: usize,
    pub pc: usize,
    pub cpsr: usize,
}

impl UserContext {
    /// The all-zero context. What a freshly reset process-table slot holds.
    pub const ZERO: Self = Self {
        gpr: [0; 13],
        sp: 0,
        lr: 0,
        pc: 0,
        cpsr: 0,
    };

    /// Reads supervisor-call argument register 0.
    pub fn arg0(&self) -> usize {
        self.gpr[0]
    }
    /// Reads supervisor-call argument register 1.
    pub fn arg1(&self) -> usize {
        self.gpr[1]
    }
    /// Reads supervisor-call argument register 2.
    pub fn arg2(&self) -> usize {
        self.gpr[2]
    }

    /// Writes the supervisor-call return register.
    pub fn ret0(&mut self, x: usize) {
        self.gpr[0] = x;
    }
}

/// Enumeration of supervisor-call numbers. The number travels as the
/// immediate operand of the trap instruction; the trampoline decodes it and
/// passes it alongside the saved context.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SvcNum {
    Yield = 0x00,
    Write = 0x01,
    Read = 0x02,
    Fork = 0x03,
    Exit = 0x04,
    Exec = 0x05,
    Kill = 0x06,
    // 0x07 is reserved.
    ShmGet = 0x08,
    ShmDetach = 0x09,
}

/// Hand-written rather than derived: a derive would buy one match at the
/// cost of a proc-macro dependency, and the operation numbers are frozen
/// ABI anyway -- spelling them out here keeps the whole decode surface on
/// one screen.
impl core::convert::TryFrom<usize> for SvcNum {
    type Error = ();

    fn try_from(x: usize) -> Result<Self, Self::Error> {
        match x {
            0x00 => Ok(Self::Yield),
            0x01 => Ok(Self::Write),
            0x02 => Ok(Self::Read),
            0x03 => Ok(Self::Fork),
            0x04 => Ok(Self::Exit),
            0x05 => Ok(Self::Exec),
            0x06 => Ok(Self::Kill),
            0x08 => Ok(Self::ShmGet),
            0x09 => Ok(Self::ShmDetach),
            _ => Err(()),
        }
    }
}
