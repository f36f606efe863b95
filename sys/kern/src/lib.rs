// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A preemptive multiprogramming kernel for a single-core 32-bit ARM
//! processor.
//!
//! The kernel multiplexes the CPU across a fixed table of processes using an
//! aging priority scheduler, and exposes a small supervisor-call surface:
//! console I/O, fork/exec/exit/kill, and named shared-memory regions used as
//! advisory locks by cooperating user programs.
//!
//! Code outside the `arch` module is portable: trap handlers are generic
//! over the device façade in [`device`], which lets the whole control plane
//! run on a development host against simulated devices and arenas. The
//! `arch` module supplies the real MMIO and trap plumbing for the target
//! board.
//!
//! # Design principles
//!
//! 1. Static shape. Every kernel structure is a fixed-capacity table; there
//!    is no allocator and nothing is ever freed.
//! 2. Trap handlers run to completion with interrupts masked. All mutable
//!    kernel state lives in one place and is only ever borrowed for the
//!    duration of a handler.
//! 3. A strong preference for safe code; the remaining `unsafe` is confined
//!    to the arena copies and the arch layer, each with a stated obligation.

#![cfg_attr(target_os = "none", no_std)]

/// Assertion that panics without dragging in formatting machinery.
macro_rules! uassert {
    ($cond:expr) => {
        if !$cond {
            panic!("Assertion failed!");
        }
    };
}

#[macro_use]
pub mod device;

pub mod arch;
pub mod err;
pub mod irq;
pub mod proc;
pub mod shmem;
pub mod stack;
pub mod startup;
pub mod syscalls;
pub mod umem;
