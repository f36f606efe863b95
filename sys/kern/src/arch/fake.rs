// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated platform for running the kernel on a development host.
//!
//! The device doubles record what the kernel does to them and feed it
//! scripted input; [`Sim`] wires them to a real `Kernel` whose arenas are
//! heap allocations, so even the paths that copy raw stack memory run
//! against real bytes.

use std::collections::VecDeque;

use crate::device::{Devices, IrqControl, IrqId, Timer, Uart};
use crate::irq;
use crate::startup::{self, Kernel, MemoryMap};
use crate::syscalls;
use abi::{UserContext, MAX_PROCS, MAX_SHRM, SHM_REGION_SIZE, STACK_SIZE};

/// Timer double; remembers its configuration and counts acks.
#[derive(Default, Debug)]
pub struct FakeTimer {
    pub period: Option<u32>,
    pub acks: usize,
}

impl Timer for FakeTimer {
    fn configure(&mut self, period: u32) {
        self.period = Some(period);
    }

    fn ack(&mut self) {
        self.acks += 1;
    }
}

/// Interrupt-controller double backed by a queue of pending sources.
#[derive(Default, Debug)]
pub struct FakeIrqControl {
    pub enabled: bool,
    pub pending: VecDeque<IrqId>,
    pub completed: Vec<IrqId>,
}

impl IrqControl for FakeIrqControl {
    fn enable(&mut self) {
        self.enabled = true;
    }

    fn ack_start(&mut self) -> IrqId {
        self.pending.pop_front().expect("no interrupt pending")
    }

    fn ack_end(&mut self, irq: IrqId) {
        self.completed.push(irq);
    }
}

/// UART double: everything `put` is captured in `tx`, `get` drains `rx`.
#[derive(Default, Debug)]
pub struct FakeUart {
    pub tx: Vec<u8>,
    pub rx: VecDeque<u8>,
}

impl Uart for FakeUart {
    fn put(&mut self, byte: u8) {
        self.tx.push(byte);
    }

    fn get(&mut self) -> u8 {
        // The real UART blocks; a test that reads must have scripted the
        // bytes first.
        self.rx.pop_front().expect("UART read with no byte scripted")
    }
}

/// Heap-backed stand-in for a linker-placed arena. Accessed through raw
/// pointers only, because the kernel writes to it through raw pointers and
/// mixing in ordinary borrows of the backing store would invalidate them.
struct ArenaBuf {
    ptr: *mut u8,
    len: usize,
    _backing: Box<[u8]>,
}

impl ArenaBuf {
    fn new(len: usize) -> Self {
        let mut backing = vec![0u8; len].into_boxed_slice();
        let ptr = backing.as_mut_ptr();
        Self {
            ptr,
            len,
            _backing: backing,
        }
    }

    /// One past the highest address, i.e. the arena top the kernel carves
    /// downward from.
    fn top(&self) -> usize {
        self.ptr as usize + self.len
    }

    fn contains(&self, addr: usize, len: usize) -> bool {
        addr >= self.ptr as usize && addr + len <= self.top()
    }

    fn read(&self, addr: usize, len: usize) -> Vec<u8> {
        assert!(self.contains(addr, len));
        // Safety: range-checked above, and the backing allocation is only
        // ever touched through `self.ptr`.
        unsafe { core::slice::from_raw_parts(addr as *const u8, len) }.to_vec()
    }

    fn write(&mut self, addr: usize, data: &[u8]) {
        assert!(self.contains(addr, data.len()));
        // Safety: as in `read`.
        unsafe {
            core::ptr::copy_nonoverlapping(
                data.as_ptr(),
                addr as *mut u8,
                data.len(),
            );
        }
    }
}

/// A complete simulated machine: kernel state, device doubles, the live
/// trapped context, and the two arenas.
pub struct Sim {
    pub kernel: Kernel,
    pub dev: Devices<FakeTimer, FakeIrqControl, FakeUart>,
    pub ctx: UserContext,
    stacks: ArenaBuf,
    _shmem: ArenaBuf,
}

impl Sim {
    /// Interrupt identity the fake controller reports for the tick timer.
    pub const TIMER_IRQ: IrqId = IrqId(36);

    pub fn new() -> Self {
        let stacks = ArenaBuf::new(MAX_PROCS * STACK_SIZE);
        let shmem = ArenaBuf::new(MAX_SHRM * SHM_REGION_SIZE);
        let map = MemoryMap {
            stack_top: stacks.top(),
            shmem_top: shmem.top(),
        };
        Self {
            kernel: Kernel::new(map),
            dev: Devices {
                timer: FakeTimer::default(),
                irq: FakeIrqControl::default(),
                uart: FakeUart::default(),
                timer_irq: Self::TIMER_IRQ,
            },
            ctx: UserContext::ZERO,
            stacks,
            _shmem: shmem,
        }
    }

    /// A machine that has already been through the reset handler with the
    /// bootstrap process entering at `entry`.
    pub fn booted(entry: usize) -> Self {
        let mut sim = Self::new();
        startup::handle_reset(
            &mut sim.kernel,
            &mut sim.dev,
            &mut sim.ctx,
            entry,
        );
        sim
    }

    /// Raises one timer interrupt and runs the IRQ trap.
    pub fn tick(&mut self) {
        self.dev.irq.pending.push_back(Self::TIMER_IRQ);
        irq::handle_irq(&mut self.kernel, &mut self.dev, &mut self.ctx);
    }

    /// Runs the supervisor-call trap with operation number `nr`. Arguments
    /// go in `self.ctx.gpr` beforehand, results come back the same way.
    pub fn svc(&mut self, nr: usize) {
        syscalls::handle_svc(&mut self.kernel, &mut self.dev, &mut self.ctx, nr);
    }

    /// Plants `data` in slot `slot`'s stack, starting `depth` bytes below
    /// its top.
    pub fn write_stack(&mut self, slot: usize, depth: usize, data: &[u8]) {
        let addr = self.kernel.stacks.stack_top(slot) - depth;
        self.stacks.write(addr, data);
    }

    /// Snapshot of slot `slot`'s entire stack.
    pub fn stack_bytes(&self, slot: usize) -> Vec<u8> {
        self.stacks
            .read(self.kernel.stacks.stack_base(slot), STACK_SIZE)
    }
}

impl Default for Sim {
    fn default() -> Self {
        Self::new()
    }
}
