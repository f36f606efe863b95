// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The process stack arena.
//!
//! A contiguous region of RAM is carved into equal-sized, full-descending
//! stacks, one per process-table slot: stack `i` occupies
//! `[top - (i+1)*STACK_SIZE, top - i*STACK_SIZE)`, with its logical top at
//! the high end. The binding of slot `i` to stack `i` is what lets fork copy
//! a live stack byte-for-byte and fix up nothing but the stack pointer.

use abi::STACK_SIZE;

/// Address arithmetic over the stack arena. Carries no runtime state beyond
/// the arena's top address.
#[derive(Copy, Clone, Debug)]
pub struct StackArena {
    top: usize,
}

impl StackArena {
    /// Creates the arena descriptor for the region ending (exclusive) at
    /// `top`.
    ///
    /// The region `[top - MAX_PROCS*STACK_SIZE, top)` must be ordinary RAM
    /// reserved for process stacks; the raw operations below write to it
    /// without further checks.
    pub const fn new(top: usize) -> Self {
        Self { top }
    }

    /// Logical top (initial stack pointer) of stack `slot`.
    pub fn stack_top(&self, slot: usize) -> usize {
        self.top - slot * STACK_SIZE
    }

    /// Lowest address belonging to stack `slot`.
    pub fn stack_base(&self, slot: usize) -> usize {
        self.stack_top(slot) - STACK_SIZE
    }

    /// Copies stack `from` over stack `to`, verbatim. Every offset relative
    /// to the stack top stays valid in the copy.
    ///
    /// # Safety
    ///
    /// Both slots must lie within the arena's backing region, and no
    /// reference may be live into either stack.
    pub unsafe fn duplicate(&self, from: usize, to: usize) {
        uassert!(from != to);
        // Safety: distinct slots occupy disjoint ranges by construction;
        // the caller vouches for the backing memory.
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.stack_base(from) as *const u8,
                self.stack_base(to) as *mut u8,
                STACK_SIZE,
            );
        }
    }

    /// Zero-fills stack `slot`.
    ///
    /// # Safety
    ///
    /// The slot must lie within the arena's backing region, and no reference
    /// may be live into it.
    pub unsafe fn zero(&self, slot: usize) {
        // Safety: per the caller's obligation above.
        unsafe {
            core::ptr::write_bytes(
                self.stack_base(slot) as *mut u8,
                0,
                STACK_SIZE,
            );
        }
    }
}
