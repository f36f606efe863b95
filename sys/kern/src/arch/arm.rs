// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bare-metal support for the RealView PB-A8 (single Cortex-A8).
//!
//! # Board map
//!
//! | Device | Base | IRQ |
//! |---|---|---|
//! | SP804 dual timer, timer 1 | `0x1001_1000` | 36 |
//! | PL011 UART0 | `0x1000_9000` | - |
//! | GIC CPU interface | `0x1E00_0000` | - |
//! | GIC distributor | `0x1E00_1000` | - |
//!
//! # Trampoline contract
//!
//! The exception vectors and register save/restore sequences live in
//! assembly outside this crate. On every trap the trampoline stores the
//! interrupted user register file in [`abi::UserContext`] layout on the
//! kernel stack and calls one of the `kernel_handler_*` entry points below
//! with a pointer to it; whatever that memory holds when the handler
//! returns is reloaded into the CPU. The supervisor-call trampoline
//! additionally decodes the immediate operand of the trapping instruction
//! and passes it as the operation number.
//!
//! The linker script supplies the arena bounds and the console entry
//! point as the symbols imported at the bottom of this file.

use core::mem::MaybeUninit;

use crate::device::{Devices, IrqControl, IrqId, Timer, Uart};
use crate::irq;
use crate::startup::{self, Kernel, MemoryMap};
use crate::syscalls;
use abi::UserContext;

/// Writes a device register.
///
/// # Safety
///
/// `addr` must be a memory-mapped register of this board.
#[inline]
unsafe fn reg_write(addr: usize, value: u32) {
    // Safety: per this function's contract.
    unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
}

/// Reads a device register.
///
/// # Safety
///
/// `addr` must be a memory-mapped register of this board.
#[inline]
unsafe fn reg_read(addr: usize) -> u32 {
    // Safety: per this function's contract.
    unsafe { core::ptr::read_volatile(addr as *const u32) }
}

// --- SP804 dual timer, first timer of the block ---

const TIMER0_BASE: usize = 0x1001_1000;
const TIMER_LOAD: usize = TIMER0_BASE;
const TIMER_CTRL: usize = TIMER0_BASE + 0x08;
const TIMER_INTCLR: usize = TIMER0_BASE + 0x0C;

/// Interrupt the board routes from the SP804's first timer.
const TIMER0_IRQ: u32 = 36;

bitflags::bitflags! {
    /// SP804 control register fields.
    struct TimerCtrl: u32 {
        const SIZE_32 = 1 << 1;
        const INT_ENABLE = 1 << 5;
        const PERIODIC = 1 << 6;
        const ENABLE = 1 << 7;
    }
}

/// The kernel tick timer.
pub struct Sp804;

impl Timer for Sp804 {
    fn configure(&mut self, period: u32) {
        let ctrl = TimerCtrl::SIZE_32
            | TimerCtrl::PERIODIC
            | TimerCtrl::INT_ENABLE
            | TimerCtrl::ENABLE;
        // Safety: SP804 registers of this board.
        unsafe {
            reg_write(TIMER_LOAD, period);
            reg_write(TIMER_CTRL, ctrl.bits());
        }
    }

    fn ack(&mut self) {
        // Any write clears the interrupt.
        // Safety: SP804 register of this board.
        unsafe { reg_write(TIMER_INTCLR, 1) }
    }
}

// --- GIC, CPU interface + distributor ---

const GICC_BASE: usize = 0x1E00_0000;
const GICC_CTLR: usize = GICC_BASE;
const GICC_PMR: usize = GICC_BASE + 0x04;
const GICC_IAR: usize = GICC_BASE + 0x0C;
const GICC_EOIR: usize = GICC_BASE + 0x10;

const GICD_BASE: usize = 0x1E00_1000;
const GICD_CTLR: usize = GICD_BASE;
const GICD_ISENABLER1: usize = GICD_BASE + 0x104;

/// The interrupt controller.
pub struct Gic;

impl IrqControl for Gic {
    fn enable(&mut self) {
        // Safety: GIC registers of this board.
        unsafe {
            // Unmask every priority level at the CPU interface.
            reg_write(GICC_PMR, 0xF0);
            // Forward the timer interrupt (36 = bank 1, bit 4).
            let bit = 1 << (TIMER0_IRQ - 32);
            reg_write(GICD_ISENABLER1, reg_read(GICD_ISENABLER1) | bit);
            // Switch on interface and distributor.
            reg_write(GICC_CTLR, 1);
            reg_write(GICD_CTLR, 1);
        }
    }

    fn ack_start(&mut self) -> IrqId {
        // Safety: GIC register of this board.
        IrqId(unsafe { reg_read(GICC_IAR) })
    }

    fn ack_end(&mut self, irq: IrqId) {
        // Safety: GIC register of this board.
        unsafe { reg_write(GICC_EOIR, irq.0) }
    }
}

// --- PL011 UART ---

const UART0_BASE: usize = 0x1000_9000;
const UART_DR: usize = UART0_BASE;
const UART_FR: usize = UART0_BASE + 0x18;

bitflags::bitflags! {
    /// PL011 flag register fields.
    struct UartFr: u32 {
        const RXFE = 1 << 4;
        const TXFF = 1 << 5;
    }
}

/// The console UART.
pub struct Pl011;

impl Uart for Pl011 {
    fn put(&mut self, byte: u8) {
        // Safety: PL011 registers of this board.
        unsafe {
            while UartFr::from_bits_truncate(reg_read(UART_FR))
                .contains(UartFr::TXFF)
            {}
            reg_write(UART_DR, byte as u32);
        }
    }

    fn get(&mut self) -> u8 {
        // Safety: PL011 registers of this board.
        unsafe {
            while UartFr::from_bits_truncate(reg_read(UART_FR))
                .contains(UartFr::RXFE)
            {}
            reg_read(UART_DR) as u8
        }
    }
}

/// The platform bundle handed to the trap handlers. The device types are
/// stateless handles over fixed registers, so a fresh bundle per trap costs
/// nothing.
pub fn devices() -> Devices<Sp804, Gic, Pl011> {
    Devices {
        timer: Sp804,
        irq: Gic,
        uart: Pl011,
        timer_irq: IrqId(TIMER0_IRQ),
    }
}

/// Enables IRQs at the CPU level. The controller and devices must already
/// be configured.
pub fn enable_irqs() {
    // Safety: flipping the CPSR I bit has no memory effects.
    unsafe { core::arch::asm!("cpsie i") }
}

/// Parks the CPU with interrupts masked. The only way forward is reset.
pub fn halt() -> ! {
    loop {
        // Safety: masking interrupts and waiting have no memory effects.
        unsafe { core::arch::asm!("cpsid i", "wfi") }
    }
}

/// A kernel panic means some invariant is gone -- a dead context must never
/// reach the CPU, so park instead of unwinding.
#[panic_handler]
fn panic(_: &core::panic::PanicInfo<'_>) -> ! {
    halt()
}

/// Backing store for the kernel-state singleton, written once by the reset
/// handler.
static mut KERNEL: MaybeUninit<Kernel> = MaybeUninit::uninit();

/// Borrows the kernel-state singleton.
///
/// # Safety
///
/// Callable only from a trap handler, after the reset handler has
/// initialized the singleton. Handlers run with IRQs masked and never
/// nest, so at most one such borrow is live at a time.
unsafe fn kernel() -> &'static mut Kernel {
    // Safety: per this function's contract.
    unsafe { (*core::ptr::addr_of_mut!(KERNEL)).assume_init_mut() }
}

extern "C" {
    /// Highest address of the process-stack arena (linker-provided).
    static __stack_arena_top: u8;
    /// Highest address of the shared-memory arena (linker-provided).
    static __shmem_arena_top: u8;
    /// Entry point of the console program, the bootstrap process.
    fn main_console() -> !;
}

/// Reset trap. Called once at boot with the context the trampoline will
/// resume into user mode.
///
/// # Safety
///
/// `ctx` must point at the trampoline's live save area, and nothing else
/// may alias it for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn kernel_handler_rst(ctx: *mut UserContext) {
    // Safety: only the addresses of the linker symbols are taken, never
    // their contents.
    let map = unsafe {
        MemoryMap {
            stack_top: core::ptr::addr_of!(__stack_arena_top) as usize,
            shmem_top: core::ptr::addr_of!(__shmem_arena_top) as usize,
        }
    };
    // Safety: reset runs once, before any other handler can touch the
    // singleton.
    unsafe { (*core::ptr::addr_of_mut!(KERNEL)).write(Kernel::new(map)) };

    let mut dev = devices();
    // Safety: `ctx` per this function's contract; the singleton was
    // initialized on the previous line.
    unsafe {
        startup::handle_reset(
            kernel(),
            &mut dev,
            &mut *ctx,
            main_console as usize,
        );
    }
    enable_irqs();
}

/// Hardware interrupt trap.
///
/// # Safety
///
/// As for [`kernel_handler_rst`], and reset must have completed.
#[no_mangle]
pub unsafe extern "C" fn kernel_handler_irq(ctx: *mut UserContext) {
    let mut dev = devices();
    // Safety: per this function's contract.
    unsafe { irq::handle_irq(kernel(), &mut dev, &mut *ctx) }
}

/// Supervisor-call trap. `nr` is the immediate operand of the trapping
/// instruction, decoded by the trampoline.
///
/// # Safety
///
/// As for [`kernel_handler_rst`], and reset must have completed.
#[no_mangle]
pub unsafe extern "C" fn kernel_handler_svc(ctx: *mut UserContext, nr: u32) {
    let mut dev = devices();
    // Safety: per this function's contract.
    unsafe { syscalls::handle_svc(kernel(), &mut dev, &mut *ctx, nr as usize) }
}
