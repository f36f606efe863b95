// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device façade: everything the kernel wants from the platform, as a set of
//! small capability traits.
//!
//! The trap handlers are written against these traits rather than against
//! registers, so the same scheduler and lifecycle code runs on the target
//! (MMIO implementations in `arch::arm`) and on a development host
//! (queue-backed doubles in `arch::fake`).

/// Identity of an interrupt source, as reported by the controller. Opaque to
/// the kernel except for equality with the tick timer's identity.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IrqId(pub u32);

/// The periodic tick timer.
pub trait Timer {
    /// Programs the timer to raise an interrupt every `period` machine
    /// ticks. Idempotent.
    fn configure(&mut self, period: u32);

    /// Clears the timer's pending-interrupt state. Must be called exactly
    /// once per timer interrupt, before end-of-interrupt.
    fn ack(&mut self);
}

/// The interrupt controller.
pub trait IrqControl {
    /// Unmasks the interrupts the kernel uses and switches the controller
    /// on, both the CPU-facing interface and the distributor.
    fn enable(&mut self);

    /// Begins handling: reads the identity of the active interrupt.
    fn ack_start(&mut self) -> IrqId;

    /// Signals completion of handling for `irq`.
    fn ack_end(&mut self, irq: IrqId);
}

/// The console UART. Both operations block: `put` until the transmitter has
/// room, `get` until a byte arrives.
pub trait Uart {
    fn put(&mut self, byte: u8);
    fn get(&mut self) -> u8;
}

/// Bundle of everything the trap handlers need from the platform.
pub struct Devices<T, I, U> {
    pub timer: T,
    pub irq: I,
    pub uart: U,
    /// The identity the controller reports for the tick timer.
    pub timer_irq: IrqId,
}

/// Emit a one-byte event marker on the console UART.
///
/// These markers are diagnostics, not interface: anything observing them is
/// observing a debug build. Compiled out unless the `ktrace` feature is on.
#[cfg(feature = "ktrace")]
macro_rules! ktrace {
    ($uart:expr, $b:expr) => {
        $crate::device::Uart::put($uart, $b)
    };
}

#[cfg(not(feature = "ktrace"))]
macro_rules! ktrace {
    ($uart:expr, $b:expr) => {{
        let _ = &$uart;
        let _ = $b;
    }};
}
