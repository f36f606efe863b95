// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardware interrupt dispatch.

use crate::device::{Devices, IrqControl, Timer, Uart};
use crate::proc::{self, NextProc};
use crate::startup::Kernel;
use abi::UserContext;

/// Entry point for the IRQ trap.
///
/// A tick from the periodic timer is acknowledged (exactly once, before
/// end-of-interrupt) and drives the scheduler; any other source is completed
/// and otherwise ignored.
pub fn handle_irq<T: Timer, I: IrqControl, U: Uart>(
    kernel: &mut Kernel,
    dev: &mut Devices<T, I, U>,
    ctx: &mut UserContext,
) {
    let irq = dev.irq.ack_start();
    if irq == dev.timer_irq {
        ktrace!(&mut dev.uart, b'T');
        dev.timer.ack();
        if proc::timer_tick(&mut kernel.procs) == NextProc::Other {
            proc::reschedule(&mut kernel.procs, ctx);
        }
    }
    dev.irq.ack_end(irq);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::fake::Sim;
    use crate::device::IrqId;
    use abi::ProcStatus;

    #[test]
    fn timer_irq_is_acked_and_completed() {
        let mut sim = Sim::booted(0x8000);
        sim.tick();
        assert_eq!(sim.dev.timer.acks, 1);
        assert_eq!(sim.dev.irq.completed, vec![Sim::TIMER_IRQ]);
    }

    #[test]
    fn non_timer_sources_are_completed_untouched() {
        let mut sim = Sim::booted(0x8000);
        let stray = IrqId(55);
        sim.dev.irq.pending.push_back(stray);
        handle_irq(&mut sim.kernel, &mut sim.dev, &mut sim.ctx);
        assert_eq!(sim.dev.timer.acks, 0);
        assert_eq!(sim.dev.irq.completed, vec![stray]);
    }

    #[test]
    fn tick_preempts_an_expired_process() {
        let mut sim = Sim::booted(0x8000);
        // A second Ready process to switch to.
        let child = 1;
        sim.kernel.procs.slots[child].pid = abi::Pid::for_slot(child);
        sim.kernel.procs.slots[child].status = ProcStatus::Ready;
        sim.kernel.procs.slots[child].ctx.pc = 0x9000;
        sim.kernel.procs.population = 2;

        // The bootstrap process has priority 0: one tick and out.
        sim.tick();
        assert_eq!(sim.kernel.procs.executing, child);
        assert_eq!(sim.ctx.pc, 0x9000);
    }
}
