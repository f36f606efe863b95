// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Processes and the aging priority scheduler.
//!
//! # Scheduling policy
//!
//! Every process has a fixed `base_priority`: the number of timer ticks it
//! runs before yielding the CPU. On each tick the executing process's `age`
//! advances; when it reaches the base priority, the scheduler looks for the
//! next Ready slot in circular order and switches to it. A base priority of
//! zero therefore means "yield every tick" and makes a process the most
//! frequently scheduled one -- the console runs at zero so it stays
//! responsive.
//!
//! Dispatch resets `age`, so over time each Ready process receives a share
//! of ticks proportional to `base_priority + 1`.

use abi::{Pid, ProcStatus, UserContext, MAX_PROCS};

/// Per-process kernel record.
#[derive(Copy, Clone, Debug)]
pub struct Pcb {
    /// Identity. Zero only in slots that have never held a process or whose
    /// process has terminated.
    pub pid: Pid,
    /// Scheduling status.
    pub status: ProcStatus,
    /// Register file last saved for this process. While the process is
    /// Executing this is stale -- the live copy is the trampoline's save
    /// area.
    pub ctx: UserContext,
    /// Ticks this process runs per dispatch; lower means scheduled more
    /// often.
    pub base_priority: u32,
    /// Ticks run since the last dispatch. Reset to zero on dispatch.
    pub age: u32,
}

impl Pcb {
    /// A zeroed slot. Both slot reset (exit, kill) and slot birth (fork)
    /// start from this.
    pub const UNUSED: Self = Self {
        pid: Pid(0),
        status: ProcStatus::Unused,
        ctx: UserContext::ZERO,
        base_priority: 0,
        age: 0,
    };
}

/// The fixed-capacity process table, plus the scheduler bookkeeping that
/// travels with it.
pub struct ProcTable {
    /// Process slots. Slot `i` owns stack `i` of the stack arena; that
    /// correspondence is relied on by fork and exec.
    pub slots: [Pcb; MAX_PROCS],
    /// Index of the slot whose context is live on the CPU.
    pub executing: usize,
    /// Population count: one past the highest slot ever assigned. Grows
    /// monotonically; terminated slots keep their index and are never
    /// reused.
    pub population: usize,
}

impl ProcTable {
    pub const fn new() -> Self {
        Self {
            slots: [Pcb::UNUSED; MAX_PROCS],
            executing: 0,
            population: 0,
        }
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Return value for operations that can have scheduling implications. This
/// is marked `must_use` because forgetting to act on it after an operation
/// that requires a switch would be Bad.
#[derive(Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum NextProc {
    /// It's fine to keep running the current process.
    Same,
    /// We need to switch; the scheduler picks the slot.
    Other,
}

/// Finds the slot holding `pid` among the live processes, scanning assigned
/// slots in index order. First match wins.
pub fn lookup_pid(table: &ProcTable, pid: Pid) -> Option<usize> {
    (0..table.population).find(|&i| {
        table.slots[i].pid == pid
            && matches!(
                table.slots[i].status,
                ProcStatus::Ready | ProcStatus::Executing
            )
    })
}

/// Selects the slot to run next: the first Ready slot in circular order
/// after `executing`, or `executing` itself if nobody else is Ready and it
/// is still runnable. `None` means nothing in the table can run, which is
/// fatal to the caller.
pub fn select(table: &ProcTable) -> Option<usize> {
    uassert!(table.population > 0);
    let n = table.population;
    for k in 1..n {
        let i = (table.executing + k) % n;
        if table.slots[i].status == ProcStatus::Ready {
            return Some(i);
        }
    }
    match table.slots[table.executing].status {
        ProcStatus::Ready | ProcStatus::Executing => Some(table.executing),
        _ => None,
    }
}

/// The context switch: retires the executing slot and installs `next` into
/// the live trapped context.
///
/// The sequence is: save the live context into the current slot and mark it
/// Ready -- unless it is Terminated, in which case its context is defunct
/// and must not survive; then load `next`'s saved context, mark it
/// Executing, and reset its age.
///
/// Switching a slot onto itself is legal and still resets the age.
pub fn switch_to(table: &mut ProcTable, ctx: &mut UserContext, next: usize) {
    let cur = table.executing;
    if table.slots[cur].status != ProcStatus::Terminated {
        table.slots[cur].ctx = *ctx;
        table.slots[cur].status = ProcStatus::Ready;
    }
    *ctx = table.slots[next].ctx;
    table.slots[next].status = ProcStatus::Executing;
    table.slots[next].age = 0;
    table.executing = next;
}

/// Advances the executing process's age by one tick. Returns `Other` once
/// the age has reached the base priority, i.e. the process has used up its
/// allotment.
pub fn timer_tick(table: &mut ProcTable) -> NextProc {
    let p = &mut table.slots[table.executing];
    if p.age == p.base_priority {
        NextProc::Other
    } else {
        p.age += 1;
        NextProc::Same
    }
}

/// Runs the scheduler against the live context.
///
/// # Panics
///
/// If no slot is runnable. The bootstrap process never exits, so an empty
/// scan means the table is corrupt; halting beats resuming a dead context.
pub fn reschedule(table: &mut ProcTable, ctx: &mut UserContext) {
    match select(table) {
        Some(next) => switch_to(table, ctx, next),
        None => panic!("no runnable process"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a table of `n` Ready processes with the given base priorities;
    /// slot 0 starts out Executing.
    fn table_of(priorities: &[u32]) -> ProcTable {
        let mut t = ProcTable::new();
        for (i, &prio) in priorities.iter().enumerate() {
            t.slots[i].pid = Pid::for_slot(i);
            t.slots[i].status = ProcStatus::Ready;
            t.slots[i].base_priority = prio;
        }
        t.slots[0].status = ProcStatus::Executing;
        t.population = priorities.len();
        t
    }

    fn executing_count(t: &ProcTable) -> usize {
        t.slots
            .iter()
            .filter(|p| p.status == ProcStatus::Executing)
            .count()
    }

    #[test]
    fn select_scans_circularly() {
        let mut t = table_of(&[0, 0, 0]);
        assert_eq!(select(&t), Some(1));
        t.executing = 2;
        t.slots[2].status = ProcStatus::Executing;
        t.slots[0].status = ProcStatus::Ready;
        assert_eq!(select(&t), Some(0));
    }

    #[test]
    fn select_skips_terminated_slots() {
        let mut t = table_of(&[0, 0, 0]);
        t.slots[1] = Pcb::UNUSED;
        t.slots[1].status = ProcStatus::Terminated;
        assert_eq!(select(&t), Some(2));
    }

    #[test]
    fn lone_process_continues() {
        let t = table_of(&[0]);
        assert_eq!(select(&t), Some(0));
    }

    #[test]
    fn nothing_runnable_is_reported() {
        let mut t = table_of(&[0, 0]);
        for s in &mut t.slots[..2] {
            *s = Pcb::UNUSED;
            s.status = ProcStatus::Terminated;
        }
        assert_eq!(select(&t), None);
    }

    #[test]
    fn switch_saves_and_restores_contexts() {
        let mut t = table_of(&[0, 0]);
        t.slots[1].ctx.pc = 0x2000;
        t.slots[1].ctx.gpr[0] = 7;

        let mut live = UserContext::ZERO;
        live.pc = 0x1000;
        live.gpr[0] = 3;

        switch_to(&mut t, &mut live, 1);

        assert_eq!(t.slots[0].ctx.pc, 0x1000);
        assert_eq!(t.slots[0].ctx.gpr[0], 3);
        assert_eq!(t.slots[0].status, ProcStatus::Ready);
        assert_eq!(live.pc, 0x2000);
        assert_eq!(live.gpr[0], 7);
        assert_eq!(t.executing, 1);
        assert_eq!(t.slots[1].age, 0);
        assert_eq!(executing_count(&t), 1);
    }

    #[test]
    fn switch_discards_terminated_context() {
        let mut t = table_of(&[0, 0]);
        t.slots[0] = Pcb::UNUSED;
        t.slots[0].status = ProcStatus::Terminated;

        let mut live = UserContext::ZERO;
        live.pc = 0xdead;
        switch_to(&mut t, &mut live, 1);

        // The dead slot stayed zeroed instead of absorbing the old context.
        assert_eq!(t.slots[0].ctx.pc, 0);
        assert_eq!(t.slots[0].status, ProcStatus::Terminated);
        assert_eq!(t.executing, 1);
    }

    #[test]
    fn zero_priority_yields_every_tick() {
        let mut t = table_of(&[0, 0]);
        assert_eq!(timer_tick(&mut t), NextProc::Other);
    }

    #[test]
    fn aging_shares_ticks_by_priority() {
        // Two always-Ready processes with base priorities 2 and 5 should
        // split ticks 3:6 -- each runs base_priority + 1 ticks per dispatch.
        let mut t = table_of(&[2, 5]);
        let mut ctx = t.slots[0].ctx;
        let mut ran = [0usize; 2];

        for _ in 0..99 {
            ran[t.executing] += 1;
            if timer_tick(&mut t) == NextProc::Other {
                reschedule(&mut t, &mut ctx);
            }
            assert_eq!(executing_count(&t), 1);
        }

        assert_eq!(ran, [33, 66]);
    }

    #[test]
    fn continues_past_allotment_when_alone() {
        let mut t = table_of(&[1]);
        let mut ctx = t.slots[0].ctx;
        for _ in 0..10 {
            if timer_tick(&mut t) == NextProc::Other {
                reschedule(&mut t, &mut ctx);
            }
            assert_eq!(t.executing, 0);
            assert_eq!(t.slots[0].status, ProcStatus::Executing);
        }
    }

    #[test]
    fn lookup_ignores_dead_slots() {
        let mut t = table_of(&[0, 0, 0]);
        assert_eq!(lookup_pid(&t, Pid(2)), Some(1));
        t.slots[1] = Pcb::UNUSED;
        t.slots[1].status = ProcStatus::Terminated;
        assert_eq!(lookup_pid(&t, Pid(2)), None);
        // A zeroed pid in a dead slot must not be findable either.
        assert_eq!(lookup_pid(&t, Pid(0)), None);
    }

    #[test]
    #[should_panic(expected = "no runnable process")]
    fn reschedule_with_no_runnable_slot_is_fatal() {
        let mut t = table_of(&[0]);
        t.slots[0] = Pcb::UNUSED;
        t.slots[0].status = ProcStatus::Terminated;
        let mut ctx = UserContext::ZERO;
        reschedule(&mut t, &mut ctx);
    }
}
