// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Named shared-memory regions.
//!
//! User processes coordinate through coarse advisory locks keyed by a
//! caller-chosen integer -- the dining philosophers number their forks this
//! way. The first attach of a new id carves the next region out of the
//! shared arena (downward from its top, mirroring the stack arena) and the
//! binding is permanent: slots are never freed, so an id always resolves to
//! the same region for the life of the system.
//!
//! The lock bit is advisory. Detach clears it with no ownership check;
//! honoring the protocol is entirely up to the processes involved.

use abi::{MAX_SHRM, SHM_REGION_SIZE};

/// One named region.
#[derive(Copy, Clone, Debug)]
pub struct ShmSlot {
    /// Caller-chosen identity, usually a small resource index.
    pub id: usize,
    /// Top-of-region address handed back from attach.
    pub tos: usize,
    /// Advisory lock bit.
    pub locked: bool,
}

/// Outcome of an attach attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum ShmGet {
    /// Lock taken; holds the region's address.
    Acquired(usize),
    /// The region exists but someone else holds the lock.
    Busy,
    /// No slot left for a new id.
    Full,
}

/// The fixed table of shared-memory slots.
pub struct ShmTable {
    slots: [ShmSlot; MAX_SHRM],
    /// Slots assigned so far. Monotonic.
    allocated: usize,
    /// Highest address of the shared arena; regions are carved downward
    /// from here.
    top: usize,
}

impl ShmTable {
    pub const fn new(top: usize) -> Self {
        Self {
            slots: [ShmSlot {
                id: 0,
                tos: 0,
                locked: false,
            }; MAX_SHRM],
            allocated: 0,
            top,
        }
    }

    /// Number of ids bound so far.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Only assigned slots participate in lookup, so id 0 names a real
    /// region rather than matching every untouched slot.
    fn find(&self, id: usize) -> Option<usize> {
        (0..self.allocated).find(|&i| self.slots[i].id == id)
    }

    /// Attaches region `id`, allocating it on first use, and takes its
    /// lock.
    pub fn get(&mut self, id: usize) -> ShmGet {
        if let Some(i) = self.find(id) {
            if self.slots[i].locked {
                return ShmGet::Busy;
            }
            self.slots[i].locked = true;
            return ShmGet::Acquired(self.slots[i].tos);
        }

        if self.allocated == MAX_SHRM {
            return ShmGet::Full;
        }
        let i = self.allocated;
        self.slots[i] = ShmSlot {
            id,
            tos: self.top - i * SHM_REGION_SIZE,
            locked: true,
        };
        self.allocated = i + 1;
        ShmGet::Acquired(self.slots[i].tos)
    }

    /// Releases the lock on region `id`. Unknown ids are a no-op.
    pub fn detach(&mut self, id: usize) {
        if let Some(i) = self.find(id) {
            self.slots[i].locked = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP: usize = 0x9000_0000;

    #[test]
    fn regions_are_carved_downward() {
        let mut t = ShmTable::new(TOP);
        assert_eq!(t.get(7), ShmGet::Acquired(TOP));
        assert_eq!(t.get(3), ShmGet::Acquired(TOP - SHM_REGION_SIZE));
        assert_eq!(t.allocated(), 2);
    }

    #[test]
    fn reattach_returns_the_same_region() {
        let mut t = ShmTable::new(TOP);
        let ShmGet::Acquired(first) = t.get(7) else {
            panic!()
        };
        t.detach(7);
        assert_eq!(t.get(7), ShmGet::Acquired(first));
        assert_eq!(t.allocated(), 1);
    }

    #[test]
    fn held_lock_reports_busy() {
        let mut t = ShmTable::new(TOP);
        let _ = t.get(7);
        assert_eq!(t.get(7), ShmGet::Busy);
        t.detach(7);
        assert_eq!(t.get(7), ShmGet::Acquired(TOP));
    }

    #[test]
    fn id_zero_is_a_real_region() {
        let mut t = ShmTable::new(TOP);
        assert_eq!(t.get(0), ShmGet::Acquired(TOP));
        assert_eq!(t.get(0), ShmGet::Busy);
    }

    #[test]
    fn detach_of_unknown_id_changes_nothing() {
        let mut t = ShmTable::new(TOP);
        let _ = t.get(7);
        t.detach(99);
        assert_eq!(t.get(7), ShmGet::Busy);
    }

    #[test]
    fn table_exhaustion() {
        let mut t = ShmTable::new(TOP);
        for id in 0..MAX_SHRM {
            assert!(matches!(t.get(id + 100), ShmGet::Acquired(_)));
        }
        assert_eq!(t.get(999), ShmGet::Full);
        // Existing ids still resolve.
        assert_eq!(t.get(100), ShmGet::Busy);
    }
}
