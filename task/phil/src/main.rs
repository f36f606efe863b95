// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dining philosophers, the canonical exerciser for the shared-memory
//! locks.
//!
//! Sixteen philosophers sit at a round table with one fork between each
//! pair of neighbors; fork `i` is the shared region with id `i`. Eating
//! takes both adjacent forks. Everyone grabs left-then-right, so the
//! classic deadlock/livelock is possible by design -- the kernel promises
//! mutual exclusion per fork and nothing more.

#![no_std]
#![no_main]

use userlib::*;

const SEATS: usize = 16;

#[no_mangle]
pub extern "C" fn main_phil() -> ! {
    for seat in 0..SEATS {
        match sys_fork() {
            ForkOutcome::Child => philosopher(seat),
            ForkOutcome::Parent(_) => {}
            ForkOutcome::Failed => {
                uprintln!("phil: seat {} has no chair", seat);
            }
        }
    }
    sys_exit(EXIT_SUCCESS)
}

fn philosopher(seat: usize) -> ! {
    let left = seat;
    let right = (seat + 1) % SEATS;
    let mut meals = 0u32;
    loop {
        // Think.
        sys_yield();

        sys_shmget(left);
        sys_shmget(right);
        meals += 1;
        uprintln!("phil: {} eating, meal {}", seat, meals);
        sys_yield();
        sys_shmdt(left);
        sys_shmdt(right);
    }
}
