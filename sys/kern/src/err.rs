// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common error-handling support.
//!
//! Errors reach user code through exactly one channel: the return-value
//! register of the supervisor call that failed. There is no asynchronous
//! error path. Syscall implementations return `Result<NextProc, UserError>`
//! and a single arm of the dispatcher discharges the `Err` side, which keeps
//! the error bookkeeping out of the individual syscalls.

use crate::proc::NextProc;

/// A supervisor call that could not be satisfied.
#[derive(Clone, Debug)]
pub struct UserError {
    /// Code deposited in the caller's return-value register.
    pub code: usize,
    /// Scheduling consequence of the failed call.
    pub hint: NextProc,
}

impl UserError {
    /// A kernel table is full, or the caller described a buffer the kernel
    /// refuses to touch. State is left unchanged; the caller sees -1.
    pub fn failure() -> Self {
        Self {
            code: abi::FAILURE_CODE,
            hint: NextProc::Same,
        }
    }
}

impl From<crate::umem::InvalidSlice> for UserError {
    fn from(_: crate::umem::InvalidSlice) -> Self {
        Self::failure()
    }
}
