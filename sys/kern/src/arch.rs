// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture- and platform-specific support.
//!
//! The kernel proper is generic over the device façade, so very little
//! lives here: the bare-metal module supplies the board's MMIO device
//! implementations, the trap entry points the assembly trampolines call,
//! and the kernel-state singleton; the fake module supplies queue-backed
//! device doubles and a simulated machine for host-side tests.

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "arm", target_os = "none"))] {
        pub mod arm;
        pub use arm::*;
    } else if #[cfg(target_os = "none")] {
        compile_error!("support for this architecture not implemented");
    } else {
        pub mod fake;
        pub use fake::*;
    }
}
