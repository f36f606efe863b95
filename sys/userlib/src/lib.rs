// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! User program support library.
//!
//! This contains the supervisor-call stubs and small console conveniences,
//! and re-exports the contents of the `abi` crate shared with the kernel.
//!
//! # Stub implementations
//!
//! Each operation is a two-byte-name affair: a public `sys_foo` wrapper for
//! programs, and a `sys_foo_stub` defined in assembly. The ABI makes the
//! stubs almost free: the AAPCS places a Rust wrapper's first three
//! arguments in `r0..r2`, which is exactly where the kernel reads
//! supervisor-call arguments, and the result comes back in `r0`. So every
//! stub is a bare trap instruction carrying the operation number as its
//! immediate, plus a return.
//!
//! On anything but the bare-metal ARM target the stubs are panicking
//! placeholders; host builds of user programs exist for type-checking only.

#![no_std]

pub use abi::*;

use core::fmt;

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "arm", target_os = "none"))] {
        core::arch::global_asm!(
            "
            .section .text.sys_stubs, \"ax\", %progbits

            .globl sys_yield_stub
            .type sys_yield_stub, %function
            sys_yield_stub:
                svc #0x00
                bx lr

            .globl sys_write_stub
            .type sys_write_stub, %function
            sys_write_stub:
                svc #0x01
                bx lr

            .globl sys_read_stub
            .type sys_read_stub, %function
            sys_read_stub:
                svc #0x02
                bx lr

            .globl sys_fork_stub
            .type sys_fork_stub, %function
            sys_fork_stub:
                svc #0x03
                bx lr

            .globl sys_exit_stub
            .type sys_exit_stub, %function
            sys_exit_stub:
                svc #0x04
                b .             @ not reached

            .globl sys_exec_stub
            .type sys_exec_stub, %function
            sys_exec_stub:
                svc #0x05
                b .             @ resumes at the new entry point, not here

            .globl sys_kill_stub
            .type sys_kill_stub, %function
            sys_kill_stub:
                svc #0x06
                bx lr

            .globl sys_shmget_stub
            .type sys_shmget_stub, %function
            sys_shmget_stub:
                svc #0x08
                bx lr

            .globl sys_shmdt_stub
            .type sys_shmdt_stub, %function
            sys_shmdt_stub:
                svc #0x09
                bx lr
            "
        );

        extern "C" {
            fn sys_yield_stub();
            fn sys_write_stub(fd: usize, buf: *const u8, len: usize) -> usize;
            fn sys_read_stub(fd: usize, buf: *mut u8, len: usize) -> usize;
            fn sys_fork_stub() -> usize;
            fn sys_exit_stub(code: usize) -> !;
            fn sys_exec_stub(entry: usize) -> !;
            fn sys_kill_stub(pid: usize);
            fn sys_shmget_stub(id: usize) -> usize;
            fn sys_shmdt_stub(id: usize);
        }
    } else {
        unsafe fn sys_yield_stub() {
            unimplemented!("supervisor calls require the bare-metal ARM target")
        }
        unsafe fn sys_write_stub(_: usize, _: *const u8, _: usize) -> usize {
            unimplemented!("supervisor calls require the bare-metal ARM target")
        }
        unsafe fn sys_read_stub(_: usize, _: *mut u8, _: usize) -> usize {
            unimplemented!("supervisor calls require the bare-metal ARM target")
        }
        unsafe fn sys_fork_stub() -> usize {
            unimplemented!("supervisor calls require the bare-metal ARM target")
        }
        unsafe fn sys_exit_stub(_: usize) -> ! {
            unimplemented!("supervisor calls require the bare-metal ARM target")
        }
        unsafe fn sys_exec_stub(_: usize) -> ! {
            unimplemented!("supervisor calls require the bare-metal ARM target")
        }
        unsafe fn sys_kill_stub(_: usize) {
            unimplemented!("supervisor calls require the bare-metal ARM target")
        }
        unsafe fn sys_shmget_stub(_: usize) -> usize {
            unimplemented!("supervisor calls require the bare-metal ARM target")
        }
        unsafe fn sys_shmdt_stub(_: usize) {
            unimplemented!("supervisor calls require the bare-metal ARM target")
        }
    }
}

/// Relinquishes the CPU to the next Ready process. Returns when this
/// process is next scheduled.
pub fn sys_yield() {
    // Safety: the stub clobbers nothing the compiler cares about.
    unsafe { sys_yield_stub() }
}

/// Writes `data` to descriptor `fd`. Currently every descriptor reaches the
/// console. Returns the number of bytes written.
pub fn sys_write(fd: usize, data: &[u8]) -> usize {
    // Safety: the slice is live for the duration of the (synchronous) call.
    unsafe { sys_write_stub(fd, data.as_ptr(), data.len()) }
}

/// Fills `buf` from descriptor `fd`, blocking until it is full. Returns the
/// number of bytes read.
pub fn sys_read(fd: usize, buf: &mut [u8]) -> usize {
    // Safety: the slice is live and exclusively ours for the duration of
    // the (synchronous) call.
    unsafe { sys_read_stub(fd, buf.as_mut_ptr(), buf.len()) }
}

/// What `sys_fork` produced, from the perspective of the process observing
/// it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ForkOutcome {
    /// You are the new process.
    Child,
    /// You are the original; here is your child.
    Parent(Pid),
    /// The process table is full; there is no child.
    Failed,
}

/// Duplicates the calling process. Both processes return from this call:
/// the parent learns the child's pid, the child gets [`ForkOutcome::Child`].
pub fn sys_fork() -> ForkOutcome {
    // Safety: the stub clobbers nothing the compiler cares about.
    match unsafe { sys_fork_stub() } {
        0 => ForkOutcome::Child,
        FAILURE_CODE => ForkOutcome::Failed,
        pid => ForkOutcome::Parent(Pid(pid as u32)),
    }
}

/// Terminates the calling process. Never returns. The status code is
/// carried for interface symmetry; nothing in the system reads it yet.
pub fn sys_exit(code: usize) -> ! {
    // Safety: the stub does not return.
    unsafe { sys_exit_stub(code) }
}

/// Replaces the calling process's program: the stack is reset and execution
/// continues at `entry`, keeping the pid and priority.
pub fn sys_exec(entry: unsafe extern "C" fn() -> !) -> ! {
    // Safety: the kernel redirects the resume point to `entry`; the
    // instruction after the trap is unreachable.
    unsafe { sys_exec_stub(entry as usize) }
}

/// Terminates the process with the given pid. Unknown pids are ignored.
pub fn sys_kill(pid: Pid) {
    // Safety: the stub clobbers nothing the compiler cares about.
    unsafe { sys_kill_stub(pid.0 as usize) }
}

/// Attaches the named shared region and takes its advisory lock, waiting
/// (by being rescheduled) while another process holds it. Returns the
/// region's address; null-ish failure only if the region table is full.
pub fn sys_shmget(id: usize) -> *mut u8 {
    // Safety: the stub clobbers nothing the compiler cares about.
    unsafe { sys_shmget_stub(id) as *mut u8 }
}

/// Releases the advisory lock on the named shared region.
pub fn sys_shmdt(id: usize) {
    // Safety: the stub clobbers nothing the compiler cares about.
    unsafe { sys_shmdt_stub(id) }
}

/// Console output handle; implements [`fmt::Write`] over `sys_write`.
pub struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        sys_write(STDOUT_FD, s.as_bytes());
        Ok(())
    }
}

/// Prints to the console.
#[macro_export]
macro_rules! uprint {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::Console, $($arg)*);
    }};
}

/// Prints to the console, with a trailing CRLF.
#[macro_export]
macro_rules! uprintln {
    () => { $crate::uprint!("\r\n") };
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::Console, $($arg)*);
        let _ = $crate::Console.write_str("\r\n");
    }};
}

/// Reads one line from the console into `buf`, echoing as it goes.
/// Returns the line without its terminator; input beyond the buffer is
/// dropped.
pub fn read_line(buf: &mut [u8]) -> &str {
    let mut len = 0;
    loop {
        let mut byte = [0u8];
        sys_read(STDIN_FD, &mut byte);
        match byte[0] {
            b'\r' | b'\n' => {
                sys_write(STDOUT_FD, b"\r\n");
                break;
            }
            b => {
                if len < buf.len() {
                    buf[len] = b;
                    len += 1;
                    sys_write(STDOUT_FD, &byte);
                }
            }
        }
    }
    // ASCII in, ASCII out; anything else is the console's problem.
    core::str::from_utf8(&buf[..len]).unwrap_or("")
}

/// Panicking user processes simply exit; there is nowhere to report to.
#[cfg(target_os = "none")]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo<'_>) -> ! {
    sys_exit(EXIT_FAILURE)
}
