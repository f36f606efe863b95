// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The console: bootstrap process (pid 1) and command interpreter.
//!
//! Runs at priority 0 so a keypress is never more than a tick away from
//! being serviced -- keeping in mind that a blocking read stalls the whole
//! machine until the line is complete.

#![no_std]
#![no_main]

use userlib::*;

extern "C" {
    /// Entry point of the dining-philosophers program, placed by the image
    /// link.
    fn main_phil() -> !;
}

#[no_mangle]
pub extern "C" fn main_console() -> ! {
    uprintln!("console: ready");
    let mut line = [0u8; 64];
    loop {
        uprint!("$ ");
        let cmd = read_line(&mut line);
        match cmd {
            "" => {}
            "phil" => match sys_fork() {
                ForkOutcome::Child => sys_exec(main_phil),
                ForkOutcome::Parent(pid) => {
                    uprintln!("console: started pid {}", pid.0)
                }
                ForkOutcome::Failed => {
                    uprintln!("console: process table full")
                }
            },
            _ => {
                if let Some(rest) = cmd.strip_prefix("kill ") {
                    match rest.parse::<u32>() {
                        Ok(pid) => sys_kill(Pid(pid)),
                        Err(_) => uprintln!("console: bad pid: {}", rest),
                    }
                } else {
                    uprintln!("console: unknown command: {}", cmd);
                }
            }
        }
    }
}
