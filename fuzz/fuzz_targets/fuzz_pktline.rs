//! Fuzz target for the receive-pack command frame.
//!
//! Splits arbitrary input into command line and pack, then parses the
//! command line. Neither step may panic.

#![no_main]

use gitgate_git::{split_frame, Command};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = split_frame(data) {
        assert!(frame.line.len() + frame.pack.len() + 4 == data.len());
        let _ = Command::parse(frame.line);
    }

    let _ = Command::parse(data);
});
