//! Fuzz target for the leading packfile object.
//!
//! Feeds arbitrary bytes to the object locator, the inflater and the commit
//! decoder without any framing in front.

#![no_main]

use gitgate_git::{decode_commit, inflate, locate_first_object, CommitRecord};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(location) = locate_first_object(data) {
        assert!(location.data_offset <= data.len());
        if let Ok(raw) = inflate(&data[location.data_offset..]) {
            let _ = CommitRecord::decode(&raw);
        }
    }

    let _ = inflate(data);
    let _ = CommitRecord::decode(data);
    let _ = decode_commit(data);
});
