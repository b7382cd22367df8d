//! Fuzz target for whole push bodies.
//!
//! Builds structurally valid pushes from arbitrary parts so the commit path
//! is reached, then mangles them. Decoding must never panic, and the ids of
//! a decoded push always come from the command line.

#![no_main]

use arbitrary::Arbitrary;
use gitgate_git::{encode_line, ObjectKind, PackBuilder, PushEvent, FLUSH};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Push {
    old_id: [u8; 20],
    new_id: [u8; 20],
    reference: String,
    capabilities: Vec<u8>,
    object: Vec<u8>,
    truncate: u16,
    raw: Vec<u8>,
}

fn hex(id: &[u8; 20]) -> String {
    id.iter().map(|b| format!("{:02x}", b)).collect()
}

fuzz_target!(|push: Push| {
    let _ = PushEvent::decode(&push.raw);

    let old_id = hex(&push.old_id);
    let new_id = hex(&push.new_id);

    let mut line = format!("{} {} {}", old_id, new_id, push.reference).into_bytes();
    line.push(0);
    line.extend_from_slice(&push.capabilities);
    line.push(b'\n');
    if line.len() > 0xfff0 {
        return;
    }

    let Ok(pack) = PackBuilder::new().add(ObjectKind::Commit, push.object).build() else {
        return;
    };

    let mut body = encode_line(&line);
    body.extend_from_slice(FLUSH);
    body.extend_from_slice(&pack);

    if let Ok(event) = PushEvent::decode(&body) {
        assert_eq!(event.old_commit_id, old_id);
        assert_eq!(event.new_commit_id, new_id);
        if let Some(commit) = &event.commit {
            assert_eq!(commit.sha, new_id);
        }
    }

    let cut = body.len().saturating_sub(push.truncate as usize);
    let _ = PushEvent::decode(&body[..cut]);
});
