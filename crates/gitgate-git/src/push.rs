//! Push event assembly.

use crate::command::Command;
use crate::commit::CommitRecord;
use crate::pack::{inflate, locate_first_object};
use crate::pktline::split_frame;
use crate::Result;
use serde::Serialize;

/// A decoded `git-receive-pack` request, for audit logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushEvent {
    /// Previous tip of the ref, or [`ZERO_ID`](crate::ZERO_ID) on create.
    pub old_commit_id: String,
    /// New tip of the ref, or [`ZERO_ID`](crate::ZERO_ID) on delete.
    pub new_commit_id: String,
    /// Fully qualified ref name.
    pub reference: String,
    /// Metadata of the leading pushed commit, when it could be recovered.
    pub commit: Option<CommitRecord>,
}

impl PushEvent {
    /// Decodes a full push request body.
    ///
    /// Fails only if the pkt-line frame or the command line is unreadable.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let frame = split_frame(body)?;
        Self::from_parts(frame.line, frame.pack)
    }

    /// Assembles an event from an already split command line and pack.
    ///
    /// Commit metadata is best effort: a missing, non-commit or corrupt
    /// leading object is logged and leaves `commit` empty.
    pub fn from_parts(line: &[u8], pack: &[u8]) -> Result<Self> {
        let command = Command::parse(line)?;

        let commit = if command.is_delete() || pack.is_empty() {
            None
        } else {
            match decode_commit(pack) {
                Ok(commit) => Some(commit),
                Err(e) => {
                    tracing::warn!(
                        reference = %command.ref_name,
                        new = %command.new_id,
                        error = %e,
                        "Failed to parse pack data"
                    );
                    None
                }
            }
        };

        Ok(Self::assemble(command, commit))
    }

    /// Builds an event from a parsed command and a decoded commit.
    ///
    /// Fills the commit's `sha` from the command, and its `parent` from the
    /// old id when the object named none. A commit is dropped for deletes.
    pub fn assemble(command: Command, commit: Option<CommitRecord>) -> Self {
        let commit = commit.filter(|_| !command.is_delete()).map(|mut commit| {
            commit.sha = command.new_id.clone();
            if commit.parent.is_empty() {
                commit.parent = command.old_id.clone();
            }
            commit
        });

        Self {
            old_commit_id: command.old_id,
            new_commit_id: command.new_id,
            reference: command.ref_name,
            commit,
        }
    }

    /// Checks if the push creates the ref.
    pub fn is_create(&self) -> bool {
        self.old_commit_id == crate::ZERO_ID
    }

    /// Checks if the push deletes the ref.
    pub fn is_delete(&self) -> bool {
        self.new_commit_id == crate::ZERO_ID
    }
}

/// Decodes the leading commit of a pack payload.
///
/// Unlike [`PushEvent::decode`] this surfaces every failure. The returned
/// record has an empty `sha`, and an empty `parent` if the object has none.
pub fn decode_commit(pack: &[u8]) -> Result<CommitRecord> {
    let location = locate_first_object(pack)?;
    let raw = inflate(&pack[location.data_offset..])?;

    tracing::debug!(
        declared = location.size,
        inflated = raw.len(),
        "Inflated leading commit"
    );

    Ok(CommitRecord::decode(&raw))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::pack::{ObjectKind, PackBuilder};
    use crate::pktline::encode_line;
    use crate::ZERO_ID;
    use proptest::prelude::*;

    fn object_id_strategy() -> impl Strategy<Value = String> {
        "[0-9a-f]{40}"
    }

    proptest! {
        /// Property: a delete never carries commit metadata, whatever the pack holds
        #[test]
        fn prop_delete_has_no_commit(
            old in object_id_strategy(),
            pack in prop::collection::vec(any::<u8>(), 0..512),
        ) {
            let line = format!("{} {} refs/heads/gone\n", old, ZERO_ID);
            let mut body = encode_line(line.as_bytes());
            body.extend_from_slice(&pack);

            let event = PushEvent::decode(&body).unwrap();
            prop_assert!(event.commit.is_none());
            prop_assert_eq!(event.old_commit_id, old);
        }

        /// Property: sha always comes from the command, parent from the object or old id
        #[test]
        fn prop_commit_ids_from_command(
            old in object_id_strategy(),
            new in object_id_strategy(),
            parent in prop::option::of(object_id_strategy()),
            message in "[a-zA-Z0-9 ]{1,80}",
        ) {
            let mut object = String::from("tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
            if let Some(parent) = &parent {
                object.push_str(&format!("parent {}\n", parent));
            }
            object.push_str(&format!("author A <a@x.com> 0 +0000\n\n{}", message));

            let pack = PackBuilder::new()
                .add(ObjectKind::Commit, object.into_bytes())
                .build()
                .unwrap();
            let line = format!("{} {} refs/heads/main\n", old, new);
            let commit = PushEvent::from_parts(line.as_bytes(), &pack).unwrap().commit.unwrap();

            prop_assert_eq!(commit.sha, new);
            prop_assert_eq!(commit.parent, parent.unwrap_or(old));
            prop_assert_eq!(commit.message, message.trim());
        }

        /// Property: arbitrary bodies never panic
        #[test]
        fn prop_decode_no_panic(data in prop::collection::vec(any::<u8>(), 0..1024)) {
            let _ = PushEvent::decode(&data);
        }
    }
}
