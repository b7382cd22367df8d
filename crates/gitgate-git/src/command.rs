//! Ref update command parsing.
//!
//! The first pkt-line of a push reads
//! `<old-id> SP <new-id> SP <ref-name> [NUL <capabilities>] [LF]`.

use crate::{DecodeError, Result};

/// Object id used for "ref does not exist".
pub const ZERO_ID: &str = "0000000000000000000000000000000000000000";

/// Characters stripped from the end of the ref name.
const REF_PADDING: &[char] = &['\0', '\r', '\n', ' '];

/// A ref update command from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Old object ID (zeros for create).
    pub old_id: String,
    /// New object ID (zeros for delete).
    pub new_id: String,
    /// Reference name.
    pub ref_name: String,
}

impl Command {
    /// Parses a command line.
    ///
    /// Object ids are carried as received. The capability list after the
    /// first NUL is dropped along with trailing padding.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let line = String::from_utf8_lossy(line);
        let mut parts = line.split(' ');

        let (Some(old_id), Some(new_id), Some(ref_field)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(DecodeError::CommandFormat(line.into_owned()));
        };

        let ref_name = ref_field
            .split('\0')
            .next()
            .unwrap_or(ref_field)
            .trim_end_matches(REF_PADDING);

        Ok(Self {
            old_id: old_id.to_string(),
            new_id: new_id.to_string(),
            ref_name: ref_name.to_string(),
        })
    }

    /// Checks if this is a create command.
    pub fn is_create(&self) -> bool {
        self.old_id == ZERO_ID
    }

    /// Checks if this is a delete command.
    pub fn is_delete(&self) -> bool {
        self.new_id == ZERO_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD: &str = "1111111111111111111111111111111111111111";
    const NEW: &str = "2222222222222222222222222222222222222222";

    #[test]
    fn test_parse_plain() {
        let line = format!("{} {} refs/heads/main", OLD, NEW);
        let cmd = Command::parse(line.as_bytes()).unwrap();
        assert_eq!(cmd.old_id, OLD);
        assert_eq!(cmd.new_id, NEW);
        assert_eq!(cmd.ref_name, "refs/heads/main");
    }

    #[test]
    fn test_parse_with_capabilities() {
        let line = format!(
            "{} {} refs/heads/main\0 report-status side-band-64k agent=git/2.43.0\n",
            OLD, NEW
        );
        let cmd = Command::parse(line.as_bytes()).unwrap();
        assert_eq!(cmd.ref_name, "refs/heads/main");
    }

    #[test]
    fn test_parse_trailing_padding() {
        let line = format!("{} {} refs/heads/dev\r\n \0", OLD, NEW);
        let cmd = Command::parse(line.as_bytes()).unwrap();
        assert_eq!(cmd.ref_name, "refs/heads/dev");
    }

    #[test]
    fn test_parse_too_few_fields() {
        let result = Command::parse(format!("{} {}", OLD, NEW).as_bytes());
        assert!(matches!(result, Err(DecodeError::CommandFormat(_))));

        let result = Command::parse(b"");
        assert!(matches!(result, Err(DecodeError::CommandFormat(_))));
    }

    #[test]
    fn test_parse_double_space_is_empty_field() {
        // Split on single spaces: "a  b" yields an empty middle field.
        let cmd = Command::parse(format!("{}  {}", OLD, NEW).as_bytes()).unwrap();
        assert_eq!(cmd.old_id, OLD);
        assert_eq!(cmd.new_id, "");
        assert_eq!(cmd.ref_name, NEW);
    }

    #[test]
    fn test_create_and_delete() {
        let line = format!("{} {} refs/heads/x", ZERO_ID, NEW);
        let create = Command::parse(line.as_bytes()).unwrap();
        assert!(create.is_create());
        assert!(!create.is_delete());

        let line = format!("{} {} refs/heads/x", OLD, ZERO_ID);
        let delete = Command::parse(line.as_bytes()).unwrap();
        assert!(delete.is_delete());
        assert!(!delete.is_create());
    }

    #[test]
    fn test_command_errors_are_framing() {
        let err = Command::parse(b"one two").unwrap_err();
        assert!(err.is_framing());
    }
}
