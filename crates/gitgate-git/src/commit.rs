//! Commit object text decoding.

use serde::Serialize;

/// Commit metadata recovered from a pushed commit object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    /// The pushed new object id; never recomputed from content.
    pub sha: String,
    /// First parent, or the push's old object id when the object has none.
    pub parent: String,
    /// Author name.
    pub author: String,
    /// Author email, without angle brackets.
    pub email: String,
    /// Message after the header block, trimmed.
    pub message: String,
    /// Author timestamp and timezone exactly as written, e.g. `1700000000 +0100`.
    pub date: String,
}

impl CommitRecord {
    /// Decodes an inflated commit object.
    ///
    /// Header lines are read up to the first empty line. Only `parent`
    /// (first one wins) and `author` are used; `tree`, `committer`,
    /// `gpgsig` and the rest are skipped. `sha` is left empty for the caller.
    /// Malformed input yields empty fields rather than an error.
    pub fn decode(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let mut commit = Self::default();

        for line in text.split('\n') {
            if line.is_empty() {
                break;
            }

            if let Some(parent) = line.strip_prefix("parent ") {
                if commit.parent.is_empty() {
                    commit.parent = parent.trim().to_string();
                }
            } else if let Some(ident) = line.strip_prefix("author ") {
                commit.set_author(ident);
            }
        }

        if let Some((_, message)) = text.split_once("\n\n") {
            commit.message = message.trim().to_string();
        }

        commit
    }

    /// Splits `Name <email> timestamp tz` on the first `<` and first `>`.
    fn set_author(&mut self, ident: &str) {
        let Some((name, rest)) = ident.split_once('<') else {
            return;
        };
        self.author = name.trim().to_string();

        if let Some((email, date)) = rest.split_once('>') {
            self.email = email.trim().to_string();
            self.date = date.trim().to_string();
        }
    }
}
