//! Authoritative document state for one session.
//!
//! Deliberately minimal: the conflict policy is last-writer-wins
//! full-document replacement. Two concurrent replaces resolve to whichever
//! one the session processed second; there is no merge and no conflict
//! detection. The revision counter exists so observers can tell "same text
//! again" apart from "replaced with identical text".

/// The shared text body plus a monotonically increasing revision counter.
#[derive(Debug, Clone, Default)]
pub struct DocumentState {
    code: String,
    revision: u64,
}

impl DocumentState {
    /// Empty document at revision zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Document seeded with stored text, e.g. when a session is re-opened.
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            revision: 0,
        }
    }

    /// Unconditionally overwrite the text body. Returns the new revision.
    pub fn replace(&mut self, new_text: impl Into<String>) -> u64 {
        self.code = new_text.into();
        self.revision += 1;
        self.revision
    }

    /// Current `(text, revision)`.
    pub fn read(&self) -> (&str, u64) {
        (&self.code, self.revision)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_empty() {
        let doc = DocumentState::new();
        assert_eq!(doc.read(), ("", 0));
    }

    #[test]
    fn test_seeded_document_starts_at_revision_zero() {
        let doc = DocumentState::with_code("print('hi')");
        assert_eq!(doc.read(), ("print('hi')", 0));
    }

    #[test]
    fn test_replace_is_last_write_wins() {
        let mut doc = DocumentState::new();
        doc.replace("first");
        doc.replace("second");
        doc.replace("third");
        assert_eq!(doc.code(), "third");
    }

    #[test]
    fn test_replace_increments_revision() {
        let mut doc = DocumentState::new();
        assert_eq!(doc.replace("a"), 1);
        assert_eq!(doc.replace("b"), 2);
        // Replacing with identical text still counts as a new revision.
        assert_eq!(doc.replace("b"), 3);
        assert_eq!(doc.revision(), 3);
    }
}
