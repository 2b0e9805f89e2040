//! Fault injection for the in-memory engine.

/// What happens when a fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The statement fails; an open transaction is marked aborted.
    Statement,
    /// The connection breaks; the server discards any open transaction.
    Connection,
    /// `COMMIT` fails and the transaction is rolled back.
    Commit,
}

/// An injected failure, matched against statement text.
///
/// ```ignore
/// engine.inject(Fault::statement_containing("CREATE (v:Person").after(1).times(1));
/// ```
#[derive(Debug, Clone)]
pub struct Fault {
    kind: FaultKind,
    pattern: String,
    message: String,
    skip: usize,
    remaining: Option<usize>,
}

impl Fault {
    /// Fail statements whose text contains `pattern`.
    pub fn statement_containing(pattern: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Statement,
            pattern: pattern.into(),
            message: "injected statement failure".to_string(),
            skip: 0,
            remaining: None,
        }
    }

    /// Break the connection on statements whose text contains `pattern`.
    pub fn connection_lost_on(pattern: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Connection,
            pattern: pattern.into(),
            message: "server closed the connection unexpectedly".to_string(),
            skip: 0,
            remaining: None,
        }
    }

    /// Fail `COMMIT`.
    pub fn commit() -> Self {
        Self {
            kind: FaultKind::Commit,
            pattern: "COMMIT".to_string(),
            message: "could not commit transaction".to_string(),
            skip: 0,
            remaining: None,
        }
    }

    /// Set the error message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Let the first `n` matching statements through.
    pub fn after(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Fire at most `n` times.
    pub fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    /// The fault kind.
    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    fn matches(&self, text: &str) -> bool {
        match self.kind {
            FaultKind::Commit => text.trim().eq_ignore_ascii_case("COMMIT"),
            FaultKind::Statement | FaultKind::Connection => text.contains(&self.pattern),
        }
    }

    fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Register one matching statement; returns true when the fault fires.
    pub(crate) fn trigger(&mut self, text: &str) -> bool {
        if self.exhausted() || !self.matches(text) {
            return false;
        }
        if self.skip > 0 {
            self.skip -= 1;
            return false;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        true
    }
}
