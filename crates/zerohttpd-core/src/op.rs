use std::fmt;

/// The kind of asynchronous operation a request context describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Accept,
    Read,
    Write,
    /// Poll on the signal-relay descriptor.
    Quit,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Accept => "accept",
            OpKind::Read => "read",
            OpKind::Write => "write",
            OpKind::Quit => "quit",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
