use crate::op::OpKind;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ZhttpdError {
    Transport(std::io::Error),
    ProtocolViolation(String),
    Config(String),
    SubmissionQueueFull,
    /// A completion carried a negative result.
    CompletionFailed { kind: OpKind, errno: i32 },
    /// No CRLF inside the request-line scan window.
    MalformedRequest { scanned: usize },
    UnknownCompletion(u64),
    EngineClosed,
}

impl From<std::io::Error> for ZhttpdError {
    fn from(e: std::io::Error) -> Self {
        ZhttpdError::Transport(e)
    }
}

impl From<nix::errno::Errno> for ZhttpdError {
    fn from(e: nix::errno::Errno) -> Self {
        ZhttpdError::Transport(e.into())
    }
}

impl fmt::Display for ZhttpdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZhttpdError::Transport(e) => write!(f, "transport error: {}", e),
            ZhttpdError::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            ZhttpdError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            ZhttpdError::SubmissionQueueFull => f.write_str("submission queue full"),
            ZhttpdError::CompletionFailed { kind, errno } => write!(
                f,
                "async request failed: {} for event: {}",
                std::io::Error::from_raw_os_error(*errno),
                kind
            ),
            ZhttpdError::MalformedRequest { scanned } => {
                write!(f, "malformed request: no line terminator in first {} bytes", scanned)
            }
            ZhttpdError::UnknownCompletion(user_data) => {
                write!(f, "completion for unknown request {:#x}", user_data)
            }
            ZhttpdError::EngineClosed => f.write_str("engine already shut down"),
        }
    }
}

impl std::error::Error for ZhttpdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ZhttpdError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// Fixed response bodies sent in place of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canned {
    NotFound,
    Unimplemented,
}

/// Everything that can go wrong while acting on a completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    CompletionFailed { kind: OpKind, errno: i32 },
    MalformedRequest { scanned: usize },
    /// Request line without a usable path token.
    BadRequestLine,
    UnsupportedMethod(String),
    FileMissing(PathBuf),
    NotRegularFile(PathBuf),
    FileUnreadable(PathBuf),
    TraversalRejected(String),
    EmptyRead,
    ShortRead { path: PathBuf, expected: u64, got: usize },
    ShortWrite { expected: usize, got: usize },
}

/// What the dispatcher does about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Stop the server.
    Fatal,
    /// Answer the affected client with a canned body.
    Respond(Canned),
    /// Note it and carry on.
    LogOnly,
}

/// The one place failures are sorted into fatal, answered, or merely logged.
pub fn classify(failure: &Failure) -> Disposition {
    match failure {
        Failure::CompletionFailed { .. } | Failure::MalformedRequest { .. } => Disposition::Fatal,
        Failure::BadRequestLine | Failure::UnsupportedMethod(_) => {
            Disposition::Respond(Canned::Unimplemented)
        }
        Failure::FileMissing(_)
        | Failure::NotRegularFile(_)
        | Failure::FileUnreadable(_)
        | Failure::TraversalRejected(_) => Disposition::Respond(Canned::NotFound),
        Failure::EmptyRead | Failure::ShortRead { .. } | Failure::ShortWrite { .. } => {
            Disposition::LogOnly
        }
    }
}

impl Failure {
    /// The error a fatal failure terminates the run loop with.
    pub fn into_error(self) -> ZhttpdError {
        match self {
            Failure::CompletionFailed { kind, errno } => ZhttpdError::CompletionFailed { kind, errno },
            Failure::MalformedRequest { scanned } => ZhttpdError::MalformedRequest { scanned },
            other => ZhttpdError::ProtocolViolation(format!("non-fatal failure escalated: {:?}", other)),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::CompletionFailed { kind, errno } => write!(
                f,
                "{} failed: {}",
                kind,
                std::io::Error::from_raw_os_error(*errno)
            ),
            Failure::MalformedRequest { scanned } => {
                write!(f, "malformed request ({} bytes scanned)", scanned)
            }
            Failure::BadRequestLine => f.write_str("request line has no usable path"),
            Failure::UnsupportedMethod(method) => write!(f, "unimplemented method {}", method),
            Failure::FileMissing(path) => write!(f, "404 Not Found: ({})", path.display()),
            Failure::NotRegularFile(path) => write!(f, "404 Not Found: {}", path.display()),
            Failure::FileUnreadable(path) => write!(f, "cannot open {}", path.display()),
            Failure::TraversalRejected(path) => write!(f, "path escapes public root: {}", path),
            Failure::EmptyRead => f.write_str("Empty request!"),
            Failure::ShortRead { path, expected, got } => write!(
                f,
                "Encountered a short read on {}: {} of {} bytes",
                path.display(),
                got,
                expected
            ),
            Failure::ShortWrite { expected, got } => {
                write!(f, "short write: {} of {} bytes sent", got, expected)
            }
        }
    }
}
