//! Request-line extraction. Only the first line of a request is ever looked
//! at; headers and body are ignored.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    /// Any other method, lower-cased.
    Other(String),
}

impl Method {
    /// Case-folds the method token. Only `GET` is recognized.
    pub fn parse(token: &[u8]) -> Self {
        let folded = token.to_ascii_lowercase();
        if folded == b"get" {
            Method::Get
        } else {
            Method::Other(String::from_utf8_lossy(&folded).into_owned())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    /// The raw path token. Not required to be UTF-8.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestLineError {
    /// No CRLF started within the scan window.
    Unterminated { scanned: usize },
}

/// Returns the bytes before the first CRLF, provided the CR sits within the
/// first `limit` bytes of `data`.
pub fn find_request_line(data: &[u8], limit: usize) -> Option<&[u8]> {
    data.windows(2)
        .take(limit)
        .position(|pair| pair == b"\r\n")
        .map(|end| &data[..end])
}

/// Splits the request line into method and path on runs of spaces.
pub fn parse_request_line(data: &[u8], limit: usize) -> Result<RequestLine, RequestLineError> {
    let line = find_request_line(data, limit).ok_or(RequestLineError::Unterminated {
        scanned: data.len().min(limit),
    })?;

    let mut tokens = line.split(|b| *b == b' ').filter(|t| !t.is_empty());
    let method = Method::parse(tokens.next().unwrap_or(b""));
    let path = tokens.next().map(|t| PathBuf::from(OsStr::from_bytes(t)));

    Ok(RequestLine { method, path })
}
