use std::path::Path;
use zerohttpd_core::Canned;

pub const STATUS_OK: &str = "HTTP/1.0 200 OK\r\n";
pub const HEADER_TERMINATOR: &str = "\r\n";

pub const UNIMPLEMENTED_CONTENT: &str = "HTTP/1.0 400 Bad Request\r\n\
Content-type: text/html\r\n\
\r\n\
<html>\
<head>\
<title>ZeroHTTPd: Unimplemented</title>\
</head>\
<body>\
<h1>Bad Request (Unimplemented)</h1>\
<p>Your client sent a request ZeroHTTPd did not understand and it is probably not your fault.</p>\
</body>\
</html>";

pub const NOT_FOUND_CONTENT: &str = "HTTP/1.0 404 Not Found\r\n\
Content-type: text/html\r\n\
\r\n\
<html>\
<head>\
<title>ZeroHTTPd: Not Found</title>\
</head>\
<body>\
<h1>Not Found (404)</h1>\
<p>Your client is asking for an object that was not found on this server.</p>\
</body>\
</html>";

/// The complete wire bytes for a canned response, status line included.
pub fn canned_body(canned: Canned) -> &'static [u8] {
    match canned {
        Canned::NotFound => NOT_FOUND_CONTENT.as_bytes(),
        Canned::Unimplemented => UNIMPLEMENTED_CONTENT.as_bytes(),
    }
}

/// Maps a file extension to its MIME type, ignoring case.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "htm" | "html" => "text/html",
        "js" => "application/javascript",
        "css" => "text/css",
        "txt" => "text/plain",
        _ => return None,
    };
    Some(mime)
}

/// The `Content-Type` header line for `path`. Empty when the extension is
/// missing or not in the table.
pub fn content_type_line(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(mime_for_extension)
        .map(|mime| format!("Content-Type: {}\r\n", mime))
        .unwrap_or_default()
}

/// Header block of a file response, one entry per scatter buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeaders {
    pub status: &'static str,
    pub server: String,
    pub content_type: String,
    pub content_length: String,
    pub terminator: &'static str,
}

impl FileHeaders {
    /// `banner` is the complete `Server:` line, CRLF included.
    pub fn new(banner: &str, path: &Path, len: u64) -> Self {
        Self {
            status: STATUS_OK,
            server: banner.to_string(),
            content_type: content_type_line(path),
            content_length: format!("content-length: {}\r\n", len),
            terminator: HEADER_TERMINATOR,
        }
    }

    /// The five header buffers in wire order.
    pub fn parts(&self) -> [&[u8]; 5] {
        [
            self.status.as_bytes(),
            self.server.as_bytes(),
            self.content_type.as_bytes(),
            self.content_length.as_bytes(),
            self.terminator.as_bytes(),
        ]
    }
}
