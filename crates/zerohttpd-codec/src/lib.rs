pub mod request;
pub mod templates;

pub use request::{find_request_line, parse_request_line, Method, RequestLine, RequestLineError};
pub use templates::{canned_body, content_type_line, mime_for_extension, FileHeaders};
