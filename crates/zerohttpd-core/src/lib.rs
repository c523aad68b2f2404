pub mod config;
pub mod error;
pub mod op;

pub use config::ServerConfig;
pub use error::{classify, Canned, Disposition, Failure, ZhttpdError};
pub use op::OpKind;
