pub use zerohttpd_core::{OpKind, ServerConfig, ZhttpdError};
pub mod context;
pub mod engine;
pub mod signal;
pub mod responder;
pub mod dispatcher;
pub mod server;

pub use context::{PeerAddr, RequestContext, MAX_WRITE_BUFFERS};
pub use engine::{Completion, CompletionEngine, CompletionHandle, UringEngine};
pub use signal::ShutdownSignalBridge;
pub use responder::{Served, StaticFileResponder};
pub use dispatcher::{Action, ConnectionDispatcher, DispatchStats, Transition};
pub use server::{BoundServer, ZeroServer};
