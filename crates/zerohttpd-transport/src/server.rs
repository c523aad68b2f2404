use crate::dispatcher::{ConnectionDispatcher, DispatchStats};
use crate::engine::UringEngine;
use crate::signal::{ShutdownSignalBridge, DEFAULT_SHUTDOWN_SIGNALS};
use nix::sys::signal::Signal;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use zerohttpd_core::{ServerConfig, ZhttpdError};

pub struct ZeroServer {
    config: ServerConfig,
    signals: Vec<Signal>,
}

impl ZeroServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            signals: DEFAULT_SHUTDOWN_SIGNALS.to_vec(),
        }
    }

    /// Replaces the signals that stop the server.
    pub fn with_shutdown_signals(mut self, signals: &[Signal]) -> Self {
        self.signals = signals.to_vec();
        self
    }

    /// Opens the listening socket, the signal relay and the ring. Must run on
    /// the thread that will call `serve`.
    pub fn bind(self) -> Result<BoundServer, ZhttpdError> {
        self.config.validate()?;
        let addr = self.config.listen_addr()?;

        let listener = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        listener.set_reuse_address(true)?;
        listener.bind(&addr.into())?;
        listener.listen(self.config.backlog)?;
        let local_addr = listener
            .local_addr()?
            .as_socket()
            .ok_or_else(|| ZhttpdError::Config(format!("{} is not an inet address", addr)))?;

        let bridge = ShutdownSignalBridge::watching(&self.signals)?;
        let engine = UringEngine::new(self.config.queue_depth, self.config.read_size)?;
        let dispatcher =
            ConnectionDispatcher::new(engine, listener.as_raw_fd(), bridge, &self.config);

        tracing::info!("Serving on port : {}", local_addr.port());
        Ok(BoundServer {
            dispatcher,
            listener,
            local_addr,
        })
    }

    /// Binds and serves until a shutdown signal arrives.
    pub fn start(self) -> Result<DispatchStats, ZhttpdError> {
        self.bind()?.serve()
    }
}

/// A server with its listener open, ready to run the dispatch loop.
pub struct BoundServer {
    // Dropped before the listener so no accept is outstanding when it closes.
    dispatcher: ConnectionDispatcher<UringEngine>,
    #[allow(dead_code)]
    listener: Socket,
    local_addr: SocketAddr,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn serve(mut self) -> Result<DispatchStats, ZhttpdError> {
        self.dispatcher.run()
    }
}
