#![allow(dead_code)]

use nix::sys::signal::Signal;
use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::Arc;
use zerohttpd_core::{OpKind, ServerConfig, ZhttpdError};
use zerohttpd_dsa::{BufferLedger, InflightArena, Token};
use zerohttpd_transport::{
    Completion, CompletionEngine, CompletionHandle, ConnectionDispatcher, RequestContext,
    ShutdownSignalBridge,
};

pub const LISTENER: RawFd = 3;

/// A `CompletionEngine` whose "kernel" is the test: submissions are parked
/// until the test completes them explicitly, in whatever order it likes.
pub struct ScriptedEngine {
    ledger: Arc<BufferLedger>,
    read_size: usize,
    pending: InflightArena<RequestContext>,
    order: Vec<Token>,
    ready: VecDeque<(Token, RequestContext, i32)>,
    unseen: Option<Token>,
    pub submissions: Vec<(OpKind, Option<RawFd>)>,
    pub closed: Vec<RawFd>,
    pub seen: usize,
    pub shut_down: bool,
}

impl ScriptedEngine {
    pub fn new(read_size: usize) -> Self {
        Self {
            ledger: BufferLedger::new(),
            read_size,
            pending: InflightArena::new(),
            order: Vec::new(),
            ready: VecDeque::new(),
            unseen: None,
            submissions: Vec::new(),
            closed: Vec::new(),
            seen: 0,
            shut_down: false,
        }
    }

    fn park(&mut self, context: RequestContext) -> Result<(), ZhttpdError> {
        if self.shut_down {
            return Err(ZhttpdError::EngineClosed);
        }
        self.submissions.push((context.kind(), context.socket()));
        let token = self.pending.insert(context);
        self.order.push(token);
        Ok(())
    }

    fn find(&self, kind: OpKind, socket: Option<RawFd>) -> Option<Token> {
        self.order.iter().copied().find(|token| match self.pending.get(*token) {
            Some(ctx) => ctx.kind() == kind && (socket.is_none() || ctx.socket() == socket),
            None => false,
        })
    }

    fn take(&mut self, kind: OpKind, socket: Option<RawFd>) -> (Token, RequestContext) {
        let token = self
            .find(kind, socket)
            .unwrap_or_else(|| panic!("no pending {} for {:?}", kind, socket));
        self.order.retain(|t| *t != token);
        let context = self.pending.remove(token).expect("pending context");
        (token, context)
    }

    /// Outstanding submissions of `kind`.
    pub fn pending(&self, kind: OpKind) -> usize {
        self.order
            .iter()
            .filter(|t| self.pending.get(**t).map(|c| c.kind()) == Some(kind))
            .count()
    }

    pub fn complete_accept(&mut self, new_fd: RawFd) {
        let (token, context) = self.take(OpKind::Accept, None);
        self.ready.push_back((token, context, new_fd));
    }

    /// Delivers `bytes` into the pending read on `socket`.
    pub fn complete_read(&mut self, socket: RawFd, bytes: &[u8]) {
        let (token, mut context) = self.take(OpKind::Read, Some(socket));
        let n = match &mut context {
            RequestContext::Read { buffer, .. } => {
                let n = bytes.len().min(buffer.len());
                buffer[..n].copy_from_slice(&bytes[..n]);
                n
            }
            _ => unreachable!(),
        };
        self.ready.push_back((token, context, n as i32));
    }

    /// Payload of the pending write on `socket`, as it would hit the wire.
    pub fn written(&self, socket: RawFd) -> Option<Vec<u8>> {
        let token = self.find(OpKind::Write, Some(socket))?;
        self.pending.get(token).map(payload)
    }

    pub fn write_buffer_count(&self, socket: RawFd) -> Option<usize> {
        let token = self.find(OpKind::Write, Some(socket))?;
        self.pending.get(token).map(|ctx| ctx.buffer_count())
    }

    pub fn complete_write(&mut self, socket: RawFd) {
        let (token, context) = self.take(OpKind::Write, Some(socket));
        let total = context.total_len() as i32;
        self.ready.push_back((token, context, total));
    }

    pub fn complete_write_partial(&mut self, socket: RawFd, sent: i32) {
        let (token, context) = self.take(OpKind::Write, Some(socket));
        self.ready.push_back((token, context, sent));
    }

    pub fn complete_quit(&mut self) {
        let (token, context) = self.take(OpKind::Quit, None);
        self.ready.push_back((token, context, 1));
    }

    /// Completes the pending `kind` operation with `-errno`.
    pub fn fail(&mut self, kind: OpKind, socket: Option<RawFd>, errno: i32) {
        let (token, context) = self.take(kind, socket);
        self.ready.push_back((token, context, -errno));
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

impl CompletionEngine for ScriptedEngine {
    fn ledger(&self) -> &Arc<BufferLedger> {
        &self.ledger
    }

    fn submit_accept(&mut self, listener: RawFd) -> Result<(), ZhttpdError> {
        if self.pending(OpKind::Accept) > 0 {
            return Err(ZhttpdError::ProtocolViolation("second accept".into()));
        }
        self.park(RequestContext::accept(listener))
    }

    fn submit_read(&mut self, socket: RawFd) -> Result<(), ZhttpdError> {
        let buffer = self.ledger.zeroed(self.read_size);
        self.park(RequestContext::Read { socket, buffer })
    }

    fn submit_write(&mut self, context: RequestContext) -> Result<(), ZhttpdError> {
        assert_eq!(context.kind(), OpKind::Write);
        self.park(context)
    }

    fn arm_shutdown_poll(&mut self, relay: RawFd) -> Result<(), ZhttpdError> {
        self.park(RequestContext::Quit { relay })
    }

    fn wait_completion(&mut self) -> Result<Completion, ZhttpdError> {
        if self.unseen.is_some() {
            return Err(ZhttpdError::ProtocolViolation("previous completion not seen".into()));
        }
        let (token, context, result) = self
            .ready
            .pop_front()
            .ok_or_else(|| ZhttpdError::ProtocolViolation("no scripted completion".into()))?;
        self.unseen = Some(token);
        Ok(Completion {
            context,
            result,
            handle: CompletionHandle::new(token),
        })
    }

    fn mark_seen(&mut self, handle: CompletionHandle) {
        assert_eq!(self.unseen.take(), Some(handle.token()), "mark_seen out of order");
        self.seen += 1;
    }

    fn close_socket(&mut self, socket: RawFd) -> Result<(), ZhttpdError> {
        self.closed.push(socket);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
        self.pending.clear();
        self.order.clear();
    }
}

/// Concatenated write payload, as it goes out on the wire.
pub fn payload(context: &RequestContext) -> Vec<u8> {
    match context {
        RequestContext::Write { buffers, .. } => buffers.iter().flat_map(|b| b.iter().copied()).collect(),
        RequestContext::Read { buffer, .. } => buffer.to_vec(),
        RequestContext::Accept { .. } | RequestContext::Quit { .. } => Vec::new(),
    }
}

pub fn config_for(root: &Path) -> ServerConfig {
    ServerConfig {
        public_root: root.to_path_buf(),
        ..ServerConfig::default()
    }
}

/// A dispatcher over a `ScriptedEngine`, primed with its accept and quit poll.
/// SIGUSR2 stands in for the shutdown signal; it is only ever blocked here.
pub fn scripted_dispatcher(config: &ServerConfig) -> ConnectionDispatcher<ScriptedEngine> {
    let bridge = ShutdownSignalBridge::watching(&[Signal::SIGUSR2]).expect("signal bridge");
    let engine = ScriptedEngine::new(config.read_size);
    let mut dispatcher = ConnectionDispatcher::new(engine, LISTENER, bridge, config);
    dispatcher.prime().expect("prime");
    dispatcher
}

/// Runs one request through accept → read → write and returns the bytes
/// that would have been sent. Leaves the write pending.
pub fn request(
    dispatcher: &mut ConnectionDispatcher<ScriptedEngine>,
    fd: RawFd,
    raw: &[u8],
) -> Vec<u8> {
    dispatcher.engine_mut().complete_accept(fd);
    dispatcher.step().expect("accept step");
    dispatcher.engine_mut().complete_read(fd, raw);
    dispatcher.step().expect("read step");
    dispatcher.engine().written(fd).expect("response write")
}

/// Completes the pending write on `fd`.
pub fn finish_write(dispatcher: &mut ConnectionDispatcher<ScriptedEngine>, fd: RawFd) {
    dispatcher.engine_mut().complete_write(fd);
    dispatcher.step().expect("write step");
}
