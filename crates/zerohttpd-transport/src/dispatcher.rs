use crate::context::RequestContext;
use crate::engine::{Completion, CompletionEngine};
use crate::responder::StaticFileResponder;
use crate::signal::ShutdownSignalBridge;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use zerohttpd_codec::{parse_request_line, Method, RequestLineError};
use zerohttpd_core::{classify, Disposition, Failure, ServerConfig, ZhttpdError};

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub accepted: u64,
    pub requests: u64,
    pub files_served: u64,
    pub canned_responses: u64,
    pub closed: u64,
    pub empty_reads: u64,
}

/// What a completion asks the loop to do next.
#[derive(Debug)]
pub enum Action {
    SubmitAccept,
    SubmitRead(RawFd),
    SubmitWrite(RequestContext),
    Close(RawFd),
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Continue,
    Terminate,
}

/// The run loop: one blocking wait per iteration, one transition per
/// completion.
///
/// | completion | action |
/// |---|---|
/// | Accept (fd) | resubmit accept, submit read on fd |
/// | Read (0) | log, close |
/// | Read (n) | parse, submit write |
/// | Write | release buffers, close |
/// | Quit | terminate |
pub struct ConnectionDispatcher<E: CompletionEngine> {
    engine: E,
    listener: RawFd,
    responder: StaticFileResponder,
    bridge: Option<ShutdownSignalBridge>,
    request_line_limit: usize,
    stats: DispatchStats,
}

impl<E: CompletionEngine> ConnectionDispatcher<E> {
    pub fn new(
        engine: E,
        listener: RawFd,
        bridge: ShutdownSignalBridge,
        config: &ServerConfig,
    ) -> Self {
        let responder = StaticFileResponder::new(config, Arc::clone(engine.ledger()));
        Self {
            engine,
            listener,
            responder,
            bridge: Some(bridge),
            request_line_limit: config.request_line_limit,
            stats: DispatchStats::default(),
        }
    }

    /// Submits the first accept and arms the shutdown poll.
    pub fn prime(&mut self) -> Result<(), ZhttpdError> {
        let relay = match &self.bridge {
            Some(bridge) => bridge.relay_fd(),
            None => return Err(ZhttpdError::EngineClosed),
        };
        self.engine.submit_accept(self.listener)?;
        self.engine.arm_shutdown_poll(relay)
    }

    /// Primes the engine and dispatches until a Quit completion arrives.
    pub fn run(&mut self) -> Result<DispatchStats, ZhttpdError> {
        self.prime()?;
        while self.step()? == Transition::Continue {}
        Ok(self.stats)
    }

    /// Waits for one completion and acts on it.
    pub fn step(&mut self) -> Result<Transition, ZhttpdError> {
        let Completion {
            context,
            result,
            handle,
        } = self.engine.wait_completion()?;

        let outcome = self
            .transition(context, result)
            .and_then(|actions| self.apply(actions));
        self.engine.mark_seen(handle);

        let transition = outcome?;
        if transition == Transition::Terminate {
            self.finish();
        }
        Ok(transition)
    }

    /// Maps one completion to the actions it calls for. The context is
    /// consumed here; its buffers are released when this returns.
    pub fn transition(
        &mut self,
        context: RequestContext,
        result: i32,
    ) -> Result<Vec<Action>, ZhttpdError> {
        if result < 0 {
            let kind = context.kind();
            let socket = context.socket();
            let failure = Failure::CompletionFailed {
                kind,
                errno: -result,
            };
            return match (self.settle(failure, socket.unwrap_or(-1))?, socket) {
                (settled, Some(socket)) => Ok(vec![Self::reply_or(settled, Action::Close(socket))]),
                (None, None) => Ok(Vec::new()),
                (Some(_), None) => Err(ZhttpdError::ProtocolViolation(format!(
                    "{} failure has no client to answer",
                    kind
                ))),
            };
        }

        let expected = context.total_len();
        match context {
            RequestContext::Accept { peer, .. } => {
                self.stats.accepted += 1;
                match peer.socket_addr() {
                    Some(addr) => tracing::debug!("Accepted {} as fd {}", addr, result),
                    None => tracing::debug!("Accepted fd {}", result),
                }
                Ok(vec![Action::SubmitAccept, Action::SubmitRead(result)])
            }
            RequestContext::Read { socket, buffer } => {
                if result == 0 {
                    self.stats.empty_reads += 1;
                    let settled = self.settle(Failure::EmptyRead, socket)?;
                    return Ok(vec![Self::reply_or(settled, Action::Close(socket))]);
                }
                self.stats.requests += 1;
                let received = &buffer[..(result as usize).min(buffer.len())];
                let response = self.handle_request(received, socket)?;
                Ok(vec![Action::SubmitWrite(response)])
            }
            RequestContext::Write { socket, buffers } => {
                drop(buffers);
                let sent = result as usize;
                if sent < expected {
                    let settled = self.settle(Failure::ShortWrite { expected, got: sent }, socket)?;
                    return Ok(vec![Self::reply_or(settled, Action::Close(socket))]);
                }
                Ok(vec![Action::Close(socket)])
            }
            RequestContext::Quit { .. } => Ok(vec![Action::Terminate]),
        }
    }

    /// A settled response goes out in place of `otherwise`; the connection
    /// then closes when that write completes.
    fn reply_or(settled: Option<RequestContext>, otherwise: Action) -> Action {
        match settled {
            Some(response) => Action::SubmitWrite(response),
            None => otherwise,
        }
    }

    fn apply(&mut self, actions: Vec<Action>) -> Result<Transition, ZhttpdError> {
        let mut transition = Transition::Continue;
        for action in actions {
            match action {
                Action::SubmitAccept => self.engine.submit_accept(self.listener)?,
                Action::SubmitRead(socket) => self.engine.submit_read(socket)?,
                Action::SubmitWrite(context) => self.engine.submit_write(context)?,
                Action::Close(socket) => {
                    if let Err(e) = self.engine.close_socket(socket) {
                        tracing::warn!("close({}) failed: {}", socket, e);
                    }
                    self.stats.closed += 1;
                }
                Action::Terminate => transition = Transition::Terminate,
            }
        }
        Ok(transition)
    }

    /// Parses the request line and produces the Write context answering it.
    fn handle_request(&mut self, data: &[u8], socket: RawFd) -> Result<RequestContext, ZhttpdError> {
        let request = match parse_request_line(data, self.request_line_limit) {
            Ok(request) => request,
            Err(RequestLineError::Unterminated { scanned }) => {
                return self.answer(Failure::MalformedRequest { scanned }, socket)
            }
        };

        let path = match (request.method, request.path) {
            (Method::Get, Some(path)) => path,
            (Method::Get, None) => return self.answer(Failure::BadRequestLine, socket),
            (Method::Other(method), _) => {
                return self.answer(Failure::UnsupportedMethod(method), socket)
            }
        };

        match self.responder.respond(&path, socket) {
            Ok(served) => {
                self.stats.files_served += 1;
                let Some(failure) = served.short_read else {
                    return Ok(served.context);
                };
                Ok(self.settle(failure, socket)?.unwrap_or(served.context))
            }
            Err(failure) => self.answer(failure, socket),
        }
    }

    /// Settles a failure that must end in a response.
    fn answer(&mut self, failure: Failure, socket: RawFd) -> Result<RequestContext, ZhttpdError> {
        self.settle(failure, socket)?.ok_or_else(|| {
            ZhttpdError::ProtocolViolation("request failure produced no response".into())
        })
    }

    /// Applies the classification of `failure`: fatal failures become the
    /// loop's error, answerable ones become a canned Write context the
    /// caller must submit.
    #[must_use = "an answerable failure carries a response to submit"]
    fn settle(
        &mut self,
        failure: Failure,
        socket: RawFd,
    ) -> Result<Option<RequestContext>, ZhttpdError> {
        match classify(&failure) {
            Disposition::Fatal => Err(failure.into_error()),
            Disposition::Respond(canned) => {
                tracing::info!("{}", failure);
                self.stats.canned_responses += 1;
                Ok(Some(self.responder.respond_canned(canned, socket)))
            }
            Disposition::LogOnly => {
                tracing::warn!("{}", failure);
                Ok(None)
            }
        }
    }

    /// Terminal state: release the ring, then close the relay descriptor.
    fn finish(&mut self) {
        self.engine.shutdown();
        if let Some(mut bridge) = self.bridge.take() {
            match bridge.take_signal() {
                Ok(Some(signal)) => tracing::info!("Received {}, shutting down", signal),
                Ok(None) => tracing::info!("Shutdown relay fired for {:?}, shutting down", bridge.signals()),
                Err(e) => tracing::warn!("Could not read shutdown signal: {}", e),
            }
        }
        tracing::info!("Dispatch finished: {:?}", self.stats);
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// True once the Quit completion has been processed.
    pub fn is_terminated(&self) -> bool {
        self.bridge.is_none()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}
