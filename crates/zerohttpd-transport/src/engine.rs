use crate::context::RequestContext;
use io_uring::{opcode, squeue, types, IoUring};
use std::os::unix::io::RawFd;
use std::sync::Arc;
use zerohttpd_core::ZhttpdError;
use zerohttpd_dsa::{BufferLedger, InflightArena, IoBuffer, Token};

/// Proof that a completion was handed out. Returned through `mark_seen`.
#[must_use = "every completion must be marked seen"]
#[derive(Debug, PartialEq, Eq)]
pub struct CompletionHandle {
    token: Token,
}

impl CompletionHandle {
    pub fn new(token: Token) -> Self {
        Self { token }
    }

    pub fn token(&self) -> Token {
        self.token
    }
}

/// A finished operation: the context it was submitted with, back in the
/// caller's hands, and the kernel's result.
#[derive(Debug)]
pub struct Completion {
    pub context: RequestContext,
    /// Negative: errno. Otherwise bytes transferred, or the new descriptor
    /// for an accept.
    pub result: i32,
    pub handle: CompletionHandle,
}

/// The submission/completion contract the dispatcher drives.
///
/// Every submit enqueues and flushes immediately; results only ever arrive
/// through `wait_completion`.
pub trait CompletionEngine {
    /// Ledger every buffer crossing this engine is accounted against.
    fn ledger(&self) -> &Arc<BufferLedger>;

    fn submit_accept(&mut self, listener: RawFd) -> Result<(), ZhttpdError>;

    /// Allocates one zero-filled read buffer and enqueues a scatter read.
    fn submit_read(&mut self, socket: RawFd) -> Result<(), ZhttpdError>;

    /// Enqueues a gather write of the context's existing buffers.
    fn submit_write(&mut self, context: RequestContext) -> Result<(), ZhttpdError>;

    /// Polls the signal-relay descriptor for readability, tagged as Quit.
    fn arm_shutdown_poll(&mut self, relay: RawFd) -> Result<(), ZhttpdError>;

    /// Blocks until one operation completes.
    fn wait_completion(&mut self) -> Result<Completion, ZhttpdError>;

    /// Closes the protocol window of the completion `handle` came from, so
    /// the next `wait_completion` is allowed. The completion queue slot
    /// itself is already back with the ring: `wait_completion` copies the
    /// entry out and advances the queue head before returning.
    fn mark_seen(&mut self, handle: CompletionHandle);

    fn close_socket(&mut self, socket: RawFd) -> Result<(), ZhttpdError>;

    /// Releases the ring. Called once, at the terminal state.
    fn shutdown(&mut self);
}

struct InFlight {
    context: RequestContext,
    iovecs: Vec<libc::iovec>,
}

fn iovec_of(buffer: &mut IoBuffer) -> libc::iovec {
    libc::iovec {
        iov_base: buffer.as_mut_ptr() as *mut libc::c_void,
        iov_len: buffer.len(),
    }
}

impl InFlight {
    /// Builds the SQE for this entry. Every pointer handed to the kernel
    /// refers to heap memory owned by `self`, which stays put while the
    /// entry lives in the arena.
    fn prepare(&mut self, user_data: u64) -> squeue::Entry {
        let InFlight { context, iovecs } = self;
        let entry = match context {
            RequestContext::Accept { listener, peer } => opcode::Accept::new(
                types::Fd(*listener),
                &mut peer.storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
                &mut peer.len as *mut libc::socklen_t,
            )
            .build(),
            RequestContext::Read { socket, buffer } => {
                iovecs.push(iovec_of(buffer));
                opcode::Readv::new(types::Fd(*socket), iovecs.as_ptr(), iovecs.len() as u32).build()
            }
            RequestContext::Write { socket, buffers } => {
                iovecs.extend(buffers.iter_mut().map(iovec_of));
                opcode::Writev::new(types::Fd(*socket), iovecs.as_ptr(), iovecs.len() as u32).build()
            }
            RequestContext::Quit { relay } => {
                opcode::PollAdd::new(types::Fd(*relay), libc::POLLIN as u32).build()
            }
        };
        entry.user_data(user_data)
    }
}

/// `CompletionEngine` backed by a kernel io_uring instance.
pub struct UringEngine {
    // Declared first: the ring must be torn down before the buffers it may
    // still reference are released.
    ring: Option<IoUring>,
    inflight: InflightArena<InFlight>,
    ledger: Arc<BufferLedger>,
    read_size: usize,
    accept_in_flight: bool,
    unseen: Option<Token>,
}

impl UringEngine {
    pub fn new(entries: u32, read_size: usize) -> Result<Self, ZhttpdError> {
        Self::with_ledger(entries, read_size, BufferLedger::new())
    }

    pub fn with_ledger(
        entries: u32,
        read_size: usize,
        ledger: Arc<BufferLedger>,
    ) -> Result<Self, ZhttpdError> {
        let ring = IoUring::builder().build(entries)?;
        tracing::debug!("UringEngine: ring initialized with {} entries", entries);
        Ok(Self {
            ring: Some(ring),
            inflight: InflightArena::with_capacity(entries as usize),
            ledger,
            read_size,
            accept_in_flight: false,
            unseen: None,
        })
    }

    /// Operations submitted and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    fn enqueue(&mut self, context: RequestContext) -> Result<(), ZhttpdError> {
        if self.ring.is_none() {
            return Err(ZhttpdError::EngineClosed);
        }

        let token = self.inflight.insert(InFlight {
            context,
            iovecs: Vec::new(),
        });
        let entry = match self.inflight.get_mut(token) {
            Some(slot) => slot.prepare(token.user_data()),
            None => {
                return Err(ZhttpdError::ProtocolViolation(format!(
                    "in-flight slot {:#x} vanished before submission",
                    token.user_data()
                )))
            }
        };

        let Some(ring) = self.ring.as_mut() else {
            return Err(ZhttpdError::EngineClosed);
        };

        // # Safety: the entry's pointers target memory owned by the arena
        // slot, which is only released after the matching CQE is reaped or
        // after the ring itself is gone.
        let pushed = unsafe { ring.submission().push(&entry) };
        if pushed.is_err() {
            self.inflight.remove(token);
            return Err(ZhttpdError::SubmissionQueueFull);
        }

        ring.submit()?;
        Ok(())
    }
}

impl CompletionEngine for UringEngine {
    fn ledger(&self) -> &Arc<BufferLedger> {
        &self.ledger
    }

    fn submit_accept(&mut self, listener: RawFd) -> Result<(), ZhttpdError> {
        if self.accept_in_flight {
            return Err(ZhttpdError::ProtocolViolation(
                "accept submitted while another is outstanding".into(),
            ));
        }
        self.enqueue(RequestContext::accept(listener))?;
        self.accept_in_flight = true;
        Ok(())
    }

    fn submit_read(&mut self, socket: RawFd) -> Result<(), ZhttpdError> {
        let buffer = self.ledger.zeroed(self.read_size);
        self.enqueue(RequestContext::Read { socket, buffer })
    }

    fn submit_write(&mut self, context: RequestContext) -> Result<(), ZhttpdError> {
        if !matches!(context, RequestContext::Write { .. }) {
            return Err(ZhttpdError::ProtocolViolation(format!(
                "submit_write given a {} context",
                context.kind()
            )));
        }
        self.enqueue(context)
    }

    fn arm_shutdown_poll(&mut self, relay: RawFd) -> Result<(), ZhttpdError> {
        self.enqueue(RequestContext::Quit { relay })
    }

    fn wait_completion(&mut self) -> Result<Completion, ZhttpdError> {
        if let Some(token) = self.unseen {
            return Err(ZhttpdError::ProtocolViolation(format!(
                "completion {:#x} was never marked seen",
                token.user_data()
            )));
        }

        let ring = self.ring.as_mut().ok_or(ZhttpdError::EngineClosed)?;
        let cqe = loop {
            if let Some(cqe) = ring.completion().next() {
                break cqe;
            }
            match ring.submit_and_wait(1) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        };

        let token = Token::from_user_data(cqe.user_data());
        let InFlight { context, .. } = self
            .inflight
            .remove(token)
            .ok_or(ZhttpdError::UnknownCompletion(cqe.user_data()))?;

        if matches!(context, RequestContext::Accept { .. }) {
            self.accept_in_flight = false;
        }
        self.unseen = Some(token);

        Ok(Completion {
            context,
            result: cqe.result(),
            handle: CompletionHandle::new(token),
        })
    }

    /// A handle for any completion other than the pending one is logged and
    /// leaves the window open.
    fn mark_seen(&mut self, handle: CompletionHandle) {
        match self.unseen {
            Some(token) if token == handle.token() => self.unseen = None,
            _ => tracing::warn!(
                "UringEngine: mark_seen for {:#x} which is not the pending completion",
                handle.token().user_data()
            ),
        }
    }

    fn close_socket(&mut self, socket: RawFd) -> Result<(), ZhttpdError> {
        nix::unistd::close(socket)?;
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(ring) = self.ring.take() {
            drop(ring);
            let released = self.inflight.clear();
            tracing::info!("UringEngine: ring released, {} outstanding operations dropped", released);
        }
        self.accept_in_flight = false;
        self.unseen = None;
    }
}
