use std::fmt;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use zerohttpd_core::OpKind;
use zerohttpd_dsa::IoBuffer;

/// Status line, banner, content type, content length, blank line, body.
pub const MAX_WRITE_BUFFERS: usize = 6;

/// Address storage the kernel fills in when an accept completes.
pub struct PeerAddr {
    pub(crate) storage: libc::sockaddr_storage,
    pub(crate) len: libc::socklen_t,
}

impl PeerAddr {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            // # Safety: sockaddr_storage is plain old data; all-zero is a valid value.
            storage: unsafe { std::mem::zeroed() },
            len: std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t,
        })
    }

    /// The peer address, once the kernel has written one.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        // # Safety: `len` never exceeds the storage size; the kernel clamps it on accept.
        let addr = unsafe { socket2::SockAddr::new(self.storage, self.len) };
        addr.as_socket()
    }
}

/// One outstanding asynchronous operation and everything it owns.
///
/// ## Ownership
/// A context is moved into the engine when submitted and handed back, whole,
/// with its completion. Buffers are released when the context returned by a
/// completion is dropped, and never before.
pub enum RequestContext {
    Accept { listener: RawFd, peer: Box<PeerAddr> },
    Read { socket: RawFd, buffer: IoBuffer },
    Write { socket: RawFd, buffers: Vec<IoBuffer> },
    Quit { relay: RawFd },
}

impl RequestContext {
    pub fn accept(listener: RawFd) -> Self {
        RequestContext::Accept {
            listener,
            peer: PeerAddr::new(),
        }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            RequestContext::Accept { .. } => OpKind::Accept,
            RequestContext::Read { .. } => OpKind::Read,
            RequestContext::Write { .. } => OpKind::Write,
            RequestContext::Quit { .. } => OpKind::Quit,
        }
    }

    /// The client connection this operation concerns, if any.
    pub fn socket(&self) -> Option<RawFd> {
        match self {
            RequestContext::Read { socket, .. } | RequestContext::Write { socket, .. } => Some(*socket),
            RequestContext::Accept { .. } | RequestContext::Quit { .. } => None,
        }
    }

    pub fn buffer_count(&self) -> usize {
        match self {
            RequestContext::Read { .. } => 1,
            RequestContext::Write { buffers, .. } => buffers.len(),
            RequestContext::Accept { .. } | RequestContext::Quit { .. } => 0,
        }
    }

    /// Sum of all buffer lengths.
    pub fn total_len(&self) -> usize {
        match self {
            RequestContext::Read { buffer, .. } => buffer.len(),
            RequestContext::Write { buffers, .. } => buffers.iter().map(|b| b.len()).sum(),
            RequestContext::Accept { .. } | RequestContext::Quit { .. } => 0,
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("kind", &self.kind())
            .field("socket", &self.socket())
            .field("buffers", &self.buffer_count())
            .finish()
    }
}
