use alloc::sync::Arc;
use bytes::BytesMut;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

/// Allocation accounting for every buffer that crosses the ring.
///
/// ## Protocol
/// Each `IoBuffer` registers itself on creation and deregisters exactly once
/// when dropped. A drop with no live buffers on the books means an
/// accounting violation and panics.
pub struct BufferLedger {
    allocated: AtomicUsize,
    released: AtomicUsize,
    live: AtomicUsize,
}

impl BufferLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            allocated: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
        })
    }

    /// Allocates a zero-filled buffer of `len` bytes.
    pub fn zeroed(self: &Arc<Self>, len: usize) -> IoBuffer {
        self.track(BytesMut::zeroed(len))
    }

    /// Allocates a buffer holding a copy of `bytes`.
    pub fn copy_from(self: &Arc<Self>, bytes: &[u8]) -> IoBuffer {
        self.track(BytesMut::from(bytes))
    }

    fn track(self: &Arc<Self>, data: BytesMut) -> IoBuffer {
        self.allocated.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::Release);
        IoBuffer {
            data,
            ledger: Arc::clone(self),
        }
    }

    fn untrack(&self) {
        let prev = self.live.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            panic!("BufferLedger: release recorded with no live buffers");
        }
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    /// Total buffers ever allocated through this ledger.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Total buffers released back.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }

    /// Buffers currently alive (allocated, not yet released).
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl fmt::Debug for BufferLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferLedger")
            .field("allocated", &self.allocated())
            .field("released", &self.released())
            .field("live", &self.live())
            .finish()
    }
}

/// An owned memory block handed to the kernel for scatter/gather I/O.
///
/// The heap block never reallocates after construction, so its address stays
/// valid for the whole time the owning request is in flight.
pub struct IoBuffer {
    data: BytesMut,
    ledger: Arc<BufferLedger>,
}

impl IoBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }
}

impl Deref for IoBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for IoBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for IoBuffer {
    fn drop(&mut self) {
        self.ledger.untrack();
    }
}

impl fmt::Debug for IoBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoBuffer").field("len", &self.data.len()).finish()
    }
}
