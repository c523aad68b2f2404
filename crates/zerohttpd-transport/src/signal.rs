//! # Shutdown Signal Bridge
//!
//! Termination signals are blocked for the serving thread and routed into a
//! `signalfd`. The signalfd is registered (one-shot, edge-triggered) with an
//! epoll instance, and the epoll descriptor is what the ring polls: a poll on
//! a bare signalfd would be evaluated against the kernel worker's signal
//! state, not the server thread's.

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use std::os::unix::io::{AsRawFd, RawFd};
use zerohttpd_core::ZhttpdError;

pub const DEFAULT_SHUTDOWN_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGTERM];

pub struct ShutdownSignalBridge {
    epoll: Epoll,
    signal_fd: SignalFd,
    signals: Vec<Signal>,
}

impl ShutdownSignalBridge {
    /// Watches SIGINT and SIGTERM.
    pub fn new() -> Result<Self, ZhttpdError> {
        Self::watching(&DEFAULT_SHUTDOWN_SIGNALS)
    }

    /// Blocks `signals` on the calling thread and relays them through an
    /// epoll descriptor. Must be called from the thread that runs the loop.
    pub fn watching(signals: &[Signal]) -> Result<Self, ZhttpdError> {
        let mut mask = SigSet::empty();
        for signal in signals {
            mask.add(*signal);
        }
        mask.thread_block()?;

        let signal_fd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)?;
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
        epoll.add(
            &signal_fd,
            EpollEvent::new(
                EpollFlags::EPOLLIN | EpollFlags::EPOLLET | EpollFlags::EPOLLONESHOT,
                signal_fd.as_raw_fd() as u64,
            ),
        )?;

        tracing::debug!("ShutdownSignalBridge: relaying {:?}", signals);
        Ok(Self {
            epoll,
            signal_fd,
            signals: signals.to_vec(),
        })
    }

    /// The auxiliary descriptor the engine polls.
    pub fn relay_fd(&self) -> RawFd {
        self.epoll.0.as_raw_fd()
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    /// Consumes one pending signal, if any, and reports which it was.
    pub fn take_signal(&mut self) -> Result<Option<Signal>, ZhttpdError> {
        match self.signal_fd.read_signal()? {
            Some(info) => Ok(Signal::try_from(info.ssi_signo as i32).ok()),
            None => Ok(None),
        }
    }
}
