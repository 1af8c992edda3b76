//! Events posted by loop tasks and the completions they turn into.

use std::io;

use tokio::net::TcpStream;

use crate::error::LoopError;
use crate::handle::{HandleId, RequestId, RequestKind};

/// A finished piece of work, handed to the dispatcher passed to
/// [`EventLoop::run`](crate::EventLoop::run).
#[derive(Debug)]
pub enum Completion {
    /// A started timer fired.
    Timer { handle: HandleId },
    /// A listening socket has a connection ready to `accept`.
    Connection {
        handle: HandleId,
        result: Result<(), LoopError>,
    },
    /// Data read from a stream. `Ok(None)` is end of stream; reading stops
    /// after it and after any error.
    Read {
        handle: HandleId,
        result: Result<Option<Vec<u8>>, LoopError>,
    },
    /// A connect, write or shutdown request finished.
    Request {
        request: RequestId,
        handle: HandleId,
        kind: RequestKind,
        result: Result<(), LoopError>,
    },
    /// A closed handle is gone; no further completions will name it.
    Closed { handle: HandleId },
}

impl Completion {
    pub fn handle(&self) -> HandleId {
        match self {
            Completion::Timer { handle }
            | Completion::Connection { handle, .. }
            | Completion::Read { handle, .. }
            | Completion::Request { handle, .. }
            | Completion::Closed { handle } => *handle,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Completion::Timer { .. } => "timer",
            Completion::Connection { .. } => "connection",
            Completion::Read { .. } => "read",
            Completion::Request { kind: RequestKind::Connect, .. } => "connect",
            Completion::Request { kind: RequestKind::Write, .. } => "write",
            Completion::Request { kind: RequestKind::Shutdown, .. } => "shutdown",
            Completion::Closed { .. } => "closed",
        }
    }
}

/// Raw notifications sent from tasks to the loop thread.
pub(crate) enum Event {
    TimerFired {
        handle: HandleId,
        generation: u64,
    },
    Incoming {
        handle: HandleId,
        result: io::Result<TcpStream>,
    },
    Connected {
        handle: HandleId,
        request: RequestId,
        result: io::Result<TcpStream>,
    },
    Read {
        handle: HandleId,
        generation: u64,
        result: io::Result<Option<Vec<u8>>>,
    },
    RequestDone {
        request: RequestId,
        result: Result<(), LoopError>,
    },
    Closed {
        handle: HandleId,
    },
}
