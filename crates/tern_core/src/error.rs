use crate::handle::{HandleId, HandleKind};
use std::io;
use thiserror::Error;

/// Errors produced by loop operations and carried by completions.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("failed to start the I/O runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("unknown handle {0}")]
    BadHandle(HandleId),

    #[error("{op}: expected a {expected} handle, got {actual}")]
    WrongKind {
        op: &'static str,
        expected: HandleKind,
        actual: HandleKind,
    },

    #[error("{op}: {reason}")]
    InvalidState {
        op: &'static str,
        reason: &'static str,
    },

    #[error("{op}: socket is not connected")]
    NotConnected { op: &'static str },

    #[error("accept: no pending connection")]
    WouldBlock,

    #[error("operation canceled")]
    Canceled,
}

impl LoopError {
    pub(crate) fn io(op: &'static str, source: io::Error) -> Self {
        LoopError::Io { op, source }
    }

    /// Error code named after the matching errno, as scripts see it.
    pub fn code(&self) -> &'static str {
        match self {
            LoopError::Runtime(_) => "EIO",
            LoopError::Io { source, .. } => io_code(source),
            LoopError::BadHandle(_) => "EBADF",
            LoopError::WrongKind { .. } | LoopError::InvalidState { .. } => "EINVAL",
            LoopError::NotConnected { .. } => "ENOTCONN",
            LoopError::WouldBlock => "EAGAIN",
            LoopError::Canceled => "ECANCELED",
        }
    }
}

fn io_code(err: &io::Error) -> &'static str {
    use io::ErrorKind::*;
    match err.kind() {
        ConnectionRefused => "ECONNREFUSED",
        ConnectionReset => "ECONNRESET",
        ConnectionAborted => "ECONNABORTED",
        NotConnected => "ENOTCONN",
        AddrInUse => "EADDRINUSE",
        AddrNotAvailable => "EADDRNOTAVAIL",
        BrokenPipe => "EPIPE",
        TimedOut => "ETIMEDOUT",
        PermissionDenied => "EACCES",
        InvalidInput => "EINVAL",
        WouldBlock => "EAGAIN",
        Interrupted => "EINTR",
        NotFound => "ENOENT",
        UnexpectedEof => "EOF",
        _ => "EIO",
    }
}
