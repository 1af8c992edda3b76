//! Handle and request identifiers, plus the per-handle state the loop keeps.

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// Opaque identifier of a long-lived loop resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        HandleId(bits)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a one-shot operation (connect, write, shutdown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub(crate) fn from_bits(bits: u64) -> Self {
        RequestId(bits)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Timer,
    Tcp,
}

impl HandleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HandleKind::Timer => "timer",
            HandleKind::Tcp => "tcp",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Connect,
    Write,
    Shutdown,
}

// ============================================================================
// Internal state
// ============================================================================

pub(crate) struct Handle {
    pub flags: HandleFlags,
    pub state: HandleState,
    /// Request tasks still attached to this handle; aborted on close.
    pub tasks: Tasks,
}

impl Handle {
    pub fn new(state: HandleState) -> Self {
        Self {
            flags: HandleFlags {
                active: false,
                referenced: true,
            },
            state,
            tasks: Tasks::default(),
        }
    }

    pub fn kind(&self) -> HandleKind {
        match self.state {
            HandleState::Timer(_) => HandleKind::Timer,
            HandleState::Tcp(_) => HandleKind::Tcp,
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.tasks.abort_all();
        match &mut self.state {
            HandleState::Timer(timer) => timer.cancel(),
            HandleState::Tcp(TcpState::Listening(listener)) => listener.accept_task.abort(),
            HandleState::Tcp(TcpState::Connected(conn)) => conn.cancel_read(),
            HandleState::Tcp(_) => {}
        }
    }
}

/// Liveness bookkeeping. Setters return the change in loop references.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HandleFlags {
    pub active: bool,
    pub referenced: bool,
}

impl HandleFlags {
    /// True when the handle keeps the loop alive.
    pub fn holds_ref(&self) -> bool {
        self.active && self.referenced
    }

    pub fn set_active(&mut self, active: bool) -> i64 {
        let before = self.holds_ref();
        self.active = active;
        ref_delta(before, self.holds_ref())
    }

    pub fn set_referenced(&mut self, referenced: bool) -> i64 {
        let before = self.holds_ref();
        self.referenced = referenced;
        ref_delta(before, self.holds_ref())
    }
}

fn ref_delta(before: bool, after: bool) -> i64 {
    match (before, after) {
        (false, true) => 1,
        (true, false) => -1,
        _ => 0,
    }
}

#[derive(Default)]
pub(crate) struct Tasks(Vec<JoinHandle<()>>);

impl Tasks {
    pub fn track(&mut self, task: JoinHandle<()>) {
        self.0.retain(|t| !t.is_finished());
        self.0.push(task);
    }

    pub fn abort_all(&mut self) {
        for task in self.0.drain(..) {
            task.abort();
        }
    }
}

pub(crate) enum HandleState {
    Timer(TimerState),
    Tcp(TcpState),
}

#[derive(Default)]
pub(crate) struct TimerState {
    /// Bumped on every start/stop so events from an old schedule are dropped.
    pub generation: u64,
    pub repeat: Option<Duration>,
    pub task: Option<JoinHandle<()>>,
}

impl TimerState {
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation += 1;
    }
}

pub(crate) enum TcpState {
    Fresh,
    Bound(TcpSocket),
    Listening(Listener),
    /// `bound` is the local address to restore if the connect fails.
    Connecting { bound: Option<SocketAddr> },
    Connected(Connection),
}

impl TcpState {
    pub fn name(&self) -> &'static str {
        match self {
            TcpState::Fresh => "fresh",
            TcpState::Bound(_) => "bound",
            TcpState::Listening(_) => "listening",
            TcpState::Connecting { .. } => "connecting",
            TcpState::Connected(_) => "connected",
        }
    }
}

pub(crate) struct Listener {
    pub local_addr: SocketAddr,
    pub accept_task: JoinHandle<()>,
    pub pending: VecDeque<TcpStream>,
    /// Wakes the accept task once a pending connection has been taken.
    pub resume: Rc<Notify>,
}

pub(crate) struct Connection {
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
    pub reader: Rc<Mutex<OwnedReadHalf>>,
    pub writer: Rc<Mutex<OwnedWriteHalf>>,
    pub read_generation: u64,
    pub read_task: Option<JoinHandle<()>>,
    pub write_shut: bool,
}

impl Connection {
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            local_addr,
            peer_addr,
            reader: Rc::new(Mutex::new(reader)),
            writer: Rc::new(Mutex::new(writer)),
            read_generation: 0,
            read_task: None,
            write_shut: false,
        })
    }

    pub fn is_reading(&self) -> bool {
        self.read_task.is_some()
    }

    pub fn cancel_read(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        self.read_generation += 1;
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingRequest {
    pub handle: HandleId,
    pub kind: RequestKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_bits() {
        let id = HandleId::from_bits(42);
        assert_eq!(id.to_bits(), 42);
        assert_eq!(id.to_string(), "#42");
    }

    #[test]
    fn new_handles_are_referenced_but_idle() {
        let handle = Handle::new(HandleState::Timer(TimerState::default()));
        assert_eq!(handle.kind(), HandleKind::Timer);
        assert!(handle.flags.referenced);
        assert!(!handle.flags.holds_ref());
    }

    #[test]
    fn flag_changes_report_reference_deltas() {
        let mut flags = HandleFlags {
            active: false,
            referenced: true,
        };
        assert_eq!(flags.set_active(true), 1);
        assert_eq!(flags.set_active(true), 0);
        assert_eq!(flags.set_referenced(false), -1);
        assert_eq!(flags.set_active(false), 0);
        assert_eq!(flags.set_referenced(true), 0);
    }

    #[test]
    fn cancelling_a_timer_invalidates_its_generation() {
        let mut timer = TimerState::default();
        let before = timer.generation;
        timer.cancel();
        assert_ne!(timer.generation, before);
        assert!(timer.task.is_none());
    }
}
