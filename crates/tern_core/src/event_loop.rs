//! Event loop
//!
//! A single-threaded loop over a tokio current-thread runtime. Handles and
//! requests hold references on the loop; [`EventLoop::run`] keeps polling
//! while any reference is held and dispatches completions in arrival order.

use std::cell::{Cell, Ref, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;

use tern_metrics::{Counter, IterationTimer};
use tokio::runtime::{Builder, EnterGuard, Runtime};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, LocalSet};
use tracing::{debug, trace};

use crate::completion::{Completion, Event};
use crate::error::LoopError;
use crate::handle::{
    Connection, Handle, HandleId, HandleKind, HandleState, PendingRequest, RequestId,
    RequestKind, TcpState,
};

/// Number of iterations kept for the rolling iteration-time average.
const ITERATION_WINDOW: usize = 128;

/// How long a call to [`EventLoop::run`] keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Until nothing holds a reference on the loop.
    #[default]
    Default,
    /// One iteration, blocking for an event if the loop is alive.
    Once,
    /// One iteration without blocking.
    NoWait,
}

/// Counters collected while running. Empty unless the `metrics` feature is on.
pub struct LoopStats {
    completions: Counter,
    iterations: IterationTimer,
}

impl LoopStats {
    fn new() -> Self {
        Self {
            completions: Counter::new(),
            iterations: IterationTimer::new(ITERATION_WINDOW),
        }
    }

    /// Dispatched completions keyed by "timer", "read", "write", ...
    pub fn completions(&self) -> &Counter {
        &self.completions
    }

    pub fn iterations(&self) -> &IterationTimer {
        &self.iterations
    }
}

pub struct EventLoop {
    refs: Cell<i64>,
    next_id: Cell<u64>,
    handles: RefCell<HashMap<HandleId, Handle>>,
    requests: RefCell<HashMap<RequestId, PendingRequest>>,
    ready: RefCell<VecDeque<Event>>,
    tx: UnboundedSender<Event>,
    rx: RefCell<UnboundedReceiver<Event>>,
    stats: RefCell<LoopStats>,
    // Handles above abort their tasks on drop, before the executor goes away.
    local: LocalSet,
    runtime: Runtime,
}

impl EventLoop {
    pub fn new() -> Result<Self, LoopError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(LoopError::Runtime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        debug!("event loop created");

        Ok(Self {
            refs: Cell::new(0),
            next_id: Cell::new(1),
            handles: RefCell::new(HashMap::new()),
            requests: RefCell::new(HashMap::new()),
            ready: RefCell::new(VecDeque::new()),
            tx,
            rx: RefCell::new(rx),
            stats: RefCell::new(LoopStats::new()),
            local: LocalSet::new(),
            runtime,
        })
    }

    // ------------------------------------------------------------------
    // Loop reference count
    // ------------------------------------------------------------------

    pub fn ref_loop(&self) {
        self.adjust_refs(1);
    }

    pub fn unref_loop(&self) {
        self.adjust_refs(-1);
    }

    pub fn ref_count(&self) -> i64 {
        self.refs.get()
    }

    /// True while something holds a reference or completions are queued.
    pub fn is_alive(&self) -> bool {
        self.refs.get() > 0 || !self.ready.borrow().is_empty()
    }

    pub fn stats(&self) -> Ref<'_, LoopStats> {
        self.stats.borrow()
    }

    // ------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------

    /// Drive the loop, handing every completion to `dispatch`.
    ///
    /// Each iteration dispatches the events available when it started;
    /// anything the dispatcher schedules is seen on a later iteration. An
    /// error from `dispatch` stops the loop immediately and is returned.
    /// Returns whether the loop is still alive.
    pub fn run<E, F>(&self, mode: RunMode, mut dispatch: F) -> Result<bool, E>
    where
        F: FnMut(Completion) -> Result<(), E>,
    {
        debug!(?mode, refs = self.refs.get(), "event loop running");
        loop {
            self.drain_channel();
            if self.ready.borrow().is_empty() {
                if mode == RunMode::NoWait {
                    self.poll_tasks();
                } else if self.refs.get() > 0 {
                    self.wait_for_event();
                }
            }
            if self.ready.borrow().is_empty() {
                break;
            }

            self.stats.borrow_mut().iterations.begin();
            let ntodo = self.ready.borrow().len();
            for _ in 0..ntodo {
                let event = self.ready.borrow_mut().pop_front();
                let Some(event) = event else {
                    break;
                };
                if let Some(completion) = self.complete(event) {
                    trace!(handle = %completion.handle(), kind = completion.label(), "dispatch");
                    self.stats.borrow_mut().completions.bump(completion.label());
                    dispatch(completion)?;
                }
            }
            self.stats.borrow_mut().iterations.end();

            if mode != RunMode::Default {
                break;
            }
        }

        let alive = self.is_alive();
        debug!(alive, refs = self.refs.get(), "event loop returned");
        Ok(alive)
    }

    fn drain_channel(&self) {
        let mut rx = self.rx.borrow_mut();
        let mut ready = self.ready.borrow_mut();
        while let Ok(event) = rx.try_recv() {
            ready.push_back(event);
        }
    }

    /// Give spawned tasks one turn without blocking.
    fn poll_tasks(&self) {
        self.runtime
            .block_on(self.local.run_until(tokio::task::yield_now()));
        self.drain_channel();
    }

    /// Block until at least one task posts an event.
    fn wait_for_event(&self) {
        let event = {
            let mut rx = self.rx.borrow_mut();
            self.runtime.block_on(self.local.run_until(rx.recv()))
        };
        if let Some(event) = event {
            self.ready.borrow_mut().push_back(event);
        }
        self.drain_channel();
    }

    /// Apply an event to the loop's bookkeeping. Events for closed handles,
    /// stopped timers or reads, and finished requests yield nothing.
    fn complete(&self, event: Event) -> Option<Completion> {
        match event {
            Event::TimerFired { handle, generation } => {
                let mut handles = self.handles.borrow_mut();
                let Handle { flags, state, .. } = handles.get_mut(&handle)?;
                let HandleState::Timer(timer) = state else {
                    return None;
                };
                if timer.generation != generation {
                    return None;
                }
                if timer.repeat.is_none() {
                    timer.task = None;
                    self.adjust_refs(flags.set_active(false));
                }
                Some(Completion::Timer { handle })
            }

            Event::Incoming { handle, result } => {
                let mut handles = self.handles.borrow_mut();
                let entry = handles.get_mut(&handle)?;
                let HandleState::Tcp(TcpState::Listening(listener)) = &mut entry.state else {
                    return None;
                };
                let result = match result {
                    Ok(stream) => {
                        listener.pending.push_back(stream);
                        Ok(())
                    }
                    Err(e) => Err(LoopError::io("accept", e)),
                };
                Some(Completion::Connection { handle, result })
            }

            Event::Connected {
                handle,
                request,
                result,
            } => {
                self.finish_request(request)?;
                let mut handles = self.handles.borrow_mut();
                let result = match handles.get_mut(&handle).map(|h| &mut h.state) {
                    Some(HandleState::Tcp(state)) => match result.and_then(Connection::new) {
                        Ok(conn) => {
                            *state = TcpState::Connected(conn);
                            Ok(())
                        }
                        Err(e) => {
                            state.reset_after_failed_connect();
                            Err(LoopError::io("connect", e))
                        }
                    },
                    _ => Err(LoopError::Canceled),
                };
                Some(Completion::Request {
                    request,
                    handle,
                    kind: RequestKind::Connect,
                    result,
                })
            }

            Event::Read {
                handle,
                generation,
                result,
            } => {
                let mut handles = self.handles.borrow_mut();
                let Handle { flags, state, .. } = handles.get_mut(&handle)?;
                let HandleState::Tcp(TcpState::Connected(conn)) = state else {
                    return None;
                };
                if conn.read_generation != generation || !conn.is_reading() {
                    return None;
                }
                let result = match result {
                    Ok(Some(bytes)) => Ok(Some(bytes)),
                    other => {
                        // End of stream and errors both stop reading.
                        conn.read_task = None;
                        self.adjust_refs(flags.set_active(false));
                        other.map_err(|e| LoopError::io("read", e))
                    }
                };
                Some(Completion::Read { handle, result })
            }

            Event::RequestDone { request, result } => {
                let pending = self.finish_request(request)?;
                Some(Completion::Request {
                    request,
                    handle: pending.handle,
                    kind: pending.kind,
                    result,
                })
            }

            Event::Closed { handle } => Some(Completion::Closed { handle }),
        }
    }

    // ------------------------------------------------------------------
    // Handles
    // ------------------------------------------------------------------

    /// Close a handle. Its tasks are aborted, outstanding requests complete
    /// with [`LoopError::Canceled`], and a [`Completion::Closed`] follows on
    /// the next iteration.
    pub fn close(&self, id: HandleId) -> Result<(), LoopError> {
        let handle = self
            .handles
            .borrow_mut()
            .remove(&id)
            .ok_or(LoopError::BadHandle(id))?;
        if handle.flags.holds_ref() {
            self.adjust_refs(-1);
        }
        let kind = handle.kind();
        drop(handle);

        let mut cancelled: Vec<RequestId> = self
            .requests
            .borrow()
            .iter()
            .filter(|(_, pending)| pending.handle == id)
            .map(|(request, _)| *request)
            .collect();
        cancelled.sort();

        let mut ready = self.ready.borrow_mut();
        for request in cancelled {
            ready.push_back(Event::RequestDone {
                request,
                result: Err(LoopError::Canceled),
            });
        }
        ready.push_back(Event::Closed { handle: id });
        debug!(handle = %id, %kind, "handle closing");
        Ok(())
    }

    pub fn handle_kind(&self, id: HandleId) -> Result<HandleKind, LoopError> {
        self.with_handle(id, |handle| Ok(handle.kind()))
    }

    pub fn is_active(&self, id: HandleId) -> Result<bool, LoopError> {
        self.with_handle(id, |handle| Ok(handle.flags.active))
    }

    pub fn has_ref(&self, id: HandleId) -> Result<bool, LoopError> {
        self.with_handle(id, |handle| Ok(handle.flags.referenced))
    }

    /// Let an active handle keep the loop alive (the default).
    pub fn ref_handle(&self, id: HandleId) -> Result<(), LoopError> {
        self.with_handle(id, |handle| {
            self.adjust_refs(handle.flags.set_referenced(true));
            Ok(())
        })
    }

    /// Stop a handle from keeping the loop alive while it stays active.
    pub fn unref_handle(&self, id: HandleId) -> Result<(), LoopError> {
        self.with_handle(id, |handle| {
            self.adjust_refs(handle.flags.set_referenced(false));
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Crate internals
    // ------------------------------------------------------------------

    pub(crate) fn adjust_refs(&self, delta: i64) {
        if delta != 0 {
            self.refs.set(self.refs.get() + delta);
        }
    }

    fn next_bits(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub(crate) fn insert_handle(&self, state: HandleState) -> HandleId {
        let id = HandleId::from_bits(self.next_bits());
        let handle = Handle::new(state);
        trace!(handle = %id, kind = %handle.kind(), "handle created");
        self.handles.borrow_mut().insert(id, handle);
        id
    }

    /// Borrow a handle for the duration of `f`. `f` must not reenter the
    /// loop's handle table.
    pub(crate) fn with_handle<R>(
        &self,
        id: HandleId,
        f: impl FnOnce(&mut Handle) -> Result<R, LoopError>,
    ) -> Result<R, LoopError> {
        let mut handles = self.handles.borrow_mut();
        let handle = handles.get_mut(&id).ok_or(LoopError::BadHandle(id))?;
        f(handle)
    }

    pub(crate) fn new_request(&self, handle: HandleId, kind: RequestKind) -> RequestId {
        let request = RequestId::from_bits(self.next_bits());
        self.requests
            .borrow_mut()
            .insert(request, PendingRequest { handle, kind });
        self.adjust_refs(1);
        request
    }

    fn finish_request(&self, request: RequestId) -> Option<PendingRequest> {
        let pending = self.requests.borrow_mut().remove(&request)?;
        self.adjust_refs(-1);
        Some(pending)
    }

    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + 'static,
    {
        self.local.spawn_local(future)
    }

    pub(crate) fn sender(&self) -> UnboundedSender<Event> {
        self.tx.clone()
    }

    /// Enter the runtime so sockets can register with its reactor.
    pub(crate) fn enter(&self) -> EnterGuard<'_> {
        self.runtime.enter()
    }
}
