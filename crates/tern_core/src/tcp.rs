//! TCP handles: bind, listen, accept, connect.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::completion::Event;
use crate::error::LoopError;
use crate::event_loop::EventLoop;
use crate::handle::{
    Connection, Handle, HandleFlags, HandleId, HandleKind, HandleState, Listener, RequestId,
    RequestKind, Tasks, TcpState,
};

/// Pause after a failed accept (e.g. out of file descriptors) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

impl EventLoop {
    pub fn tcp_new(&self) -> HandleId {
        self.insert_handle(HandleState::Tcp(TcpState::Fresh))
    }

    pub fn tcp_bind(&self, id: HandleId, addr: SocketAddr) -> Result<(), LoopError> {
        self.with_tcp("tcp_bind", id, |state, _, _| match state {
            TcpState::Fresh => {
                *state = TcpState::Bound(bound_socket("tcp_bind", addr)?);
                Ok(())
            }
            _ => Err(LoopError::InvalidState {
                op: "tcp_bind",
                reason: "socket is already bound",
            }),
        })
    }

    /// Start accepting connections. Each one produces a
    /// [`Completion::Connection`](crate::Completion::Connection) and waits
    /// for [`EventLoop::tcp_accept`]. Unbound sockets listen on `0.0.0.0:0`.
    /// On failure a bound socket stays bound.
    pub fn tcp_listen(&self, id: HandleId, backlog: u32) -> Result<(), LoopError> {
        let tx = self.sender();
        self.with_tcp("listen", id, |state, flags, _| {
            let socket = match std::mem::replace(state, TcpState::Fresh) {
                TcpState::Fresh => {
                    bound_socket("listen", SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?
                }
                TcpState::Bound(socket) => socket,
                other => {
                    *state = other;
                    return Err(LoopError::InvalidState {
                        op: "listen",
                        reason: "socket is already in use",
                    });
                }
            };

            let listener = {
                let _runtime = self.enter();
                match listen(socket, backlog) {
                    Ok(listener) => listener,
                    Err((socket, e)) => {
                        if let Some(socket) = socket {
                            *state = TcpState::Bound(socket);
                        }
                        return Err(LoopError::io("listen", e));
                    }
                }
            };
            let local_addr = listener
                .local_addr()
                .map_err(|e| LoopError::io("listen", e))?;
            let resume = Rc::new(Notify::new());
            let accept_task = self.spawn(accept_loop(tx, id, listener, resume.clone()));
            *state = TcpState::Listening(Listener {
                local_addr,
                accept_task,
                pending: VecDeque::new(),
                resume,
            });
            self.adjust_refs(flags.set_active(true));
            debug!(handle = %id, %local_addr, backlog, "listening");
            Ok(())
        })
    }

    /// Take the oldest pending connection of a listening handle as a new,
    /// connected handle. The listener accepts the next connection only
    /// after this.
    pub fn tcp_accept(&self, server: HandleId) -> Result<HandleId, LoopError> {
        let stream = self.with_tcp("accept", server, |state, _, _| match state {
            TcpState::Listening(listener) => {
                let stream = listener.pending.pop_front().ok_or(LoopError::WouldBlock)?;
                listener.resume.notify_one();
                Ok(stream)
            }
            _ => Err(LoopError::InvalidState {
                op: "accept",
                reason: "socket is not listening",
            }),
        })?;
        let conn = Connection::new(stream).map_err(|e| LoopError::io("accept", e))?;
        let peer = conn.peer_addr;
        let id = self.insert_handle(HandleState::Tcp(TcpState::Connected(conn)));
        debug!(server = %server, handle = %id, %peer, "accepted");
        Ok(id)
    }

    /// Connect to `addr`. Completes with a
    /// [`RequestKind::Connect`] request; on success the handle is a stream.
    /// A failed connect leaves the handle as it was before.
    pub fn tcp_connect(&self, id: HandleId, addr: SocketAddr) -> Result<RequestId, LoopError> {
        let tx = self.sender();
        self.with_tcp("tcp_connect", id, |state, _, tasks| {
            let (socket, bound) = match std::mem::replace(state, TcpState::Fresh) {
                TcpState::Fresh => match new_socket(addr) {
                    Ok(socket) => (socket, None),
                    Err(e) => return Err(LoopError::io("tcp_connect", e)),
                },
                TcpState::Bound(socket) => {
                    let bound = socket.local_addr().ok();
                    (socket, bound)
                }
                other => {
                    *state = other;
                    return Err(LoopError::InvalidState {
                        op: "tcp_connect",
                        reason: "socket is already in use",
                    });
                }
            };
            *state = TcpState::Connecting { bound };

            let request = self.new_request(id, RequestKind::Connect);
            tasks.track(self.spawn(async move {
                let result = socket.connect(addr).await;
                let _ = tx.send(Event::Connected {
                    handle: id,
                    request,
                    result,
                });
            }));
            debug!(handle = %id, %addr, "connecting");
            Ok(request)
        })
    }

    pub fn tcp_local_addr(&self, id: HandleId) -> Result<SocketAddr, LoopError> {
        self.with_tcp("tcp_getsockname", id, |state, _, _| match state {
            TcpState::Bound(socket) => socket
                .local_addr()
                .map_err(|e| LoopError::io("tcp_getsockname", e)),
            TcpState::Listening(listener) => Ok(listener.local_addr),
            TcpState::Connected(conn) => Ok(conn.local_addr),
            _ => Err(LoopError::InvalidState {
                op: "tcp_getsockname",
                reason: "socket is not bound",
            }),
        })
    }

    pub fn tcp_peer_addr(&self, id: HandleId) -> Result<SocketAddr, LoopError> {
        self.with_tcp("tcp_getpeername", id, |state, _, _| match state {
            TcpState::Connected(conn) => Ok(conn.peer_addr),
            _ => Err(LoopError::NotConnected {
                op: "tcp_getpeername",
            }),
        })
    }

    /// Borrow a TCP handle's state, flags and task list.
    pub(crate) fn with_tcp<R>(
        &self,
        op: &'static str,
        id: HandleId,
        f: impl FnOnce(&mut TcpState, &mut HandleFlags, &mut Tasks) -> Result<R, LoopError>,
    ) -> Result<R, LoopError> {
        self.with_handle(id, |handle| {
            let actual = handle.kind();
            let Handle {
                flags,
                state,
                tasks,
            } = handle;
            match state {
                HandleState::Tcp(tcp) => f(tcp, flags, tasks),
                _ => Err(LoopError::WrongKind {
                    op,
                    expected: HandleKind::Tcp,
                    actual,
                }),
            }
        })
    }
}

fn new_socket(addr: SocketAddr) -> std::io::Result<TcpSocket> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    Ok(socket)
}

fn bound_socket(op: &'static str, addr: SocketAddr) -> Result<TcpSocket, LoopError> {
    let socket = new_socket(addr).map_err(|e| LoopError::io(op, e))?;
    socket.bind(addr).map_err(|e| LoopError::io(op, e))?;
    Ok(socket)
}

impl TcpState {
    /// Back to `Bound` on the original address when there was one, else
    /// `Fresh`. The failed socket is already closed, so the address is free.
    pub(crate) fn reset_after_failed_connect(&mut self) {
        let bound = match self {
            TcpState::Connecting { bound } => *bound,
            _ => None,
        };
        *self = match bound.map(|addr| bound_socket("connect", addr)) {
            Some(Ok(socket)) => TcpState::Bound(socket),
            Some(Err(e)) => {
                warn!(error = %e, "could not restore bound address after failed connect");
                TcpState::Fresh
            }
            None => TcpState::Fresh,
        };
    }
}

/// Listen without giving up the socket on failure. Must run inside the
/// runtime context.
#[cfg(unix)]
fn listen(
    socket: TcpSocket,
    backlog: u32,
) -> Result<TcpListener, (Option<TcpSocket>, std::io::Error)> {
    use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd};

    let backlog = backlog.min(libc::c_int::MAX as u32) as libc::c_int;
    // SAFETY: the descriptor is owned by `socket` and valid for this call.
    if unsafe { libc::listen(socket.as_raw_fd(), backlog) } != 0 {
        return Err((Some(socket), std::io::Error::last_os_error()));
    }
    // SAFETY: ownership of the descriptor moves from `socket` to the listener.
    let listener = unsafe { std::net::TcpListener::from_raw_fd(socket.into_raw_fd()) };
    TcpListener::from_std(listener).map_err(|e| (None, e))
}

#[cfg(not(unix))]
fn listen(
    socket: TcpSocket,
    backlog: u32,
) -> Result<TcpListener, (Option<TcpSocket>, std::io::Error)> {
    socket.listen(backlog).map_err(|e| (None, e))
}

/// Accepts one connection at a time. After handing one over it waits for
/// `resume`, so unaccepted connections stay in the kernel backlog.
async fn accept_loop(
    tx: UnboundedSender<Event>,
    handle: HandleId,
    listener: TcpListener,
    resume: Rc<Notify>,
) {
    loop {
        let result = listener.accept().await.map(|(stream, _)| stream);
        let failed = result.is_err();
        if let Err(e) = &result {
            warn!(handle = %handle, error = %e, "accept failed");
        }
        if tx.send(Event::Incoming { handle, result }).is_err() {
            return;
        }
        if failed {
            tokio::time::sleep(ACCEPT_BACKOFF).await;
        } else {
            resume.notified().await;
        }
    }
}
