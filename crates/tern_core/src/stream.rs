//! Stream operations on connected TCP handles.

use std::rc::Rc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::trace;

use crate::completion::Event;
use crate::error::LoopError;
use crate::event_loop::EventLoop;
use crate::handle::{HandleId, RequestId, RequestKind, TcpState};

/// Bytes requested from the socket per read.
const READ_CHUNK: usize = 64 * 1024;

impl EventLoop {
    /// Start delivering [`Completion::Read`](crate::Completion::Read)s.
    /// Starting a stream that is already reading is a no-op.
    pub fn read_start(&self, id: HandleId) -> Result<(), LoopError> {
        let tx = self.sender();
        self.with_tcp("read_start", id, |state, flags, _| {
            let TcpState::Connected(conn) = state else {
                return Err(LoopError::NotConnected { op: "read_start" });
            };
            if conn.is_reading() {
                return Ok(());
            }
            conn.read_generation += 1;
            let generation = conn.read_generation;
            conn.read_task = Some(self.spawn(read_loop(tx, id, generation, conn.reader.clone())));
            self.adjust_refs(flags.set_active(true));
            Ok(())
        })
    }

    pub fn read_stop(&self, id: HandleId) -> Result<(), LoopError> {
        self.with_tcp("read_stop", id, |state, flags, _| {
            let TcpState::Connected(conn) = state else {
                return Err(LoopError::NotConnected { op: "read_stop" });
            };
            conn.cancel_read();
            self.adjust_refs(flags.set_active(false));
            Ok(())
        })
    }

    /// Queue `data` for writing. Writes on one stream complete in order.
    pub fn write(&self, id: HandleId, data: Vec<u8>) -> Result<RequestId, LoopError> {
        let tx = self.sender();
        self.with_tcp("write", id, |state, _, tasks| {
            let TcpState::Connected(conn) = state else {
                return Err(LoopError::NotConnected { op: "write" });
            };
            if conn.write_shut {
                return Err(LoopError::io(
                    "write",
                    std::io::Error::from(std::io::ErrorKind::BrokenPipe),
                ));
            }
            let writer = conn.writer.clone();
            let request = self.new_request(id, RequestKind::Write);
            trace!(handle = %id, %request, len = data.len(), "write queued");
            tasks.track(self.spawn(async move {
                let result = writer
                    .lock()
                    .await
                    .write_all(&data)
                    .await
                    .map_err(|e| LoopError::io("write", e));
                let _ = tx.send(Event::RequestDone { request, result });
            }));
            Ok(request)
        })
    }

    /// Half-close the write side once every queued write has gone out.
    pub fn shutdown(&self, id: HandleId) -> Result<RequestId, LoopError> {
        let tx = self.sender();
        self.with_tcp("shutdown", id, |state, _, tasks| {
            let TcpState::Connected(conn) = state else {
                return Err(LoopError::NotConnected { op: "shutdown" });
            };
            if conn.write_shut {
                return Err(LoopError::InvalidState {
                    op: "shutdown",
                    reason: "stream is already shut down",
                });
            }
            conn.write_shut = true;
            let writer = conn.writer.clone();
            let request = self.new_request(id, RequestKind::Shutdown);
            tasks.track(self.spawn(async move {
                let result = writer
                    .lock()
                    .await
                    .shutdown()
                    .await
                    .map_err(|e| LoopError::io("shutdown", e));
                let _ = tx.send(Event::RequestDone { request, result });
            }));
            Ok(request)
        })
    }
}

async fn read_loop(
    tx: UnboundedSender<Event>,
    handle: HandleId,
    generation: u64,
    reader: Rc<Mutex<OwnedReadHalf>>,
) {
    let mut reader = reader.lock().await;
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let result = match reader.read(&mut buf).await {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(e) => Err(e),
        };
        let more = matches!(result, Ok(Some(_)));
        if tx
            .send(Event::Read {
                handle,
                generation,
                result,
            })
            .is_err()
            || !more
        {
            return;
        }
    }
}
