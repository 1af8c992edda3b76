//! Tern Core
//!
//! The event loop that script bindings drive:
//! - Loop reference counting and run modes
//! - Handles (timers, TCP sockets) and in-flight requests
//! - Completions handed back to the embedder one at a time
//!
//! All I/O is performed by tokio tasks on a current-thread runtime. Tasks
//! never call back into the embedder; they post events that [`EventLoop::run`]
//! turns into [`Completion`]s on the calling thread.

pub mod completion;
pub mod error;
pub mod event_loop;
pub mod handle;
mod stream;
mod tcp;
mod timer;

pub use completion::Completion;
pub use error::LoopError;
pub use event_loop::{EventLoop, LoopStats, RunMode};
pub use handle::{HandleId, HandleKind, RequestId, RequestKind};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
