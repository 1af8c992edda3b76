//! Tern Script
//!
//! Embeds QuickJS and exposes the event loop to scripts as the global `uv`
//! namespace.

pub mod bindings;
pub mod error;
pub mod runtime;

pub use bindings::{Binding, InitError};
pub use error::ScriptError;
pub use runtime::{ScriptLimits, ScriptRuntime};

// Re-export rquickjs for convenience
pub use rquickjs;
