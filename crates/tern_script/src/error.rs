use std::io;
use std::path::PathBuf;

use tern_core::LoopError;
use thiserror::Error;

use crate::bindings::InitError;

#[derive(Debug, Error)]
pub enum ScriptError {
    /// An uncaught exception, rendered with its stack when one exists.
    #[error("uncaught exception: {0}")]
    Js(String),

    #[error(transparent)]
    Engine(#[from] rquickjs::Error),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create event loop: {0}")]
    Loop(#[from] LoopError),

    #[error("failed to register bindings: {0}")]
    Init(#[from] InitError),
}
