use std::io;
use thiserror::Error;

/// Errors raised by environment queries that can actually fail.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("unable to resolve executable path: {0}")]
    ExePath(#[source] io::Error),
}

impl EnvError {
    /// Short error code in the style of the system errno names.
    pub fn code(&self) -> &'static str {
        match self {
            EnvError::ExePath(err) => match err.kind() {
                io::ErrorKind::NotFound => "ENOENT",
                io::ErrorKind::PermissionDenied => "EACCES",
                io::ErrorKind::Unsupported => "ENOSYS",
                _ => "EIO",
            },
        }
    }
}
