//! Tern Environment
//!
//! Host and process information queried from the operating system:
//! memory, load averages, uptime and the executable path.

pub mod error;
pub mod load;
pub mod memory;
pub mod process;

pub use error::EnvError;
pub use load::{loadavg, uptime};
pub use memory::{free_memory, total_memory, MemoryStats};
pub use process::exe_path;
