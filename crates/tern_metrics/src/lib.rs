//! Tern Metrics - lightweight event loop instrumentation
//!
//! Counts dispatched completions and tracks how long loop iterations take.
//! Everything here vanishes when the `metrics` feature is off.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use tern_metrics::{Counter, IterationTimer};
//!
//! let mut timer = IterationTimer::new(64);
//! let mut counter = Counter::new();
//! timer.begin();
//! counter.bump("timer");
//! timer.end();
//! println!("avg iteration: {:.3} ms", timer.average_ms());
//! ```

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod iteration_timer;
#[cfg(feature = "metrics")]
mod ring_buffer;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use iteration_timer::IterationTimer;
#[cfg(feature = "metrics")]
pub use ring_buffer::RingBuffer;

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn bump(&mut self, _name: &'static str) {}
    pub fn add(&mut self, _name: &'static str, _value: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn total(&self) -> u64 { 0 }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug)]
pub struct IterationTimer;

#[cfg(not(feature = "metrics"))]
impl IterationTimer {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn begin(&mut self) {}
    pub fn end(&mut self) {}
    pub fn iterations(&self) -> u64 { 0 }
    pub fn average_ms(&self) -> f64 { 0.0 }
    pub fn max_ms(&self) -> f64 { 0.0 }
}
