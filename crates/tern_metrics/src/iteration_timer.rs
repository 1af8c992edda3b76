//! Loop iteration timing

use super::ring_buffer::RingBuffer;
use std::time::Instant;

#[derive(Debug)]
pub struct IterationTimer {
    started: Option<Instant>,
    iterations: u64,
    window: RingBuffer,
}

impl IterationTimer {
    pub fn new(capacity: usize) -> Self {
        Self {
            started: None,
            iterations: 0,
            window: RingBuffer::new(capacity),
        }
    }

    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Record the time since the matching `begin`. Unpaired calls are ignored.
    pub fn end(&mut self) {
        if let Some(started) = self.started.take() {
            self.window.push(started.elapsed());
            self.iterations += 1;
        }
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn average_ms(&self) -> f64 {
        self.window.average().as_secs_f64() * 1000.0
    }

    pub fn max_ms(&self) -> f64 {
        self.window.max().as_secs_f64() * 1000.0
    }
}
