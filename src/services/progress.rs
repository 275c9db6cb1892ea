use std::sync::{Arc, Mutex};

/// The single 0-100 counter every phase feeds: probe workers, transfer
/// workers, and the auxiliary archive download all add their weighted share
/// here, and the presentation layer reads it at its own cadence. The engine
/// never polls its own aggregate.
#[derive(Clone, Default)]
pub struct ProgressCounter {
    value: Arc<Mutex<f64>>,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an attempt from a prior completed share (resumed attempts
    /// carry the byte credit of files already downloaded).
    pub fn reset_to(&self, value: f64) {
        if let Ok(mut guard) = self.value.lock() {
            *guard = value;
        }
    }

    pub fn add(&self, amount: f64) {
        if amount <= 0.0 {
            return;
        }
        if let Ok(mut guard) = self.value.lock() {
            *guard += amount;
        }
    }

    /// Raw aggregate. Concurrent additions may transiently overshoot the
    /// phase budget by floating-point slack; callers clamp for display.
    pub fn read(&self) -> f64 {
        self.value.lock().map(|guard| *guard).unwrap_or(0.0)
    }
}
