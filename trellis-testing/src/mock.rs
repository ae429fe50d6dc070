// Call recording for test doubles

use parking_lot::Mutex;
use std::sync::Arc;

/// Records the calls made to a fake service.
///
/// Clones share the same log, so a test can keep one handle while the
/// container owns another.
#[derive(Debug, Clone)]
pub struct CallRecorder<A> {
    calls: Arc<Mutex<Vec<A>>>,
}

impl<A> Default for CallRecorder<A> {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<A: Clone> CallRecorder<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, args: A) {
        self.calls.lock().push(args);
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn was_called(&self) -> bool {
        self.count() > 0
    }

    pub fn calls(&self) -> Vec<A> {
        self.calls.lock().clone()
    }

    pub fn last(&self) -> Option<A> {
        self.calls.lock().last().cloned()
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}
