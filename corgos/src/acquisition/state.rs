use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether an acquisition pass is running. Readable without any queue lock.
#[derive(Debug, Clone, Default)]
pub struct RefreshState {
    loading: Arc<AtomicBool>,
}

impl RefreshState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Mark a pass as started. Returns `None` if one is already running.
    pub fn try_begin(&self) -> Option<RefreshGuard> {
        self.loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RefreshGuard {
                loading: self.loading.clone(),
            })
    }
}

/// Clears the loading flag when dropped, whatever way the pass ends.
#[derive(Debug)]
pub struct RefreshGuard {
    loading: Arc<AtomicBool>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.loading.store(false, Ordering::SeqCst);
    }
}
