//! Busy/idle accounting
//!
//! Work that must not be interrupted by an idle shutdown holds a [`BusyGuard`]
//! for its duration. Idle requests are only honoured by the daemon; the
//! engine asks for idle once its worker has been idle long enough and no
//! guard is held.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info};

/// Reasons to keep the process alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusyReason {
    /// A pipeline iteration is running
    Streaming,
    /// The worker is resolving the next item
    Resolving,
    /// Held by an embedder (e.g. a transport with open streams)
    External,
}

struct Inner {
    counts: Mutex<HashMap<BusyReason, usize>>,
    idle: watch::Sender<bool>,
}

/// Shared handle; clones observe the same counters
#[derive(Clone)]
pub struct KeepAlive {
    inner: Arc<Inner>,
}

impl KeepAlive {
    pub fn new() -> Self {
        let (idle, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                counts: Mutex::new(HashMap::new()),
                idle,
            }),
        }
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<BusyReason, usize>> {
        self.inner
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark the process busy until the returned guard is dropped
    pub fn hold(&self, reason: BusyReason) -> BusyGuard {
        *self.counts().entry(reason).or_insert(0) += 1;
        debug!("Busy: {:?}", reason);
        BusyGuard {
            keepalive: self.clone(),
            reason,
        }
    }

    fn release(&self, reason: BusyReason) {
        let mut counts = self.counts();
        if let Some(count) = counts.get_mut(&reason) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&reason);
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        !self.counts().is_empty()
    }

    pub fn busy_reasons(&self) -> Vec<BusyReason> {
        self.counts().keys().copied().collect()
    }

    /// Ask the process to go idle; ignored while busy
    pub fn request_idle(&self) -> bool {
        if self.is_busy() {
            return false;
        }
        info!("Idle requested");
        self.inner.idle.send_replace(true);
        true
    }

    pub fn is_idle_requested(&self) -> bool {
        *self.inner.idle.borrow()
    }

    /// Resolves once idle has been requested
    pub async fn idle_requested(&self) {
        let mut rx = self.inner.idle.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|requested| *requested).await;
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new()
    }
}

/// Released on drop
pub struct BusyGuard {
    keepalive: KeepAlive,
    reason: BusyReason,
}

impl BusyGuard {
    pub fn reason(&self) -> BusyReason {
        self.reason
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.keepalive.release(self.reason);
    }
}
