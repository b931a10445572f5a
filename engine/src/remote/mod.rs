//! The remote store adapter.
//!
//! Abstracts a tree-structured remote database in which each principal owns
//! a `{principal}/notes` subtree. The adapter supports point writes, point
//! deletes, one-shot subtree reads, and a long-lived subscription that
//! emits the full subtree snapshot on every descendant change.
//!
//! Subscriptions are owned resources: the listener registration is released
//! exactly once, on explicit cancellation or on drop, whichever comes
//! first, no matter how many times teardown is invoked.

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::MemoryRemote;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RemoteResult;
use crate::identity::Principal;
use crate::mapper::WireNote;

/// A full subtree snapshot: every wire note under `{principal}/notes`.
pub type Snapshot = Vec<WireNote>;

/// A remote tree-structured store scoped by principal namespaces.
///
/// All operations take the principal explicitly; the adapter holds no
/// notion of a current user. Writes and deletes are idempotent upserts and
/// removes keyed by note id.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Idempotent upsert of one note under `{principal}/notes/{id}`.
    async fn write(&self, principal: &Principal, note: &WireNote) -> RemoteResult<()>;

    /// Idempotent delete of `{principal}/notes/{id}`.
    async fn remove(&self, principal: &Principal, id: &str) -> RemoteResult<()>;

    /// One-shot fetch of the full subtree.
    async fn read_all(&self, principal: &Principal) -> RemoteResult<Snapshot>;

    /// Open a long-lived subscription to the subtree.
    ///
    /// The subscription emits the current snapshot immediately, then a
    /// fresh snapshot after every descendant change. It yields `Err` and
    /// closes when the namespace becomes inaccessible or the connection is
    /// lost unrecoverably.
    async fn subscribe(&self, principal: &Principal) -> RemoteResult<Subscription>;
}

/// Releases a remote listener registration exactly once.
///
/// Teardown is idempotent: explicit [`release`](Self::release) followed by
/// drop (or repeated release) runs the underlying cleanup a single time.
pub struct ListenerGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Release the listener now instead of at drop.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// An open subscription to one principal's subtree.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<RemoteResult<Snapshot>>,
    guard: ListenerGuard,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<RemoteResult<Snapshot>>, guard: ListenerGuard) -> Self {
        Self { rx, guard }
    }

    /// Next snapshot, or `None` once the channel is closed.
    pub async fn next_snapshot(&mut self) -> Option<RemoteResult<Snapshot>> {
        self.rx.recv().await
    }

    /// Tear down the remote listener. Idempotent; also runs on drop.
    pub fn cancel(&mut self) {
        self.guard.release();
    }
}
