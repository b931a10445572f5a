//! In-process remote store.
//!
//! Backs the test suites and the CLI's offline demo mode. Behaves like the
//! real tree store - namespace scoping, snapshot-per-change subscriptions,
//! idempotent writes - and adds fault injection: a simulated outage flag
//! and per-namespace access revocation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{ListenerGuard, RemoteStore, Snapshot, Subscription};
use crate::error::{RemoteError, RemoteResult};
use crate::identity::Principal;
use crate::mapper::WireNote;

#[derive(Debug)]
struct Listener {
    namespace: String,
    tx: mpsc::UnboundedSender<RemoteResult<Snapshot>>,
}

#[derive(Debug, Default)]
struct Inner {
    /// namespace -> id -> wire note
    trees: DashMap<String, BTreeMap<String, WireNote>>,
    listeners: DashMap<u64, Listener>,
    next_listener_id: AtomicU64,
    offline: AtomicBool,
    revoked: DashMap<String, ()>,
    releases: AtomicUsize,
    failing_writes: AtomicUsize,
    failing_reads: AtomicUsize,
}

/// In-memory [`RemoteStore`] with fault injection.
#[derive(Debug, Default, Clone)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a network outage. While offline every operation fails with
    /// [`RemoteError::Unavailable`]; open subscriptions are not torn down
    /// (a dead link is not a revocation).
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Revoke access to a namespace. Subsequent operations fail with
    /// [`RemoteError::PermissionDenied`], and open subscriptions on the
    /// namespace receive the error and close.
    pub fn revoke(&self, principal: &Principal) {
        self.inner.revoked.insert(principal.as_str().to_string(), ());

        self.inner.listeners.retain(|_, listener| {
            if listener.namespace == principal.as_str() {
                let _ = listener.tx.send(Err(RemoteError::PermissionDenied(
                    principal.as_str().to_string(),
                )));
                false
            } else {
                true
            }
        });
    }

    /// Fail the next `count` write calls with [`RemoteError::Unavailable`],
    /// then recover. Lets tests exercise partial batch failures.
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` subtree reads with [`RemoteError::Unavailable`].
    pub fn fail_next_reads(&self, count: usize) {
        self.inner.failing_reads.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    /// How many listener registrations have been released so far.
    pub fn listener_releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

    /// Number of currently registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Current subtree content, for test assertions.
    pub fn snapshot_of(&self, principal: &Principal) -> Snapshot {
        self.inner
            .trees
            .get(principal.as_str())
            .map(|tree| tree.values().cloned().collect())
            .unwrap_or_default()
    }

    fn check_access(&self, principal: &Principal) -> RemoteResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("simulated outage".into()));
        }
        if self.inner.revoked.contains_key(principal.as_str()) {
            return Err(RemoteError::PermissionDenied(
                principal.as_str().to_string(),
            ));
        }
        Ok(())
    }

    fn broadcast(&self, namespace: &str) {
        let snapshot: Snapshot = self
            .inner
            .trees
            .get(namespace)
            .map(|tree| tree.values().cloned().collect())
            .unwrap_or_default();

        for listener in self.inner.listeners.iter() {
            if listener.namespace == namespace {
                let _ = listener.tx.send(Ok(snapshot.clone()));
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn write(&self, principal: &Principal, note: &WireNote) -> RemoteResult<()> {
        self.check_access(principal)?;
        if Self::take_injected_failure(&self.inner.failing_writes) {
            return Err(RemoteError::Unavailable("injected write failure".into()));
        }

        self.inner
            .trees
            .entry(principal.as_str().to_string())
            .or_default()
            .insert(note.id.clone(), note.clone());

        self.broadcast(principal.as_str());
        Ok(())
    }

    async fn remove(&self, principal: &Principal, id: &str) -> RemoteResult<()> {
        self.check_access(principal)?;

        if let Some(mut tree) = self.inner.trees.get_mut(principal.as_str()) {
            tree.remove(id);
        }

        self.broadcast(principal.as_str());
        Ok(())
    }

    async fn read_all(&self, principal: &Principal) -> RemoteResult<Snapshot> {
        self.check_access(principal)?;
        if Self::take_injected_failure(&self.inner.failing_reads) {
            return Err(RemoteError::Unavailable("injected read failure".into()));
        }
        Ok(self.snapshot_of(principal))
    }

    async fn subscribe(&self, principal: &Principal) -> RemoteResult<Subscription> {
        self.check_access(principal)?;

        let (tx, rx) = mpsc::unbounded_channel();

        // Value-listener semantics: the current snapshot arrives first.
        let _ = tx.send(Ok(self.snapshot_of(principal)));

        let listener_id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.insert(
            listener_id,
            Listener {
                namespace: principal.as_str().to_string(),
                tx,
            },
        );

        tracing::debug!(
            namespace = %principal,
            listener_id,
            "memory remote listener registered"
        );

        let inner = self.inner.clone();
        let guard = ListenerGuard::new(move || {
            inner.listeners.remove(&listener_id);
            inner.releases.fetch_add(1, Ordering::SeqCst);
        });

        Ok(Subscription::new(rx, guard))
    }
}
