//! The sync engine.
//!
//! Orchestrates the write-through of local mutations, the push of pending
//! notes, the overwrite-merge of remote snapshots, and the continuous
//! change-subscription loop. The engine owns no record state of its own: it
//! is a stateless reconciliation pass over the local store, the remote
//! adapter, and an in-memory subscription handle.
//!
//! Propagation policy: remote failures inside `upsert`, `delete`, and the
//! push phase of `manual_sync` are logged and absorbed - the affected note
//! simply stays `Pending` and the caller is never blocked. Local store
//! failures always propagate. Subscription failures terminate the
//! `realtime_sync` stream with a typed error for diagnostics; retrying is
//! the caller's policy.
//!
//! The composition root pairs the store's namespace with the signed-in
//! principal; the engine re-reads the identity context at every refresh
//! point rather than caching it.

use std::sync::Arc;

use futures::Stream;
use serde::Serialize;

use crate::error::{RemoteError, StoreError, StoreResult, SyncError};
use crate::identity::Identity;
use crate::mapper::WireNote;
use crate::note::{Note, SyncState};
use crate::remote::{RemoteStore, Snapshot, Subscription};
use crate::store::LocalStore;

/// Outcome of a [`SyncEngine::manual_sync`] run. Diagnostics only: remote
/// failures are already absorbed by the time the report is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Pending notes confirmed on the remote during the push phase.
    pub pushed: usize,
    /// Pending notes whose remote write failed; they stay `Pending`.
    pub push_failed: usize,
    /// Remote notes merged into the local store during the pull phase.
    pub pulled: usize,
    /// Remote notes discarded as unaddressable (empty id).
    pub discarded: usize,
    /// Whether the pull phase was aborted by a failed subtree read.
    pub pull_aborted: bool,
}

/// One completed merge on the realtime stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTick {
    /// Remote notes merged into the local store for this snapshot.
    pub merged: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct MergeOutcome {
    merged: usize,
    discarded: usize,
}

enum RealtimeState<R: RemoteStore> {
    Connect(SyncEngine<R>),
    Listen(SyncEngine<R>, Subscription),
    Closed,
}

/// Offline-first sync engine over a local store and a remote adapter.
///
/// Cheap to clone; all clones share the same stores and identity context.
pub struct SyncEngine<R: RemoteStore> {
    store: Arc<LocalStore>,
    remote: Arc<R>,
    identity: Arc<dyn Identity>,
}

impl<R: RemoteStore> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            remote: self.remote.clone(),
            identity: self.identity.clone(),
        }
    }
}

impl<R: RemoteStore> SyncEngine<R> {
    pub fn new(store: Arc<LocalStore>, remote: Arc<R>, identity: Arc<dyn Identity>) -> Self {
        Self {
            store,
            remote,
            identity,
        }
    }

    /// The underlying local store (sign-out `clear()` goes through here).
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// A lazy, infinite, restartable stream of full note-list snapshots.
    ///
    /// Emits the current list immediately, then again after every local
    /// mutation. Never touches the network; renders instantly from local
    /// data even when offline.
    pub fn observe(&self) -> impl Stream<Item = StoreResult<Vec<Note>>> + Send {
        let store = self.store.clone();
        let rx = store.watch();

        futures::stream::unfold((store, rx, false), |(store, mut rx, primed)| async move {
            if primed && rx.changed().await.is_err() {
                return None;
            }
            let snapshot = store.get_all().await;
            Some((snapshot, (store, rx, true)))
        })
    }

    /// Point lookup from the local store.
    pub async fn get_by_id(&self, id: &str) -> StoreResult<Option<Note>> {
        self.store.get_by_id(id).await
    }

    /// Write a note through to the local store, then best-effort to the
    /// remote.
    ///
    /// The note is durable locally, as `Pending`, before any network I/O
    /// starts. With a principal present the engine attempts the remote
    /// write and, on success, flips the note to `Synced` - unless a newer
    /// local edit landed in the interim, in which case the row stays
    /// `Pending` so the newer edit is not silently marked clean.
    pub async fn upsert(&self, note: Note) -> StoreResult<()> {
        let note = note.with_state(SyncState::Pending);
        self.store.put(&note).await?;

        let Some(principal) = self.identity.current_principal() else {
            tracing::debug!(id = %note.id, "signed out; note kept local-only");
            return Ok(());
        };

        match self.remote.write(&principal, &WireNote::from_note(&note)).await {
            Ok(()) => {
                let flipped = self.store.mark_synced_if_unchanged(&note).await?;
                if !flipped {
                    tracing::debug!(
                        id = %note.id,
                        "note changed while confirming remote write; left pending"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(id = %note.id, error = %err, "remote write failed; note stays pending");
            }
        }

        Ok(())
    }

    /// Remove a note locally, then best-effort remotely.
    ///
    /// The local removal is immediate and unconditional. A failed remote
    /// remove is logged and absorbed; there is no retry queue for deletes.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.store.delete(id).await?;

        let Some(principal) = self.identity.current_principal() else {
            return Ok(());
        };

        if let Err(err) = self.remote.remove(&principal, id).await {
            tracing::warn!(id, error = %err, "remote remove failed; skipping");
        }

        Ok(())
    }

    /// Two-phase reconciliation, invoked on explicit user refresh.
    ///
    /// Phase 1 pushes every pending note independently; one failure does
    /// not abort the batch. Phase 2 pulls the full remote subtree and
    /// merges it with unconditional overwrite - remote wins. A failed pull
    /// aborts phase 2 only; phase 1 results are kept. Signed out, the
    /// whole operation is a no-op.
    pub async fn manual_sync(&self) -> StoreResult<SyncReport> {
        let mut report = SyncReport::default();

        let Some(principal) = self.identity.current_principal() else {
            tracing::debug!("signed out; manual sync skipped");
            return Ok(report);
        };

        for note in self.store.get_pending().await? {
            match self.remote.write(&principal, &WireNote::from_note(&note)).await {
                Ok(()) => {
                    report.pushed += 1;
                    self.store.mark_synced_if_unchanged(&note).await?;
                }
                Err(err) => {
                    report.push_failed += 1;
                    tracing::warn!(id = %note.id, error = %err, "push failed; note stays pending");
                }
            }
        }

        match self.remote.read_all(&principal).await {
            Ok(snapshot) => {
                let outcome = self.merge_snapshot(snapshot).await?;
                report.pulled = outcome.merged;
                report.discarded = outcome.discarded;
            }
            Err(err) => {
                report.pull_aborted = true;
                tracing::warn!(error = %err, "pull aborted; keeping push results");
            }
        }

        tracing::info!(
            pushed = report.pushed,
            push_failed = report.push_failed,
            pulled = report.pulled,
            pull_aborted = report.pull_aborted,
            "manual sync finished"
        );

        Ok(report)
    }

    /// The continuous change-subscription loop.
    ///
    /// Signed out, the stream yields exactly one
    /// [`SyncError::Unauthenticated`] and ends. Otherwise it subscribes to
    /// the principal's subtree and, per emitted snapshot, runs the same
    /// overwrite-merge as the pull phase of [`manual_sync`](Self::manual_sync),
    /// yielding a [`SyncTick`] per completed merge. Any subscription error
    /// is yielded once and ends the stream. Dropping the stream at any
    /// point releases the remote listener exactly once.
    pub fn realtime_sync(&self) -> impl Stream<Item = Result<SyncTick, SyncError>> + Send {
        futures::stream::unfold(RealtimeState::Connect(self.clone()), |mut state| async move {
            loop {
                match state {
                    RealtimeState::Closed => return None,

                    RealtimeState::Connect(engine) => {
                        let Some(principal) = engine.identity.current_principal() else {
                            return Some((Err(SyncError::Unauthenticated), RealtimeState::Closed));
                        };

                        match engine.remote.subscribe(&principal).await {
                            Ok(subscription) => {
                                tracing::debug!(namespace = %principal, "realtime sync listening");
                                state = RealtimeState::Listen(engine, subscription);
                            }
                            Err(err) => return Some((Err(err.into()), RealtimeState::Closed)),
                        }
                    }

                    RealtimeState::Listen(engine, mut subscription) => {
                        match subscription.next_snapshot().await {
                            Some(Ok(snapshot)) => match engine.merge_snapshot(snapshot).await {
                                Ok(outcome) => {
                                    return Some((
                                        Ok(SyncTick {
                                            merged: outcome.merged,
                                        }),
                                        RealtimeState::Listen(engine, subscription),
                                    ));
                                }
                                Err(err) => {
                                    return Some((
                                        Err(SyncError::Store(err)),
                                        RealtimeState::Closed,
                                    ));
                                }
                            },
                            Some(Err(err)) => {
                                return Some((Err(err.into()), RealtimeState::Closed))
                            }
                            None => {
                                return Some((
                                    Err(SyncError::Subscription(RemoteError::Unavailable(
                                        "subscription closed".into(),
                                    ))),
                                    RealtimeState::Closed,
                                ));
                            }
                        }
                    }
                }
            }
        })
    }

    /// Merge a remote snapshot with unconditional overwrite.
    ///
    /// Every addressable wire note replaces the local copy and lands
    /// `Synced`; unaddressable notes are discarded. Pulls only upsert: a
    /// note present locally but missing from the snapshot is left alone.
    async fn merge_snapshot(&self, snapshot: Snapshot) -> Result<MergeOutcome, StoreError> {
        let mut outcome = MergeOutcome::default();

        for wire in snapshot {
            match wire.into_note() {
                Some(note) => {
                    self.store.put_synced(&note).await?;
                    outcome.merged += 1;
                }
                None => outcome.discarded += 1,
            }
        }

        if outcome.discarded > 0 {
            tracing::debug!(
                discarded = outcome.discarded,
                "discarded unaddressable remote notes"
            );
        }

        Ok(outcome)
    }
}
