//! End-to-end tests for the sync engine over its public surface.
//!
//! Each section exercises one guarantee of the engine, driving a real
//! SQLite-backed local store against the in-memory remote.

use std::sync::Arc;

use futures::StreamExt;
use sqlx::sqlite::SqlitePoolOptions;

use jot_engine::{
    LocalStore, MemoryRemote, Note, Principal, RemoteError, RemoteStore, SessionIdentity,
    SyncEngine, SyncError, SyncState, WireNote,
};

struct Harness {
    engine: SyncEngine<MemoryRemote>,
    store: Arc<LocalStore>,
    remote: MemoryRemote,
    identity: Arc<SessionIdentity>,
    principal: Principal,
}

async fn harness(signed_in: bool) -> Harness {
    let principal = Principal::new("alice").expect("non-empty principal");
    let namespace = if signed_in { principal.as_str() } else { "guest" };

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    let store = Arc::new(LocalStore::open(pool, namespace).await.expect("bootstrap store"));

    let identity = Arc::new(if signed_in {
        SessionIdentity::signed_in(principal.clone())
    } else {
        SessionIdentity::signed_out()
    });

    let remote = MemoryRemote::new();
    let engine = SyncEngine::new(store.clone(), Arc::new(remote.clone()), identity.clone());

    Harness {
        engine,
        store,
        remote,
        identity,
        principal,
    }
}

fn note(id: &str, title: &str, modified_at: i64) -> Note {
    Note {
        id: id.into(),
        title: title.into(),
        body: format!("body of {title}"),
        modified_at,
        state: SyncState::Pending,
    }
}

fn wire(id: &str, title: &str, timestamp: i64) -> WireNote {
    WireNote {
        id: id.into(),
        title: title.into(),
        content: format!("content of {title}"),
        timestamp,
    }
}

// ============================================================================
// Write-through durability
// ============================================================================

#[tokio::test]
async fn upsert_is_durable_even_when_remote_is_unreachable() {
    let h = harness(true).await;
    h.remote.set_offline(true);

    let n = note("a", "draft", 1000);
    h.engine.upsert(n.clone()).await.unwrap();

    let stored = h.engine.get_by_id("a").await.unwrap().unwrap();
    assert_eq!(stored.id, n.id);
    assert_eq!(stored.title, n.title);
    assert_eq!(stored.body, n.body);
    assert_eq!(stored.state, SyncState::Pending);

    // Nothing reached the remote.
    assert!(h.remote.snapshot_of(&h.principal).is_empty());
}

#[tokio::test]
async fn pending_note_recovers_on_next_manual_sync() {
    let h = harness(true).await;

    h.remote.set_offline(true);
    h.engine.upsert(note("a", "draft", 1000)).await.unwrap();

    h.remote.set_offline(false);
    let report = h.engine.manual_sync().await.unwrap();

    assert_eq!(report.pushed, 1);
    assert_eq!(report.push_failed, 0);
    assert_eq!(
        h.engine.get_by_id("a").await.unwrap().unwrap().state,
        SyncState::Synced
    );
    assert_eq!(h.remote.snapshot_of(&h.principal).len(), 1);
}

// ============================================================================
// Manual sync: two phases, per-record independence, idempotence
// ============================================================================

#[tokio::test]
async fn manual_sync_is_idempotent() {
    let h = harness(true).await;

    h.remote.write(&h.principal, &wire("r", "remote", 500)).await.unwrap();
    h.engine.upsert(note("a", "local", 1000)).await.unwrap();

    h.engine.manual_sync().await.unwrap();
    let first = h.store.get_all().await.unwrap();

    let report = h.engine.manual_sync().await.unwrap();
    let second = h.store.get_all().await.unwrap();

    assert_eq!(first, second);
    // Nothing was pending the second time around.
    assert_eq!(report.pushed, 0);
}

#[tokio::test]
async fn one_push_failure_does_not_abort_the_batch() {
    let h = harness(true).await;
    h.remote.set_offline(true);
    h.engine.upsert(note("a", "first", 2000)).await.unwrap();
    h.engine.upsert(note("b", "second", 1000)).await.unwrap();
    h.remote.set_offline(false);

    // Pending notes push newest-first; fail exactly the first attempt.
    h.remote.fail_next_writes(1);
    let report = h.engine.manual_sync().await.unwrap();

    assert_eq!(report.pushed, 1);
    assert_eq!(report.push_failed, 1);

    let states: Vec<_> = h
        .store
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|n| (n.id, n.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("a".to_string(), SyncState::Pending),
            ("b".to_string(), SyncState::Synced),
        ]
    );
}

#[tokio::test]
async fn failed_pull_keeps_push_results() {
    let h = harness(true).await;
    h.engine.upsert(note("a", "local", 1000)).await.unwrap();
    // Make it pending again so the push phase has work to do.
    h.store.put(&note("a", "edited", 2000)).await.unwrap();

    h.remote.fail_next_reads(1);
    let report = h.engine.manual_sync().await.unwrap();

    assert_eq!(report.pushed, 1);
    assert!(report.pull_aborted);
    assert_eq!(
        h.engine.get_by_id("a").await.unwrap().unwrap().state,
        SyncState::Synced
    );
}

#[tokio::test]
async fn manual_sync_when_signed_out_is_a_noop() {
    let h = harness(false).await;
    h.engine.upsert(note("a", "local", 1000)).await.unwrap();

    let report = h.engine.manual_sync().await.unwrap();

    assert_eq!(report, Default::default());
    assert_eq!(
        h.engine.get_by_id("a").await.unwrap().unwrap().state,
        SyncState::Pending
    );
    assert!(h.remote.snapshot_of(&h.principal).is_empty());
}

// ============================================================================
// Pull merge: remote wins, no diff-and-remove
// ============================================================================

#[tokio::test]
async fn pull_overwrites_local_state_unconditionally() {
    let h = harness(true).await;

    h.engine.upsert(note("a", "old", 1000)).await.unwrap();
    assert_eq!(
        h.engine.get_by_id("a").await.unwrap().unwrap().state,
        SyncState::Synced
    );

    // Another client rewrote the note; its timestamp is even older, which
    // must not matter: the pulled copy simply wins.
    h.remote.write(&h.principal, &wire("a", "new", 1)).await.unwrap();
    h.engine.manual_sync().await.unwrap();

    let merged = h.engine.get_by_id("a").await.unwrap().unwrap();
    assert_eq!(merged.title, "new");
    assert_eq!(merged.modified_at, 1);
    assert_eq!(merged.state, SyncState::Synced);
}

#[tokio::test]
async fn pull_never_deletes_local_notes() {
    // Known gap, asserted on purpose: pulls only upsert, so a note deleted
    // remotely by another client persists locally until a tombstone scheme
    // exists.
    let h = harness(true).await;

    h.engine.upsert(note("a", "kept", 1000)).await.unwrap();
    h.remote.remove(&h.principal, "a").await.unwrap();

    h.engine.manual_sync().await.unwrap();

    assert!(h.engine.get_by_id("a").await.unwrap().is_some());
}

#[tokio::test]
async fn pull_discards_unaddressable_remote_notes() {
    let h = harness(true).await;

    h.remote.write(&h.principal, &wire("a", "ok", 1)).await.unwrap();
    h.remote
        .write(&h.principal, &wire("", "orphan", 2))
        .await
        .unwrap();

    let report = h.engine.manual_sync().await.unwrap();

    assert_eq!(report.pulled, 1);
    assert_eq!(report.discarded, 1);
    assert_eq!(h.store.get_all().await.unwrap().len(), 1);
}

// ============================================================================
// No lost edits under race
// ============================================================================

#[tokio::test]
async fn stale_confirmation_never_marks_a_newer_edit_synced() {
    let h = harness(true).await;
    h.remote.set_offline(true);

    let v1 = note("a", "first draft", 1000);
    h.engine.upsert(v1.clone()).await.unwrap();

    // A newer edit lands while v1's confirmation is still in flight.
    let v2 = note("a", "second draft", 2000);
    h.engine.upsert(v2.clone()).await.unwrap();

    // The late confirmation for v1 arrives; it must not flip v2.
    assert!(!h.store.mark_synced_if_unchanged(&v1).await.unwrap());

    let stored = h.engine.get_by_id("a").await.unwrap().unwrap();
    assert_eq!(stored.title, "second draft");
    assert_eq!(stored.state, SyncState::Pending);
}

// ============================================================================
// Delete: immediate, local-first, no retry queue
// ============================================================================

#[tokio::test]
async fn delete_is_immediate_regardless_of_connectivity() {
    let h = harness(true).await;

    h.engine.upsert(note("a", "doomed", 1000)).await.unwrap();
    h.remote.set_offline(true);

    h.engine.delete("a").await.unwrap();
    assert!(h.engine.get_by_id("a").await.unwrap().is_none());

    // The remote copy survives the failed remove; there is no retry queue
    // for deletes.
    h.remote.set_offline(false);
    assert_eq!(h.remote.snapshot_of(&h.principal).len(), 1);
}

// ============================================================================
// Signed-out mode: local-only, never blocks
// ============================================================================

#[tokio::test]
async fn signed_out_operations_touch_only_the_local_store() {
    let h = harness(false).await;

    h.engine.upsert(note("a", "local", 1000)).await.unwrap();
    h.engine.upsert(note("b", "local too", 2000)).await.unwrap();
    h.engine.delete("b").await.unwrap();
    h.engine.manual_sync().await.unwrap();

    let all = h.store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].state, SyncState::Pending);
    assert!(h.remote.snapshot_of(&h.principal).is_empty());
}

#[tokio::test]
async fn realtime_sync_signals_unauthenticated_and_ends() {
    let h = harness(false).await;

    let stream = h.engine.realtime_sync();
    futures::pin_mut!(stream);

    let first = stream.next().await.unwrap();
    assert!(matches!(first, Err(SyncError::Unauthenticated)));
    assert!(stream.next().await.is_none());

    // No listener was ever registered.
    assert_eq!(h.remote.listener_count(), 0);
}

// ============================================================================
// Observe: local reads only, re-emission on mutation
// ============================================================================

#[tokio::test]
async fn observe_emits_immediately_and_after_each_mutation() {
    let h = harness(true).await;
    h.remote.set_offline(true); // reads never touch the network

    h.engine.upsert(note("a", "first", 1000)).await.unwrap();

    let stream = h.engine.observe();
    futures::pin_mut!(stream);

    let initial = stream.next().await.unwrap().unwrap();
    assert_eq!(initial.len(), 1);

    h.engine.upsert(note("b", "second", 2000)).await.unwrap();
    let updated = stream.next().await.unwrap().unwrap();
    assert_eq!(updated.len(), 2);
    assert_eq!(updated[0].id, "b"); // newest first

    h.engine.delete("a").await.unwrap();
    let after_delete = stream.next().await.unwrap().unwrap();
    assert_eq!(after_delete.len(), 1);
}

// ============================================================================
// Realtime sync: merge loop, termination, teardown
// ============================================================================

#[tokio::test]
async fn realtime_sync_merges_each_remote_snapshot() {
    let h = harness(true).await;

    h.remote.write(&h.principal, &wire("a", "seed", 1)).await.unwrap();

    let stream = h.engine.realtime_sync();
    futures::pin_mut!(stream);

    // Initial snapshot merges the seed note.
    let tick = stream.next().await.unwrap().unwrap();
    assert_eq!(tick.merged, 1);
    assert_eq!(h.engine.get_by_id("a").await.unwrap().unwrap().title, "seed");

    // Another client writes; the change flows into the local store.
    h.remote.write(&h.principal, &wire("b", "live", 2)).await.unwrap();
    let tick = stream.next().await.unwrap().unwrap();
    assert_eq!(tick.merged, 2);
    assert!(h.engine.get_by_id("b").await.unwrap().is_some());
}

#[tokio::test]
async fn revoked_namespace_terminates_the_stream() {
    let h = harness(true).await;

    let stream = h.engine.realtime_sync();
    futures::pin_mut!(stream);
    stream.next().await.unwrap().unwrap(); // initial merge

    h.remote.revoke(&h.principal);

    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        SyncError::Subscription(RemoteError::PermissionDenied(_))
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn dropping_the_stream_releases_the_listener_exactly_once() {
    let h = harness(true).await;

    {
        let stream = h.engine.realtime_sync();
        futures::pin_mut!(stream);
        stream.next().await.unwrap().unwrap();
        assert_eq!(h.remote.listener_count(), 1);
        // Dropped mid-listen here.
    }

    assert_eq!(h.remote.listener_count(), 0);
    assert_eq!(h.remote.listener_releases(), 1);
}

#[tokio::test]
async fn concurrent_manual_and_realtime_pulls_converge() {
    let h = harness(true).await;

    h.remote.write(&h.principal, &wire("a", "one", 1)).await.unwrap();
    h.remote.write(&h.principal, &wire("b", "two", 2)).await.unwrap();

    let stream = h.engine.realtime_sync();
    futures::pin_mut!(stream);
    stream.next().await.unwrap().unwrap();

    // A manual pull racing the realtime merge applies the same overwrite;
    // last-applied-wins is idempotent for the same snapshot.
    h.engine.manual_sync().await.unwrap();

    let all = h.store.get_all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|n| n.state == SyncState::Synced));
}

// ============================================================================
// Sign-out lifecycle
// ============================================================================

#[tokio::test]
async fn sign_out_mid_session_downgrades_to_local_only() {
    let h = harness(true).await;

    h.engine.upsert(note("a", "synced", 1000)).await.unwrap();
    h.identity.sign_out();

    h.engine.upsert(note("b", "local", 2000)).await.unwrap();
    assert_eq!(
        h.engine.get_by_id("b").await.unwrap().unwrap().state,
        SyncState::Pending
    );
    assert_eq!(h.remote.snapshot_of(&h.principal).len(), 1);

    // Clearing the namespace is the sign-out cleanup path.
    h.store.clear().await.unwrap();
    assert!(h.store.get_all().await.unwrap().is_empty());
}
