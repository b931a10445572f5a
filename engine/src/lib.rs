//! # Jot Engine
//!
//! An offline-first sync engine for note collections.
//!
//! Notes are durable in a local SQLite store and opportunistically mirrored
//! to a remote tree-structured database under the signed-in principal's
//! namespace. Callers read a unified, eventually-consistent stream backed
//! entirely by local data; mutations write through locally first and reach
//! the remote on a best-effort basis.
//!
//! ## Design Principles
//!
//! - **Local first**: every read and write completes against the local
//!   store before any network I/O; the user is never blocked on the remote.
//! - **Explicit failure routing**: remote errors are typed and absorbed at
//!   documented call sites, never silently discarded; local store errors
//!   always surface.
//! - **Remote wins on pull**: pulled snapshots overwrite local state
//!   unconditionally; `modified_at` orders displays, not merges.
//! - **Owned subscriptions**: the remote change listener is acquired and
//!   released as a scoped resource, exactly once, on every exit path.
//!
//! ## Core Concepts
//!
//! ### Notes
//!
//! A [`Note`] carries an opaque client-generated id, free-text title and
//! body, a display timestamp, and a [`SyncState`] flag: `Pending` until the
//! engine confirms a remote write, `Synced` after confirmation or a remote
//! pull. The flag is local bookkeeping and never leaves the device.
//!
//! ### Stores
//!
//! The [`LocalStore`] owns the durable representation; the [`RemoteStore`]
//! trait abstracts the remote tree ([`HttpRemote`] over REST + server-sent
//! events, [`MemoryRemote`] in-process with fault injection).
//!
//! ### The engine
//!
//! [`SyncEngine`] combines the two stores with an [`Identity`] context.
//! `observe` streams local snapshots, `upsert`/`delete` write through,
//! `manual_sync` runs a push-then-pull reconciliation, and `realtime_sync`
//! keeps merging remote change notifications until cancelled.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use jot_engine::{
//!     connect, LocalStore, MemoryRemote, Note, Principal, SessionIdentity, SyncEngine,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("sqlite://jot.db").await?;
//! let store = Arc::new(LocalStore::open(pool, "alice").await?);
//! let identity = Arc::new(SessionIdentity::signed_in(
//!     Principal::new("alice").expect("non-empty"),
//! ));
//!
//! let engine = SyncEngine::new(store, Arc::new(MemoryRemote::new()), identity);
//!
//! engine.upsert(Note::new("groceries", "milk, eggs")).await?;
//! let report = engine.manual_sync().await?;
//! println!("pushed {}, pulled {}", report.pushed, report.pulled);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod identity;
pub mod mapper;
pub mod note;
pub mod remote;
pub mod store;
pub mod sync;

// Re-export main types at crate root
pub use error::{RemoteError, RemoteResult, StoreError, StoreResult, SyncError};
pub use identity::{Identity, Principal, SessionIdentity};
pub use mapper::WireNote;
pub use note::{Note, SyncState};
pub use remote::{HttpRemote, ListenerGuard, MemoryRemote, RemoteStore, Snapshot, Subscription};
pub use store::{connect, LocalStore, GUEST_NAMESPACE};
pub use sync::{SyncEngine, SyncReport, SyncTick};

/// Type aliases for clarity
pub type NoteId = String;
pub type Timestamp = i64;
