//! The durable local store.
//!
//! A namespace-scoped SQLite table holding the full visible note set for the
//! active principal. The store exclusively owns the durable representation;
//! the sync engine operates as a reconciliation pass over it. Every mutation
//! is atomic and durable on return, and fires the watch channel that backs
//! the engine's `observe()` re-emission.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tokio::sync::watch;

use crate::error::{StoreError, StoreResult};
use crate::note::{Note, SyncState};

/// Namespace used for notes created while signed out. Never synced.
pub const GUEST_NAMESPACE: &str = "guest";

/// Open a SQLite pool for the given database URL, creating the file if
/// missing. Use `sqlite::memory:` for ephemeral stores in tests.
pub async fn connect(database_url: &str) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// A raw row from the notes table.
#[derive(Debug)]
struct NoteRow {
    id: String,
    title: String,
    body: String,
    modified_at: i64,
    state: i64,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for NoteRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(NoteRow {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            modified_at: row.try_get("modified_at")?,
            state: row.try_get("state")?,
        })
    }
}

impl NoteRow {
    fn into_note(self) -> StoreResult<Note> {
        let state = SyncState::from_i64(self.state).ok_or_else(|| StoreError::CorruptRow {
            id: self.id.clone(),
            reason: format!("invalid sync state {}", self.state),
        })?;
        Ok(Note {
            id: self.id,
            title: self.title,
            body: self.body,
            modified_at: self.modified_at,
            state,
        })
    }
}

/// Durable key-value table of notes for one namespace.
#[derive(Debug)]
pub struct LocalStore {
    pool: SqlitePool,
    namespace: String,
    changed: watch::Sender<u64>,
}

impl LocalStore {
    /// Open the store over an existing pool, bootstrapping the schema.
    pub async fn open(pool: SqlitePool, namespace: impl Into<String>) -> StoreResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id          TEXT PRIMARY KEY,
                namespace   TEXT NOT NULL,
                title       TEXT NOT NULL,
                body        TEXT NOT NULL,
                modified_at INTEGER NOT NULL,
                state       INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_notes_namespace_modified
             ON notes (namespace, modified_at DESC)",
        )
        .execute(&pool)
        .await?;

        let (changed, _) = watch::channel(0u64);

        Ok(Self {
            pool,
            namespace: namespace.into(),
            changed,
        })
    }

    /// The namespace this store serves.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Subscribe to mutation notifications. The receiver is marked changed
    /// after every observable mutation.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    fn notify(&self) {
        self.changed.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Upsert by id, replacing all fields. Durable on return.
    pub async fn put(&self, note: &Note) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notes (id, namespace, title, body, modified_at, state)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (id) DO UPDATE SET
                namespace = excluded.namespace,
                title = excluded.title,
                body = excluded.body,
                modified_at = excluded.modified_at,
                state = excluded.state
            "#,
        )
        .bind(&note.id)
        .bind(&self.namespace)
        .bind(&note.title)
        .bind(&note.body)
        .bind(note.modified_at)
        .bind(note.state.to_i64())
        .execute(&self.pool)
        .await?;

        self.notify();
        Ok(())
    }

    /// Pull-merge upsert: store the note as `Synced` unconditionally.
    /// Remote always wins on pull.
    pub async fn put_synced(&self, note: &Note) -> StoreResult<()> {
        let note = note.clone().with_state(SyncState::Synced);
        self.put(&note).await
    }

    /// Flip a note from `Pending` to `Synced`, but only if the stored row
    /// still matches the given note's content. A local edit that raced the
    /// remote confirmation keeps the row `Pending`.
    ///
    /// Returns whether the flip happened.
    pub async fn mark_synced_if_unchanged(&self, note: &Note) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notes SET state = ?1
            WHERE id = ?2 AND namespace = ?3
              AND title = ?4 AND body = ?5 AND modified_at = ?6
              AND state = ?7
            "#,
        )
        .bind(SyncState::Synced.to_i64())
        .bind(&note.id)
        .bind(&self.namespace)
        .bind(&note.title)
        .bind(&note.body)
        .bind(note.modified_at)
        .bind(SyncState::Pending.to_i64())
        .execute(&self.pool)
        .await?;

        let flipped = result.rows_affected() > 0;
        if flipped {
            self.notify();
        }
        Ok(flipped)
    }

    /// All notes in the namespace, newest first.
    pub async fn get_all(&self) -> StoreResult<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>(
            r#"
            SELECT id, title, body, modified_at, state
            FROM notes
            WHERE namespace = ?1
            ORDER BY modified_at DESC, id
            "#,
        )
        .bind(&self.namespace)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NoteRow::into_note).collect()
    }

    /// Point lookup by id.
    pub async fn get_by_id(&self, id: &str) -> StoreResult<Option<Note>> {
        let row = sqlx::query_as::<_, NoteRow>(
            r#"
            SELECT id, title, body, modified_at, state
            FROM notes
            WHERE namespace = ?1 AND id = ?2
            "#,
        )
        .bind(&self.namespace)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(NoteRow::into_note).transpose()
    }

    /// Snapshot of notes awaiting a confirmed remote write.
    pub async fn get_pending(&self) -> StoreResult<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>(
            r#"
            SELECT id, title, body, modified_at, state
            FROM notes
            WHERE namespace = ?1 AND state = ?2
            ORDER BY modified_at DESC, id
            "#,
        )
        .bind(&self.namespace)
        .bind(SyncState::Pending.to_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NoteRow::into_note).collect()
    }

    /// Remove a note. No-op (and no notification) when absent.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM notes WHERE namespace = ?1 AND id = ?2")
            .bind(&self.namespace)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            self.notify();
        }
        Ok(())
    }

    /// Remove every note in the namespace. Used on sign-out.
    pub async fn clear(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM notes WHERE namespace = ?1")
            .bind(&self.namespace)
            .execute(&self.pool)
            .await?;

        self.notify();
        Ok(())
    }
}
