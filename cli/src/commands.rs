//! Command implementations.
//!
//! Each command drives the engine through its public surface and prints a
//! short human-readable result. No sync logic lives here.

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use jot_engine::{Note, RemoteStore, SyncEngine, SyncState};

fn state_marker(state: SyncState) -> &'static str {
    match state {
        SyncState::Pending => "pending",
        SyncState::Synced => "synced",
    }
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

pub async fn add<R: RemoteStore>(
    engine: &SyncEngine<R>,
    title: String,
    body: String,
) -> Result<()> {
    let note = Note::new(title, body);
    let id = note.id.clone();
    engine.upsert(note).await.context("failed to save note")?;
    println!("created {id}");
    Ok(())
}

pub async fn edit<R: RemoteStore>(
    engine: &SyncEngine<R>,
    id: String,
    title: Option<String>,
    body: Option<String>,
) -> Result<()> {
    let Some(existing) = engine.get_by_id(&id).await? else {
        bail!("no note with id {id}");
    };

    let title = title.unwrap_or_else(|| existing.title.clone());
    let body = body.unwrap_or_else(|| existing.body.clone());
    engine
        .upsert(existing.edited(title, body))
        .await
        .context("failed to save note")?;

    println!("updated {id}");
    Ok(())
}

pub async fn rm<R: RemoteStore>(engine: &SyncEngine<R>, id: String) -> Result<()> {
    engine.delete(&id).await.context("failed to delete note")?;
    println!("deleted {id}");
    Ok(())
}

pub async fn list<R: RemoteStore>(engine: &SyncEngine<R>) -> Result<()> {
    let stream = engine.observe();
    futures::pin_mut!(stream);

    let notes = match stream.next().await {
        Some(snapshot) => snapshot?,
        None => Vec::new(),
    };

    if notes.is_empty() {
        println!("no notes");
        return Ok(());
    }

    for note in notes {
        println!(
            "{}  {:<30}  {}  [{}]",
            note.id,
            note.title,
            format_timestamp(note.modified_at),
            state_marker(note.state),
        );
    }
    Ok(())
}

pub async fn show<R: RemoteStore>(engine: &SyncEngine<R>, id: String) -> Result<()> {
    let Some(note) = engine.get_by_id(&id).await? else {
        bail!("no note with id {id}");
    };

    println!("{}", note.title);
    println!("modified: {}  [{}]", format_timestamp(note.modified_at), state_marker(note.state));
    println!();
    println!("{}", note.body);
    Ok(())
}

pub async fn sync<R: RemoteStore>(engine: &SyncEngine<R>) -> Result<()> {
    let report = engine.manual_sync().await.context("manual sync failed")?;

    if report.pull_aborted {
        println!(
            "pushed {} (failed {}); pull aborted - remote unreachable",
            report.pushed, report.push_failed
        );
    } else {
        println!(
            "pushed {} (failed {}), pulled {}",
            report.pushed, report.push_failed, report.pulled
        );
    }
    Ok(())
}

pub async fn watch<R: RemoteStore>(engine: &SyncEngine<R>) -> Result<()> {
    let stream = engine.realtime_sync();
    futures::pin_mut!(stream);

    println!("watching for remote changes (ctrl-c to stop)");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("stopped");
                return Ok(());
            }
            item = stream.next() => match item {
                Some(Ok(tick)) => println!("merged {} note(s)", tick.merged),
                Some(Err(err)) => return Err(err).context("realtime sync ended"),
                None => return Ok(()),
            }
        }
    }
}

pub async fn status<R: RemoteStore>(
    engine: &SyncEngine<R>,
    principal: Option<&str>,
    remote: &str,
) -> Result<()> {
    let pending = engine.store().get_pending().await?.len();
    let total = engine.store().get_all().await?.len();

    match principal {
        Some(principal) => println!("signed in as {principal}"),
        None => println!("signed out (notes stay local)"),
    }
    println!("remote: {remote}");
    println!("{total} note(s), {pending} pending");
    Ok(())
}
