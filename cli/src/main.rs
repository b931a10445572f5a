//! # jot
//!
//! Terminal client for Jot, an offline-first note store. Notes are always
//! written to the local database first; with a signed-in principal and a
//! configured remote they are mirrored to `{principal}/notes` on a
//! best-effort basis.
//!
//! ```bash
//! # Capture a note (works offline)
//! jot add "groceries" "milk, eggs"
//!
//! # Sign in and reconcile with the remote
//! jot login alice
//! jot sync
//!
//! # Follow remote changes until ctrl-c
//! jot watch
//! ```
//!
//! Configuration comes from the environment (`.env` is honored):
//! `JOT_DATA_DIR`, `JOT_DB`, `JOT_REMOTE_URL`, `JOT_PRINCIPAL`.

mod commands;
mod config;
mod session;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jot_engine::{
    HttpRemote, Identity, LocalStore, MemoryRemote, Principal, RemoteStore, SessionIdentity,
    SyncEngine, GUEST_NAMESPACE,
};

use crate::config::Config;
use crate::session::Session;

/// Offline-first notes in your terminal.
#[derive(Parser, Debug)]
#[command(name = "jot")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a note
    Add {
        title: String,
        /// Note body; empty when omitted
        #[arg(default_value = "")]
        body: String,
    },

    /// Replace a note's title and/or body
    Edit {
        id: String,
        #[arg(long, short)]
        title: Option<String>,
        #[arg(long, short)]
        body: Option<String>,
    },

    /// Delete a note
    Rm { id: String },

    /// List all notes, newest first
    List,

    /// Print one note
    Show { id: String },

    /// Push pending notes, then pull the remote state
    Sync,

    /// Keep merging remote changes until interrupted
    Watch,

    /// Record the signed-in principal
    Login { principal: String },

    /// Sign out and clear the signed-in namespace
    Logout,

    /// Show session and store state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jot=warn,jot_engine=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Login and logout only touch the session (and, for logout, the old
    // namespace), so resolve the current session before building anything.
    let mut session = Session::load(&config.session_path);

    if let Commands::Login { principal } = &cli.command {
        let principal =
            Principal::new(principal.clone()).context("principal must not be empty")?;
        session.principal = Some(principal.clone());
        session.save(&config.session_path)?;
        println!("signed in as {principal}");
        return Ok(());
    }

    let principal = match &config.principal_override {
        Some(id) => Some(Principal::new(id.clone()).context("JOT_PRINCIPAL must not be empty")?),
        None => session.principal.clone(),
    };

    let namespace = principal
        .as_ref()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| GUEST_NAMESPACE.to_string());

    let pool = jot_engine::connect(&config.database_url)
        .await
        .context("failed to open local database")?;
    let store = Arc::new(
        LocalStore::open(pool, namespace)
            .await
            .context("failed to bootstrap local database")?,
    );

    let identity: Arc<dyn Identity> = Arc::new(match &principal {
        Some(principal) => SessionIdentity::signed_in(principal.clone()),
        None => SessionIdentity::signed_out(),
    });

    match &config.remote_url {
        Some(url) => {
            let remote = HttpRemote::new(url.clone())
                .with_context(|| format!("invalid JOT_REMOTE_URL '{url}'"))?;
            let engine = SyncEngine::new(store, Arc::new(remote), identity);
            dispatch(cli.command, engine, &config, &mut session, principal, url).await
        }
        None => {
            // No remote configured: sync against an in-process store so
            // every command still works end to end.
            let engine = SyncEngine::new(store, Arc::new(MemoryRemote::new()), identity);
            dispatch(cli.command, engine, &config, &mut session, principal, "(in-process)").await
        }
    }
}

async fn dispatch<R: RemoteStore>(
    command: Commands,
    engine: SyncEngine<R>,
    config: &Config,
    session: &mut Session,
    principal: Option<Principal>,
    remote_label: &str,
) -> Result<()> {
    match command {
        Commands::Login { .. } => unreachable!("handled before engine construction"),

        Commands::Add { title, body } => commands::add(&engine, title, body).await,
        Commands::Edit { id, title, body } => commands::edit(&engine, id, title, body).await,
        Commands::Rm { id } => commands::rm(&engine, id).await,
        Commands::List => commands::list(&engine).await,
        Commands::Show { id } => commands::show(&engine, id).await,
        Commands::Sync => commands::sync(&engine).await,
        Commands::Watch => commands::watch(&engine).await,

        Commands::Logout => {
            engine
                .store()
                .clear()
                .await
                .context("failed to clear local namespace")?;
            session.principal = None;
            session.save(&config.session_path)?;
            println!("signed out");
            Ok(())
        }

        Commands::Status => {
            commands::status(&engine, principal.as_ref().map(Principal::as_str), remote_label).await
        }
    }
}
