// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Command-line host for the Volo script language server session.
//!
//! Plays the editor's part: supplies workspace folders and settings,
//! activates the session, and deactivates it on shutdown.

#![allow(clippy::print_stdout, reason = "CLI tool needs to output to stdout")]

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use volo_session::cli::ColorConfig;
use volo_session::config::Config;
use volo_session::discovery::BinderPolicy;
use volo_session::launch::ServerProcessSpec;
use volo_session::lsp::SessionState;
use volo_session::{SessionController, WorkspaceFolder};

/// How long `run` waits for the handshake before giving up.
const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Command-line arguments for volo-session.
#[derive(Parser, Debug)]
#[command(name = "volo-session")]
#[command(about = "Start and manage a Volo script language server session")]
#[command(version = env!("VOLO_SESSION_VERSION"))]
struct Args {
    /// The subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,

    /// Workspace folders, in precedence order. Can be specified multiple times.
    #[arg(short, long = "folder", global = true)]
    folders: Vec<PathBuf>,

    /// Path to configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Profile forwarded to the server during initialization.
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Binder discovery policy. Overrides the config file.
    #[arg(long, value_enum, global = true)]
    binder_policy: Option<BinderPolicy>,
}

/// Subcommands supported by volo-session.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server and keep the session open until ctrl-c (default).
    Run {
        /// Script documents to open once the server is ready.
        #[arg(long)]
        open: Vec<PathBuf>,
    },

    /// Show what would be launched for the workspace, without starting it.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        nocolor: bool,
    },
}

/// Entry point for the volo-session binary.
///
/// # Errors
///
/// Returns an error if the subcommand fails.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("volo_session=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    let folders = resolve_folders(&args.folders)?;

    match args.command {
        None => run_session(config, &folders, &[]).await,
        Some(Command::Run { open }) => run_session(config, &folders, &open).await,
        Some(Command::Doctor { nocolor }) => run_doctor(config, &folders, nocolor),
    }
}

/// Loads configuration and applies CLI overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.clone())?;
    if let Some(profile) = &args.profile {
        config.profile = Some(profile.clone());
    }
    if let Some(policy) = args.binder_policy {
        config.binder_policy = policy;
    }
    Ok(config)
}

/// Canonicalizes the folders, defaulting to the current directory.
fn resolve_folders(raw: &[PathBuf]) -> Result<Vec<WorkspaceFolder>> {
    let raw = if raw.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        raw.to_vec()
    };
    raw.into_iter()
        .map(|folder| Ok(WorkspaceFolder::new(folder.canonicalize()?)))
        .collect()
}

/// Runs a session until ctrl-c or until the server goes away.
///
/// # Errors
///
/// Returns an error if activation fails, the handshake does not complete,
/// or the server cannot be stopped cleanly.
async fn run_session(config: Config, folders: &[WorkspaceFolder], open: &[PathBuf]) -> Result<()> {
    let mut controller = SessionController::new(config);
    controller.activate(folders)?;

    let state = match controller.wait_ready(READY_TIMEOUT).await {
        Ok(state) => state,
        Err(e) => {
            controller.deactivate().await?;
            return Err(e);
        }
    };
    if state != SessionState::Running {
        controller.deactivate().await?;
        bail!("Language server failed to start (state: {state})");
    }

    for path in open {
        match controller.open_document(path).await {
            Ok(true) => info!("Opened {}", path.display()),
            Ok(false) => warn!("Not a Volo script, skipped: {}", path.display()),
            Err(e) => warn!("Failed to open {}: {:#}", path.display(), e),
        }
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        state = controller.closed() => {
            warn!("Language server exited (state: {:?})", state);
        }
    }

    controller.deactivate().await
}

/// Prints discovery results without spawning anything.
///
/// # Errors
///
/// Returns an error if no server executable is found.
fn run_doctor(config: Config, folders: &[WorkspaceFolder], nocolor: bool) -> Result<()> {
    let colors = ColorConfig::new(nocolor);

    println!("volo-session {}", env!("VOLO_SESSION_VERSION"));
    println!();

    let controller = SessionController::new(config);
    let discovery = controller.discover(folders)?;

    println!("{}", colors.bold("Folders:"));
    for folder in folders {
        println!("  {}", colors.cyan(&folder.path().display().to_string()));
    }
    println!();

    println!("{}", colors.bold("Server:"));
    for candidate in &discovery.searched {
        let selected = discovery.server.as_ref() == Some(candidate);
        let line = format!("{} {}", colors.mark(selected), candidate.display());
        println!("  {}", if selected { line } else { colors.dim(&line) });
    }
    if discovery.searched.is_empty() {
        println!("  {}", colors.red("no workspace folders"));
    }
    println!();

    println!(
        "{} {}",
        colors.bold("Binders:"),
        colors.dim(&format!("({:?} policy)", controller.config().binder_policy).to_lowercase())
    );
    if discovery.binders.is_empty() {
        println!("  {}", colors.yellow("none found, server will use its defaults"));
    }
    for binder in discovery.binders.paths() {
        println!("  {}", binder.display());
    }
    println!();

    match &controller.config().profile {
        Some(profile) => println!("{} {}", colors.bold("Profile:"), profile),
        None => println!("{} {}", colors.bold("Profile:"), colors.dim("(unset)")),
    }
    println!();

    let spec: ServerProcessSpec = discovery.into_spec()?;
    println!("{}", colors.bold("Command:"));
    println!("  {}", spec.command_line());
    Ok(())
}
