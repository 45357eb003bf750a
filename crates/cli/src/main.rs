//! Bugdesk CLI - terminal client for the Bugdesk bug tracker.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the session is kept under the data directory)
//! bugdesk login -e a@b.com -p secret
//!
//! # List your reports, search everything
//! bugdesk bugs list mine
//! bugdesk bugs search "crash on save" --severity high
//!
//! # Work on a bug
//! bugdesk bugs assign 42
//! bugdesk bugs status 42 in-progress
//!
//! # Attachments
//! bugdesk attachments upload 42 ./screenshot.png
//! bugdesk attachments download 7 -o screenshot.png
//! ```
//!
//! # Environment Variables
//!
//! - `BUGDESK_API_URL` - Base URL of the Bugdesk API (required)
//! - `BUGDESK_DATA_DIR` - Where the session is persisted
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `RUST_LOG` - Log filter (default: `bugdesk_client=info,bugdesk_cli=info`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bugdesk_client::ClientConfig;
use bugdesk_core::{BugStatus, Severity};

mod commands;
mod output;

use commands::CliError;

#[derive(Parser)]
#[command(name = "bugdesk")]
#[command(author, version, about = "Bugdesk bug tracker client")]
struct Cli {
    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        /// Full name
        #[arg(short, long)]
        name: String,
        /// Account role (`User` or `Developer`)
        #[arg(short, long)]
        role: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in account
    Whoami {
        /// Re-fetch the account from the server
        #[arg(long)]
        refresh: bool,
    },
    /// Work with bugs
    Bugs {
        #[command(subcommand)]
        action: BugAction,
    },
    /// Work with attachments
    Attachments {
        #[command(subcommand)]
        action: AttachmentAction,
    },
    /// List developers bugs can be assigned to
    Developers,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListScope {
    /// Bugs you reported
    Mine,
    /// Bugs assigned to you
    Assigned,
    /// Bugs nobody is working on
    Unassigned,
}

#[derive(Subcommand)]
enum BugAction {
    /// List bugs
    List {
        #[arg(value_enum, default_value = "mine")]
        scope: ListScope,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Filter unassigned bugs by text
        #[arg(long)]
        search: Option<String>,
    },
    /// Search all bugs
    Search {
        term: Option<String>,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long)]
        status: Option<BugStatus>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show a bug with its attachments
    Show { id: i64 },
    /// Report a new bug
    Create {
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        description: String,
        #[arg(short, long, default_value = "medium")]
        severity: Severity,
        /// Steps to reproduce
        #[arg(long)]
        steps: Option<String>,
    },
    /// Edit a bug
    Update {
        id: i64,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        severity: Option<Severity>,
        #[arg(long)]
        steps: Option<String>,
    },
    /// Move a bug to another status
    Status { id: i64, status: BugStatus },
    /// Assign a bug (to yourself unless a developer is given)
    Assign {
        id: i64,
        #[arg(long)]
        developer: Option<String>,
    },
    /// Remove the assignee of a bug
    Unassign { id: i64 },
    /// Delete a bug
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum AttachmentAction {
    /// Attach a file to a bug
    Upload { bug_id: i64, file: PathBuf },
    /// Save an attachment's content
    Download {
        attachment_id: i64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete an attachment from a bug
    Delete { bug_id: i64, attachment_id: i64 },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bugdesk_client=info,bugdesk_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), CliError> {
    let ctx = commands::Context::start(config, cli.json)?;

    match cli.command {
        Commands::Login { email, password } => commands::auth::login(&ctx, &email, password).await,
        Commands::Register {
            email,
            password,
            name,
            role,
        } => commands::auth::register(&ctx, &email, password, name, role).await,
        Commands::Logout => {
            commands::auth::logout(&ctx);
            Ok(())
        }
        Commands::Whoami { refresh } => commands::auth::whoami(&ctx, refresh).await,
        Commands::Developers => commands::bugs::developers(&ctx).await,
        Commands::Bugs { action } => match action {
            BugAction::List {
                scope,
                page,
                search,
            } => {
                let scope = match scope {
                    ListScope::Mine => commands::bugs::Listing::Mine,
                    ListScope::Assigned => commands::bugs::Listing::Assigned,
                    ListScope::Unassigned => commands::bugs::Listing::Unassigned { search },
                };
                commands::bugs::list(&ctx, scope, page).await
            }
            BugAction::Search {
                term,
                severity,
                status,
                page,
            } => commands::bugs::search(&ctx, term, severity, status, page).await,
            BugAction::Show { id } => commands::bugs::show(&ctx, id).await,
            BugAction::Create {
                title,
                description,
                severity,
                steps,
            } => commands::bugs::create(&ctx, title, description, severity, steps).await,
            BugAction::Update {
                id,
                title,
                description,
                severity,
                steps,
            } => {
                let edit = commands::bugs::Edit {
                    title,
                    description,
                    severity,
                    steps,
                };
                commands::bugs::update(&ctx, id, edit).await
            }
            BugAction::Status { id, status } => commands::bugs::set_status(&ctx, id, status).await,
            BugAction::Assign { id, developer } => {
                commands::bugs::assign(&ctx, id, developer).await
            }
            BugAction::Unassign { id } => commands::bugs::unassign(&ctx, id).await,
            BugAction::Delete { id } => commands::bugs::delete(&ctx, id).await,
        },
        Commands::Attachments { action } => match action {
            AttachmentAction::Upload { bug_id, file } => {
                commands::attachments::upload(&ctx, bug_id, &file).await
            }
            AttachmentAction::Download {
                attachment_id,
                output,
            } => commands::attachments::download(&ctx, attachment_id, output).await,
            AttachmentAction::Delete {
                bug_id,
                attachment_id,
            } => commands::attachments::delete(&ctx, bug_id, attachment_id).await,
        },
    }
}
