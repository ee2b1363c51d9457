//! Kizuna CLI and REST API entry point.
//!
//! Binary name: `kizuna`
//!
//! Parses CLI arguments, loads settings, initializes the database and
//! services, then dispatches to the command handler or starts the REST
//! API server with the background schedulers.

mod config;
mod http;
mod jobs;
mod state;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use kizuna_core::scheduler::diary::DiaryJob;
use state::AppState;

#[derive(Parser)]
#[command(name = "kizuna", about = "Conversational companion backend")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "KIZUNA_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server with the background schedulers.
    Serve {
        #[arg(long, default_value_t = 8787)]
        port: u16,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Run the diary pass for one date (defaults to today) and exit.
    DiaryRun {
        #[arg(long)]
        date: Option<String>,
    },

    /// Show a quick overview of the stored data.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "info,kizuna=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let settings = config::load_settings(cli.config.as_deref())?;
    let state = AppState::init(settings, cli.config.clone()).await?;

    match cli.command {
        Commands::Serve { port, host } => {
            let cancel = CancellationToken::new();
            jobs::spawn_schedulers(&state, cancel.clone()).await;

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            println!(
                "  {} Kizuna API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            cancel.cancel();
            println!("\n  Server stopped.");
        }

        Commands::DiaryRun { date } => {
            let date = match date {
                Some(date) => date,
                None => {
                    let settings = state.settings_snapshot().await;
                    kizuna_core::timefmt::local_date(
                        chrono::Utc::now().timestamp_millis(),
                        kizuna_core::timefmt::parse_zone(Some(&settings.diary.time_zone)),
                    )
                }
            };
            let runner = jobs::DiaryJobRunner { state };
            runner.run_for_date(&date).await?;
            println!("  Diary pass for {date} finished.");
        }

        Commands::Status => {
            let counts: Vec<(&str, i64)> = {
                let mut out = Vec::new();
                for table in ["user_states", "conversation_logs", "diary_entries", "proactive_messages"] {
                    let (count,): (i64,) =
                        sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                            .fetch_one(&state.pool.reader)
                            .await?;
                    out.push((table, count));
                }
                out
            };
            for (table, count) in counts {
                println!("  {:<20} {count}", format!("{table}:"));
            }
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
