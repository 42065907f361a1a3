//! Contest Joiner CLI
//!
//! Polls the forum contest feed and joins contests by solving their captcha.
//! Supports continuous worker mode (run), a single cycle (once) and joining
//! a single thread (join).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use contest_joiner::config::AppConfig;
use contest_joiner::site::{ContestRef, HttpSiteClient, SiteClient};
use contest_joiner::solver::{build_solver, SolverKind};
use contest_joiner::worker::{
    run_until_complete, setup_signal_handler, ContestWorker, ParticipationOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "contest-joiner")]
#[command(about = "Join forum contests by solving their click captcha")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./contest-joiner.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Captcha solver, overrides the config file
    #[arg(long, value_enum, global = true)]
    solver: Option<SolverKind>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the contest feed until interrupted
    Run,

    /// Run a single poll cycle and exit
    Once,

    /// Join one contest thread
    Join {
        /// Contest thread URL
        #[arg(short, long)]
        url: String,
    },

    /// Fetch a fresh anti-bot identity cookie and print it
    RenewIdentity,
}

/// How long a pending terminal prompt may delay process exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging, RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // The manual solver prompt blocks a thread that Ctrl-C cannot interrupt,
    // so the runtime is shut down explicitly instead of waiting on it
    run_until_complete(execute(cli), SHUTDOWN_GRACE)?
}

async fn execute(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(kind) = cli.solver {
        config.solver.kind = kind;
    }

    let site = Arc::new(HttpSiteClient::new(config.site_config()?)?);

    if let Commands::RenewIdentity = cli.command {
        site.renew_identity_cookie().await?;
        let cookie = &config.identity_cookie;
        match site.cookie_value(cookie) {
            Some(value) => println!("{}={}", cookie, value),
            None => println!("{} was not stored", cookie),
        }
        return Ok(());
    }

    let solver = build_solver(&config.solver)?;
    let worker = ContestWorker::new(site, solver, config.worker_config()?);
    setup_signal_handler(worker.shutdown_handle());

    match cli.command {
        Commands::Run => {
            if let Err(e) = worker.run().await {
                error!("Worker stopped: {}", e);
                return Err(e.into());
            }
        }

        Commands::Once => {
            info!("Running a single cycle...");
            let report = worker.run_once().await?;
            println!(
                "Discovered {}, joined {}, skipped {}, rejected {}, failed {}{}",
                report.discovered,
                report.joined,
                report.skipped,
                report.rejected,
                report.failed,
                if report.aborted { " (aborted)" } else { "" }
            );
        }

        Commands::Join { url } => {
            let contest = ContestRef::parse(&url)?;
            worker.ensure_session().await?;
            match worker.participate(&contest).await? {
                ParticipationOutcome::Joined => println!("Joined {}", contest),
                ParticipationOutcome::Skipped { reason } => {
                    println!("Skipped {}: {}", contest, reason)
                }
                ParticipationOutcome::AnswerRejected => {
                    println!("Captcha for {} was never accepted", contest)
                }
            }
        }

        Commands::RenewIdentity => {}
    }

    Ok(())
}
