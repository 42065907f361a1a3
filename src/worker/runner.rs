//! Contest worker - session setup and the main poll loop

use crate::error::{ContestError, ErrorKind, Result};
use crate::site::SiteClient;
use crate::solver::Solver;
use crate::worker::{ParticipationOutcome, PollBackoff, WorkerConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Counters for one pass over the contest list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub discovered: usize,
    pub joined: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Remaining contests were dropped after a connection error
    pub aborted: bool,
}

/// Polls the contest feed and joins every listed contest
pub struct ContestWorker {
    site: Arc<dyn SiteClient>,
    solver: Arc<dyn Solver>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl ContestWorker {
    pub fn new(site: Arc<dyn SiteClient>, solver: Arc<dyn Solver>, config: WorkerConfig) -> Self {
        Self {
            site,
            solver,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Get a handle to signal shutdown
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub(crate) fn site(&self) -> &dyn SiteClient {
        self.site.as_ref()
    }

    pub(crate) fn solver(&self) -> &dyn Solver {
        self.solver.as_ref()
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Await `future` unless shutdown is signalled first
    pub(crate) async fn until_shutdown<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ContestError::Cancelled),
            result = future => result,
        }
    }

    /// Make sure both session cookies are usable.
    ///
    /// A missing identity cookie is renewed; a missing login cookie cannot be
    /// and fails with `CredentialsExpired`.
    pub async fn ensure_session(&self) -> Result<()> {
        if !self.site.has_cookie(&self.config.identity_cookie) {
            info!(
                "{} cookie is missing, renewing...",
                self.config.identity_cookie
            );
            self.site.renew_identity_cookie().await?;
        }

        if !self.site.has_cookie(&self.config.auth_cookie) {
            return Err(ContestError::CredentialsExpired {
                cookie: self.config.auth_cookie.clone(),
            });
        }

        Ok(())
    }

    /// Main worker loop
    ///
    /// Runs poll cycles until shutdown is signalled. Only fatal errors are
    /// returned; shutdown ends the loop with `Ok(())`.
    pub async fn run(&self) -> Result<()> {
        info!("Starting contest worker...");
        info!(
            "Poll delay: {:?} (max {:?}, x{})",
            self.config.poll_base_delay, self.config.poll_max_delay, self.config.poll_multiplier
        );

        match self.until_shutdown(self.ensure_session()).await {
            Ok(()) => {}
            Err(ContestError::Cancelled) => {
                info!("Shutdown signal received before start");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let mut backoff = PollBackoff::from_config(&self.config);

        loop {
            let report = match self.run_cycle().await {
                Ok(report) => report,
                Err(ContestError::Cancelled) => break,
                Err(e) => return Err(e),
            };

            let delay = backoff.advance(report.joined);
            let next_poll = chrono::Duration::from_std(delay)
                .ok()
                .and_then(|d| chrono::Local::now().checked_add_signed(d))
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "later".to_string());
            info!(
                joined = report.joined,
                skipped = report.skipped,
                rejected = report.rejected,
                failed = report.failed,
                "Cycle finished, waiting {} m (next poll at {})",
                delay.as_secs() / 60,
                next_poll
            );

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!("Task cancelled, worker stopped");
        Ok(())
    }

    /// Set up the session and run a single cycle (for the `once` command)
    pub async fn run_once(&self) -> Result<CycleReport> {
        self.ensure_session().await?;
        self.run_cycle().await
    }

    /// Discover contests and try each of them once.
    ///
    /// A feed failure yields an empty cycle. A transport error while joining
    /// stops the remaining contests of this cycle. Fatal errors and shutdown
    /// are returned.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let contests = match self.until_shutdown(self.site.fetch_contest_list()).await {
            Ok(contests) => contests,
            Err(ContestError::Cancelled) => return Err(ContestError::Cancelled),
            Err(e) => {
                error!("Failed to fetch contest list: {}", e);
                Vec::new()
            }
        };
        report.discovered = contests.len();
        info!("Parsed {} url(s)", contests.len());

        for contest in &contests {
            if self.shutdown.is_cancelled() {
                return Err(ContestError::Cancelled);
            }

            match self.participate(contest).await {
                Ok(ParticipationOutcome::Joined) => report.joined += 1,
                Ok(ParticipationOutcome::Skipped { reason }) => {
                    info!("Skipped contest {}: {}", contest, reason);
                    report.skipped += 1;
                }
                Ok(ParticipationOutcome::AnswerRejected) => {
                    warn!("Captcha for {} was never accepted", contest);
                    report.rejected += 1;
                }
                Err(e) if e.kind() == ErrorKind::Transport => {
                    error!("Connection error: {}", e);
                    report.aborted = true;
                    break;
                }
                Err(e) if e.kind() == ErrorKind::Cancelled || e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Failed to participate in {}: {}", contest, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Drive `future` on a fresh multi-thread runtime, then shut the runtime down.
///
/// Blocking tasks still running afterwards (a terminal prompt waiting for
/// input) get at most `grace` before they are abandoned.
pub fn run_until_complete<F: Future>(future: F, grace: Duration) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}

/// Setup signal handlers for graceful shutdown
pub fn setup_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Detected Ctrl-C, initiating shutdown...");
                shutdown.cancel();
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
    });
}
