//! Contest Joiner - a worker that joins forum contests
//!
//! The worker polls the contests feed of a XenForo forum, opens every listed
//! thread, hands its click captcha to a pluggable [`Solver`] and submits the
//! answer. Wrong answers are retried per contest; the delay between polls
//! grows while nothing new is joined.
//!
//! # Example
//! ```ignore
//! use contest_joiner::{AppConfig, ContestWorker, HttpSiteClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> contest_joiner::Result<()> {
//!     let config = AppConfig::load(None)?;
//!     let site = Arc::new(HttpSiteClient::new(config.site_config()?)?);
//!     let solver = contest_joiner::solver::build_solver(&config.solver)?;
//!     let worker = ContestWorker::new(site, solver, config.worker_config()?);
//!     worker.run().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod retry;
pub mod site;
pub mod solver;
pub mod worker;

pub use config::AppConfig;
pub use error::{ContestError, ErrorKind, Result};
pub use retry::{RetryPolicy, Tries};
pub use site::{
    CaptchaAnswer, CaptchaChallenge, ContestRef, HttpSiteClient, SiteClient, SiteConfig,
    SubmitOutcome,
};
pub use solver::{Solver, SolverKind};
pub use worker::{ContestWorker, CycleReport, ParticipationOutcome, PollBackoff, WorkerConfig};
