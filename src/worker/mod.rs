//! Worker module for polling contests and joining them
//!
//! This module provides:
//! - ContestWorker: session setup, poll loop and per-contest state machine
//! - PollBackoff: adaptive delay between poll cycles
//! - WorkerConfig: Configuration for the worker

pub mod backoff;
pub mod config;
pub mod participation;
pub mod runner;

pub use backoff::PollBackoff;
pub use config::WorkerConfig;
pub use participation::{AttemptState, ParticipationOutcome};
pub use runner::{run_until_complete, setup_signal_handler, ContestWorker, CycleReport};
