//! Captcha solving strategies
//!
//! This module provides:
//! - Solver: the `solve(image, grid_size)` capability used by the worker
//! - ManualSolver: asks a human at the terminal
//! - RemoteSolver: delegates to an HTTP inference service

pub mod manual;
pub mod remote;

pub use manual::ManualSolver;
pub use remote::RemoteSolver;

use crate::error::{ContestError, Result};
use crate::site::CaptchaAnswer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Finds the grid cell holding the target in a base64 encoded captcha image.
///
/// Returns [`CaptchaAnswer::NONE`] when no cell can be determined.
#[async_trait]
pub trait Solver: Send + Sync {
    async fn solve(&self, image: &str, grid_size: u32) -> Result<CaptchaAnswer>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// Prompt for the answer in the terminal
    Manual,
    /// Ask a remote classifier over HTTP
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub kind: SolverKind,
    /// Inference endpoint for the remote solver
    pub endpoint: Option<String>,
    /// Cell size the remote model was trained for
    pub expected_grid_size: Option<u32>,
    pub timeout_secs: u64,
    /// Where the manual solver drops captcha images (system temp dir if unset)
    pub image_dir: Option<PathBuf>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            kind: SolverKind::Manual,
            endpoint: None,
            expected_grid_size: Some(20),
            timeout_secs: 30,
            image_dir: None,
        }
    }
}

/// Build the solver selected in `settings`
pub fn build_solver(settings: &SolverSettings) -> Result<Arc<dyn Solver>> {
    match settings.kind {
        SolverKind::Manual => Ok(Arc::new(ManualSolver::new(settings.image_dir.clone()))),
        SolverKind::Remote => {
            let endpoint = settings.endpoint.as_deref().ok_or_else(|| {
                ContestError::ConfigError("solver.endpoint is required for the remote solver".to_string())
            })?;
            let solver = RemoteSolver::new(
                endpoint,
                settings.expected_grid_size,
                Duration::from_secs(settings.timeout_secs),
            )?;
            Ok(Arc::new(solver))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_without_endpoint_is_config_error() {
        let settings = SolverSettings {
            kind: SolverKind::Remote,
            ..Default::default()
        };
        assert!(matches!(
            build_solver(&settings),
            Err(ContestError::ConfigError(_))
        ));
    }

    #[test]
    fn builds_each_kind() {
        assert!(build_solver(&SolverSettings::default()).is_ok());

        let settings = SolverSettings {
            kind: SolverKind::Remote,
            endpoint: Some("http://127.0.0.1:8500/solve".to_string()),
            ..Default::default()
        };
        assert!(build_solver(&settings).is_ok());
    }
}
