//! HTTP client for a remote captcha classifier

use crate::error::{ContestError, Result};
use crate::site::CaptchaAnswer;
use crate::solver::Solver;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct SolveRequest<'a> {
    image: &'a str,
    grid_size: u32,
}

/// `x`/`y` may be null when the model found nothing
#[derive(Debug, Deserialize)]
struct SolveResponse {
    x: Option<u32>,
    y: Option<u32>,
}

/// Posts the captcha to an inference service and reads back the cell
#[derive(Debug, Clone)]
pub struct RemoteSolver {
    client: Client,
    endpoint: Url,
    expected_grid_size: Option<u32>,
}

impl RemoteSolver {
    pub fn new(endpoint: &str, expected_grid_size: Option<u32>, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|_| ContestError::InvalidUrl(endpoint.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ContestError::SolverError(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            expected_grid_size,
        })
    }
}

#[async_trait]
impl Solver for RemoteSolver {
    async fn solve(&self, image: &str, grid_size: u32) -> Result<CaptchaAnswer> {
        if let Some(expected) = self.expected_grid_size {
            if expected != grid_size {
                return Err(ContestError::SolverError(format!(
                    "model expects {} px cells, captcha uses {}",
                    expected, grid_size
                )));
            }
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&SolveRequest { image, grid_size })
            .send()
            .await
            .map_err(|e| ContestError::SolverError(format!("solver request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ContestError::SolverError(format!(
                "solver returned status {}: {}",
                status, error_text
            )));
        }

        let answer = response
            .json::<SolveResponse>()
            .await
            .map_err(|e| ContestError::SolverError(format!("failed to parse solver response: {}", e)))?;
        debug!("Response from solver: {:?}", answer);

        match (answer.x, answer.y) {
            (Some(x), Some(y)) => Ok(CaptchaAnswer::new(x, y)),
            _ => Ok(CaptchaAnswer::NONE),
        }
    }
}
