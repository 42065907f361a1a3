//! Human-in-the-loop solver

use crate::error::{ContestError, Result};
use crate::site::{png_dimensions, CaptchaAnswer};
use crate::solver::Solver;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dialoguer::Input;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

/// Saves the captcha to a temporary PNG and asks for the target cell
pub struct ManualSolver {
    image_dir: Option<PathBuf>,
}

impl ManualSolver {
    pub fn new(image_dir: Option<PathBuf>) -> Self {
        Self { image_dir }
    }
}

#[async_trait]
impl Solver for ManualSolver {
    async fn solve(&self, image: &str, grid_size: u32) -> Result<CaptchaAnswer> {
        let bytes = STANDARD
            .decode(image.trim())
            .map_err(|e| ContestError::SolverError(format!("captcha is not base64: {}", e)))?;

        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("captcha-").suffix(".png");
            builder
        };
        let mut file = match &self.image_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(&bytes)?;
        file.flush()?;

        let grid = match png_dimensions(&bytes) {
            Some((width, height)) if grid_size > 0 => {
                format!("{}x{} cells", width / grid_size, height / grid_size)
            }
            _ => "unknown grid".to_string(),
        };
        info!(
            "Captcha saved to {} ({} px cells, {})",
            file.path().display(),
            grid_size,
            grid
        );

        let input = tokio::task::spawn_blocking(|| {
            Input::<String>::new()
                .with_prompt("Target cell as column,row (empty to skip)")
                .allow_empty(true)
                .interact_text()
        })
        .await
        .map_err(|e| ContestError::SolverError(e.to_string()))?
        .map_err(|e| ContestError::SolverError(e.to_string()))?;

        drop(file);

        match parse_cell(&input) {
            Some(answer) => Ok(answer),
            None => {
                warn!("Could not read a cell from {:?}", input);
                Ok(CaptchaAnswer::NONE)
            }
        }
    }
}

/// Parse `column,row` (comma, semicolon or whitespace separated)
fn parse_cell(input: &str) -> Option<CaptchaAnswer> {
    let mut parts = input
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|p| !p.is_empty());
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(CaptchaAnswer::new(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cells() {
        assert_eq!(parse_cell("3,4"), Some(CaptchaAnswer::new(3, 4)));
        assert_eq!(parse_cell(" 7 ; 1 "), Some(CaptchaAnswer::new(7, 1)));
        assert_eq!(parse_cell("2 9"), Some(CaptchaAnswer::new(2, 9)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_cell(""), None);
        assert_eq!(parse_cell("3"), None);
        assert_eq!(parse_cell("a,b"), None);
        assert_eq!(parse_cell("-1,2"), None);
        assert_eq!(parse_cell("1,2,3"), None);
    }

    #[tokio::test]
    async fn invalid_base64_is_solver_error() {
        let solver = ManualSolver::new(None);
        assert!(matches!(
            solver.solve("***", 20).await,
            Err(ContestError::SolverError(_))
        ));
    }
}
