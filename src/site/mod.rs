//! Forum access: contest discovery, thread pages, participation and session cookies
//!
//! This module provides:
//! - SiteClient: the capability the worker depends on
//! - HttpSiteClient: reqwest-backed implementation with a cookie jar
//! - parser: page, feed and script extraction helpers

pub mod http;
pub mod parser;

pub use http::{HttpSiteClient, SiteConfig};

use crate::error::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use url::Url;

/// Server message returned when the clicked cell is wrong
pub const CAPTCHA_FAILED_MESSAGE: &str =
    "Вы не прошли проверку CAPTCHA должным образом. Пожалуйста, попробуйте ещё раз.";

/// Reference to a contest thread
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContestRef(Url);

impl ContestRef {
    pub fn new(url: Url) -> Self {
        Self(url)
    }

    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self(Url::parse(url.trim())?))
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    /// Endpoint accepting the participation form
    pub fn participate_url(&self) -> Url {
        let mut url = self.0.clone();
        url.set_query(None);
        url.set_fragment(None);
        let path = format!("{}/participate", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url
    }
}

impl fmt::Display for ContestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Click captcha scraped from a thread page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    pub csrf_token: String,
    pub captcha_hash: String,
    /// Base64 encoded image
    pub image: String,
    /// Cell size in pixels
    pub grid_size: u32,
}

impl CaptchaChallenge {
    pub fn image_bytes(&self) -> Option<Vec<u8>> {
        STANDARD.decode(self.image.trim()).ok()
    }

    /// Number of (columns, rows) in the grid, when the image is a readable PNG
    pub fn grid_dimensions(&self) -> Option<(u32, u32)> {
        if self.grid_size == 0 {
            return None;
        }
        let (width, height) = png_dimensions(&self.image_bytes()?)?;
        Some((width / self.grid_size, height / self.grid_size))
    }
}

/// Zero-based (column, row) of the clicked cell. `(0, 0)` means "no answer".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptchaAnswer {
    pub x: u32,
    pub y: u32,
}

impl CaptchaAnswer {
    pub const NONE: CaptchaAnswer = CaptchaAnswer { x: 0, y: 0 };

    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Whether the answer can be submitted for `challenge`
    pub fn is_valid_for(&self, challenge: &CaptchaChallenge) -> bool {
        if self.is_none() {
            return false;
        }
        match challenge.grid_dimensions() {
            Some((columns, rows)) => self.x < columns && self.y < rows,
            None => true,
        }
    }
}

/// Result of posting the participation form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Joined,
    Rejected { message: String },
}

impl SubmitOutcome {
    /// Whether the rejection is the wrong-captcha message.
    ///
    /// Whitespace is collapsed before the exact comparison; any other change
    /// to the server text makes this return false.
    pub fn is_captcha_failure(&self) -> bool {
        match self {
            SubmitOutcome::Rejected { message } => {
                normalize_whitespace(message) == normalize_whitespace(CAPTCHA_FAILED_MESSAGE)
            }
            SubmitOutcome::Joined => false,
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
    if bytes.len() < 24 || bytes[..8] != SIGNATURE || bytes[12..16] != *b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    Some((width, height))
}

/// Forum operations the worker relies on
#[async_trait]
pub trait SiteClient: Send + Sync {
    /// Contest threads currently listed in the contests feed
    async fn fetch_contest_list(&self) -> Result<Vec<ContestRef>>;

    /// Raw HTML of a contest thread
    async fn fetch_thread_page(&self, contest: &ContestRef) -> Result<String>;

    /// Pull the participation challenge out of a thread page.
    ///
    /// Fails with `CaptchaNotFound` when the page has no active form.
    fn extract_captcha(&self, page: &str) -> Result<CaptchaChallenge> {
        parser::extract_challenge(page)
    }

    /// Post an answer. Rejections are reported in the outcome, not as errors.
    async fn submit_participation(
        &self,
        contest: &ContestRef,
        challenge: &CaptchaChallenge,
        answer: CaptchaAnswer,
    ) -> Result<SubmitOutcome>;

    fn has_cookie(&self, name: &str) -> bool;

    /// Replace the anti-bot identity cookie with a fresh one
    async fn renew_identity_cookie(&self) -> Result<()>;
}
