//! Application configuration
//!
//! Values are layered: built-in defaults, then the TOML file, then
//! `CONTEST_*` environment variables (`__` separates nested keys, e.g.
//! `CONTEST_POLL__MAX_DELAY_SECS=600`).

use crate::error::{ContestError, Result};
use crate::retry::Tries;
use crate::site::http::DEFAULT_USER_AGENT;
use crate::site::SiteConfig;
use crate::solver::SolverSettings;
use crate::worker::WorkerConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "contest-joiner.toml";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "CONTEST_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub contests_feed_path: String,
    pub identity_cookie: String,
    pub auth_cookie: String,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Sent with every request
    pub headers: BTreeMap<String, String>,
    /// Session cookies, `xf_user` at least
    pub cookies: BTreeMap<String, String>,
    pub poll: PollSettings,
    pub answer_retry: AnswerRetrySettings,
    pub solver: SolverSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerRetrySettings {
    /// `-1` retries until the answer is accepted
    pub tries: i64,
    pub delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "https://lolz.guru/".to_string(),
            contests_feed_path: "forums/contests/index.rss".to_string(),
            identity_cookie: "df_id".to_string(),
            auth_cookie: "xf_user".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            poll: PollSettings::default(),
            answer_retry: AnswerRetrySettings::default(),
            solver: SolverSettings::default(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            base_delay_secs: 60,
            max_delay_secs: 3600,
            multiplier: 2.0,
        }
    }
}

impl Default for AnswerRetrySettings {
    fn default() -> Self {
        Self {
            tries: -1,
            delay_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Load and validate the layered configuration.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        figment = match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ContestError::ConfigError(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                figment.merge(Toml::file(path))
            }
            None => figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
        };

        let config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.parsed_base_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ContestError::ConfigError(format!(
                "base_url must be http(s), got {}",
                self.base_url
            )));
        }

        if !self.poll.multiplier.is_finite() || self.poll.multiplier < 1.0 {
            return Err(ContestError::ConfigError(format!(
                "poll.multiplier must be >= 1, got {}",
                self.poll.multiplier
            )));
        }

        if self.poll.base_delay_secs == 0 {
            return Err(ContestError::ConfigError(
                "poll.base_delay_secs must be positive".to_string(),
            ));
        }

        Tries::from_count(self.answer_retry.tries)?;
        Ok(())
    }

    /// Base URL with a trailing slash so relative paths join under it
    fn parsed_base_url(&self) -> Result<Url> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| ContestError::InvalidUrl(format!("{}: {}", self.base_url, e)))
    }

    pub fn site_config(&self) -> Result<SiteConfig> {
        let mut site = SiteConfig::new(self.parsed_base_url()?);
        site.contests_feed_path = self.contests_feed_path.clone();
        site.identity_cookie = self.identity_cookie.clone();
        site.user_agent = self.user_agent.clone();
        site.headers = self.headers.clone();
        site.cookies = self.cookies.clone();
        site.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        site.request_timeout = Duration::from_secs(self.request_timeout_secs);
        Ok(site)
    }

    pub fn worker_config(&self) -> Result<WorkerConfig> {
        Ok(WorkerConfig::builder()
            .poll_base_delay(Duration::from_secs(self.poll.base_delay_secs))
            .poll_max_delay(Duration::from_secs(self.poll.max_delay_secs))
            .poll_multiplier(self.poll.multiplier)
            .answer_retry_tries(Tries::from_count(self.answer_retry.tries)?)
            .answer_retry_delay(Duration::from_millis(self.answer_retry.delay_ms))
            .session_cookies(&self.identity_cookie, &self.auth_cookie)
            .build())
    }
}
