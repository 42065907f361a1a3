//! Worker configuration

use crate::error::ErrorKind;
use crate::retry::{RetryPolicy, Tries};
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay after a cycle that joined something
    pub poll_base_delay: Duration,

    /// Upper bound for the delay between cycles
    pub poll_max_delay: Duration,

    /// Growth factor applied after a cycle with no joins
    pub poll_multiplier: f64,

    /// Attempts per contest while the captcha answer is rejected
    pub answer_retry_tries: Tries,

    /// Fixed pause between captcha attempts
    pub answer_retry_delay: Duration,

    /// Anti-bot cookie renewed at startup when missing
    pub identity_cookie: String,

    /// Login cookie; its absence stops the worker
    pub auth_cookie: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_base_delay: Duration::from_secs(60),
            poll_max_delay: Duration::from_secs(3600),
            poll_multiplier: 2.0,
            answer_retry_tries: Tries::Unbounded,
            answer_retry_delay: Duration::from_secs(1),
            identity_cookie: "df_id".to_string(),
            auth_cookie: "xf_user".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create a new config builder
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Policy wrapping one contest: retry wrong answers at a constant pace
    pub fn answer_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(&[ErrorKind::AnswerRejected])
            .tries(self.answer_retry_tries)
            .initial_delay(self.answer_retry_delay)
            .multiplier(1.0)
    }
}

/// Builder for WorkerConfig
#[derive(Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    pub fn poll_base_delay(mut self, delay: Duration) -> Self {
        self.config.poll_base_delay = delay;
        self
    }

    pub fn poll_max_delay(mut self, delay: Duration) -> Self {
        self.config.poll_max_delay = delay;
        self
    }

    pub fn poll_multiplier(mut self, multiplier: f64) -> Self {
        self.config.poll_multiplier = multiplier;
        self
    }

    pub fn answer_retry_tries(mut self, tries: Tries) -> Self {
        self.config.answer_retry_tries = tries;
        self
    }

    pub fn answer_retry_delay(mut self, delay: Duration) -> Self {
        self.config.answer_retry_delay = delay;
        self
    }

    pub fn session_cookies(mut self, identity: &str, auth: &str) -> Self {
        self.config.identity_cookie = identity.to_string();
        self.config.auth_cookie = auth.to_string();
        self
    }

    /// Build the config
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_forum_cadence() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_base_delay, Duration::from_secs(60));
        assert_eq!(config.poll_max_delay, Duration::from_secs(3600));
        assert_eq!(config.poll_multiplier, 2.0);
        assert_eq!(config.answer_retry_tries, Tries::Unbounded);
    }

    #[test]
    fn answer_policy_only_retries_rejections() {
        let policy = WorkerConfig::builder()
            .answer_retry_tries(Tries::Limited(4))
            .build()
            .answer_retry_policy();

        assert!(policy.retries(ErrorKind::AnswerRejected));
        assert!(!policy.retries(ErrorKind::CaptchaNotFound));
        assert!(!policy.retries(ErrorKind::Transport));
        assert_eq!(policy.get_tries(), Tries::Limited(4));
        assert_eq!(policy.get_initial_delay(), Duration::from_secs(1));
    }
}
