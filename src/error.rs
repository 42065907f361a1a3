//! Error types for contest-joiner

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContestError {
    #[error("Failed to fetch URL: {url}")]
    FetchError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for URL: {url}")]
    HttpStatusError { url: String, status: u16 },

    #[error("Unexpected response from {url}: {reason}")]
    UnexpectedResponse { url: String, reason: String },

    #[error("Captcha not found: {0}")]
    CaptchaNotFound(String),

    #[error("Captcha answer rejected: {0}")]
    AnswerRejected(String),

    #[error("Failed to renew identity cookie: {0}")]
    IdentityRenewal(String),

    #[error("Credentials expired: cookie '{cookie}' is missing")]
    CredentialsExpired { cookie: String },

    #[error("Solver error: {0}")]
    SolverError(String),

    #[error("Failed to parse page: {0}")]
    ParseError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("File system error")]
    FsError(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Coarse classification used by retry policies and the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network or HTTP status failure
    Transport,
    /// Page carries no active participation form
    CaptchaNotFound,
    /// Submitted (or about to be submitted) answer is wrong
    AnswerRejected,
    /// Anti-bot cookie renewal page was not recognised
    IdentityRenewal,
    /// Authentication cookie is gone
    Credentials,
    Cancelled,
    Other,
}

impl ContestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContestError::FetchError { .. }
            | ContestError::HttpStatusError { .. }
            | ContestError::UnexpectedResponse { .. } => ErrorKind::Transport,
            ContestError::CaptchaNotFound(_) => ErrorKind::CaptchaNotFound,
            ContestError::AnswerRejected(_) => ErrorKind::AnswerRejected,
            ContestError::IdentityRenewal(_) => ErrorKind::IdentityRenewal,
            ContestError::CredentialsExpired { .. } => ErrorKind::Credentials,
            ContestError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }

    /// Errors that must stop the worker: the session cannot heal itself
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::IdentityRenewal | ErrorKind::Credentials
        )
    }
}

impl From<figment::Error> for ContestError {
    fn from(err: figment::Error) -> Self {
        ContestError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ContestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_is_transport() {
        let err = ContestError::HttpStatusError {
            url: "https://example.com".to_string(),
            status: 503,
        };
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(!err.is_fatal());
    }

    #[test]
    fn unexpected_response_is_transport() {
        let err = ContestError::UnexpectedResponse {
            url: "https://lolz.guru/threads/1/participate".to_string(),
            reason: "expected JSON".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn session_errors_are_fatal() {
        assert!(ContestError::IdentityRenewal("no script".into()).is_fatal());
        assert!(ContestError::CredentialsExpired {
            cookie: "xf_user".into()
        }
        .is_fatal());
        assert!(!ContestError::AnswerRejected("wrong".into()).is_fatal());
        assert!(!ContestError::Cancelled.is_fatal());
    }

    #[test]
    fn other_errors_classified_as_other() {
        assert_eq!(
            ContestError::ParseError("bad".into()).kind(),
            ErrorKind::Other
        );
        assert_eq!(
            ContestError::SolverError("down".into()).kind(),
            ErrorKind::Other
        );
    }
}
