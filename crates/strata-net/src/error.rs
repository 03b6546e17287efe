use thiserror::Error;

/// Result type used by `strata-net`.
pub type NetResult<T> = Result<T, NetError>;

/// Errors talking to a remote origin.
///
/// The expiry policy cares about one distinction above all: a confirmed miss
/// (HTTP 404, the origin answered and does not have the artifact) versus a
/// transport failure (the origin could not answer). The two are cached under
/// different periods, so they stay separate variants here.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("timeout talking to origin")]
    Timeout,
}

impl NetError {
    pub fn http_status(status: u16, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn http<S: Into<String>>(msg: S) -> Self {
        Self::Http(msg.into())
    }

    /// HTTP status code, if the origin answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// A confirmed 404: the origin is up and does not have the artifact.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Whether retrying against the origin could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Http(_) => true,
        }
    }
}

impl From<reqwest::Error> for NetError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(error.to_string())
        }
    }
}
