//! Request error taxonomy.
//!
//! Every transport or parsing failure is surfaced to callers as a
//! [`RequestError`]. The kind decides whether the network dispatcher routes
//! it through the retry policy or delivers it straight away.

use thiserror::Error;

use super::response::NetworkResponse;

/// Errors delivered to a request's error callback.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// Server indicated missing or invalid credentials (401/403).
    #[error("authentication required{}", hint_suffix(.resolution))]
    AuthRequired {
        response: Option<NetworkResponse>,
        /// Hint for how the caller can obtain credentials.
        resolution: Option<String>,
    },

    #[error("request rejected by server: HTTP {}", .response.status)]
    ClientRejected { response: NetworkResponse },

    #[error("server failure{}", status_suffix(.response))]
    ServerFailed { response: Option<NetworkResponse> },

    #[error("request timed out")]
    Timeout,

    #[error("no connection: {0}")]
    NoConnection(String),

    #[error("malformed target url: {0}")]
    MalformedTarget(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("response parse failure: {0}")]
    Parse(String),
}

fn hint_suffix(resolution: &Option<String>) -> String {
    resolution.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
}

fn status_suffix(response: &Option<NetworkResponse>) -> String {
    response.as_ref().map(|r| format!(": HTTP {}", r.status)).unwrap_or_default()
}

/// Coarse classification of a [`RequestError`], used for retry decisions
/// and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthRequired,
    ClientRejected,
    ServerFailed,
    Timeout,
    NoConnection,
    MalformedTarget,
    Network,
    Parse,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthRequired => "auth",
            Self::ClientRejected => "client",
            Self::ServerFailed => "server",
            Self::Timeout => "timeout",
            Self::NoConnection => "no_connection",
            Self::MalformedTarget => "malformed_target",
            Self::Network => "network",
            Self::Parse => "parse",
        }
    }
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthRequired { .. } => ErrorKind::AuthRequired,
            Self::ClientRejected { .. } => ErrorKind::ClientRejected,
            Self::ServerFailed { .. } => ErrorKind::ServerFailed,
            Self::Timeout => ErrorKind::Timeout,
            Self::NoConnection(_) => ErrorKind::NoConnection,
            Self::MalformedTarget(_) => ErrorKind::MalformedTarget,
            Self::Network(_) => ErrorKind::Network,
            Self::Parse(_) => ErrorKind::Parse,
        }
    }

    /// Returns true if this error may be handed to the retry policy.
    ///
    /// Server failures only qualify when the request opted in.
    pub fn is_retryable(&self, retry_server_errors: bool) -> bool {
        match self.kind() {
            ErrorKind::Timeout | ErrorKind::NoConnection | ErrorKind::Network => true,
            ErrorKind::ServerFailed => retry_server_errors,
            ErrorKind::AuthRequired
            | ErrorKind::ClientRejected
            | ErrorKind::MalformedTarget
            | ErrorKind::Parse => false,
        }
    }

    /// The network response attached to this error, if the server answered.
    pub fn response(&self) -> Option<&NetworkResponse> {
        match self {
            Self::AuthRequired { response, .. } | Self::ServerFailed { response } => {
                response.as_ref()
            }
            Self::ClientRejected { response } => Some(response),
            _ => None,
        }
    }
}
