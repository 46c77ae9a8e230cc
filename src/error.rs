use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible errors raised by the query-node client.
///
/// All payloads are plain strings so that task outcomes stay `Clone`: a
/// background task records its outcome once and any number of callers may
/// read it afterwards.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid or missing configuration, detected at session creation.
    #[error("configuration error: {0}")]
    Config(String),

    /// TLS trust material could not be loaded or resolved.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Authentication was rejected by the server.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Connection failure or a non-2xx status outside the query-error path.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server rejected the query itself (HTTP 400).
    #[error("query error: {message}")]
    Query {
        message: String,
        details: Option<String>,
    },

    /// The long-poll retry budget was exhausted before any rows arrived.
    #[error("timeout while polling for the results")]
    PollTimeout,

    /// A placeholder was left unbound before substitution. Ordinals are
    /// 1-based, in order of appearance in the template.
    #[error("required parameter {0} is not set for prepared query")]
    UnboundParameter(usize),

    /// A bind call named an ordinal outside the template's placeholder range.
    #[error("invalid parameter ordinal: {0}")]
    InvalidParameter(usize),

    /// The session has been closed.
    #[error("session is closed")]
    SessionClosed,

    /// The cursor has been closed.
    #[error("cursor is closed")]
    CursorClosed,

    /// A value accessor was used while not positioned on a row, or named a
    /// column outside the schema.
    #[error("cursor usage error: {0}")]
    Usage(String),

    /// Waiting on a background task failed because the task was torn down
    /// before recording an outcome.
    #[error("I/O error: interrupted while waiting for a background task")]
    Interrupted,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_parameter_names_ordinal() {
        let err = Error::UnboundParameter(3);
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn query_error_displays_message() {
        let err = Error::Query {
            message: "syntax error near WHERE".into(),
            details: None,
        };
        assert_eq!(err.to_string(), "query error: syntax error near WHERE");
    }
}
