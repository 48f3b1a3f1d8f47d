use thiserror::Error;

use crate::util::truncate_chars;

/// Failures of the remote collaborators or of process configuration.
///
/// Bad user input and empty results are not errors: they come back as
/// ordinary replies from the executor.
#[derive(Debug, Error)]
pub(crate) enum BotError {
    /// The chat transport rejected or failed a call.
    #[error("transport {op} failed: {detail}")]
    Transport { op: &'static str, detail: String },

    /// The tabular store rejected or failed a call.
    #[error("store {op} failed: {detail}")]
    Store { op: &'static str, detail: String },

    /// A remote call did not finish within the configured timeout.
    #[error("{op} timed out")]
    Timeout { op: &'static str },

    /// The remote could not be reached at all (DNS, refused connection).
    /// Nothing was sent, so any call may be repeated.
    #[error("{op} connection error: {detail}")]
    Connection { op: &'static str, detail: String },

    /// The connection broke after the request went out; the remote may
    /// already have acted on it.
    #[error("{op} interrupted: {detail}")]
    Interrupted { op: &'static str, detail: String },

    /// The notice announcing an attachment went out but the file did not.
    #[error("attachment {filename} not delivered: {source}")]
    Attachment {
        filename: String,
        #[source]
        source: Box<BotError>,
    },

    #[error("authorization failed: {0}")]
    Auth(String),

    /// A response arrived but did not have the expected shape.
    #[error("unexpected {op} response: {detail}")]
    Decode { op: &'static str, detail: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Upper bound on how much of an error response body ends up in logs.
const ERROR_BODY_MAX_CHARS: usize = 300;

impl BotError {
    /// Failures a read-only call may be repeated after.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(
            self,
            BotError::Timeout { .. } | BotError::Connection { .. } | BotError::Interrupted { .. }
        )
    }

    /// Failures that happened before the request reached the remote.
    pub(crate) fn is_safe_to_resend(&self) -> bool {
        matches!(self, BotError::Connection { .. })
    }

    pub(crate) fn from_ureq(op: &'static str, err: ureq::Error, store: bool) -> BotError {
        match err {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                let detail = format!("{code}: {}", truncate_chars(body.trim(), ERROR_BODY_MAX_CHARS));
                if code == 401 || code == 403 {
                    BotError::Auth(format!("{op} {detail}"))
                } else if store {
                    BotError::Store { op, detail }
                } else {
                    BotError::Transport { op, detail }
                }
            }
            ureq::Error::Transport(transport) => {
                let detail = transport.to_string();
                match transport.kind() {
                    ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed => {
                        BotError::Connection { op, detail }
                    }
                    _ if is_timeout_message(&detail) => BotError::Timeout { op },
                    _ => BotError::Interrupted { op, detail },
                }
            }
        }
    }
}

fn is_timeout_message(detail: &str) -> bool {
    let lowered = detail.to_ascii_lowercase();
    lowered.contains("timed out") || lowered.contains("timeout")
}

pub(crate) type BotResult<T> = Result<T, BotError>;

/// Runs a read-only `call`, and runs it a second time if the first failure is retryable.
pub(crate) fn retry_once<T>(op: &str, call: impl FnMut() -> BotResult<T>) -> BotResult<T> {
    retry_if(op, call, BotError::is_retryable)
}

/// Runs a call that changes remote state. It is repeated only when the first
/// attempt never reached the remote, so a slow success is not sent twice.
pub(crate) fn retry_unsent<T>(op: &str, call: impl FnMut() -> BotResult<T>) -> BotResult<T> {
    retry_if(op, call, BotError::is_safe_to_resend)
}

fn retry_if<T>(
    op: &str,
    mut call: impl FnMut() -> BotResult<T>,
    should_retry: fn(&BotError) -> bool,
) -> BotResult<T> {
    match call() {
        Err(err) if should_retry(&err) => {
            tracing::warn!(op, error = %err, "remote call failed, retrying once");
            call()
        }
        other => other,
    }
}
