//! Error types for the polyglot-runes MCP server.
//!
//! Errors are organized by layer: [`LspError`] for a single downstream
//! language server, [`BridgeError`] for the pool, fan-out and facade, and the
//! crate-wide [`Error`] that wraps both.

use std::fmt;

use thiserror::Error;

use crate::language::LanguageId;

/// Errors related to LSP client operations.
#[derive(Debug, Error)]
pub enum LspError {
    /// The language server process failed to start.
    #[error("failed to start language server: {0}")]
    ServerStartFailed(String),

    /// The language server process exited unexpectedly.
    #[error("language server exited unexpectedly: {0}")]
    ServerExited(String),

    /// Failed to initialize the language server.
    #[error("language server initialization failed: {0}")]
    InitializationFailed(String),

    /// The language server returned an error response.
    #[error("language server error: {message} (code: {code})")]
    ServerError {
        /// The error code from the language server.
        code: i32,
        /// The error message from the language server.
        message: String,
    },

    /// A request to the language server timed out.
    #[error("language server request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The transport to the language server is gone.
    #[error("lost connection to language server: {0}")]
    ConnectionLost(String),

    /// Failed to send a request to the language server.
    #[error("failed to send request to language server: {0}")]
    RequestFailed(String),

    /// The requested capability is not supported by the language server.
    #[error("capability not supported: {0}")]
    CapabilityNotSupported(String),

    /// Document not found or not readable.
    #[error("document not found: {0}")]
    DocumentNotFound(String),
}

impl LspError {
    /// Returns `true` when the failure means the server process or its pipes
    /// are unusable, so the connection has to be restarted.
    ///
    /// Error responses, timeouts and unreadable documents leave the session
    /// intact.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            Self::ServerStartFailed(_)
                | Self::ServerExited(_)
                | Self::InitializationFailed(_)
                | Self::ConnectionLost(_)
        )
    }

    /// Converts a transport-level async-lsp error into an [`LspError`].
    pub(crate) fn from_transport(method: &str, err: async_lsp::Error) -> Self {
        match err {
            async_lsp::Error::Response(resp) => Self::ServerError {
                code: resp.code.0,
                message: format!("{method}: {}", resp.message),
            },
            async_lsp::Error::ServiceStopped | async_lsp::Error::Eof => {
                Self::ConnectionLost(format!("{method}: {err}"))
            }
            async_lsp::Error::Io(e) => Self::ConnectionLost(format!("{method}: {e}")),
            other => Self::RequestFailed(format!("{method} failed: {other:?}")),
        }
    }
}

/// A failure attributed to one language of a multi-language operation.
#[derive(Debug, Clone)]
pub struct LanguageFailure {
    /// Language whose connection or request failed.
    pub language: LanguageId,
    /// The underlying failure.
    pub error: BridgeError,
}

impl LanguageFailure {
    /// Pairs a language with the error it produced.
    pub fn new(language: LanguageId, error: BridgeError) -> Self {
        Self { language, error }
    }
}

impl fmt::Display for LanguageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "language {}: {}", self.language, self.error)
    }
}

/// Errors surfaced by the client pool, the fan-out executor and the bridge
/// facade.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// No language could be inferred for a file or project.
    #[error("language inference failed: {0}")]
    LanguageInferenceFailed(String),

    /// Spawning or initializing a language server failed.
    #[error("failed to initialize {language} language server: {reason}")]
    ConnectionInitializationFailed {
        /// Language of the connection.
        language: LanguageId,
        /// What went wrong.
        reason: String,
    },

    /// The connection was closed while the call was pending or before it started.
    #[error("connection to {language} language server is closed")]
    ConnectionClosed {
        /// Language of the connection.
        language: LanguageId,
    },

    /// Restart attempts are exhausted; the connection is closed.
    #[error("{language} language server unavailable after {attempts} restart attempts")]
    UpstreamUnavailable {
        /// Language of the connection.
        language: LanguageId,
        /// Consecutive failed attempts when the policy gave up.
        attempts: u32,
    },

    /// The server answered the request with an error or did not answer in time.
    #[error("{language} request failed: {reason}")]
    RequestFailed {
        /// Language of the connection.
        language: LanguageId,
        /// Downstream failure description.
        reason: String,
    },

    /// A fan-out finished with results and failures side by side.
    #[error(
        "{} of {} languages failed: {}",
        failed.len(),
        failed.len() + succeeded.len(),
        join_failures(failed)
    )]
    PartialBatchFailure {
        /// Languages that produced a result.
        succeeded: Vec<LanguageId>,
        /// Languages that failed.
        failed: Vec<LanguageFailure>,
    },

    /// Every language of a multi-language operation failed.
    #[error("all languages failed: {}", join_failures(failures))]
    BatchFailed {
        /// One entry per failed language.
        failures: Vec<LanguageFailure>,
    },

    /// A multi-language operation resolved zero languages.
    #[error("no languages to query")]
    NoLanguages,

    /// Malformed coordinates, empty query, unknown direction or mode.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Applying edits to the workspace failed.
    #[error("failed to apply edits: {0}")]
    EditFailed(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl BridgeError {
    /// Returns the language this error originated from, when there is exactly one.
    pub fn language(&self) -> Option<&LanguageId> {
        match self {
            Self::ConnectionInitializationFailed { language, .. }
            | Self::ConnectionClosed { language }
            | Self::UpstreamUnavailable { language, .. }
            | Self::RequestFailed { language, .. } => Some(language),
            _ => None,
        }
    }

    /// Wraps a downstream failure for the given language.
    pub(crate) fn request(language: &LanguageId, err: &LspError) -> Self {
        Self::RequestFailed {
            language: language.clone(),
            reason: err.to_string(),
        }
    }
}

fn join_failures(failures: &[LanguageFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A unified error type for the entire application.
#[derive(Debug, Error)]
pub enum Error {
    /// LSP-related error.
    #[error("LSP error: {0}")]
    Lsp(#[from] LspError),

    /// Pool or facade error.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for polyglot-runes operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for pool, fan-out and facade operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
