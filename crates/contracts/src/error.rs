//! Layered error definitions
//!
//! Categorized by layer: config / upstream fetch / transform / sink

use std::time::Duration;

use thiserror::Error;

/// Unified error type for configuration, sinks and stores
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Unknown adapter type requested by a source
    #[error("unknown source type '{source_type}' for source '{source_id}'")]
    UnknownSourceType {
        source_id: String,
        source_type: String,
    },

    /// Credentials referenced by a source could not be resolved
    #[error("credentials '{reference}' for source '{source_id}' are not set")]
    MissingCredentials { source_id: String, reference: String },

    // ===== Sink Errors =====
    /// Sink write error (SinkWriteFailed)
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink connection error
    pub fn sink_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}

/// Upstream fetch failures
///
/// Transport-level problems are retried with backoff; auth problems are a
/// configuration issue and are surfaced immediately.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Network failure, timeout or 5xx
    #[error("upstream unavailable for source '{source_id}': {message}")]
    UpstreamUnavailable { source_id: String, message: String },

    /// 429 or quota exhausted
    #[error("upstream rate limited for source '{source_id}'")]
    UpstreamRateLimited {
        source_id: String,
        /// `Retry-After` hint, when the upstream sent one
        retry_after: Option<Duration>,
    },

    /// 401 / 403
    #[error("upstream rejected credentials for source '{source_id}' (status {status})")]
    UpstreamAuthError { source_id: String, status: u16 },
}

impl FetchError {
    pub fn unavailable(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    pub fn rate_limited(source_id: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::UpstreamRateLimited {
            source_id: source_id.into(),
            retry_after,
        }
    }

    pub fn auth(source_id: impl Into<String>, status: u16) -> Self {
        Self::UpstreamAuthError {
            source_id: source_id.into(),
            status,
        }
    }

    /// Whether the fetcher may retry this failure within the current cycle
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UpstreamAuthError { .. })
    }

    /// Short label used for metrics and status
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::UpstreamRateLimited { .. } => "upstream_rate_limited",
            Self::UpstreamAuthError { .. } => "upstream_auth_error",
        }
    }
}

/// A raw record that cannot be mapped to a canonical reading
///
/// Per-record and non-fatal: the record is counted and quarantined, the
/// batch carries on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed record from source '{source_id}': {reason}")]
pub struct MalformedRecord {
    pub source_id: String,
    pub reason: String,
}

impl MalformedRecord {
    pub fn new(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }
}
