//! Error kinds that are allowed to be fatal or to cross component
//! boundaries. Everything else (fetch/brain/doc/subprocess failures) is
//! swallowed locally and logged — see `spec.md` §7.

use thiserror::Error;

/// Configuration errors are the only startup-fatal error kind.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable LLM_AGGREGATOR_CONFIG is not set")]
    MissingEnvVar,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path} as YAML: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from the brain client. Never fatal; the enrichment loop requeues
/// the batch and backs off.
#[derive(Debug, Error)]
pub enum BrainError {
    #[error("brain request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("brain returned HTTP {0}")]
    Status(u16),

    #[error("brain response was not valid JSON: {0}")]
    Malformed(String),
}
