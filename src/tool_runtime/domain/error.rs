//! Error types for tool runtime domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing tool runtime domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolRuntimeDomainError {
    /// The process executable is empty after trimming.
    #[error("process executable must not be empty")]
    EmptyExecutable,

    /// The install command line could not be split into words.
    #[error("install command '{command}' could not be parsed: {reason}")]
    UnparseableCommandLine {
        /// Command line as provided.
        command: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The process working directory is empty after trimming.
    #[error("process working directory must not be empty when provided")]
    EmptyWorkingDirectory,

    /// The network base URL is empty.
    #[error("network base URL must not be empty")]
    EmptyBaseUrl,

    /// The network base URL does not have an `http://` or `https://` prefix.
    #[error("network base URL '{0}' must start with 'http://' or 'https://'")]
    InvalidBaseUrl(String),

    /// A configured duration or limit must be strictly positive.
    #[error("runtime setting '{0}' must be greater than zero")]
    NonPositiveSetting(&'static str),
}

/// Error returned while parsing an instance status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown instance status: {0}")]
pub struct ParseInstanceStatusError(pub String);

/// Error returned while parsing a transport kind from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown transport kind: {0}")]
pub struct ParseTransportKindError(pub String);
