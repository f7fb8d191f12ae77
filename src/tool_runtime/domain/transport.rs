//! Transport configuration value objects.

use super::{ParseTransportKindError, ToolRuntimeDomainError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Default request timeout applied to network tool servers.
const DEFAULT_NETWORK_TIMEOUT_MS: u64 = 30_000;

/// Settings for a tool server hosted as a local child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTransportConfig {
    executable: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_directory: Option<String>,
}

impl ProcessTransportConfig {
    /// Creates a process transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRuntimeDomainError::EmptyExecutable`] when `executable`
    /// is empty after trimming.
    pub fn new(executable: impl Into<String>) -> Result<Self, ToolRuntimeDomainError> {
        let normalized = executable.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ToolRuntimeDomainError::EmptyExecutable);
        }

        Ok(Self {
            executable: normalized,
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
        })
    }

    /// Builds a configuration from an install command such as
    /// `npx -y @scope/server`, splitting it with POSIX shell-word rules.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRuntimeDomainError::UnparseableCommandLine`] for
    /// unbalanced quoting and [`ToolRuntimeDomainError::EmptyExecutable`]
    /// when the command has no words.
    pub fn from_command_line(command_line: &str) -> Result<Self, ToolRuntimeDomainError> {
        let words = shell_words::split(command_line).map_err(|err| {
            ToolRuntimeDomainError::UnparseableCommandLine {
                command: command_line.to_owned(),
                reason: err.to_string(),
            }
        })?;
        let mut remaining = words.into_iter();
        let executable = remaining
            .next()
            .ok_or(ToolRuntimeDomainError::EmptyExecutable)?;
        Ok(Self::new(executable)?.with_args(remaining))
    }

    /// Replaces command-line arguments.
    #[must_use]
    pub fn with_args(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.args = values.into_iter().collect();
        self
    }

    /// Replaces the environment overlay applied on top of the inherited
    /// environment.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = values.into_iter().collect();
        self
    }

    /// Sets an explicit working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRuntimeDomainError::EmptyWorkingDirectory`] when the
    /// provided value is empty after trimming.
    pub fn with_working_directory(
        mut self,
        value: impl Into<String>,
    ) -> Result<Self, ToolRuntimeDomainError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ToolRuntimeDomainError::EmptyWorkingDirectory);
        }

        self.working_directory = Some(normalized);
        Ok(self)
    }

    /// Returns the executable.
    #[must_use]
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Returns command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the environment overlay.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the optional working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }

    /// Renders executable and arguments for diagnostics.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Settings for a tool server reachable over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTransportConfig {
    base_url: String,
    timeout_ms: u64,
}

impl NetworkTransportConfig {
    /// Creates a network transport configuration with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRuntimeDomainError`] when `base_url` is empty or does
    /// not start with `http://` or `https://`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ToolRuntimeDomainError> {
        let normalized = base_url.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ToolRuntimeDomainError::EmptyBaseUrl);
        }

        let has_valid_prefix =
            normalized.starts_with("http://") || normalized.starts_with("https://");
        if !has_valid_prefix {
            return Err(ToolRuntimeDomainError::InvalidBaseUrl(normalized));
        }

        Ok(Self {
            base_url: normalized,
            timeout_ms: DEFAULT_NETWORK_TIMEOUT_MS,
        })
    }

    /// Overrides the per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRuntimeDomainError::NonPositiveSetting`] for a zero
    /// timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ToolRuntimeDomainError> {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Err(ToolRuntimeDomainError::NonPositiveSetting("timeout"));
        }
        self.timeout_ms = millis;
        Ok(self)
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// How a tool server is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "config")]
pub enum TransportConfig {
    /// JSON-RPC over a child process's standard streams.
    Process(ProcessTransportConfig),
    /// JSON-RPC over HTTP POST.
    Network(NetworkTransportConfig),
}

impl TransportConfig {
    /// Creates a process transport for a bare executable.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`ProcessTransportConfig::new`].
    pub fn process(executable: impl Into<String>) -> Result<Self, ToolRuntimeDomainError> {
        Ok(Self::Process(ProcessTransportConfig::new(executable)?))
    }

    /// Creates a network transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`NetworkTransportConfig::new`].
    pub fn network(base_url: impl Into<String>) -> Result<Self, ToolRuntimeDomainError> {
        Ok(Self::Network(NetworkTransportConfig::new(base_url)?))
    }

    /// Returns the transport kind.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::Process(_) => TransportKind::Process,
            Self::Network(_) => TransportKind::Network,
        }
    }
}

impl From<ProcessTransportConfig> for TransportConfig {
    fn from(config: ProcessTransportConfig) -> Self {
        Self::Process(config)
    }
}

impl From<NetworkTransportConfig> for TransportConfig {
    fn from(config: NetworkTransportConfig) -> Self {
        Self::Network(config)
    }
}

/// Discriminant of [`TransportConfig`], as persisted with instance records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Child-process transport.
    Process,
    /// HTTP transport.
    Network,
}

impl TransportKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Process => "stdio",
            Self::Network => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TransportKind {
    type Error = ParseTransportKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" | "process" => Ok(Self::Process),
            "http" | "network" => Ok(Self::Network),
            _ => Err(ParseTransportKindError(value.to_owned())),
        }
    }
}
