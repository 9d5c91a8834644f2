use thiserror::Error;

use crate::config::{ExpandError, HostSpecError};

#[derive(Error, Debug)]
pub enum DialError {
    // Resolution errors
    #[error("{}", unsupported_message(.setting, .value, .specific))]
    UnsupportedSetting {
        setting: String,
        value: String,
        /// `true` when only this value is unsupported, `false` when the whole setting is
        specific: bool,
    },

    #[error("Setting {key:?} expects yes or no, received {value:?}")]
    NotABoolean { key: String, value: String },

    #[error("Setting {key:?} has invalid numeric value {value:?}: {reason}")]
    InvalidNumber {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid host specification: {0}")]
    HostSpec(#[from] HostSpecError),

    #[error("Expansion failed: {0}")]
    Expand(#[from] ExpandError),

    // Validation errors
    #[error(transparent)]
    Field(#[from] FieldError),

    // Dial errors
    #[error("Unknown address family: {family:?}")]
    UnknownAddressFamily { family: String },

    #[error("Dial cancelled: context was closed")]
    ContextClosed,

    #[error("ProxyJump cycle detected at {alias} (chain: {chain})")]
    JumpCycle { alias: String, chain: String },

    #[error("Resource closer panicked during cleanup")]
    CloserPanicked,

    // SSH errors
    #[error("SSH connection failed to {host}: {reason}")]
    Connection { host: String, reason: String },

    #[error("SSH host key mismatch for {host}: expected {expected}, got {actual}")]
    HostKeyMismatch {
        host: String,
        expected: String,
        actual: String,
    },

    #[error("SSH host key unknown for {host} (fingerprint: {fingerprint})")]
    HostKeyUnknown { host: String, fingerprint: String },

    #[error("Failed to access known_hosts: {0}")]
    KnownHosts(String),

    #[error("SSH authentication failed for {user}@{host}")]
    Auth { user: String, host: String },

    #[error("SSH command execution failed: {reason}")]
    Exec { reason: String },

    #[error("SSH protocol error: {0}")]
    Ssh(#[from] russh::Error),

    // Settings errors
    #[error("Settings file not found: {path}")]
    SettingsNotFound { path: String },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn unsupported_message(setting: &str, value: &str, specific: &bool) -> String {
    if *specific {
        format!("unsupported configuration value for setting {setting:?}: {value:?}")
    } else {
        format!("unsupported configuration setting {setting:?} (has value {value:?})")
    }
}

/// A validated profile field that failed its check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Field {field:?}: {cause}")]
pub struct FieldError {
    pub field: &'static str,
    pub cause: FieldCause,
}

impl FieldError {
    #[must_use]
    pub const fn new(field: &'static str, cause: FieldCause) -> Self {
        Self { field, cause }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCause {
    #[error("field must be non-empty")]
    Empty,
    #[error("field value invalid")]
    Invalid,
    #[error("no supported value found")]
    NoSupportedValue,
}

pub type Result<T> = std::result::Result<T, DialError>;
