use std::fmt;
use std::time::Duration;

use crate::ports::Network;

/// Fully resolved connection settings for one host alias.
///
/// Produced by [`resolve_profile_config`](super::resolve_profile_config) and
/// checked by [`validate`](super::validate) before any dial uses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub address_family: AddressFamily,
    pub hostname: String,
    pub username: String,
    pub port: u16,

    /// Algorithm preferences; empty means "let the transport decide"
    pub ciphers: Vec<String>,
    pub kex_algorithms: Vec<String>,
    pub macs: Vec<String>,
    pub host_key_algorithms: Vec<String>,

    pub compression: bool,

    /// Jump hosts in dial order, each an alias string
    pub proxy_jump: Vec<String>,

    /// `None` when `ConnectTimeout` is 0
    pub connect_timeout: Option<Duration>,
    pub connection_attempts: u64,
    pub rekey_limit: RekeyLimit,
    pub server_alive_interval: Duration,
    pub server_alive_count_max: u64,

    // Authentication
    pub identity_agent: String,
    pub identity_files: Vec<String>,
    pub identities_only: bool,
    pub preferred_authentications: String,
    pub pubkey_authentication: bool,
    pub kbd_interactive_authentication: bool,
    pub password_authentication: bool,
    pub number_of_password_prompts: u64,

    pub strict_host_key_checking: HostKeyVerification,
}

pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECTION_ATTEMPTS: u64 = 1;
pub const DEFAULT_SERVER_ALIVE_COUNT_MAX: u64 = 3;
pub const DEFAULT_IDENTITY_AGENT: &str = "SSH_AUTH_SOCK";
pub const DEFAULT_IDENTITY_FILES: &[&str] = &[
    "~/.ssh/id_rsa",
    "~/.ssh/id_ecdsa",
    "~/.ssh/id_ecdsa_sk",
    "~/.ssh/id_ed25519",
    "~/.ssh/id_ed25519_sk",
    "~/.ssh/id_dsa",
];
pub const DEFAULT_PREFERRED_AUTHENTICATIONS: &str =
    "gssapi-with-mic,hostbased,publickey,keyboard-interactive,password";
pub const DEFAULT_NUMBER_OF_PASSWORD_PROMPTS: u64 = 3;

impl ProfileConfig {
    /// A configuration with every setting at its default.
    #[must_use]
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            address_family: AddressFamily::Any,
            hostname: hostname.into(),
            username: username.into(),
            port: DEFAULT_PORT,
            ciphers: Vec::new(),
            kex_algorithms: Vec::new(),
            macs: Vec::new(),
            host_key_algorithms: Vec::new(),
            compression: false,
            proxy_jump: Vec::new(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            connection_attempts: DEFAULT_CONNECTION_ATTEMPTS,
            rekey_limit: RekeyLimit::Unset,
            server_alive_interval: Duration::ZERO,
            server_alive_count_max: DEFAULT_SERVER_ALIVE_COUNT_MAX,
            identity_agent: DEFAULT_IDENTITY_AGENT.to_string(),
            identity_files: DEFAULT_IDENTITY_FILES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            identities_only: false,
            preferred_authentications: DEFAULT_PREFERRED_AUTHENTICATIONS.to_string(),
            pubkey_authentication: true,
            kbd_interactive_authentication: true,
            password_authentication: true,
            number_of_password_prompts: DEFAULT_NUMBER_OF_PASSWORD_PROMPTS,
            strict_host_key_checking: HostKeyVerification::Strict,
        }
    }
}

/// `AddressFamily` setting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AddressFamily {
    #[default]
    Any,
    Inet,
    Inet6,
    /// Anything else; rejected by validation
    Unknown(String),
}

impl AddressFamily {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "any" => Self::Any,
            "inet" => Self::Inet,
            "inet6" => Self::Inet6,
            _ => Self::Unknown(value.to_string()),
        }
    }

    /// The network to dial for this family, `None` for an unknown family.
    #[must_use]
    pub const fn network(&self) -> Option<Network> {
        match self {
            Self::Any => Some(Network::Tcp),
            Self::Inet => Some(Network::Tcp4),
            Self::Inet6 => Some(Network::Tcp6),
            Self::Unknown(_) => None,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Inet => f.write_str("inet"),
            Self::Inet6 => f.write_str("inet6"),
            Self::Unknown(value) => f.write_str(value),
        }
    }
}

/// `RekeyLimit` setting. Only the unset state is accepted by validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RekeyLimit {
    #[default]
    Unset,
    Fixed(String),
}

impl RekeyLimit {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_lowercase().as_str() {
            "" | "default none" => Self::Unset,
            _ => Self::Fixed(value.to_string()),
        }
    }
}

/// Host key verification mode, from `StrictHostKeyChecking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyVerification {
    /// Strict: reject unknown hosts, reject mismatched keys (default)
    #[default]
    Strict,
    /// Accept new: add unknown hosts to `known_hosts`, reject mismatched keys
    AcceptNew,
    /// Off: accept all keys (insecure, for testing only)
    Off,
}

impl HostKeyVerification {
    /// Map an OpenSSH `StrictHostKeyChecking` value. `ask` has no prompt
    /// here and is treated as strict.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" | "ask" => Some(Self::Strict),
            "accept-new" => Some(Self::AcceptNew),
            "no" | "off" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Process-level fallbacks used during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    /// Used when neither the alias nor the config names a user
    pub username: String,
}

impl Defaults {
    /// Defaults taken from the running process.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            username: local_username(),
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self::from_env()
    }
}

/// The current system user, falling back to `root`.
#[must_use]
pub fn local_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}
