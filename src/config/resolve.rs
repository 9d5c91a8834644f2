//! Build a [`ProfileConfig`] from a [`ConfigSource`].
//!
//! Each key is read with a type-specific coercion and falls back to the
//! defaults in [`ProfileConfig::new`] when absent. Explicit fields of the
//! alias's [`HostSpec`] override the configured user and port.

use std::time::Duration;

use tracing::debug;

use super::host::HostSpec;
use super::types::{
    AddressFamily, DEFAULT_CONNECT_TIMEOUT, DEFAULT_CONNECTION_ATTEMPTS, DEFAULT_IDENTITY_AGENT,
    DEFAULT_IDENTITY_FILES, DEFAULT_NUMBER_OF_PASSWORD_PROMPTS, DEFAULT_PORT,
    DEFAULT_PREFERRED_AUTHENTICATIONS, DEFAULT_SERVER_ALIVE_COUNT_MAX, Defaults,
    HostKeyVerification, ProfileConfig, RekeyLimit,
};
use super::unsupported::check_unsupported;
use crate::error::{DialError, FieldCause, FieldError, Result};
use crate::ports::{AliasView, ConfigSource};

/// Entry value meaning "no jump host".
const SKIP_JUMP: &str = "none";

/// Resolve the configuration for `spec`, without validating it.
///
/// # Errors
///
/// Returns an error if an unsupported setting is present or a value cannot
/// be coerced to its field type.
pub fn resolve_profile_config(
    source: &dyn ConfigSource,
    spec: &HostSpec,
    defaults: &Defaults,
) -> Result<ProfileConfig> {
    let view = AliasView::new(source, &spec.host);
    check_unsupported(&view)?;

    let mut config = ProfileConfig {
        address_family: AddressFamily::parse(&string(&view, "AddressFamily", "any")),
        hostname: string(&view, "Hostname", &spec.host),
        username: string(&view, "User", &defaults.username),
        port: port(&view, "Port", DEFAULT_PORT)?,
        ciphers: string_list(&view, "Ciphers"),
        kex_algorithms: string_list(&view, "KexAlgorithms"),
        macs: string_list(&view, "MACs"),
        host_key_algorithms: string_list(&view, "HostKeyAlgorithms"),
        compression: yes_no(&view, "Compression", false)?,
        proxy_jump: string_lists(&view, "ProxyJump", Some(SKIP_JUMP)),
        connect_timeout: seconds(&view, "ConnectTimeout")?
            .map_or(Some(DEFAULT_CONNECT_TIMEOUT), |t| (!t.is_zero()).then_some(t)),
        connection_attempts: uint(&view, "ConnectionAttempts", DEFAULT_CONNECTION_ATTEMPTS)?,
        rekey_limit: view
            .lookup("RekeyLimit")
            .map_or(RekeyLimit::Unset, |v| RekeyLimit::parse(&v)),
        server_alive_interval: seconds(&view, "ServerAliveInterval")?.unwrap_or(Duration::ZERO),
        server_alive_count_max: uint(
            &view,
            "ServerAliveCountMax",
            DEFAULT_SERVER_ALIVE_COUNT_MAX,
        )?,
        identity_agent: string(&view, "IdentityAgent", DEFAULT_IDENTITY_AGENT),
        identity_files: view.lookup_all("IdentityFile").map_or_else(
            || DEFAULT_IDENTITY_FILES.iter().map(|s| (*s).to_string()).collect(),
            |files| files.into_iter().filter(|f| !f.is_empty()).collect(),
        ),
        identities_only: yes_no(&view, "IdentitiesOnly", false)?,
        preferred_authentications: string(
            &view,
            "PreferredAuthentications",
            DEFAULT_PREFERRED_AUTHENTICATIONS,
        ),
        pubkey_authentication: yes_no(&view, "PubkeyAuthentication", true)?,
        kbd_interactive_authentication: yes_no(&view, "KbdInteractiveAuthentication", true)?,
        password_authentication: yes_no(&view, "PasswordAuthentication", true)?,
        number_of_password_prompts: uint(
            &view,
            "NumberOfPasswordPrompts",
            DEFAULT_NUMBER_OF_PASSWORD_PROMPTS,
        )?,
        strict_host_key_checking: host_key_checking(&view)?,
    };

    if let Some(user) = spec.explicit_user() {
        config.username = user.to_string();
    }
    if let Some(port) = spec.explicit_port() {
        config.port = port;
    }

    debug!(
        alias = %spec,
        hostname = %config.hostname,
        port = config.port,
        jumps = config.proxy_jump.len(),
        "Resolved profile configuration"
    );
    Ok(config)
}

/// Absent or empty values take the default.
fn string(view: &AliasView<'_>, key: &str, default: &str) -> String {
    view.lookup(key)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Comma-separated list; absent or empty means an empty list.
fn string_list(view: &AliasView<'_>, key: &str) -> Vec<String> {
    view.lookup(key)
        .map(|value| split_list(&value))
        .unwrap_or_default()
}

/// Every value of a repeated key, each split on `,`, with `skip` entries
/// removed.
fn string_lists(view: &AliasView<'_>, key: &str, skip: Option<&str>) -> Vec<String> {
    view.lookup_all(key)
        .unwrap_or_default()
        .iter()
        .flat_map(|value| split_list(value))
        .filter(|entry| skip.is_none_or(|s| !entry.eq_ignore_ascii_case(s)))
        .collect()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn yes_no(view: &AliasView<'_>, key: &str, default: bool) -> Result<bool> {
    let Some(value) = view.lookup(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(DialError::NotABoolean {
            key: key.to_string(),
            value,
        }),
    }
}

fn uint(view: &AliasView<'_>, key: &str, default: u64) -> Result<u64> {
    let Some(value) = view.lookup(key) else {
        return Ok(default);
    };
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| DialError::InvalidNumber {
            key: key.to_string(),
            reason: e.to_string(),
            value,
        })
}

fn port(view: &AliasView<'_>, key: &str, default: u16) -> Result<u16> {
    let Some(value) = view.lookup(key) else {
        return Ok(default);
    };
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| DialError::InvalidNumber {
            key: key.to_string(),
            reason: e.to_string(),
            value,
        })
}

/// Whole seconds; absent means `None`.
fn seconds(view: &AliasView<'_>, key: &str) -> Result<Option<Duration>> {
    if view.lookup(key).is_none() {
        return Ok(None);
    }
    uint(view, key, 0).map(|secs| Some(Duration::from_secs(secs)))
}

fn host_key_checking(view: &AliasView<'_>) -> Result<HostKeyVerification> {
    match view.lookup("StrictHostKeyChecking") {
        None => Ok(HostKeyVerification::Strict),
        Some(value) => HostKeyVerification::parse(&value).ok_or_else(|| {
            FieldError::new("StrictHostKeyChecking", FieldCause::Invalid).into()
        }),
    }
}
