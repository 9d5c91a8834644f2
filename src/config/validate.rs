//! Profile validation.
//!
//! Checks run in a fixed order and stop at the first failure. Algorithm
//! lists are filtered down to supported names in place; whether an entirely
//! unsupported list is an error or is cleared depends on strict mode.

use tracing::debug;

use super::algorithms::{
    SUPPORTED_CIPHERS, SUPPORTED_KEX_ALGORITHMS, SUPPORTED_MACS, is_supported_host_key_algorithm,
};
use super::host::HostSpec;
use super::types::{AddressFamily, ProfileConfig, RekeyLimit};
use crate::error::{FieldCause, FieldError};

/// Validate `config`, filtering its algorithm lists in place.
///
/// # Errors
///
/// Returns the first failing field, checked in this order: `AddressFamily`,
/// `Ciphers`, `Compression`, `ConnectionAttempts`, `HostKeyAlgorithms`,
/// `Hostname`, `KexAlgorithms`, `MACs`, `ProxyJump`, `Port`, `RekeyLimit`,
/// `ServerAliveInterval`, `User`.
pub fn validate(config: &mut ProfileConfig, strict: bool) -> Result<(), FieldError> {
    if let AddressFamily::Unknown(_) = config.address_family {
        return Err(FieldError::new("AddressFamily", FieldCause::Invalid));
    }

    filter_supported("Ciphers", &mut config.ciphers, strict, |name| {
        SUPPORTED_CIPHERS.contains(&name)
    })?;

    if config.compression {
        return Err(FieldError::new("Compression", FieldCause::Invalid));
    }

    if config.connection_attempts != 1 {
        return Err(FieldError::new("ConnectionAttempts", FieldCause::Invalid));
    }

    filter_supported(
        "HostKeyAlgorithms",
        &mut config.host_key_algorithms,
        strict,
        is_supported_host_key_algorithm,
    )?;

    if config.hostname.is_empty() {
        return Err(FieldError::new("Hostname", FieldCause::Empty));
    }

    filter_supported("KexAlgorithms", &mut config.kex_algorithms, strict, |name| {
        SUPPORTED_KEX_ALGORITHMS.contains(&name)
    })?;

    filter_supported("MACs", &mut config.macs, strict, |name| {
        SUPPORTED_MACS.contains(&name)
    })?;

    if config.proxy_jump.iter().any(|jump| !HostSpec::is_valid(jump)) {
        return Err(FieldError::new("ProxyJump", FieldCause::Invalid));
    }

    if config.port == 0 || config.port == u16::MAX {
        return Err(FieldError::new("Port", FieldCause::Invalid));
    }

    if config.rekey_limit != RekeyLimit::Unset {
        return Err(FieldError::new("RekeyLimit", FieldCause::Invalid));
    }

    if !config.server_alive_interval.is_zero() {
        return Err(FieldError::new("ServerAliveInterval", FieldCause::Invalid));
    }

    if config.username.is_empty() {
        return Err(FieldError::new("User", FieldCause::Empty));
    }

    Ok(())
}

/// Keep only supported entries of a non-empty list, in configured order.
fn filter_supported(
    field: &'static str,
    values: &mut Vec<String>,
    strict: bool,
    supported: impl Fn(&str) -> bool,
) -> Result<(), FieldError> {
    if values.is_empty() {
        return Ok(());
    }

    let before = values.len();
    values.retain(|name| supported(name.as_str()));

    if values.is_empty() {
        if strict {
            return Err(FieldError::new(field, FieldCause::NoSupportedValue));
        }
        debug!(field, "No supported algorithm configured, using transport defaults");
    } else if values.len() < before {
        debug!(
            field,
            dropped = before - values.len(),
            "Dropped unsupported algorithms"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn valid() -> ProfileConfig {
        ProfileConfig::new("db.internal", "alice")
    }

    fn field_of(mut config: ProfileConfig, strict: bool) -> Option<&'static str> {
        validate(&mut config, strict).err().map(|e| e.field)
    }

    // ============== Accepted ==============

    #[test]
    fn test_defaults_are_valid() {
        let mut config = valid();
        validate(&mut config, true).unwrap();
        assert_eq!(config, valid());
    }

    #[test]
    fn test_port_bounds() {
        let mut config = valid();
        config.port = 1;
        assert_eq!(field_of(config.clone(), true), None);
        config.port = 65534;
        assert_eq!(field_of(config.clone(), true), None);
        config.port = 0;
        assert_eq!(field_of(config.clone(), true), Some("Port"));
        config.port = 65535;
        assert_eq!(field_of(config, true), Some("Port"));
    }

    // ============== Rejected fields ==============

    #[test]
    fn test_unknown_address_family() {
        let mut config = valid();
        config.address_family = AddressFamily::Unknown("ipx".to_string());
        let err = validate(&mut config, true).unwrap_err();
        assert_eq!(err, FieldError::new("AddressFamily", FieldCause::Invalid));
    }

    #[test]
    fn test_compression_rejected() {
        let mut config = valid();
        config.compression = true;
        assert_eq!(field_of(config, true), Some("Compression"));
    }

    #[test]
    fn test_connection_attempts_must_be_one() {
        let mut config = valid();
        config.connection_attempts = 3;
        assert_eq!(field_of(config, false), Some("ConnectionAttempts"));
    }

    #[test]
    fn test_empty_hostname() {
        let mut config = valid();
        config.hostname.clear();
        let err = validate(&mut config, true).unwrap_err();
        assert_eq!(err.cause, FieldCause::Empty);
        assert_eq!(err.field, "Hostname");
    }

    #[test]
    fn test_invalid_proxy_jump_entry() {
        let mut config = valid();
        config.proxy_jump = vec!["bastion".to_string(), "ssh://edge".to_string()];
        assert_eq!(field_of(config, true), Some("ProxyJump"));
    }

    #[test]
    fn test_rekey_limit_must_be_unset() {
        let mut config = valid();
        config.rekey_limit = RekeyLimit::Fixed("1G".to_string());
        assert_eq!(field_of(config, true), Some("RekeyLimit"));
    }

    #[test]
    fn test_server_alive_interval_must_be_zero() {
        let mut config = valid();
        config.server_alive_interval = Duration::from_secs(30);
        assert_eq!(field_of(config, true), Some("ServerAliveInterval"));
    }

    #[test]
    fn test_empty_user() {
        let mut config = valid();
        config.username.clear();
        assert_eq!(field_of(config, true), Some("User"));
    }

    #[test]
    fn test_first_failure_wins() {
        let mut config = valid();
        config.compression = true;
        config.hostname.clear();
        config.username.clear();
        assert_eq!(field_of(config, true), Some("Compression"));
    }

    // ============== Algorithm filtering ==============

    #[test]
    fn test_ciphers_strict_rejects_all_unsupported() {
        let mut config = valid();
        config.ciphers = vec!["arcfour".to_string()];
        let err = validate(&mut config, true).unwrap_err();
        assert_eq!(err, FieldError::new("Ciphers", FieldCause::NoSupportedValue));
    }

    #[test]
    fn test_ciphers_lenient_clears_all_unsupported() {
        let mut config = valid();
        config.ciphers = vec!["arcfour".to_string()];
        validate(&mut config, false).unwrap();
        assert!(config.ciphers.is_empty());
    }

    #[test]
    fn test_filter_keeps_configured_order() {
        let mut config = valid();
        config.macs = vec![
            "hmac-sha1".to_string(),
            "umac-64@openssh.com".to_string(),
            "hmac-sha2-256".to_string(),
        ];
        validate(&mut config, true).unwrap();
        assert_eq!(config.macs, vec!["hmac-sha1", "hmac-sha2-256"]);
    }

    #[test]
    fn test_host_key_algorithms_drop_certificates() {
        let mut config = valid();
        config.host_key_algorithms = vec![
            "ssh-ed25519-cert-v01@openssh.com".to_string(),
            "ssh-dss".to_string(),
            "rsa-sha2-512".to_string(),
        ];
        validate(&mut config, true).unwrap();
        assert_eq!(config.host_key_algorithms, vec!["rsa-sha2-512"]);
    }

    #[test]
    fn test_strict_cbc_cipher_is_kept() {
        let mut config = valid();
        config.ciphers = vec!["aes128-cbc".to_string()];
        validate(&mut config, true).unwrap();
        assert_eq!(config.ciphers, vec!["aes128-cbc"]);
    }

    #[test]
    fn test_kex_strict_rejects_all_unsupported() {
        let mut config = valid();
        config.kex_algorithms = vec!["sntrup761x25519-sha512@openssh.com".to_string()];
        assert_eq!(field_of(config, true), Some("KexAlgorithms"));
    }

    #[test]
    fn test_empty_algorithm_list_is_untouched() {
        let mut config = valid();
        validate(&mut config, true).unwrap();
        assert!(config.kex_algorithms.is_empty());
        assert!(config.host_key_algorithms.is_empty());
    }
}
