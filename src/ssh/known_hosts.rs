//! SSH `known_hosts` verification wrapper around russh's built-in support

use std::path::{Path, PathBuf};

use russh::keys::known_hosts::{check_known_hosts_path, learn_known_hosts_path};
use russh::keys::{Error as KeyError, HashAlg, PublicKey};
use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use crate::config::HostKeyVerification;
use crate::error::{DialError, Result};

/// Result of looking a host key up in `known_hosts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Match,
    /// A different key of the same type is recorded on `line`
    Mismatch { line: usize },
    Unknown,
}

/// `~/.ssh/known_hosts`
#[must_use]
pub fn default_known_hosts_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ssh")
        .join("known_hosts")
}

/// Look `key` up in the `known_hosts` file at `path`.
///
/// A missing file counts as no entries.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn verify(hostname: &str, port: u16, key: &PublicKey, path: &Path) -> Result<VerifyResult> {
    match check_known_hosts_path(hostname, port, key, path) {
        Ok(true) => {
            debug!(hostname = %hostname, port = %port, "Host key verified");
            Ok(VerifyResult::Match)
        }
        Ok(false) => {
            debug!(hostname = %hostname, port = %port, "Host key not in known_hosts");
            Ok(VerifyResult::Unknown)
        }
        Err(KeyError::KeyChanged { line }) => {
            warn!(
                hostname = %hostname,
                port = %port,
                line = %line,
                "Host key mismatch detected"
            );
            Ok(VerifyResult::Mismatch { line })
        }
        Err(e) => Err(DialError::KnownHosts(format!(
            "{}: {e}",
            path.display()
        ))),
    }
}

/// Append `key` for `hostname:port` to the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be written to.
pub fn add_key(hostname: &str, port: u16, key: &PublicKey, path: &Path) -> Result<()> {
    learn_known_hosts_path(hostname, port, key, path)
        .map_err(|e| DialError::KnownHosts(format!("{}: {e}", path.display())))?;

    debug!(hostname = %hostname, port = %port, "Added host key to known_hosts");
    Ok(())
}

#[must_use]
pub fn fingerprint(key: &PublicKey) -> String {
    key.fingerprint(HashAlg::Sha256).to_string()
}

/// Warn when `known_hosts` is writable or readable by others.
#[cfg(unix)]
fn check_permissions(path: &Path) {
    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.mode() & 0o777;
        if mode & 0o077 != 0 && mode != 0o644 {
            warn!(
                path = %path.display(),
                mode = format!("{mode:o}"),
                "known_hosts file has overly permissive permissions"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) {}

/// Apply the `StrictHostKeyChecking` policy to a server key.
///
/// # Errors
///
/// Returns an error if:
/// - The key differs from the recorded one (`Strict` and `AcceptNew`)
/// - The host is unknown (`Strict`)
/// - The `known_hosts` file cannot be read or written to
pub fn verify_host_key(
    hostname: &str,
    port: u16,
    key: &PublicKey,
    mode: HostKeyVerification,
    path: &Path,
) -> Result<()> {
    if mode == HostKeyVerification::Off {
        warn!(
            hostname = %hostname,
            "Host key verification is disabled for this host"
        );
        return Ok(());
    }

    check_permissions(path);

    match verify(hostname, port, key, path)? {
        VerifyResult::Match => Ok(()),
        VerifyResult::Mismatch { line } => Err(DialError::HostKeyMismatch {
            host: hostname.to_string(),
            expected: format!("key from known_hosts line {line}"),
            actual: fingerprint(key),
        }),
        VerifyResult::Unknown if mode == HostKeyVerification::AcceptNew => {
            warn!(hostname = %hostname, fingerprint = %fingerprint(key), "Adding new host key to known_hosts");
            add_key(hostname, port, key, path)
        }
        VerifyResult::Unknown => Err(DialError::HostKeyUnknown {
            host: hostname.to_string(),
            fingerprint: fingerprint(key),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY_A: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEB";
    const KEY_B: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgIC";

    fn key(openssh: &str) -> PublicKey {
        PublicKey::from_openssh(openssh).unwrap()
    }

    fn known_hosts(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("known_hosts");
        std::fs::write(&path, content).unwrap();
        path
    }

    // ============== Lookup ==============

    #[test]
    fn test_missing_file_is_unknown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent");
        assert_eq!(
            verify("db.internal", 22, &key(KEY_A), &path).unwrap(),
            VerifyResult::Unknown
        );
    }

    #[test]
    fn test_recorded_key_matches() {
        let dir = TempDir::new().unwrap();
        let path = known_hosts(&dir, &format!("db.internal {KEY_A}\n"));
        assert_eq!(
            verify("db.internal", 22, &key(KEY_A), &path).unwrap(),
            VerifyResult::Match
        );
    }

    #[test]
    fn test_changed_key_reports_line() {
        let dir = TempDir::new().unwrap();
        let path = known_hosts(&dir, &format!("db.internal {KEY_A}\n"));
        assert_eq!(
            verify("db.internal", 22, &key(KEY_B), &path).unwrap(),
            VerifyResult::Mismatch { line: 1 }
        );
    }

    // ============== Policy ==============

    #[test]
    fn test_strict_rejects_unknown_host() {
        let dir = TempDir::new().unwrap();
        let path = known_hosts(&dir, "");
        let err = verify_host_key(
            "db.internal",
            22,
            &key(KEY_A),
            HostKeyVerification::Strict,
            &path,
        )
        .unwrap_err();
        assert!(matches!(err, DialError::HostKeyUnknown { ref fingerprint, .. } if fingerprint.starts_with("SHA256:")));
    }

    #[test]
    fn test_strict_rejects_changed_key() {
        let dir = TempDir::new().unwrap();
        let path = known_hosts(&dir, &format!("db.internal {KEY_A}\n"));
        let err = verify_host_key(
            "db.internal",
            22,
            &key(KEY_B),
            HostKeyVerification::Strict,
            &path,
        )
        .unwrap_err();
        assert!(matches!(err, DialError::HostKeyMismatch { .. }));
    }

    #[test]
    fn test_accept_new_learns_then_matches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("known_hosts");

        verify_host_key(
            "db.internal",
            22,
            &key(KEY_A),
            HostKeyVerification::AcceptNew,
            &path,
        )
        .unwrap();
        verify_host_key(
            "db.internal",
            22,
            &key(KEY_A),
            HostKeyVerification::Strict,
            &path,
        )
        .unwrap();
    }

    #[test]
    fn test_accept_new_rejects_changed_key() {
        let dir = TempDir::new().unwrap();
        let path = known_hosts(&dir, &format!("db.internal {KEY_A}\n"));
        let err = verify_host_key(
            "db.internal",
            22,
            &key(KEY_B),
            HostKeyVerification::AcceptNew,
            &path,
        )
        .unwrap_err();
        assert!(matches!(err, DialError::HostKeyMismatch { .. }));
    }

    #[test]
    fn test_off_accepts_anything() {
        let dir = TempDir::new().unwrap();
        let path = known_hosts(&dir, &format!("db.internal {KEY_A}\n"));
        verify_host_key(
            "db.internal",
            22,
            &key(KEY_B),
            HostKeyVerification::Off,
            &path,
        )
        .unwrap();
    }

    #[test]
    fn test_default_path() {
        assert!(default_known_hosts_path().ends_with(".ssh/known_hosts"));
    }
}
