//! russh-backed [`Transport`]

use std::borrow::Cow;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config};
use russh::{Preferred, cipher, kex, mac};
use russh::keys::Algorithm;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::domain::Connection;
use crate::error::{DialError, FieldCause, FieldError, Result};
use crate::ports::{BoxedStream, ConnectSettings, Network, Transport};
use crate::ssh::client::{ClientHandler, SshClient};
use crate::ssh::known_hosts::default_known_hosts_path;

/// Dials TCP with tokio and speaks SSH with russh.
#[derive(Debug, Clone)]
pub struct RusshTransport {
    known_hosts: PathBuf,
}

impl Default for RusshTransport {
    fn default() -> Self {
        Self {
            known_hosts: default_known_hosts_path(),
        }
    }
}

impl RusshTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` instead of `~/.ssh/known_hosts`.
    #[must_use]
    pub fn with_known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = path.into();
        self
    }
}

async fn connect_addr(addr: SocketAddr, limit: Option<Duration>) -> io::Result<TcpStream> {
    match limit {
        Some(limit) => timeout(limit, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {addr} timed out after {}s", limit.as_secs()),
                )
            })?,
        None => TcpStream::connect(addr).await,
    }
}

#[async_trait]
impl Transport for RusshTransport {
    type Client = SshClient;

    async fn dial(
        &self,
        network: Network,
        address: &str,
        timeout: Option<Duration>,
    ) -> Result<BoxedStream> {
        let candidates: Vec<SocketAddr> = lookup_host(address)
            .await?
            .filter(|addr| network.admits(addr))
            .collect();

        let mut last_error = io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {network} address for {address}"),
        );

        for addr in candidates {
            match connect_addr(addr, timeout).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!(address = %address, peer = %addr, "TCP connection established");
                    return Ok(Box::pin(stream));
                }
                Err(e) => {
                    debug!(address = %address, peer = %addr, error = %e, "TCP connect failed");
                    last_error = e;
                }
            }
        }

        Err(DialError::Io(last_error))
    }

    async fn connect(&self, connection: Connection, settings: ConnectSettings) -> Result<SshClient> {
        let config = Arc::new(client_config(&settings)?);
        let rejection = Arc::new(Mutex::new(None));
        let handler = ClientHandler::new(
            settings.hostname.clone(),
            settings.port,
            settings.host_key_verification,
            self.known_hosts.clone(),
            Arc::clone(&rejection),
        );

        let establish = async {
            let handle = client::connect_stream(config, connection, handler)
                .await
                .map_err(|e| {
                    rejection
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take()
                        .unwrap_or(DialError::Ssh(e))
                })?;
            debug!(host = %settings.alias, "SSH handshake complete");
            SshClient::authenticate(handle, &settings).await
        };

        let client = match settings.timeout {
            Some(limit) => timeout(limit, establish).await.map_err(|_| {
                tracing::error!(host = %settings.alias, timeout_secs = limit.as_secs(), "SSH connection timeout");
                DialError::Connection {
                    host: settings.alias.clone(),
                    reason: format!("Connection timeout after {}s", limit.as_secs()),
                }
            })??,
            None => establish.await?,
        };

        info!(host = %settings.alias, user = %settings.username, "SSH client ready");
        Ok(client)
    }
}

/// russh client configuration for `settings`.
fn client_config(settings: &ConnectSettings) -> Result<Config> {
    Ok(Config {
        preferred: preferred(settings)?,
        keepalive_max: settings.keepalive_max,
        ..Default::default()
    })
}

/// Replace russh's defaults with the configured algorithm names, in
/// configured order. An empty list keeps the defaults.
///
/// # Errors
///
/// Returns a field error when a non-empty list names nothing russh can
/// negotiate.
fn preferred(settings: &ConnectSettings) -> Result<Preferred> {
    let base = Preferred::default();

    let kex = match resolve("KexAlgorithms", &settings.kex_algorithms, |n| {
        kex::Name::try_from(n).ok()
    })? {
        Some(mut names) => {
            names.extend([
                kex::EXTENSION_SUPPORT_AS_CLIENT,
                kex::EXTENSION_OPENSSH_STRICT_KEX_AS_CLIENT,
            ]);
            Cow::Owned(names)
        }
        None => base.kex,
    };
    let key = resolve("HostKeyAlgorithms", &settings.host_key_algorithms, |n| {
        Algorithm::new(n).ok()
    })?
    .map_or(base.key, Cow::Owned);
    let cipher = resolve("Ciphers", &settings.ciphers, |n| {
        cipher::Name::try_from(n).ok()
    })?
    .map_or(base.cipher, Cow::Owned);
    let mac = resolve("MACs", &settings.macs, |n| mac::Name::try_from(n).ok())?
        .map_or(base.mac, Cow::Owned);

    Ok(Preferred {
        kex,
        key,
        cipher,
        mac,
        ..base
    })
}

/// Look up each wanted name. `None` means the list was empty.
fn resolve<T: PartialEq>(
    field: &'static str,
    wanted: &[String],
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<Vec<T>>> {
    if wanted.is_empty() {
        return Ok(None);
    }

    let mut selected = Vec::with_capacity(wanted.len());
    for name in wanted {
        match parse(name) {
            Some(algorithm) if !selected.contains(&algorithm) => selected.push(algorithm),
            Some(_) => {}
            None => debug!(field, name = %name, "Algorithm not known to russh, skipping"),
        }
    }

    if selected.is_empty() {
        return Err(FieldError::new(field, FieldCause::NoSupportedValue).into());
    }
    Ok(Some(selected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostKeyVerification;

    fn settings() -> ConnectSettings {
        ConnectSettings {
            alias: "db".to_string(),
            hostname: "db.internal".to_string(),
            port: 22,
            username: "alice".to_string(),
            timeout: None,
            ciphers: Vec::new(),
            kex_algorithms: Vec::new(),
            macs: Vec::new(),
            host_key_algorithms: Vec::new(),
            host_key_verification: HostKeyVerification::Strict,
            keepalive_max: 3,
            auth_methods: Vec::new(),
        }
    }

    // ============== Algorithm selection ==============

    use crate::config::{
        SUPPORTED_CIPHERS, SUPPORTED_HOST_KEY_ALGORITHMS, SUPPORTED_KEX_ALGORITHMS,
        SUPPORTED_MACS,
    };

    fn only(name: &str) -> Vec<String> {
        vec![name.to_string()]
    }

    #[test]
    fn test_empty_lists_keep_defaults() {
        let base = Preferred::default();
        let preferred = preferred(&settings()).unwrap();
        assert_eq!(preferred.cipher, base.cipher);
        assert_eq!(preferred.kex, base.kex);
        assert_eq!(preferred.mac, base.mac);
        assert_eq!(preferred.key, base.key);
    }

    #[test]
    fn test_configured_order_is_kept() {
        let mut settings = settings();
        settings.ciphers = vec![
            "aes256-ctr".to_string(),
            "chacha20-poly1305@openssh.com".to_string(),
        ];
        settings.host_key_algorithms = only("ssh-ed25519");

        let preferred = preferred(&settings).unwrap();
        let ciphers: Vec<&str> = preferred.cipher.iter().map(AsRef::as_ref).collect();
        assert_eq!(ciphers, vec!["aes256-ctr", "chacha20-poly1305@openssh.com"]);
        assert_eq!(preferred.key.len(), 1);
        assert_eq!(preferred.key[0].as_str(), "ssh-ed25519");
    }

    #[test]
    fn test_cbc_cipher_outside_defaults_is_selected() {
        let mut settings = settings();
        settings.ciphers = only("aes128-cbc");

        let preferred = preferred(&settings).unwrap();
        let ciphers: Vec<&str> = preferred.cipher.iter().map(AsRef::as_ref).collect();
        assert_eq!(ciphers, vec!["aes128-cbc"]);
    }

    #[test]
    fn test_restricted_kex_keeps_client_extensions() {
        let mut settings = settings();
        settings.kex_algorithms = only("diffie-hellman-group14-sha1");

        let preferred = preferred(&settings).unwrap();
        let kex: Vec<&str> = preferred.kex.iter().map(AsRef::as_ref).collect();
        assert_eq!(
            kex,
            vec![
                "diffie-hellman-group14-sha1",
                "ext-info-c",
                "kex-strict-c-v00@openssh.com"
            ]
        );
    }

    #[test]
    fn test_unknown_names_are_an_error() {
        let mut settings = settings();
        settings.macs = only("hmac-made-up");
        let err = preferred(&settings).err().unwrap();
        assert!(matches!(
            err,
            DialError::Field(FieldError { field: "MACs", cause: FieldCause::NoSupportedValue })
        ));
    }

    #[test]
    fn test_duplicate_names_collapse() {
        let mut settings = settings();
        settings.macs = vec!["hmac-sha1".to_string(), "hmac-sha1".to_string()];
        let preferred = preferred(&settings).unwrap();
        assert_eq!(preferred.mac.len(), 1);
    }

    #[test]
    fn test_every_supported_cipher_is_selectable() {
        for name in SUPPORTED_CIPHERS {
            let mut settings = settings();
            settings.ciphers = only(name);
            let preferred = preferred(&settings).unwrap();
            let ciphers: Vec<&str> = preferred.cipher.iter().map(AsRef::as_ref).collect();
            assert_eq!(ciphers, vec![*name]);
        }
    }

    #[test]
    fn test_every_supported_kex_is_selectable() {
        for name in SUPPORTED_KEX_ALGORITHMS {
            let mut settings = settings();
            settings.kex_algorithms = only(name);
            let preferred = preferred(&settings).unwrap();
            assert_eq!(preferred.kex[0].as_ref(), *name);
        }
    }

    #[test]
    fn test_every_supported_mac_is_selectable() {
        for name in SUPPORTED_MACS {
            let mut settings = settings();
            settings.macs = only(name);
            let preferred = preferred(&settings).unwrap();
            let macs: Vec<&str> = preferred.mac.iter().map(AsRef::as_ref).collect();
            assert_eq!(macs, vec![*name]);
        }
    }

    #[test]
    fn test_every_supported_host_key_is_selectable() {
        for name in SUPPORTED_HOST_KEY_ALGORITHMS {
            let mut settings = settings();
            settings.host_key_algorithms = only(name);
            let preferred = preferred(&settings).unwrap();
            assert_eq!(preferred.key.len(), 1);
            assert_eq!(preferred.key[0].as_str(), *name);
        }
    }

    #[test]
    fn test_client_config_keepalive() {
        let mut settings = settings();
        settings.keepalive_max = 7;
        assert_eq!(client_config(&settings).unwrap().keepalive_max, 7);
    }

    // ============== Dialing ==============

    #[tokio::test]
    async fn test_dial_reaches_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let transport = RusshTransport::new();
        let stream = transport
            .dial(Network::Tcp4, &address, Some(Duration::from_secs(5)))
            .await;
        assert!(stream.is_ok());
        let (_peer, _) = listener.accept().await.unwrap();
    }

    #[tokio::test]
    async fn test_dial_filters_by_network() {
        let transport = RusshTransport::new();
        let err = transport
            .dial(Network::Tcp6, "127.0.0.1:22", None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DialError::Io(ref e) if e.kind() == io::ErrorKind::AddrNotAvailable));
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = RusshTransport::new()
            .dial(Network::Tcp, &address, None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DialError::Io(_)));
    }
}
