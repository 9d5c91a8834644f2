//! Transport Port
//!
//! Abstracts byte-stream dialing and SSH client establishment so the dial
//! pipeline can be exercised without real servers.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::HostKeyVerification;
use crate::domain::Connection;
use crate::error::Result;
use crate::ports::AuthMethod;

/// Anything that can carry an SSH session.
pub trait ByteStream: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send> ByteStream for T {}

pub type BoxedStream = Pin<Box<dyn ByteStream>>;

/// Network selector derived from `AddressFamily`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// Either IPv4 or IPv6
    Tcp,
    Tcp4,
    Tcp6,
}

impl Network {
    /// Whether a resolved socket address belongs to this network.
    #[must_use]
    pub fn admits(self, addr: &std::net::SocketAddr) -> bool {
        match self {
            Self::Tcp => true,
            Self::Tcp4 => addr.is_ipv4(),
            Self::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Tcp4 => f.write_str("tcp4"),
            Self::Tcp6 => f.write_str("tcp6"),
        }
    }
}

/// Everything an SSH handshake needs, derived from a validated profile.
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    /// Alias the settings were resolved for (used in logs and errors)
    pub alias: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    /// Bound on handshake plus authentication
    pub timeout: Option<Duration>,
    pub ciphers: Vec<String>,
    pub kex_algorithms: Vec<String>,
    pub macs: Vec<String>,
    pub host_key_algorithms: Vec<String>,
    pub host_key_verification: HostKeyVerification,
    pub keepalive_max: usize,
    pub auth_methods: Vec<AuthMethod>,
}

/// Creates raw connections and SSH clients on top of them.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The client type produced by [`Transport::connect`]
    type Client: TunnelClient + 'static;

    /// Open a direct connection to `address` (`host:port`).
    async fn dial(
        &self,
        network: Network,
        address: &str,
        timeout: Option<Duration>,
    ) -> Result<BoxedStream>;

    /// Run the SSH handshake and authentication over `connection`.
    async fn connect(
        &self,
        connection: Connection,
        settings: ConnectSettings,
    ) -> Result<Self::Client>;
}

/// An established SSH client usable as a jump host.
#[async_trait]
pub trait TunnelClient: Send + Sync {
    /// Open a forwarded stream to `host:port` as seen from the remote side.
    async fn dial_tunnel(&self, network: Network, host: &str, port: u16) -> Result<BoxedStream>;

    /// Close the client. Calling this more than once is harmless.
    async fn close(&self) -> Result<()>;
}
