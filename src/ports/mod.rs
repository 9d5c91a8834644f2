//! Ports module - Trait definitions for hexagonal architecture
//!
//! This module contains the trait definitions (ports) that define
//! the boundaries between the dial pipeline and external adapters.

mod auth;
mod source;
mod transport;

pub use auth::{AuthMethod, AuthProvider, CredentialPrompt, Question};
pub use source::{AliasView, ConfigSource};
pub use transport::{BoxedStream, ByteStream, ConnectSettings, Network, Transport, TunnelClient};

#[cfg(test)]
pub use auth::mock::MockPrompt;
#[cfg(test)]
pub use transport::mock::{Behavior, MockClient, MockTransport};
