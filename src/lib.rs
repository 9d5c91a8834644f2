// Use mimalloc allocator when the feature is enabled (recommended for musl builds)
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod ssh;

pub use config::{HostSpec, ProfileConfig, Settings};
pub use domain::{Closer, Connection, DialResult, Environment, Profile, ResourceStack};
pub use error::{DialError, FieldCause, FieldError, Result};
pub use ports::{ConfigSource, Transport, TunnelClient};
pub use ssh::{RusshTransport, SshClient};
