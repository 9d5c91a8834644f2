mod client;
pub mod known_hosts;
mod transport;

pub use client::{CommandOutput, SshClient};
pub use known_hosts::{VerifyResult, default_known_hosts_path, verify_host_key};
pub use transport::RusshTransport;
