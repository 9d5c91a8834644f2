mod algorithms;
mod expand;
mod host;
mod loader;
mod resolve;
mod source;
mod ssh_config;
mod types;
mod unsupported;
mod validate;

pub use algorithms::{
    SUPPORTED_CIPHERS, SUPPORTED_HOST_KEY_ALGORITHMS, SUPPORTED_KEX_ALGORITHMS, SUPPORTED_MACS,
    is_supported_host_key_algorithm,
};
pub use expand::{
    ExpandError, ExpandFlags, Expander, IDENTITY_FLAGS, TokenValues, Variables, process_variables,
};
pub use host::{HostSpec, HostSpecError, join_host_port};
pub use loader::{Settings, default_settings_path, load_settings};
pub use resolve::resolve_profile_config;
pub use source::{CombinedSource, MapSource};
pub use ssh_config::SshConfigSource;
pub use types::{
    AddressFamily, DEFAULT_CONNECT_TIMEOUT, DEFAULT_CONNECTION_ATTEMPTS, DEFAULT_IDENTITY_AGENT,
    DEFAULT_IDENTITY_FILES, DEFAULT_NUMBER_OF_PASSWORD_PROMPTS, DEFAULT_PORT,
    DEFAULT_PREFERRED_AUTHENTICATIONS, DEFAULT_SERVER_ALIVE_COUNT_MAX, Defaults,
    HostKeyVerification, ProfileConfig, RekeyLimit, local_username,
};
pub use unsupported::{UNSUPPORTED_FLAGS, UNSUPPORTED_SETTINGS, check_unsupported};
pub use validate::validate;
