//! Authentication Port
//!
//! Describes which SSH authentication methods to attempt for a profile and
//! how interactive credentials are obtained. The SSH adapter turns each
//! [`AuthMethod`] into protocol exchanges.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::domain::Profile;
use crate::error::Result;

/// One keyboard-interactive question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub prompt: String,
    pub echo: bool,
}

/// Source of interactive credentials (terminal, GUI, test double).
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// Ask for the password of `user@host`.
    async fn password(&self, user: &str, host: &str) -> Result<Zeroizing<String>>;

    /// Answer a keyboard-interactive challenge, one answer per question.
    async fn keyboard_interactive(
        &self,
        name: &str,
        instructions: &str,
        questions: &[Question],
    ) -> Result<Vec<Zeroizing<String>>>;
}

/// An authentication method to attempt, in order.
#[derive(Clone)]
pub enum AuthMethod {
    /// Public keys held by the agent listening on `socket`
    Agent { socket: PathBuf },
    /// A private key file on disk
    IdentityFile { path: PathBuf },
    KeyboardInteractive { prompt: Arc<dyn CredentialPrompt> },
    /// Password auth, retried up to `attempts` times
    Password {
        prompt: Arc<dyn CredentialPrompt>,
        attempts: u64,
    },
}

impl AuthMethod {
    /// The SSH method name this maps to.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Agent { .. } | Self::IdentityFile { .. } => "publickey",
            Self::KeyboardInteractive { .. } => "keyboard-interactive",
            Self::Password { .. } => "password",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent { socket } => f.debug_struct("Agent").field("socket", socket).finish(),
            Self::IdentityFile { path } => {
                f.debug_struct("IdentityFile").field("path", path).finish()
            }
            Self::KeyboardInteractive { .. } => f.write_str("KeyboardInteractive"),
            Self::Password { attempts, .. } => f
                .debug_struct("Password")
                .field("attempts", attempts)
                .finish_non_exhaustive(),
        }
    }
}

/// Builds the ordered method list for a profile.
pub trait AuthProvider: Send + Sync {
    /// Methods for the comma-separated `preferred` method names, in that
    /// order. Unknown or disabled names contribute nothing.
    fn methods(&self, preferred: &str, profile: &Profile) -> Vec<AuthMethod>;
}
