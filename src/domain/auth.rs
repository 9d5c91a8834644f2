//! Default [`AuthProvider`]: agent, key files and interactive prompts.

use std::sync::Arc;

use tracing::debug;

use crate::domain::Profile;
use crate::ports::{AuthMethod, AuthProvider, CredentialPrompt};

/// Builds auth methods from the profile's `*Authentication` switches.
///
/// Without a [`CredentialPrompt`] the interactive methods are skipped.
#[derive(Clone, Default)]
pub struct StandardAuth {
    prompt: Option<Arc<dyn CredentialPrompt>>,
}

impl StandardAuth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    fn publickey(profile: &Profile, methods: &mut Vec<AuthMethod>) {
        let config = profile.raw_config();
        if !config.pubkey_authentication {
            return;
        }

        if !config.identities_only
            && let Some(socket) = profile.identity_agent()
        {
            methods.push(AuthMethod::Agent { socket });
        }

        for path in profile.identity_files() {
            if path.is_file() {
                methods.push(AuthMethod::IdentityFile { path });
            } else {
                debug!(path = %path.display(), "Identity file not found");
            }
        }
    }
}

impl AuthProvider for StandardAuth {
    fn methods(&self, preferred: &str, profile: &Profile) -> Vec<AuthMethod> {
        let config = profile.raw_config();
        let mut methods = Vec::new();

        for name in preferred.split(',').map(str::trim) {
            match name {
                "publickey" => Self::publickey(profile, &mut methods),
                "keyboard-interactive" if config.kbd_interactive_authentication => {
                    if let Some(prompt) = &self.prompt {
                        methods.push(AuthMethod::KeyboardInteractive {
                            prompt: Arc::clone(prompt),
                        });
                    }
                }
                "password" if config.password_authentication => {
                    if let Some(prompt) = &self.prompt {
                        methods.push(AuthMethod::Password {
                            prompt: Arc::clone(prompt),
                            attempts: config.number_of_password_prompts,
                        });
                    }
                }
                other => debug!(method = %other, "Skipping authentication method"),
            }
        }

        methods
    }
}

impl std::fmt::Debug for StandardAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardAuth")
            .field("prompt", &self.prompt.is_some())
            .finish()
    }
}
