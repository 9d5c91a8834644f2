//! A resolved host alias and its lazily validated configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::config::{
    Expander, HostSpec, IDENTITY_FLAGS, ProfileConfig, TokenValues, Variables, local_username,
    process_variables, validate,
};
use crate::error::FieldError;

type Validator = Arc<dyn Fn(&mut ProfileConfig, bool) -> Result<(), FieldError> + Send + Sync>;

enum Validation {
    Unchecked,
    Valid(ProfileConfig),
    Invalid(FieldError),
}

/// Connection profile for one alias.
///
/// The configuration is validated on first access to [`Profile::config`] and
/// the outcome, success or failure, is reused by every later call.
pub struct Profile {
    spec: HostSpec,
    config: ProfileConfig,
    strict: bool,
    variables: Variables,
    local_user: String,
    validator: Validator,
    validation: Mutex<Validation>,
}

impl Profile {
    #[must_use]
    pub fn new(spec: HostSpec, config: ProfileConfig, strict: bool) -> Self {
        Self {
            spec,
            config,
            strict,
            variables: process_variables(),
            local_user: local_username(),
            validator: Arc::new(validate),
            validation: Mutex::new(Validation::Unchecked),
        }
    }

    /// Use `variables` instead of the process environment for expansion.
    #[must_use]
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    #[must_use]
    pub fn with_local_user(mut self, local_user: impl Into<String>) -> Self {
        self.local_user = local_user.into();
        self
    }

    #[cfg(test)]
    pub(crate) fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self.validation = Mutex::new(Validation::Unchecked);
        self
    }

    /// The host part of the alias, as given.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.host
    }

    #[must_use]
    pub const fn host_spec(&self) -> &HostSpec {
        &self.spec
    }

    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// The configuration as resolved, before validation.
    #[must_use]
    pub const fn raw_config(&self) -> &ProfileConfig {
        &self.config
    }

    /// Replace the configuration and forget any earlier validation outcome.
    pub fn set_config(&mut self, config: ProfileConfig) {
        self.config = config;
        *self
            .validation
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = Validation::Unchecked;
    }

    /// The validated configuration.
    ///
    /// Concurrent first callers wait for a single validation run.
    ///
    /// # Errors
    ///
    /// Returns the field error from validation, the same one on every call.
    pub fn config(&self) -> Result<ProfileConfig, FieldError> {
        let mut state = self
            .validation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match &*state {
            Validation::Valid(config) => Ok(config.clone()),
            Validation::Invalid(e) => Err(e.clone()),
            Validation::Unchecked => {
                let mut config = self.config.clone();
                let outcome = (self.validator)(&mut config, self.strict).map(|()| config);
                *state = match &outcome {
                    Ok(config) => Validation::Valid(config.clone()),
                    Err(e) => {
                        debug!(alias = %self.spec, error = %e, "Profile failed validation");
                        Validation::Invalid(e.clone())
                    }
                };
                outcome
            }
        }
    }

    fn token_values(&self) -> TokenValues {
        TokenValues {
            hostname: self.config.hostname.clone(),
            port: self.config.port,
            remote_user: self.config.username.clone(),
            alias: self.spec.host.clone(),
            local_user: self.local_user.clone(),
        }
    }

    /// Expanded `IdentityFile` paths. Entries that fail to expand are dropped.
    #[must_use]
    pub fn identity_files(&self) -> Vec<PathBuf> {
        let tokens = self.token_values();
        let expander = Expander::new(&self.variables, &tokens);
        self.config
            .identity_files
            .iter()
            .filter_map(|file| match expander.expand(file, IDENTITY_FLAGS) {
                Ok(path) => Some(PathBuf::from(path)),
                Err(e) => {
                    debug!(file = %file, error = %e, "Skipping identity file");
                    None
                }
            })
            .collect()
    }

    /// Socket of the agent to use, `None` when disabled or unresolvable.
    #[must_use]
    pub fn identity_agent(&self) -> Option<PathBuf> {
        let agent = self.config.identity_agent.trim();
        if agent.is_empty() || agent.eq_ignore_ascii_case("none") {
            return None;
        }

        let variable = if agent == "SSH_AUTH_SOCK" {
            Some(agent)
        } else {
            agent.strip_prefix('$').filter(|name| !name.starts_with('{'))
        };
        if let Some(name) = variable {
            return (self.variables)(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from);
        }

        let tokens = self.token_values();
        match Expander::new(&self.variables, &tokens).expand(agent, IDENTITY_FLAGS) {
            Ok(path) => Some(PathBuf::from(path)),
            Err(e) => {
                debug!(agent = %agent, error = %e, "Identity agent path did not expand");
                None
            }
        }
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("alias", &self.spec.to_string())
            .field("strict", &self.strict)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldCause;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Arc::new(move |name: &str| map.get(name).cloned())
    }

    fn profile(config: ProfileConfig) -> Profile {
        Profile::new(HostSpec::parse("db").unwrap(), config, true)
            .with_variables(vars(&[
                ("HOME", "/home/alice"),
                ("SSH_AUTH_SOCK", "/tmp/agent.sock"),
                ("MY_AGENT", "/run/my-agent.sock"),
            ]))
            .with_local_user("alice")
    }

    fn counting(count: &Arc<AtomicUsize>) -> Validator {
        let count = Arc::clone(count);
        Arc::new(move |config: &mut ProfileConfig, strict: bool| {
            count.fetch_add(1, Ordering::SeqCst);
            validate(config, strict)
        })
    }

    // ============== Memoized validation ==============

    #[test]
    fn test_config_validates_once_on_success() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut config = ProfileConfig::new("db.internal", "alice");
        config.ciphers = vec!["aes128-ctr".to_string(), "rc4".to_string()];
        let profile = profile(config).with_validator(counting(&count));

        let first = profile.config().unwrap();
        let second = profile.config().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.ciphers, vec!["aes128-ctr"]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(profile.raw_config().ciphers.len(), 2);
    }

    #[test]
    fn test_config_validates_once_on_failure() {
        let count = Arc::new(AtomicUsize::new(0));
        let profile =
            profile(ProfileConfig::new("", "alice")).with_validator(counting(&count));

        let first = profile.config().unwrap_err();
        let second = profile.config().unwrap_err();
        assert_eq!(first, second);
        assert_eq!(first, FieldError::new("Hostname", FieldCause::Empty));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_config_validates_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let profile = Arc::new(
            profile(ProfileConfig::new("db.internal", "alice")).with_validator(counting(&count)),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let profile = Arc::clone(&profile);
                std::thread::spawn(move || profile.config().is_ok())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_config_resets_validation() {
        let mut profile = profile(ProfileConfig::new("", "alice"));
        assert!(profile.config().is_err());

        profile.set_config(ProfileConfig::new("db.internal", "alice"));
        assert_eq!(profile.config().unwrap().hostname, "db.internal");
    }

    // ============== Identity files ==============

    #[test]
    fn test_identity_files_expanded() {
        let mut config = ProfileConfig::new("db.internal", "dba");
        config.identity_files = vec![
            "~/.ssh/id_ed25519".to_string(),
            "%d/.ssh/%r@%h".to_string(),
            "${UNSET}/key".to_string(),
        ];
        let files = profile(config).identity_files();
        assert_eq!(
            files,
            vec![
                PathBuf::from("/home/alice/.ssh/id_ed25519"),
                PathBuf::from("/home/alice/.ssh/dba@db.internal"),
            ]
        );
    }

    // ============== Identity agent ==============

    #[test]
    fn test_identity_agent_default_uses_ssh_auth_sock() {
        let profile = profile(ProfileConfig::new("db.internal", "alice"));
        assert_eq!(
            profile.identity_agent(),
            Some(PathBuf::from("/tmp/agent.sock"))
        );
    }

    #[test]
    fn test_identity_agent_none() {
        for value in ["none", "", "NONE"] {
            let mut config = ProfileConfig::new("db.internal", "alice");
            config.identity_agent = value.to_string();
            assert_eq!(profile(config).identity_agent(), None);
        }
    }

    #[test]
    fn test_identity_agent_variable() {
        let mut config = ProfileConfig::new("db.internal", "alice");
        config.identity_agent = "$MY_AGENT".to_string();
        assert_eq!(
            profile(config).identity_agent(),
            Some(PathBuf::from("/run/my-agent.sock"))
        );

        let mut config = ProfileConfig::new("db.internal", "alice");
        config.identity_agent = "$MISSING".to_string();
        assert_eq!(profile(config).identity_agent(), None);
    }

    #[test]
    fn test_identity_agent_path_expanded() {
        let mut config = ProfileConfig::new("db.internal", "alice");
        config.identity_agent = "~/.agent/%u.sock".to_string();
        assert_eq!(
            profile(config).identity_agent(),
            Some(PathBuf::from("/home/alice/.agent/alice.sock"))
        );
    }
}
