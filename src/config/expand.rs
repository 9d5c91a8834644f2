//! `%`-token, `${VAR}` and `~` expansion for path-like settings.

use std::sync::Arc;

use thiserror::Error;

/// Environment lookup used by expansion. Empty values count as unset.
pub type Variables = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Variables read from the process environment.
#[must_use]
pub fn process_variables() -> Variables {
    Arc::new(|name: &str| std::env::var(name).ok())
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    #[error("trailing percent in {0:?}")]
    TrailingPercent(String),

    #[error("unclosed variable in {0:?}")]
    UnclosedVariable(String),

    #[error("variable {0:?} is not set")]
    UnsetVariable(String),

    #[error("token %{0} is not available")]
    UnknownToken(char),
}

/// Which expansions apply to a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandFlags {
    /// Characters accepted after `%`; empty disables token expansion
    pub tokens: &'static str,
    pub environment: bool,
    pub tilde: bool,
}

/// Flags for `IdentityFile` and `IdentityAgent`.
pub const IDENTITY_FLAGS: ExpandFlags = ExpandFlags {
    tokens: "%CdhikLlnpru",
    environment: true,
    tilde: true,
};

/// Values substituted for `%` tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenValues {
    /// `%h`
    pub hostname: String,
    /// `%p`
    pub port: u16,
    /// `%r`
    pub remote_user: String,
    /// `%n`, the alias as given
    pub alias: String,
    /// `%u`
    pub local_user: String,
}

pub struct Expander<'a> {
    variables: &'a Variables,
    tokens: &'a TokenValues,
}

impl<'a> Expander<'a> {
    #[must_use]
    pub const fn new(variables: &'a Variables, tokens: &'a TokenValues) -> Self {
        Self { variables, tokens }
    }

    fn var(&self, name: &str) -> Result<String, ExpandError> {
        (self.variables)(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ExpandError::UnsetVariable(name.to_string()))
    }

    fn token(&self, token: char) -> Result<String, ExpandError> {
        let value = match token {
            '%' => "%".to_string(),
            'h' => self.tokens.hostname.clone(),
            'p' => self.tokens.port.to_string(),
            'r' => self.tokens.remote_user.clone(),
            'n' => self.tokens.alias.clone(),
            'u' => self.tokens.local_user.clone(),
            'd' => self.var("HOME")?,
            other => return Err(ExpandError::UnknownToken(other)),
        };
        Ok(value)
    }

    /// Expand `template` according to `flags`.
    ///
    /// A `%` followed by a character outside `flags.tokens` is kept as is.
    /// Only a leading `~` expands to `$HOME`.
    ///
    /// # Errors
    ///
    /// Returns an error for a trailing `%`, an unterminated `${`, a reference
    /// to an unset variable, or a token with no value available.
    pub fn expand(&self, template: &str, flags: ExpandFlags) -> Result<String, ExpandError> {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();
        let mut first = true;

        while let Some(c) = chars.next() {
            let at_start = std::mem::replace(&mut first, false);
            match c {
                '%' if !flags.tokens.is_empty() => match chars.next() {
                    None => return Err(ExpandError::TrailingPercent(template.to_string())),
                    Some(t) if flags.tokens.contains(t) => out.push_str(&self.token(t)?),
                    Some(t) => {
                        out.push('%');
                        out.push(t);
                    }
                },
                '$' if flags.environment && chars.peek() == Some(&'{') => {
                    chars.next();
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => name.push(ch),
                            None => {
                                return Err(ExpandError::UnclosedVariable(template.to_string()));
                            }
                        }
                    }
                    out.push_str(&self.var(&name)?);
                }
                '~' if flags.tilde && at_start => out.push_str(&self.var("HOME")?),
                _ => out.push(c),
            }
        }

        Ok(out)
    }
}
