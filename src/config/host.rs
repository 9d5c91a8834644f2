//! `[user@]host[:port]` alias parsing.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostSpecError {
    #[error("URL-style host {0:?} is not supported")]
    UnsupportedScheme(String),

    #[error("invalid port {value:?}: {source}")]
    InvalidPort {
        value: String,
        source: ParseIntError,
    },

    #[error("unterminated IPv6 literal in {0:?}")]
    UnterminatedBracket(String),
}

/// The user, host and port an alias string names directly.
///
/// Any of the parts may be overridden by configuration lookups later on;
/// values given here win over the configured `User` and `Port`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostSpec {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl HostSpec {
    /// Parse `[user@]host[:port]`.
    ///
    /// The user ends at the first `@`; the port starts after the first `:`
    /// that follows it. IPv6 literals must be bracketed (`[::1]:22`).
    ///
    /// # Errors
    ///
    /// Returns an error for URL-style input (`ssh://...`) or a port that is
    /// not a base-10 `u16`.
    pub fn parse(input: &str) -> Result<Self, HostSpecError> {
        if input.contains("://") {
            return Err(HostSpecError::UnsupportedScheme(input.to_string()));
        }

        let (user, rest) = match input.split_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, input),
        };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| HostSpecError::UnterminatedBracket(input.to_string()))?;
            (host, after.strip_prefix(':'))
        } else {
            match rest.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        let port = port
            .map(|value| {
                value
                    .parse::<u16>()
                    .map_err(|source| HostSpecError::InvalidPort {
                        value: value.to_string(),
                        source,
                    })
            })
            .transpose()?;

        Ok(Self {
            user: user.filter(|u| !u.is_empty()).map(str::to_string),
            host: host.to_string(),
            port,
        })
    }

    /// `true` if `input` parses and names a non-empty host.
    #[must_use]
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok_and(|spec| !spec.host.is_empty())
    }

    /// The port, if one was given and it is non-zero.
    #[must_use]
    pub fn explicit_port(&self) -> Option<u16> {
        self.port.filter(|p| *p != 0)
    }

    /// The user, if one was given.
    #[must_use]
    pub fn explicit_user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

impl FromStr for HostSpec {
    type Err = HostSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

/// Join a host and port into a dialable address, bracketing IPv6 literals.
#[must_use]
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
