//! Dial pipeline
//!
//! Resolves an alias into a [`Profile`], walks its `ProxyJump` chain by
//! building a client for every hop through the same pipeline, and opens the
//! final connection either directly or as a tunnel through the last hop.
//! Everything opened on the way is registered on a [`ResourceStack`] that the
//! caller drains to tear the chain down.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::config::{
    Defaults, HostSpec, Settings, Variables, join_host_port, process_variables,
    resolve_profile_config,
};
use crate::domain::{Closer, Connection, Profile, ResourceStack, StandardAuth};
use crate::error::{DialError, Result};
use crate::ports::{AuthProvider, ConfigSource, ConnectSettings, Transport, TunnelClient};

/// A dialed connection and everything that must be closed with it.
///
/// Draining `resources` closes `connection` and every hop behind it.
#[derive(Debug)]
pub struct DialResult {
    pub connection: Connection,
    pub resources: ResourceStack,
}

/// Configuration sources, policy and adapters shared by every dial.
pub struct Environment<T: Transport> {
    source: Arc<dyn ConfigSource>,
    strict: bool,
    defaults: Defaults,
    variables: Variables,
    auth: Arc<dyn AuthProvider>,
    transport: T,
}

impl<T: Transport> Environment<T> {
    /// Strict environment using the process environment and [`StandardAuth`]
    /// without interactive prompts.
    pub fn new(source: Arc<dyn ConfigSource>, transport: T) -> Self {
        Self {
            source,
            strict: true,
            defaults: Defaults::from_env(),
            variables: process_variables(),
            auth: Arc::new(StandardAuth::new()),
            transport,
        }
    }

    /// Environment reading the sources and policy of `settings`.
    pub fn from_settings(settings: &Settings, transport: T) -> Self {
        Self::new(Arc::new(settings.source()), transport).with_strict(settings.strict)
    }

    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }

    /// Resolve `alias` (`[user@]host[:port]`) into an unvalidated profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the alias does not parse, a denylisted setting is
    /// present, or a value cannot be coerced.
    pub fn new_profile(&self, alias: &str) -> Result<Profile> {
        let spec = HostSpec::parse(alias)?;
        let config = resolve_profile_config(self.source.as_ref(), &spec, &self.defaults)?;
        Ok(Profile::new(spec, config, self.strict).with_variables(Arc::clone(&self.variables)))
    }

    /// Open a connection to `alias`, through `proxy` and the alias's
    /// `ProxyJump` chain.
    ///
    /// On success the caller owns `resources` and must close it. On failure
    /// everything opened has already been closed.
    ///
    /// # Errors
    ///
    /// Returns [`DialError::ContextClosed`] if `cancel` fires before the dial
    /// completes, or the first resolution, validation or network error.
    pub async fn dial(
        &self,
        proxy: Option<Arc<T::Client>>,
        alias: &str,
        cancel: &CancellationToken,
    ) -> Result<DialResult> {
        if cancel.is_cancelled() {
            return Err(DialError::ContextClosed);
        }
        let profile = self.new_profile(alias)?;
        self.dial_profile(&profile, proxy, cancel, &[]).await
    }

    /// Dial `alias` and run the SSH handshake over the connection.
    ///
    /// The client is registered last on the returned stack, so closing the
    /// stack closes the client before the connections beneath it.
    ///
    /// # Errors
    ///
    /// Same as [`Environment::dial`], plus handshake and authentication
    /// failures.
    pub async fn new_client(
        &self,
        proxy: Option<Arc<T::Client>>,
        alias: &str,
        cancel: &CancellationToken,
    ) -> Result<(Arc<T::Client>, ResourceStack)> {
        self.new_client_within(proxy, alias, cancel, &[]).await
    }

    async fn new_client_within(
        &self,
        proxy: Option<Arc<T::Client>>,
        alias: &str,
        cancel: &CancellationToken,
        trail: &[String],
    ) -> Result<(Arc<T::Client>, ResourceStack)> {
        if cancel.is_cancelled() {
            return Err(DialError::ContextClosed);
        }
        let profile = self.new_profile(alias)?;
        let DialResult {
            connection,
            resources,
        } = self.dial_profile(&profile, proxy, cancel, trail).await?;

        let client = match until_cancelled(cancel, self.connect(&profile, connection)).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                if let Err(close_err) = resources.close().await {
                    warn!(alias = %alias, error = %close_err, "Cleanup after failed handshake");
                }
                return Err(e);
            }
        };

        resources
            .push(Arc::new(ClientCloser(Arc::clone(&client))))
            .await;
        Ok((client, resources))
    }

    /// Boxed so that jump hosts can recurse through
    /// [`Environment::new_client_within`].
    fn dial_profile<'a>(
        &'a self,
        profile: &'a Profile,
        proxy: Option<Arc<T::Client>>,
        cancel: &'a CancellationToken,
        trail: &'a [String],
    ) -> BoxFuture<'a, Result<DialResult>> {
        async move {
            if cancel.is_cancelled() {
                return Err(DialError::ContextClosed);
            }

            let stack = ResourceStack::new();
            let watcher = DialWatcher::spawn(cancel, stack.clone(), profile.name());
            let outcome = self.open(profile, proxy, &stack, cancel, trail).await;
            let cancelled = watcher.finish().await;

            let error = match outcome {
                Ok(connection) if !cancelled => {
                    return Ok(DialResult {
                        connection,
                        resources: stack,
                    });
                }
                Err(e) if !cancelled => e,
                _ => DialError::ContextClosed,
            };

            debug!(alias = %profile.name(), error = %error, "Dial failed, releasing resources");
            if let Err(e) = stack.close().await {
                warn!(alias = %profile.name(), error = %e, "Cleanup after failed dial");
            }
            Err(error)
        }
        .boxed()
    }

    async fn open(
        &self,
        profile: &Profile,
        proxy: Option<Arc<T::Client>>,
        stack: &ResourceStack,
        cancel: &CancellationToken,
        trail: &[String],
    ) -> Result<Connection> {
        let config = profile.config()?;

        let name = profile.name().to_string();
        if trail.contains(&name) {
            let chain = trail
                .iter()
                .chain(std::iter::once(&name))
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(DialError::JumpCycle { alias: name, chain });
        }
        let mut trail = trail.to_vec();
        trail.push(name);

        let mut hop = proxy;
        for jump in &config.proxy_jump {
            if cancel.is_cancelled() {
                return Err(DialError::ContextClosed);
            }
            debug!(alias = %profile.name(), jump = %jump, "Connecting through jump host");
            let (client, nested) = self
                .new_client_within(hop.clone(), jump, cancel, &trail)
                .await?;
            stack.push_stack(&nested).await;
            hop = Some(client);
        }

        let network = config
            .address_family
            .network()
            .ok_or_else(|| DialError::UnknownAddressFamily {
                family: config.address_family.to_string(),
            })?;
        let address = join_host_port(&config.hostname, config.port);

        if cancel.is_cancelled() {
            return Err(DialError::ContextClosed);
        }

        let stream = match &hop {
            None => {
                until_cancelled(
                    cancel,
                    self.transport
                        .dial(network, &address, config.connect_timeout),
                )
                .await?
            }
            Some(client) => {
                until_cancelled(
                    cancel,
                    client.dial_tunnel(network, &config.hostname, config.port),
                )
                .await?
            }
        };

        let connection = Connection::new(stream, address.clone());
        stack.push(Arc::new(connection.handle())).await;

        info!(
            alias = %profile.name(),
            address = %address,
            network = %network,
            hops = config.proxy_jump.len(),
            tunneled = hop.is_some(),
            "Connection established"
        );
        Ok(connection)
    }

    async fn connect(&self, profile: &Profile, connection: Connection) -> Result<T::Client> {
        let config = profile.config()?;
        let auth_methods = self
            .auth
            .methods(&config.preferred_authentications, profile);
        debug!(
            alias = %profile.name(),
            methods = auth_methods.len(),
            "Starting SSH handshake"
        );

        let settings = ConnectSettings {
            alias: profile.name().to_string(),
            timeout: config.connect_timeout,
            keepalive_max: usize::try_from(config.server_alive_count_max).unwrap_or(usize::MAX),
            host_key_verification: config.strict_host_key_checking,
            auth_methods,
            hostname: config.hostname,
            port: config.port,
            username: config.username,
            ciphers: config.ciphers,
            kex_algorithms: config.kex_algorithms,
            macs: config.macs,
            host_key_algorithms: config.host_key_algorithms,
        };
        self.transport.connect(connection, settings).await
    }
}

impl<T: Transport> std::fmt::Debug for Environment<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("strict", &self.strict)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

/// Closes an SSH client when its stack is drained.
struct ClientCloser<C>(Arc<C>);

#[async_trait]
impl<C: TunnelClient + 'static> Closer for ClientCloser<C> {
    async fn close(&self) -> Result<()> {
        TunnelClient::close(self.0.as_ref()).await
    }
}

/// Background task draining a dial's stack when the dial is cancelled.
///
/// Retired by [`DialWatcher::finish`], or by dropping it.
struct DialWatcher {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
    done: DropGuard,
}

impl DialWatcher {
    fn spawn(cancel: &CancellationToken, stack: ResourceStack, alias: &str) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let done = CancellationToken::new();

        let task = tokio::spawn({
            let cancel = cancel.clone();
            let done = done.clone();
            let cancelled = Arc::clone(&cancelled);
            let alias = alias.to_string();
            async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        cancelled.store(true, Ordering::SeqCst);
                        warn!(alias = %alias, "Dial cancelled, closing opened resources");
                        if let Err(e) = stack.close().await {
                            warn!(alias = %alias, error = %e, "Cleanup after cancellation");
                        }
                    }
                    () = done.cancelled() => {}
                }
            }
        });

        Self {
            cancelled,
            task,
            done: done.drop_guard(),
        }
    }

    /// Stop watching and report whether cancellation was observed.
    async fn finish(self) -> bool {
        let Self {
            cancelled,
            task,
            done,
        } = self;
        drop(done);
        if let Err(e) = task.await {
            warn!(error = %e, "Dial watcher task failed");
        }
        cancelled.load(Ordering::SeqCst)
    }
}

/// Run `future` unless `cancel` fires first.
async fn until_cancelled<F, R>(cancel: &CancellationToken, future: F) -> Result<R>
where
    F: Future<Output = Result<R>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DialError::ContextClosed),
        result = future => result,
    }
}
