//! russh client: host key policy, authentication, commands and tunnels.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use russh::ChannelMsg;
use russh::client::{Handle, Handler, KeyboardInteractiveAuthResponse};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{PublicKey, load_secret_key};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{HostKeyVerification, join_host_port};
use crate::error::{DialError, Result};
use crate::ports::{
    AuthMethod, BoxedStream, ConnectSettings, CredentialPrompt, Network, Question, TunnelClient,
};
use crate::ssh::known_hosts;

/// Sanitize SSH error messages before logging.
/// Masks auth method names and truncates long messages.
fn sanitize_ssh_error(error: &impl std::fmt::Display) -> String {
    let mut msg = error.to_string();
    for method in &["publickey", "keyboard-interactive", "gssapi-with-mic"] {
        msg = msg.replace(method, "***");
    }
    if msg.len() > 500 {
        let cut = (0..=500).rev().find(|&i| msg.is_char_boundary(i)).unwrap_or(0);
        format!("{}... (truncated)", &msg[..cut])
    } else {
        msg
    }
}

/// Output from a command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: u32,
    pub duration_ms: u64,
}

/// russh handler applying the host key policy.
///
/// A rejected key is kept in `rejection` so the caller can report why the
/// handshake failed.
pub(crate) struct ClientHandler {
    hostname: String,
    port: u16,
    verification_mode: HostKeyVerification,
    known_hosts: PathBuf,
    rejection: Arc<Mutex<Option<DialError>>>,
}

impl ClientHandler {
    pub(crate) const fn new(
        hostname: String,
        port: u16,
        verification_mode: HostKeyVerification,
        known_hosts: PathBuf,
        rejection: Arc<Mutex<Option<DialError>>>,
    ) -> Self {
        Self {
            hostname,
            port,
            verification_mode,
            known_hosts,
            rejection,
        }
    }
}

impl Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match known_hosts::verify_host_key(
            &self.hostname,
            self.port,
            server_public_key,
            self.verification_mode,
            &self.known_hosts,
        ) {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::error!(error = %e, "Host key verification failed");
                *self
                    .rejection
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(e);
                Ok(false)
            }
        }
    }
}

/// Authenticated SSH client.
pub struct SshClient {
    handle: Handle<ClientHandler>,
    host_name: String,
    closed: AtomicBool,
}

impl SshClient {
    /// Try `settings.auth_methods` in order until one is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`DialError::Ssh`] as soon as the session itself fails, and
    /// [`DialError::Auth`] when every method was rejected or failed locally.
    pub(crate) async fn authenticate(
        mut handle: Handle<ClientHandler>,
        settings: &ConnectSettings,
    ) -> Result<Self> {
        let user = settings.username.as_str();

        for method in &settings.auth_methods {
            let outcome = match method {
                AuthMethod::Agent { socket } => auth_with_agent(&mut handle, user, socket).await,
                AuthMethod::IdentityFile { path } => auth_with_key(&mut handle, user, path).await,
                AuthMethod::KeyboardInteractive { prompt } => {
                    auth_with_keyboard(&mut handle, user, prompt.as_ref()).await
                }
                AuthMethod::Password { prompt, attempts } => {
                    auth_with_password(
                        &mut handle,
                        user,
                        &settings.hostname,
                        prompt.as_ref(),
                        *attempts,
                    )
                    .await
                }
            };

            match outcome {
                Ok(true) => {
                    info!(
                        host = %settings.alias,
                        user = %user,
                        method = method.name(),
                        "SSH authentication succeeded"
                    );
                    return Ok(Self {
                        handle,
                        host_name: settings.alias.clone(),
                        closed: AtomicBool::new(false),
                    });
                }
                Ok(false) => {
                    debug!(host = %settings.alias, method = method.name(), "Authentication method rejected");
                }
                Err(e) if ends_session(&e) => {
                    tracing::error!(
                        host = %settings.alias,
                        method = method.name(),
                        error = %sanitize_ssh_error(&e),
                        "SSH transport failed during authentication"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        host = %settings.alias,
                        method = method.name(),
                        error = %sanitize_ssh_error(&e),
                        "Authentication method failed"
                    );
                }
            }
        }

        tracing::error!(
            host = %settings.alias,
            user = %user,
            methods = settings.auth_methods.len(),
            "SSH authentication failed - no method accepted"
        );
        Err(DialError::Auth {
            user: user.to_string(),
            host: settings.alias.clone(),
        })
    }

    /// Execute a command on the remote host
    ///
    /// # Errors
    ///
    /// Returns an error if the SSH channel cannot be opened or the command
    /// cannot be started.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let start = std::time::Instant::now();

        let mut channel =
            self.handle
                .channel_open_session()
                .await
                .map_err(|e| DialError::Exec {
                    reason: format!("Failed to open channel: {e}"),
                })?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| DialError::Exec {
                reason: format!("Failed to execute command: {e}"),
            })?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = 0u32;

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                    stderr.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => exit_code = exit_status,
                None => break,
                // ExitStatus may arrive after Eof; keep reading until the channel closes
                Some(_) => {}
            }
        }

        #[expect(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(host = %self.host_name, exit_code, duration_ms, "Command finished");
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
            duration_ms,
        })
    }

    /// The alias this client was created for
    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.host_name
    }
}

#[async_trait]
impl TunnelClient for SshClient {
    async fn dial_tunnel(&self, network: Network, host: &str, port: u16) -> Result<BoxedStream> {
        debug!(
            via = %self.host_name,
            target = %join_host_port(host, port),
            network = %network,
            "Opening tunnel"
        );

        let channel = self
            .handle
            .channel_open_direct_tcpip(host, u32::from(port), "127.0.0.1", 0)
            .await
            .map_err(|e| DialError::Connection {
                host: join_host_port(host, port),
                reason: format!("Failed to open tunnel through {}: {e}", self.host_name),
            })?;

        Ok(Box::pin(channel.into_stream()))
    }

    /// Disconnect (with 5s timeout to avoid blocking)
    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        match timeout(
            Duration::from_secs(5),
            self.handle
                .disconnect(russh::Disconnect::ByApplication, "", "en"),
        )
        .await
        {
            Ok(Ok(())) => {
                debug!(host = %self.host_name, "SSH client closed");
                Ok(())
            }
            Ok(Err(e)) => Err(DialError::Connection {
                host: self.host_name.clone(),
                reason: e.to_string(),
            }),
            Err(_) => {
                warn!(host = %self.host_name, "Timeout closing SSH connection, forcing drop");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for SshClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshClient")
            .field("host_name", &self.host_name)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Whether an auth attempt failed at the transport, leaving nothing to retry on.
const fn ends_session(error: &DialError) -> bool {
    matches!(error, DialError::Ssh(_))
}

/// Authenticate with a private key file. Encrypted keys are not supported.
async fn auth_with_key(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    path: &Path,
) -> Result<bool> {
    let key_pair = load_secret_key(path, None).map_err(|e| DialError::Connection {
        host: path.display().to_string(),
        reason: format!("Invalid private key: {}", sanitize_ssh_error(&e)),
    })?;

    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .ok()
        .flatten()
        .flatten();

    let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);
    let result = handle.authenticate_publickey(user, key_with_hash).await?;
    Ok(result.success())
}

/// Authenticate with each identity held by the agent at `socket`.
#[cfg(unix)]
async fn auth_with_agent(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    socket: &Path,
) -> Result<bool> {
    use russh::AgentAuthError;
    use russh::keys::agent::client::AgentClient;

    let mut agent = AgentClient::connect_uds(socket).await.map_err(|e| {
        DialError::Connection {
            host: socket.display().to_string(),
            reason: format!("SSH agent connection failed: {}", sanitize_ssh_error(&e)),
        }
    })?;

    let identities = agent.request_identities().await.map_err(|e| {
        DialError::Connection {
            host: socket.display().to_string(),
            reason: format!("Failed to get agent identities: {}", sanitize_ssh_error(&e)),
        }
    })?;

    if identities.is_empty() {
        debug!(socket = %socket.display(), "No identities available in SSH agent");
        return Ok(false);
    }

    for public_key in &identities {
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();

        match handle
            .authenticate_publickey_with(user, public_key.clone(), hash_alg, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(true),
            Ok(_) => debug!(fingerprint = %known_hosts::fingerprint(public_key), "Agent key rejected"),
            Err(AgentAuthError::Send(_)) => return Err(DialError::Ssh(russh::Error::SendError)),
            Err(e) => debug!(error = %sanitize_ssh_error(&e), "Agent signing failed"),
        }
    }

    Ok(false)
}

#[cfg(not(unix))]
async fn auth_with_agent(
    _handle: &mut Handle<ClientHandler>,
    _user: &str,
    socket: &Path,
) -> Result<bool> {
    debug!(socket = %socket.display(), "SSH agent sockets not supported on this platform");
    Ok(false)
}

async fn auth_with_keyboard(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    prompt: &dyn CredentialPrompt,
) -> Result<bool> {
    let mut response = handle
        .authenticate_keyboard_interactive_start(user, None::<String>)
        .await?;

    loop {
        match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::InfoRequest {
                name,
                instructions,
                prompts,
            } => {
                let questions: Vec<Question> = prompts
                    .iter()
                    .map(|p| Question {
                        prompt: p.prompt.clone(),
                        echo: p.echo,
                    })
                    .collect();
                let answers = prompt
                    .keyboard_interactive(&name, &instructions, &questions)
                    .await?;
                let answers = answers.iter().map(|a| a.as_str().to_string()).collect();
                response = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await?;
            }
            _ => return Ok(false),
        }
    }
}

async fn auth_with_password(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    host: &str,
    prompt: &dyn CredentialPrompt,
    attempts: u64,
) -> Result<bool> {
    for attempt in 1..=attempts {
        let password = prompt.password(user, host).await?;
        let result = handle
            .authenticate_password(user, password.as_str())
            .await?;
        if result.success() {
            return Ok(true);
        }
        debug!(host = %host, attempt, "Password rejected");
    }
    Ok(false)
}
