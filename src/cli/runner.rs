//! CLI runner functions

use std::fmt::Write as FmtWrite;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::Cli;
use crate::config::{ProfileConfig, Settings, default_settings_path, load_settings};
use crate::domain::{Environment, Profile};
use crate::error::Result;
use crate::ssh::RusshTransport;

/// Settings from `--config`, else the default file if present, else defaults.
fn settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => load_settings(path)?,
        None => {
            let path = default_settings_path();
            if path.exists() {
                load_settings(&path)?
            } else {
                Settings::default()
            }
        }
    };
    if cli.lenient {
        settings.strict = false;
    }
    Ok(settings)
}

/// Run the CLI and return the exit status to report.
///
/// # Errors
///
/// Returns an error if settings cannot be loaded, the alias does not
/// resolve to a valid profile, or dialing, authentication or command
/// execution fails.
pub async fn run(cli: &Cli) -> Result<u32> {
    let settings = settings(cli)?;
    let env = Environment::from_settings(&settings, RusshTransport::new());

    if cli.command.is_empty() {
        let profile = env.new_profile(&cli.alias)?;
        let config = profile.config()?;
        print!("{}", render_profile(&profile, &config));
        return Ok(0);
    }

    run_command(&env, &cli.alias, &cli.command.join(" ")).await
}

async fn run_command(
    env: &Environment<RusshTransport>,
    alias: &str,
    command: &str,
) -> Result<u32> {
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling dial");
                cancel.cancel();
            }
        }
    });

    let connected = env.new_client(None, alias, &cancel).await;
    interrupt.abort();
    let (client, resources) = connected?;

    info!(host = %alias, command = %command, "Executing SSH command");
    let output = client.exec(command).await;

    if let Err(e) = resources.close().await {
        warn!(host = %alias, error = %e, "Failed to close connection chain");
    }
    let output = output?;

    print!("{}", output.stdout);
    eprint!("{}", output.stderr);
    if output.exit_code != 0 {
        warn!(
            host = %alias,
            command = %command,
            exit_code = output.exit_code,
            "Command failed"
        );
    }
    Ok(output.exit_code)
}

fn list(values: &[String]) -> String {
    if values.is_empty() {
        "(default)".to_string()
    } else {
        values.join(",")
    }
}

/// Human-readable view of a validated profile.
#[must_use]
pub fn render_profile(profile: &Profile, config: &ProfileConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}:", profile.host_spec());
    let _ = writeln!(out, "  Hostname: {}:{}", config.hostname, config.port);
    let _ = writeln!(out, "  User: {}", config.username);
    let _ = writeln!(out, "  AddressFamily: {}", config.address_family);
    if config.proxy_jump.is_empty() {
        let _ = writeln!(out, "  ProxyJump: none");
    } else {
        let _ = writeln!(out, "  ProxyJump: {}", config.proxy_jump.join(" -> "));
    }
    match config.connect_timeout {
        Some(timeout) => {
            let _ = writeln!(out, "  ConnectTimeout: {}s", timeout.as_secs());
        }
        None => {
            let _ = writeln!(out, "  ConnectTimeout: none");
        }
    }
    let _ = writeln!(out, "  Ciphers: {}", list(&config.ciphers));
    let _ = writeln!(out, "  KexAlgorithms: {}", list(&config.kex_algorithms));
    let _ = writeln!(out, "  MACs: {}", list(&config.macs));
    let _ = writeln!(out, "  HostKeyAlgorithms: {}", list(&config.host_key_algorithms));
    let _ = writeln!(
        out,
        "  PreferredAuthentications: {}",
        config.preferred_authentications
    );
    let _ = writeln!(out, "  StrictHostKeyChecking: {:?}", config.strict_host_key_checking);
    for file in profile.identity_files() {
        let _ = writeln!(out, "  IdentityFile: {}", file.display());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostSpec;
    use crate::error::DialError;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_render_profile() {
        let mut config = ProfileConfig::new("db.internal", "dba");
        config.port = 2222;
        config.proxy_jump = vec!["bastion".to_string(), "relay".to_string()];
        config.connect_timeout = Some(Duration::from_secs(10));
        config.ciphers = vec!["aes256-ctr".to_string()];
        config.identity_files = Vec::new();
        let profile = Profile::new(HostSpec::parse("db").unwrap(), config.clone(), true);

        let rendered = render_profile(&profile, &config);
        assert!(rendered.starts_with("db:\n"));
        assert!(rendered.contains("  Hostname: db.internal:2222\n"));
        assert!(rendered.contains("  User: dba\n"));
        assert!(rendered.contains("  ProxyJump: bastion -> relay\n"));
        assert!(rendered.contains("  ConnectTimeout: 10s\n"));
        assert!(rendered.contains("  Ciphers: aes256-ctr\n"));
        assert!(rendered.contains("  MACs: (default)\n"));
        assert!(!rendered.contains("IdentityFile"));
    }

    #[test]
    fn test_missing_settings_file_is_an_error() {
        let cli = Cli::parse_from(["hostdial", "-c", "/nonexistent/hostdial.yaml", "db"]);
        assert!(matches!(
            settings(&cli),
            Err(DialError::SettingsNotFound { .. })
        ));
    }

    #[test]
    fn test_lenient_flag_overrides_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"strict: true\nssh_config: []\n").unwrap();
        let path = file.path().display().to_string();

        let cli = Cli::parse_from(["hostdial", "-c", path.as_str(), "--lenient", "db"]);
        assert!(!settings(&cli).unwrap().strict);

        let cli = Cli::parse_from(["hostdial", "-c", path.as_str(), "db"]);
        assert!(settings(&cli).unwrap().strict);
    }
}
