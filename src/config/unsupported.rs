//! Settings this crate refuses to honour.
//!
//! Silently ignoring these would change what a connection does compared to
//! OpenSSH, so their presence aborts resolution.

use crate::error::{DialError, Result};
use crate::ports::AliasView;

/// Rejected when set to `yes`.
pub const UNSUPPORTED_FLAGS: &[&str] = &[
    "ControlMaster",
    "ExitOnForwardFailure",
    "ForkAfterAuthentication",
    "ForwardAgent",
    "ForwardX11",
    "ForwardX11Trusted",
    "GatewayPorts",
    "GSSAPIAuthentication",
    "GSSAPIDelegateCredentials",
    "HashKnownHosts",
    "HostbasedAuthentication",
    "NoHostAuthenticationForLocalhost",
    "PermitLocalCommand",
    "StreamLocalBindUnlink",
    "Tunnel",
    "UpdateHostKeys",
    "VisualHostKey",
];

/// Rejected when set to any non-empty value.
pub const UNSUPPORTED_SETTINGS: &[&str] = &[
    "BindAddress",
    "CanonicalDomains",
    "CanonicalizePermittedCNAMEs",
    "CASignatureAlgorithms",
    "CertificateFile",
    "DynamicForward",
    "HostKeyAlias",
    "IPQoS",
    "KbdInteractiveDevices",
    "KnownHostsCommand",
    "LocalCommand",
    "LocalForward",
    "PermitRemoteOpen",
    "PKCS11Provider",
    "ProxyCommand",
    "PubkeyAcceptedAlgorithms",
    "RemoteCommand",
    "RemoteForward",
    "RequestTTY",
    "SendEnv",
    "SessionType",
    "SetEnv",
    "StdinNull",
];

/// Fail if the alias uses any unsupported flag or setting.
///
/// # Errors
///
/// Returns [`DialError::UnsupportedSetting`] for the first offending key;
/// flags are checked before settings.
pub fn check_unsupported(view: &AliasView<'_>) -> Result<()> {
    for flag in UNSUPPORTED_FLAGS {
        if let Some(value) = view.lookup(flag)
            && value.trim().eq_ignore_ascii_case("yes")
        {
            return Err(DialError::UnsupportedSetting {
                setting: (*flag).to_string(),
                value,
                specific: true,
            });
        }
    }

    for setting in UNSUPPORTED_SETTINGS {
        if let Some(value) = view.lookup(setting)
            && !value.is_empty()
        {
            return Err(DialError::UnsupportedSetting {
                setting: (*setting).to_string(),
                value,
                specific: false,
            });
        }
    }

    Ok(())
}
