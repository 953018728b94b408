pub mod types;

use anyhow::{Context, Result};
use std::path::Path;
use types::AppConfig;

/// Maximum config file size (1 MB)
const MAX_CONFIG_SIZE: u64 = 1_048_576;

/// Load and validate configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("reading config metadata: {}", path.display()))?;
    if metadata.len() > MAX_CONFIG_SIZE {
        anyhow::bail!(
            "config file too large: {} bytes (max {} bytes)",
            metadata.len(),
            MAX_CONFIG_SIZE
        );
    }

    check_config_file_permissions(path);

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    parse_config(&content)
}

/// On Unix, warn if the config file is readable by group or others.
/// The credential table it may carry is bait, but the block/allow lists
/// and listen addresses reveal the deployment.
#[cfg(unix)]
fn check_config_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                tracing::warn!(
                    path = %path.display(),
                    mode = format!("{:04o}", mode & 0o7777),
                    "Config file is readable by group/others. \
                     Consider restricting permissions to 0600."
                );
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not check config file permissions"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_config_file_permissions(_path: &Path) {}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content).context("parsing TOML configuration")?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    validate_listeners(config)?;
    validate_limits(config)?;
    validate_security(config)?;
    Ok(())
}

fn validate_listeners(config: &AppConfig) -> Result<()> {
    if !config.ssh.enabled && !config.telnet.enabled {
        anyhow::bail!("at least one listener (ssh or telnet) must be enabled");
    }
    if config.ssh.enabled {
        config
            .ssh
            .listen
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("invalid ssh listen address: {}", config.ssh.listen))?;
        if !config.ssh.server_id.starts_with("SSH-2.0-") {
            anyhow::bail!(
                "ssh server_id must start with \"SSH-2.0-\": {}",
                config.ssh.server_id
            );
        }
    }
    if config.telnet.enabled {
        config
            .telnet
            .listen
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("invalid telnet listen address: {}", config.telnet.listen))?;
    }
    Ok(())
}

fn validate_limits(config: &AppConfig) -> Result<()> {
    let limits = &config.limits;
    if limits.max_connections == 0 {
        anyhow::bail!("limits.max_connections must be at least 1");
    }
    if limits.max_auth_attempts == 0 || limits.max_auth_attempts > 10 {
        anyhow::bail!(
            "limits.max_auth_attempts must be in 1..=10 (got {})",
            limits.max_auth_attempts
        );
    }
    if config.ssh.enabled && config.ssh.connection_timeout == 0 {
        anyhow::bail!("ssh.connection_timeout must be at least 1 second");
    }
    if config.telnet.enabled && config.telnet.connection_timeout == 0 {
        anyhow::bail!("telnet.connection_timeout must be at least 1 second");
    }
    if config.shell.home.is_empty() || !config.shell.home.starts_with('/') {
        anyhow::bail!("shell.home must be an absolute path: {}", config.shell.home);
    }
    Ok(())
}

fn validate_security(config: &AppConfig) -> Result<()> {
    let sec = &config.security;
    if sec.rate_limit_enabled {
        if sec.max_connections_per_ip == 0 {
            anyhow::bail!("security.max_connections_per_ip must be at least 1 when rate limiting is enabled");
        }
        if sec.rate_limit_window == 0 {
            anyhow::bail!("security.rate_limit_window must be at least 1 second");
        }
    }
    for user in &config.users {
        if user.username.is_empty() {
            anyhow::bail!("users entries must have a non-empty username");
        }
    }
    // An allowlist narrows who can even reach the lure; unusual for a
    // deception deployment, so worth surfacing.
    if !sec.allowed_ips.is_empty() {
        tracing::warn!(
            allowed = sec.allowed_ips.len(),
            "allowed_ips is non-empty; only listed peers will be admitted"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = parse_config("").unwrap();
        assert!(config.ssh.enabled);
        assert_eq!(config.limits.max_connections, 100);
    }

    #[test]
    fn parses_full_config() {
        let config = parse_config(
            r#"
[ssh]
listen = "127.0.0.1:2222"

[telnet]
listen = "127.0.0.1:2323"
banner = "Debian GNU/Linux 11"

[limits]
max_connections = 50
max_auth_attempts = 5

[security]
blocked_ips = ["203.0.113.7"]

[[users]]
username = "backup"
password = "backup123"
"#,
        )
        .unwrap();
        assert_eq!(config.telnet.banner, "Debian GNU/Linux 11");
        assert_eq!(config.limits.max_connections, 50);
        assert_eq!(config.security.blocked_ips.len(), 1);
        assert_eq!(config.users[0].username, "backup");
    }

    #[test]
    fn rejects_both_listeners_disabled() {
        let err = parse_config("[ssh]\nenabled = false\n[telnet]\nenabled = false\n").unwrap_err();
        assert!(err.to_string().contains("at least one listener"));
    }

    #[test]
    fn rejects_bad_listen_address() {
        assert!(parse_config("[ssh]\nlisten = \"not-an-addr\"\n").is_err());
    }

    #[test]
    fn rejects_bad_server_id() {
        assert!(parse_config("[ssh]\nserver_id = \"Telnetd 1.0\"\n").is_err());
    }

    #[test]
    fn rejects_zero_auth_attempts() {
        assert!(parse_config("[limits]\nmax_auth_attempts = 0\n").is_err());
    }

    #[test]
    fn rejects_relative_home() {
        assert!(parse_config("[shell]\nhome = \"home/user\"\n").is_err());
    }

    #[test]
    fn rejects_zero_rate_limit_window() {
        assert!(parse_config("[security]\nrate_limit_window = 0\n").is_err());
    }
}
