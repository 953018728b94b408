use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level enum (replaces stringly-typed field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log format enum (replaces stringly-typed field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub telnet: TelnetConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Extra bait credentials appended to the built-in table.
    /// Plaintext on purpose: these are lures, not secrets.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// SSH listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SshConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ssh_listen")]
    pub listen: String,
    /// Version string presented during the SSH handshake. Must start "SSH-2.0-".
    #[serde(default = "default_server_id")]
    pub server_id: String,
    #[serde(default = "default_host_key_path")]
    pub host_key_path: PathBuf,
    /// Max concurrent connections on this listener alone.
    #[serde(default = "default_listener_max_connections")]
    pub max_connections: u32,
    /// Seconds a shell session on this listener may sit idle before it is
    /// closed.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_ssh_listen(),
            server_id: default_server_id(),
            host_key_path: default_host_key_path(),
            max_connections: default_listener_max_connections(),
            connection_timeout: default_connection_timeout(),
        }
    }
}

/// Telnet listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelnetConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_telnet_listen")]
    pub listen: String,
    /// Banner line printed before the login prompt.
    #[serde(default = "default_telnet_banner")]
    pub banner: String,
    /// Max concurrent connections on this listener alone.
    #[serde(default = "default_listener_max_connections")]
    pub max_connections: u32,
    /// Seconds a shell session on this listener may sit idle before it is
    /// closed.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_telnet_listen(),
            banner: default_telnet_banner(),
            max_connections: default_listener_max_connections(),
            connection_timeout: default_connection_timeout(),
        }
    }
}

/// Virtual shell configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShellConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Home directory every session starts in. Shared by all usernames.
    #[serde(default = "default_home")]
    pub home: String,
    /// Artificial latency before every command reply, in milliseconds.
    #[serde(default = "default_command_delay_ms")]
    pub command_delay_ms: u64,
    /// Input lines longer than this are truncated before dispatch.
    #[serde(default = "default_max_command_length")]
    pub max_command_length: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            home: default_home(),
            command_delay_ms: default_command_delay_ms(),
            max_command_length: default_max_command_length(),
        }
    }
}

/// Connection and session limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Global cap on concurrent connections across both listeners.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for each line during interactive login.
    #[serde(default = "default_login_timeout")]
    pub login_timeout: u64,
    /// Failed login attempts before the session is torn down.
    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: u32,
    /// Seconds to wait for active sessions to drain on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            login_timeout: default_login_timeout(),
            max_auth_attempts: default_max_auth_attempts(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Admission security configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    #[serde(default = "default_true")]
    pub rate_limit_enabled: bool,
    /// Max new connections per peer inside the rate-limit window.
    #[serde(default = "default_max_connections_per_ip")]
    pub max_connections_per_ip: u32,
    /// Sliding-window length in seconds.
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window: u64,
    /// Peers rejected unconditionally.
    #[serde(default)]
    pub blocked_ips: Vec<IpAddr>,
    /// If non-empty, only these peers may connect.
    #[serde(default)]
    pub allowed_ips: Vec<IpAddr>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limit_enabled: true,
            max_connections_per_ip: default_max_connections_per_ip(),
            rate_limit_window: default_rate_limit_window(),
            blocked_ips: Vec::new(),
            allowed_ips: Vec::new(),
        }
    }
}

/// Logging and audit output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Structured audit events go here as one JSON object per line.
    /// None disables the file sink (events still mirror to tracing).
    pub audit_log_path: Option<PathBuf>,
    #[serde(default = "default_audit_max_size_mb")]
    pub audit_max_size_mb: u64,
    #[serde(default = "default_audit_max_files")]
    pub audit_max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            audit_log_path: Some(PathBuf::from("logs/audit.json")),
            audit_max_size_mb: default_audit_max_size_mb(),
            audit_max_files: default_audit_max_files(),
        }
    }
}

/// One extra bait credential
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
}

fn default_true() -> bool {
    true
}

fn default_ssh_listen() -> String {
    "0.0.0.0:2222".to_string()
}

fn default_server_id() -> String {
    "SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.5".to_string()
}

fn default_host_key_path() -> PathBuf {
    PathBuf::from("keys/ssh_host_key")
}

fn default_telnet_listen() -> String {
    "0.0.0.0:2323".to_string()
}

fn default_telnet_banner() -> String {
    "Ubuntu 20.04.5 LTS".to_string()
}

fn default_listener_max_connections() -> u32 {
    100
}

fn default_hostname() -> String {
    "server01".to_string()
}

fn default_home() -> String {
    "/home/user".to_string()
}

fn default_command_delay_ms() -> u64 {
    100
}

fn default_max_command_length() -> usize {
    1000
}

fn default_max_connections() -> u32 {
    100
}

fn default_connection_timeout() -> u64 {
    300
}

fn default_login_timeout() -> u64 {
    30
}

fn default_max_auth_attempts() -> u32 {
    3
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_connections_per_ip() -> u32 {
    5
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_audit_max_size_mb() -> u64 {
    10
}

fn default_audit_max_files() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert!(config.ssh.enabled);
        assert!(config.telnet.enabled);
        assert_eq!(config.limits.max_auth_attempts, 3);
        assert_eq!(config.security.max_connections_per_ip, 5);
        assert_eq!(config.shell.home, "/home/user");
    }

    #[test]
    fn server_id_is_ssh2() {
        assert!(SshConfig::default().server_id.starts_with("SSH-2.0-"));
    }

    #[test]
    fn log_level_display() {
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }
}
