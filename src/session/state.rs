use crate::shell::data::ENV_DEFAULTS;
use std::fmt;
use std::net::IpAddr;
use std::time::Instant;

/// Which transport carries the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ssh,
    Telnet,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ssh => "ssh",
            Protocol::Telnet => "telnet",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hard cap on retained history entries; display shows far fewer, this only
/// bounds memory against a peer feeding us lines forever.
pub const MAX_HISTORY_ENTRIES: usize = 1000;

/// Per-connection session state. Owned exclusively by the session task that
/// created it; nothing here is shared or locked.
#[derive(Debug)]
pub struct ClientSession {
    pub session_id: String,
    pub peer_addr: IpAddr,
    pub protocol: Protocol,
    authenticated: bool,
    username: Option<String>,
    pub login_attempts: u32,
    pub current_path: String,
    /// Environment in display order. Seeded from defaults; only shell
    /// built-ins mutate it (`cd` keeps `PWD` current).
    env: Vec<(String, String)>,
    history: std::collections::VecDeque<String>,
    /// Commands actually dispatched to the engine (excludes the terminating
    /// `exit`/`logout`), reported in the session summary.
    pub commands_executed: u64,
    pub started_at: Instant,
}

impl ClientSession {
    pub fn new(session_id: String, peer_addr: IpAddr, protocol: Protocol, home: &str) -> Self {
        let mut env: Vec<(String, String)> = ENV_DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (key, value) in env.iter_mut() {
            if key == "HOME" || key == "PWD" {
                *value = home.to_string();
            }
        }
        Self {
            session_id,
            peer_addr,
            protocol,
            authenticated: false,
            username: None,
            login_attempts: 0,
            current_path: home.to_string(),
            env,
            history: std::collections::VecDeque::new(),
            commands_executed: 0,
            started_at: Instant::now(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Mark the session authenticated. The transition is one-way and the
    /// username is set exactly once; a second call is ignored and logged.
    pub fn authenticate(&mut self, username: &str) {
        if self.authenticated {
            tracing::warn!(
                session_id = %self.session_id,
                user = %username,
                "Duplicate authentication ignored"
            );
            return;
        }
        self.authenticated = true;
        self.username = Some(username.to_string());
    }

    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_env(&mut self, key: &str, value: &str) {
        match self.env.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.env.push((key.to_string(), value.to_string())),
        }
    }

    pub fn env_iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn record_command(&mut self, line: &str) {
        if self.history.len() >= MAX_HISTORY_ENTRIES {
            self.history.pop_front();
        }
        self.history.push_back(line.to_string());
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Last `n` history entries, oldest first.
    pub fn history_tail(&self, n: usize) -> impl Iterator<Item = &str> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).map(|s| s.as_str())
    }

    /// First `n` history entries, for the truncated summary list.
    pub fn history_head(&self, n: usize) -> Vec<String> {
        self.history.iter().take(n).cloned().collect()
    }

    pub fn duration_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ClientSession {
        ClientSession::new(
            "ab12cd34".to_string(),
            "10.0.0.1".parse().unwrap(),
            Protocol::Telnet,
            "/home/user",
        )
    }

    #[test]
    fn starts_unauthenticated_at_home() {
        let s = session();
        assert!(!s.is_authenticated());
        assert!(s.username().is_none());
        assert_eq!(s.current_path, "/home/user");
        assert_eq!(s.get_env("PWD"), Some("/home/user"));
        assert_eq!(s.get_env("HOME"), Some("/home/user"));
    }

    #[test]
    fn authentication_is_monotonic() {
        let mut s = session();
        s.authenticate("root");
        assert!(s.is_authenticated());
        assert_eq!(s.username(), Some("root"));

        s.authenticate("admin");
        assert_eq!(s.username(), Some("root"));
    }

    #[test]
    fn env_respects_configured_home() {
        let s = ClientSession::new(
            "ab12cd34".to_string(),
            "10.0.0.1".parse().unwrap(),
            Protocol::Ssh,
            "/home/svc",
        );
        assert_eq!(s.get_env("HOME"), Some("/home/svc"));
        assert_eq!(s.get_env("PWD"), Some("/home/svc"));
        // Other defaults untouched
        assert_eq!(s.get_env("SHELL"), Some("/bin/bash"));
    }

    #[test]
    fn set_env_updates_in_place() {
        let mut s = session();
        s.set_env("PWD", "/tmp");
        assert_eq!(s.get_env("PWD"), Some("/tmp"));
        // Order preserved: PWD is still the last default entry.
        let keys: Vec<&str> = s.env_iter().map(|(k, _)| k).collect();
        assert_eq!(keys.last(), Some(&"PWD"));
    }

    #[test]
    fn history_is_append_only_and_capped() {
        let mut s = session();
        for i in 0..(MAX_HISTORY_ENTRIES + 10) {
            s.record_command(&format!("echo {}", i));
        }
        assert_eq!(s.history_len(), MAX_HISTORY_ENTRIES);
        // Oldest entries were evicted.
        let first = s.history_head(1);
        assert_eq!(first[0], "echo 10");
    }

    #[test]
    fn history_tail_is_submission_ordered() {
        let mut s = session();
        s.record_command("pwd");
        s.record_command("ls");
        s.record_command("whoami");
        let tail: Vec<&str> = s.history_tail(2).collect();
        assert_eq!(tail, vec!["ls", "whoami"]);
    }
}
