use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;

/// One structured audit record. Events are the system's sole durable output
/// of value: every security-relevant occurrence becomes exactly one record.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type")]
pub enum AuditEvent {
    #[serde(rename = "connection.new")]
    ConnectionNew {
        timestamp: DateTime<Utc>,
        session_id: String,
        source_ip: String,
        protocol: String,
    },
    #[serde(rename = "connection.closed")]
    ConnectionClosed {
        timestamp: DateTime<Utc>,
        session_id: String,
        source_ip: String,
        protocol: String,
    },
    #[serde(rename = "admission.rejected")]
    AdmissionRejected {
        timestamp: DateTime<Utc>,
        source_ip: String,
        protocol: String,
        reason: String,
    },
    #[serde(rename = "auth.attempt")]
    AuthAttempt {
        timestamp: DateTime<Utc>,
        session_id: String,
        source_ip: String,
        protocol: String,
        username: String,
        /// Submitted password, recorded verbatim. Capturing what attackers
        /// try is half the point of running this service.
        password: String,
    },
    #[serde(rename = "auth.success")]
    AuthSuccess {
        timestamp: DateTime<Utc>,
        session_id: String,
        source_ip: String,
        protocol: String,
        username: String,
    },
    #[serde(rename = "auth.failure")]
    AuthFailure {
        timestamp: DateTime<Utc>,
        session_id: String,
        source_ip: String,
        protocol: String,
        username: String,
        attempt: u32,
    },
    #[serde(rename = "command.executed")]
    CommandExecuted {
        timestamp: DateTime<Utc>,
        session_id: String,
        source_ip: String,
        protocol: String,
        username: String,
        command: String,
    },
    #[serde(rename = "command.dangerous")]
    CommandDangerous {
        timestamp: DateTime<Utc>,
        session_id: String,
        source_ip: String,
        protocol: String,
        username: String,
        command: String,
    },
    #[serde(rename = "session.summary")]
    SessionSummary {
        timestamp: DateTime<Utc>,
        session_id: String,
        source_ip: String,
        protocol: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        duration_secs: u64,
        command_count: u64,
        /// First entries of the session's command history, truncated.
        commands: Vec<String>,
    },
}

impl AuditEvent {
    pub fn connection_new(session_id: &str, source_ip: IpAddr, protocol: &str) -> Self {
        Self::ConnectionNew {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            source_ip: source_ip.to_string(),
            protocol: protocol.to_string(),
        }
    }

    pub fn connection_closed(session_id: &str, source_ip: IpAddr, protocol: &str) -> Self {
        Self::ConnectionClosed {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            source_ip: source_ip.to_string(),
            protocol: protocol.to_string(),
        }
    }

    pub fn admission_rejected(source_ip: IpAddr, protocol: &str, reason: &str) -> Self {
        Self::AdmissionRejected {
            timestamp: Utc::now(),
            source_ip: source_ip.to_string(),
            protocol: protocol.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn auth_attempt(
        session_id: &str,
        source_ip: IpAddr,
        protocol: &str,
        username: &str,
        password: &str,
    ) -> Self {
        Self::AuthAttempt {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            source_ip: source_ip.to_string(),
            protocol: protocol.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn auth_success(
        session_id: &str,
        source_ip: IpAddr,
        protocol: &str,
        username: &str,
    ) -> Self {
        Self::AuthSuccess {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            source_ip: source_ip.to_string(),
            protocol: protocol.to_string(),
            username: username.to_string(),
        }
    }

    pub fn auth_failure(
        session_id: &str,
        source_ip: IpAddr,
        protocol: &str,
        username: &str,
        attempt: u32,
    ) -> Self {
        Self::AuthFailure {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            source_ip: source_ip.to_string(),
            protocol: protocol.to_string(),
            username: username.to_string(),
            attempt,
        }
    }

    pub fn command_executed(
        session_id: &str,
        source_ip: IpAddr,
        protocol: &str,
        username: &str,
        command: &str,
    ) -> Self {
        Self::CommandExecuted {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            source_ip: source_ip.to_string(),
            protocol: protocol.to_string(),
            username: username.to_string(),
            command: command.to_string(),
        }
    }

    pub fn command_dangerous(
        session_id: &str,
        source_ip: IpAddr,
        protocol: &str,
        username: &str,
        command: &str,
    ) -> Self {
        Self::CommandDangerous {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            source_ip: source_ip.to_string(),
            protocol: protocol.to_string(),
            username: username.to_string(),
            command: command.to_string(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn session_summary(
        session_id: &str,
        source_ip: IpAddr,
        protocol: &str,
        username: Option<&str>,
        duration_secs: u64,
        command_count: u64,
        commands: Vec<String>,
    ) -> Self {
        Self::SessionSummary {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            source_ip: source_ip.to_string(),
            protocol: protocol.to_string(),
            username: username.map(|u| u.to_string()),
            duration_secs,
            command_count,
            commands,
        }
    }

    /// Event type string, matching the serde tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConnectionNew { .. } => "connection.new",
            Self::ConnectionClosed { .. } => "connection.closed",
            Self::AdmissionRejected { .. } => "admission.rejected",
            Self::AuthAttempt { .. } => "auth.attempt",
            Self::AuthSuccess { .. } => "auth.success",
            Self::AuthFailure { .. } => "auth.failure",
            Self::CommandExecuted { .. } => "command.executed",
            Self::CommandDangerous { .. } => "command.dangerous",
            Self::SessionSummary { .. } => "session.summary",
        }
    }

    /// Whether this event should use priority delivery under channel pressure.
    /// A brute-force flood fills the buffer with connection events; the
    /// verdict-carrying records must survive it.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::AdmissionRejected { .. }
                | Self::AuthFailure { .. }
                | Self::CommandDangerous { .. }
                | Self::SessionSummary { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> IpAddr {
        "203.0.113.9".parse().unwrap()
    }

    #[test]
    fn serializes_with_event_type_tag() {
        let event = AuditEvent::auth_attempt("ab12cd34", ip(), "ssh", "root", "toor");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"auth.attempt\""));
        assert!(json.contains("\"username\":\"root\""));
        assert!(json.contains("\"password\":\"toor\""));
        assert!(json.contains("\"source_ip\":\"203.0.113.9\""));
    }

    #[test]
    fn summary_skips_absent_username() {
        let event = AuditEvent::session_summary("ab12cd34", ip(), "telnet", None, 12, 0, vec![]);
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("username"));
    }

    #[test]
    fn summary_carries_commands() {
        let event = AuditEvent::session_summary(
            "ab12cd34",
            ip(),
            "ssh",
            Some("root"),
            44,
            2,
            vec!["pwd".into(), "exit".into()],
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"command_count\":2"));
        assert!(json.contains("\"commands\":[\"pwd\",\"exit\"]"));
    }

    #[test]
    fn critical_classification() {
        assert!(AuditEvent::admission_rejected(ip(), "ssh", "rate limited").is_critical());
        assert!(AuditEvent::command_dangerous("s", ip(), "ssh", "root", "rm -rf /").is_critical());
        assert!(!AuditEvent::connection_new("s", ip(), "ssh").is_critical());
        assert!(!AuditEvent::command_executed("s", ip(), "ssh", "root", "ls").is_critical());
    }

    #[test]
    fn event_type_matches_serde_tag() {
        let event = AuditEvent::connection_new("s", ip(), "telnet");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(event.event_type()));
    }
}
