use crate::admission::AdmissionController;
use crate::audit::AuditLogger;
use crate::config::types::AppConfig;
use crate::shell::data::CREDENTIALS;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Shared application context, replacing scattered Arc parameters.
/// Constructed once at startup; no component reads ambient global state.
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub admission: Arc<AdmissionController>,
    pub audit: Arc<AuditLogger>,
    /// Merged bait credential table: built-ins plus `[[users]]` extras.
    credentials: HashMap<String, String>,
    pub start_time: Instant,
}

impl AppContext {
    pub fn new(
        config: Arc<AppConfig>,
        admission: Arc<AdmissionController>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        let mut credentials: HashMap<String, String> = CREDENTIALS
            .iter()
            .map(|(user, pass)| (user.to_string(), pass.to_string()))
            .collect();
        for user in &config.users {
            credentials.insert(user.username.clone(), user.password.clone());
        }
        Self {
            config,
            admission,
            audit,
            credentials,
            start_time: Instant::now(),
        }
    }

    /// Exact, case-sensitive credential check.
    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        self.credentials.get(username).map(String::as_str) == Some(password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::UserConfig;

    fn ctx_with(users: Vec<UserConfig>) -> AppContext {
        let mut config = AppConfig::default();
        config.users = users;
        let config = Arc::new(config);
        let admission = Arc::new(AdmissionController::new(&config));
        AppContext::new(config, admission, Arc::new(AuditLogger::new_noop()))
    }

    #[test]
    fn builtin_credentials_match_exactly() {
        let ctx = ctx_with(vec![]);
        assert!(ctx.check_credentials("root", "toor"));
        assert!(!ctx.check_credentials("root", "Toor"));
        assert!(!ctx.check_credentials("ROOT", "toor"));
        assert!(!ctx.check_credentials("nobody", "toor"));
    }

    #[test]
    fn config_users_extend_and_override() {
        let ctx = ctx_with(vec![
            UserConfig {
                username: "backup".into(),
                password: "backup123".into(),
            },
            UserConfig {
                username: "root".into(),
                password: "hunter2".into(),
            },
        ]);
        assert!(ctx.check_credentials("backup", "backup123"));
        assert!(ctx.check_credentials("root", "hunter2"));
        assert!(!ctx.check_credentials("root", "toor"));
    }
}
