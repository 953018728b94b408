use crate::session::state::ClientSession;
use crate::shell::data::CANNED_OUTPUTS;
use crate::shell::{parser, vfs};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// How a command reply should be treated by the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Normal,
    /// Sensitive-action command: reply is a plausible failure, and the
    /// session loop emits an elevated-severity audit event.
    Dangerous,
    /// `exit`/`logout`: the session loop says goodbye and closes.
    Exit,
}

/// Result of dispatching one command line.
#[derive(Debug)]
pub struct CommandReply {
    pub output: String,
    pub kind: ReplyKind,
}

impl CommandReply {
    fn normal(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            kind: ReplyKind::Normal,
        }
    }

    fn dangerous(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            kind: ReplyKind::Dangerous,
        }
    }

    fn exit() -> Self {
        Self {
            output: String::new(),
            kind: ReplyKind::Exit,
        }
    }
}

/// State-mutating built-ins and local queries, dispatched before any table.
#[derive(Debug, Clone, Copy)]
enum Builtin {
    Cd,
    Pwd,
    Whoami,
    Ls,
    Cat,
    Echo,
    History,
    Env,
    Clear,
    Exit,
}

static BUILTINS: Lazy<HashMap<&'static str, Builtin>> = Lazy::new(|| {
    HashMap::from([
        ("cd", Builtin::Cd),
        ("pwd", Builtin::Pwd),
        ("whoami", Builtin::Whoami),
        ("ls", Builtin::Ls),
        ("cat", Builtin::Cat),
        ("echo", Builtin::Echo),
        ("history", Builtin::History),
        ("env", Builtin::Env),
        ("clear", Builtin::Clear),
        ("exit", Builtin::Exit),
        ("logout", Builtin::Exit),
    ])
});

/// Alias groups that share one canned block, keyed by the canned-table entry
/// they resolve to.
static CATEGORY_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("ps", "ps aux"),
        ("top", "ps aux"),
        ("htop", "ps aux"),
        ("netstat", "netstat -an"),
        ("ss", "netstat -an"),
        ("ifconfig", "ifconfig"),
        ("ip", "ifconfig"),
        ("df", "df -h"),
        ("du", "df -h"),
        ("free", "free -m"),
        ("vmstat", "free -m"),
        ("uname", "uname -a"),
    ])
});

/// Sensitive-action commands: never emulated, always answered with a
/// plausible failure and flagged for elevated audit.
#[derive(Debug, Clone, Copy)]
enum DangerousKind {
    Delete,
    Fetch,
    NetTool,
    Interpreter,
}

static DANGEROUS: Lazy<HashMap<&'static str, DangerousKind>> = Lazy::new(|| {
    HashMap::from([
        ("rm", DangerousKind::Delete),
        ("rmdir", DangerousKind::Delete),
        ("del", DangerousKind::Delete),
        ("delete", DangerousKind::Delete),
        ("wget", DangerousKind::Fetch),
        ("curl", DangerousKind::Fetch),
        ("download", DangerousKind::Fetch),
        ("nc", DangerousKind::NetTool),
        ("netcat", DangerousKind::NetTool),
        ("ncat", DangerousKind::NetTool),
        ("python", DangerousKind::Interpreter),
        ("python3", DangerousKind::Interpreter),
        ("perl", DangerousKind::Interpreter),
        ("php", DangerousKind::Interpreter),
        ("bash", DangerousKind::Interpreter),
        ("sh", DangerousKind::Interpreter),
    ])
});

/// How many history entries the `history` built-in displays.
const HISTORY_DISPLAY: usize = 20;

/// Protocol-agnostic virtual command interpreter. Holds only immutable
/// presentation data; all session side effects go through the passed-in
/// `ClientSession`.
pub struct ShellEngine {
    hostname: String,
    home: String,
}

impl ShellEngine {
    pub fn new(hostname: String, home: String) -> Self {
        Self { hostname, home }
    }

    /// The shell prompt, with the home directory shown as `~`.
    pub fn prompt(&self, session: &ClientSession) -> String {
        let cwd = &session.current_path;
        let path_display = if cwd == &self.home {
            "~".to_string()
        } else if let Some(rest) = cwd.strip_prefix(&self.home) {
            format!("~{}", rest)
        } else {
            cwd.clone()
        };
        format!(
            "{}@{}:{}$ ",
            session.username().unwrap_or("user"),
            self.hostname,
            path_display
        )
    }

    /// Dispatch one command line. Priority order: built-ins, exact canned
    /// full-line match, category aliases, dangerous commands, not-found.
    pub fn execute(&self, session: &mut ClientSession, line: &str) -> CommandReply {
        let tokens = parser::tokenize(line.trim());
        if tokens.is_empty() {
            return CommandReply::normal("");
        }
        let cmd = tokens[0].as_str();
        let args = &tokens[1..];
        let full_command = tokens.join(" ");

        if let Some(builtin) = BUILTINS.get(cmd) {
            return self.run_builtin(*builtin, session, args);
        }

        if let Some(output) = CANNED_OUTPUTS.get(full_command.as_str()) {
            return CommandReply::normal(*output);
        }

        if let Some(canned_key) = CATEGORY_ALIASES.get(cmd) {
            if let Some(output) = CANNED_OUTPUTS.get(canned_key) {
                return CommandReply::normal(*output);
            }
        }

        if let Some(kind) = DANGEROUS.get(cmd) {
            return CommandReply::dangerous(dangerous_reply(*kind, cmd, args));
        }

        if cmd.starts_with('#') {
            return CommandReply::normal("");
        }

        CommandReply::normal(format!("{}: command not found", cmd))
    }

    fn run_builtin(
        &self,
        builtin: Builtin,
        session: &mut ClientSession,
        args: &[String],
    ) -> CommandReply {
        match builtin {
            Builtin::Cd => self.cmd_cd(session, args),
            Builtin::Pwd => CommandReply::normal(session.current_path.clone()),
            Builtin::Whoami => {
                CommandReply::normal(session.username().unwrap_or("user").to_string())
            }
            Builtin::Ls => {
                let target = args
                    .first()
                    .map(|a| vfs::resolve_path(a, &session.current_path, &self.home))
                    .unwrap_or_else(|| session.current_path.clone());
                CommandReply::normal(vfs::list_directory(&target).join("  "))
            }
            Builtin::Cat => CommandReply::normal(cmd_cat(args)),
            Builtin::Echo => CommandReply::normal(args.join(" ")),
            Builtin::History => {
                let lines: Vec<String> = session
                    .history_tail(HISTORY_DISPLAY)
                    .enumerate()
                    .map(|(i, cmd)| format!("  {}  {}", i + 1, cmd))
                    .collect();
                CommandReply::normal(lines.join("\n"))
            }
            Builtin::Env => {
                let lines: Vec<String> = session
                    .env_iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                CommandReply::normal(lines.join("\n"))
            }
            Builtin::Clear => CommandReply::normal("\x1b[2J\x1b[H"),
            Builtin::Exit => CommandReply::exit(),
        }
    }

    fn cmd_cd(&self, session: &mut ClientSession, args: &[String]) -> CommandReply {
        let Some(target) = args.first() else {
            session.current_path = self.home.clone();
            let home = self.home.clone();
            session.set_env("PWD", &home);
            return CommandReply::normal("");
        };

        let resolved = vfs::resolve_path(target, &session.current_path, &self.home);
        // Accepted when modeled or absolute. Resolution always yields an
        // absolute path, so the error branch guards the contract rather
        // than a reachable input today.
        if vfs::is_modeled(&resolved) || resolved.starts_with('/') {
            session.current_path = resolved.clone();
            session.set_env("PWD", &resolved);
            CommandReply::normal("")
        } else {
            CommandReply::normal(format!("cd: {}: No such file or directory", target))
        }
    }
}

fn cmd_cat(args: &[String]) -> String {
    let Some(filename) = args.first() else {
        return "cat: missing file operand".to_string();
    };
    if filename == "/etc/passwd" || filename == "passwd" {
        return CANNED_OUTPUTS["cat /etc/passwd"].to_string();
    }
    if filename.ends_with(".txt") {
        return format!(
            "This is the content of {}\nSample text file content.",
            filename
        );
    }
    format!("cat: {}: No such file or directory", filename)
}

fn dangerous_reply(kind: DangerousKind, cmd: &str, args: &[String]) -> String {
    match kind {
        DangerousKind::Delete => {
            let joined = args.join(" ");
            if joined.contains("-rf") {
                let target = args.last().map(|s| s.as_str()).unwrap_or("file");
                format!("{}: cannot remove '{}': Operation not permitted", cmd, target)
            } else {
                let target = args.first().map(|s| s.as_str()).unwrap_or("file");
                format!("{}: cannot remove '{}': No such file or directory", cmd, target)
            }
        }
        DangerousKind::Fetch => format!("{}: unable to resolve host address", cmd),
        DangerousKind::NetTool => format!("{}: connection refused", cmd),
        DangerousKind::Interpreter => format!("{}: command not found", cmd),
    }
}
