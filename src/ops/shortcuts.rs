use crate::error::Result;
use crate::ops::{CommandRunner, Compose, Invocation};

pub const DB_FILE_IN_CONTAINER: &str = "/data/boxdesk.db";

/// Named stack-lifecycle shortcuts, each mapped to exactly one compose call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Up,
    Down,
    Logs,
    Restart,
    ShellApi,
    ShellBot,
    ShellDashboard,
    Db,
}

impl Shortcut {
    pub const ALL: [Shortcut; 8] = [
        Shortcut::Up,
        Shortcut::Down,
        Shortcut::Logs,
        Shortcut::Restart,
        Shortcut::ShellApi,
        Shortcut::ShellBot,
        Shortcut::ShellDashboard,
        Shortcut::Db,
    ];

    pub fn compose_args(&self) -> Vec<&'static str> {
        match self {
            Shortcut::Up => vec!["up", "-d", "--build"],
            Shortcut::Down => vec!["down"],
            Shortcut::Logs => vec!["logs", "-f"],
            Shortcut::Restart => vec!["restart"],
            Shortcut::ShellApi => vec!["exec", "api", "/bin/sh"],
            Shortcut::ShellBot => vec!["exec", "bot", "/bin/sh"],
            Shortcut::ShellDashboard => vec!["exec", "dashboard", "/bin/sh"],
            Shortcut::Db => vec!["exec", "api", "sqlite3", DB_FILE_IN_CONTAINER],
        }
    }

    pub fn invocation(&self, compose: &Compose) -> Invocation {
        compose.invocation(self.compose_args())
    }

    /// Runs the shortcut and returns the wrapped command's exit code.
    pub async fn run(&self, compose: &Compose, runner: &dyn CommandRunner) -> Result<i32> {
        runner.run(&self.invocation(compose)).await
    }
}
