pub mod pipeline;
pub mod smoke;
pub mod shortcuts;
pub mod tunnel;

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;

use crate::error::{BoxdeskError, Result};

/// One external command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs invocations and reports their exit code.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<i32>;
}

/// Spawns real processes with inherited stdio.
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<i32> {
        tracing::info!(command = %invocation, "running");
        let status = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| BoxdeskError::Runtime(format!("{}: {e}", invocation.program)))?;
        // Killed by a signal: no code, report a generic failure.
        Ok(status.code().unwrap_or(1))
    }
}

/// `docker compose`, optionally pinned to one compose file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compose {
    pub file: Option<String>,
}

impl Compose {
    pub fn new(file: Option<String>) -> Self {
        Self { file }
    }

    pub fn invocation<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Invocation {
        let mut full = vec!["compose".to_string()];
        if let Some(file) = &self.file {
            full.push("-f".to_string());
            full.push(file.clone());
        }
        full.extend(args.into_iter().map(str::to_string));
        Invocation::new("docker", full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_file_goes_before_the_subcommand() {
        let compose = Compose::new(Some("docker-compose.azure.yml".to_string()));
        assert_eq!(
            compose.invocation(["up", "-d"]).to_string(),
            "docker compose -f docker-compose.azure.yml up -d"
        );
        assert_eq!(
            Compose::default().invocation(["down"]).to_string(),
            "docker compose down"
        );
    }
}
