//! Build, start, wait, test, tear down. Teardown always runs.

use std::time::Duration;

use crate::error::{BoxdeskError, Result};
use crate::ops::{CommandRunner, Compose, Invocation};

pub const DEFAULT_HEALTH_URL: &str = "http://localhost:8000/health";
pub const DEFAULT_READY_NEEDLE: &str = "\"status\":\"ok\"";

/// How the pipeline waits for the API after `up -d`.
#[derive(Debug, Clone)]
pub enum Readiness {
    /// Fixed wait; never fails.
    Sleep(Duration),
    /// GET `url` until the body contains `needle`, at most `attempts` times.
    /// With `strict` unset the pipeline proceeds once the budget is spent.
    Poll {
        url: String,
        needle: String,
        attempts: u32,
        interval: Duration,
        strict: bool,
    },
}

impl Default for Readiness {
    fn default() -> Self {
        Readiness::Poll {
            url: DEFAULT_HEALTH_URL.to_string(),
            needle: DEFAULT_READY_NEEDLE.to_string(),
            attempts: 30,
            interval: Duration::from_secs(2),
            strict: false,
        }
    }
}

/// Whether tests exec into the running API container or start a one-shot one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TestMode {
    #[default]
    Exec,
    Run,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub steps: Vec<StepResult>,
}

impl PipelineReport {
    fn record(&mut self, name: &'static str, ok: bool, detail: impl Into<String>) -> bool {
        let detail = detail.into();
        if ok {
            tracing::info!(step = name, %detail, "step passed");
        } else {
            tracing::error!(step = name, %detail, "step failed");
        }
        self.steps.push(StepResult { name, ok, detail });
        ok
    }

    pub fn ran(&self, name: &str) -> bool {
        self.steps.iter().any(|step| step.name == name)
    }

    /// First failing step, if any.
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.steps.iter().find(|step| !step.ok)
    }

    pub fn result(&self) -> Result<()> {
        match self.first_failure() {
            Some(step) => Err(BoxdeskError::Runtime(format!(
                "step {} failed: {}",
                step.name, step.detail
            ))),
            None => Ok(()),
        }
    }
}

pub struct CiPipeline {
    pub compose: Compose,
    pub readiness: Readiness,
    pub test_mode: TestMode,
    pub test_command: Vec<String>,
    pub service: String,
}

impl CiPipeline {
    pub fn new(compose: Compose) -> Self {
        Self {
            compose,
            readiness: Readiness::default(),
            test_mode: TestMode::Exec,
            test_command: vec![
                "boxdesk".to_string(),
                "smoke".to_string(),
                "--api-url".to_string(),
                "http://localhost:8000".to_string(),
            ],
            service: "api".to_string(),
        }
    }

    pub fn test_invocation(&self) -> Invocation {
        let mut args: Vec<&str> = match self.test_mode {
            TestMode::Exec => vec!["exec", "-T", self.service.as_str()],
            TestMode::Run => vec!["run", "--rm", self.service.as_str()],
        };
        args.extend(self.test_command.iter().map(String::as_str));
        self.compose.invocation(args)
    }

    pub async fn run(&self, runner: &dyn CommandRunner) -> PipelineReport {
        let mut report = PipelineReport::default();
        self.run_steps(runner, &mut report).await;

        let teardown = self.compose.invocation(["down", "-v"]);
        let (ok, detail) = exit_status(runner.run(&teardown).await);
        report.record("teardown", ok, detail);
        report
    }

    async fn run_steps(&self, runner: &dyn CommandRunner, report: &mut PipelineReport) {
        let (ok, detail) = exit_status(runner.run(&self.compose.invocation(["build"])).await);
        if !report.record("build", ok, detail) {
            return;
        }
        let (ok, detail) = exit_status(runner.run(&self.compose.invocation(["up", "-d"])).await);
        if !report.record("up", ok, detail) {
            return;
        }
        let (ok, detail) = wait_ready(&self.readiness).await;
        if !report.record("readiness", ok, detail) {
            return;
        }
        let (ok, detail) = exit_status(runner.run(&self.test_invocation()).await);
        report.record("test", ok, detail);
    }
}

fn exit_status(result: Result<i32>) -> (bool, String) {
    match result {
        Ok(0) => (true, "exit 0".to_string()),
        Ok(code) => (false, format!("exit {code}")),
        Err(err) => (false, err.to_string()),
    }
}

/// Returns whether the pipeline may continue, and a note for the report.
pub async fn wait_ready(readiness: &Readiness) -> (bool, String) {
    match readiness {
        Readiness::Sleep(duration) => {
            tokio::time::sleep(*duration).await;
            (true, format!("waited {}s", duration.as_secs_f64()))
        }
        Readiness::Poll {
            url,
            needle,
            attempts,
            interval,
            strict,
        } => {
            let client = match reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
            {
                Ok(client) => client,
                Err(err) => return (false, err.to_string()),
            };
            for attempt in 1..=*attempts {
                match probe(&client, url).await {
                    Ok(body) if body.contains(needle.as_str()) => {
                        return (true, format!("ready after {attempt} attempt(s)"));
                    }
                    Ok(_) => tracing::debug!(attempt, "not ready yet"),
                    Err(err) => tracing::debug!(attempt, error = %err, "probe failed"),
                }
                if attempt < *attempts {
                    tokio::time::sleep(*interval).await;
                }
            }
            let note = format!("not ready after {attempts} attempt(s)");
            if *strict {
                (false, note)
            } else {
                tracing::warn!(%url, "{note}, continuing");
                (true, note)
            }
        }
    }
}

async fn probe(client: &reqwest::Client, url: &str) -> Result<String> {
    client
        .get(url)
        .send()
        .await
        .map_err(|e| BoxdeskError::Http(e.to_string()))?
        .text()
        .await
        .map_err(|e| BoxdeskError::Http(e.to_string()))
}
