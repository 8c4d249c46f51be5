use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

use boxdesk::bot::discord::DiscordClient;
use boxdesk::client::ApiClient;
use boxdesk::config::{Config, DEFAULT_DISCORD_API_BASE};
use boxdesk::db::Database;
use boxdesk::error::Result;
use boxdesk::export;
use boxdesk::ops::pipeline::{CiPipeline, Readiness, TestMode, DEFAULT_HEALTH_URL, DEFAULT_READY_NEEDLE};
use boxdesk::ops::shortcuts::Shortcut;
use boxdesk::ops::{smoke, tunnel, Compose, ProcessRunner};

#[derive(Parser, Debug)]
#[command(name = "boxdesk")]
#[command(about = "boxdesk operator CLI")]
struct Cli {
    /// Compose file to use instead of the default one.
    #[arg(long, short = 'f', global = true, env = "BOXDESK_COMPOSE_FILE")]
    file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// docker compose up -d --build
    Up,
    /// docker compose down
    Down,
    /// docker compose logs -f
    Logs,
    /// docker compose restart
    Restart,
    /// Shell in the api container.
    ShellApi,
    /// Shell in the bot container.
    ShellBot,
    /// Shell in the dashboard container.
    ShellDashboard,
    /// sqlite3 session on the API database.
    Db,
    /// Build, start, wait for readiness, test, then tear down.
    Ci {
        /// Fixed wait in seconds instead of polling the health endpoint.
        #[arg(long)]
        sleep: Option<u64>,

        #[arg(long, default_value = DEFAULT_HEALTH_URL)]
        health_url: String,

        #[arg(long, default_value = DEFAULT_READY_NEEDLE)]
        needle: String,

        #[arg(long, default_value_t = 30)]
        attempts: u32,

        #[arg(long, default_value_t = 2)]
        interval: u64,

        /// Fail when the stack never becomes ready.
        #[arg(long, default_value_t = false)]
        strict: bool,

        #[arg(long, value_enum, default_value_t = TestMode::Exec)]
        mode: TestMode,

        /// Test command; defaults to the smoke check.
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Read-only checks against a running API.
    Smoke {
        #[arg(long, env = "API_URL", default_value = "http://localhost:8000")]
        api_url: String,
    },
    /// Local schema helpers.
    Schema {
        #[command(subcommand)]
        command: SchemaCommand,
    },
    /// Dump a Discord channel's history as JSON.
    Export {
        #[arg(long)]
        channel: String,

        #[arg(long, default_value = "messages.json")]
        output: String,

        #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
        token: String,

        #[arg(long, env = "DISCORD_API_BASE", default_value = DEFAULT_DISCORD_API_BASE)]
        api_base: String,
    },
    /// Point API_URL in an env file at the current ngrok https tunnel.
    Tunnel {
        #[arg(long, default_value = tunnel::DEFAULT_INSPECT_URL)]
        inspect_url: String,

        #[arg(long, default_value = ".env")]
        env_file: String,
    },
}

#[derive(Subcommand, Debug)]
enum SchemaCommand {
    /// Create the schema if needed and check every table is present.
    Init,
    /// List user tables.
    Tables,
}

async fn run(cli: Cli) -> Result<i32> {
    let compose = Compose::new(cli.file);
    let runner = ProcessRunner;
    match cli.command {
        Commands::Up => Shortcut::Up.run(&compose, &runner).await,
        Commands::Down => Shortcut::Down.run(&compose, &runner).await,
        Commands::Logs => Shortcut::Logs.run(&compose, &runner).await,
        Commands::Restart => Shortcut::Restart.run(&compose, &runner).await,
        Commands::ShellApi => Shortcut::ShellApi.run(&compose, &runner).await,
        Commands::ShellBot => Shortcut::ShellBot.run(&compose, &runner).await,
        Commands::ShellDashboard => Shortcut::ShellDashboard.run(&compose, &runner).await,
        Commands::Db => Shortcut::Db.run(&compose, &runner).await,
        Commands::Ci {
            sleep,
            health_url,
            needle,
            attempts,
            interval,
            strict,
            mode,
            command,
        } => {
            let mut pipeline = CiPipeline::new(compose);
            pipeline.readiness = match sleep {
                Some(seconds) => Readiness::Sleep(Duration::from_secs(seconds)),
                None => Readiness::Poll {
                    url: health_url,
                    needle,
                    attempts,
                    interval: Duration::from_secs(interval),
                    strict,
                },
            };
            pipeline.test_mode = mode;
            if !command.is_empty() {
                pipeline.test_command = command;
            }
            let report = pipeline.run(&runner).await;
            for step in &report.steps {
                let mark = if step.ok {
                    style("ok").green().bold()
                } else {
                    style("failed").red().bold()
                };
                println!("{:<10} {} {}", step.name, mark, style(&step.detail).color256(245));
            }
            report.result().map(|_| 0)
        }
        Commands::Smoke { api_url } => {
            let api = ApiClient::with_timeout(&api_url, Duration::from_secs(10))?;
            smoke::smoke(&api).await?;
            println!("{}", style("smoke checks passed").green());
            Ok(0)
        }
        Commands::Schema { command } => {
            let config = Config::from_env()?;
            let db = Database::open(&config.database.path).await?;
            match command {
                SchemaCommand::Init => {
                    db.verify_schema().await?;
                    println!("schema ready in {}", db.path());
                }
                SchemaCommand::Tables => {
                    for table in db.table_names().await? {
                        println!("{table}");
                    }
                }
            }
            Ok(0)
        }
        Commands::Export {
            channel,
            output,
            token,
            api_base,
        } => {
            let client = DiscordClient::new(&token, api_base)?;
            let messages = export::export_channel(&client, &channel).await?;
            export::write_json(&output, &messages).await?;
            println!("{} messages written to {}", messages.len(), output);
            Ok(0)
        }
        Commands::Tunnel {
            inspect_url,
            env_file,
        } => {
            let url = tunnel::sync_env_file(&inspect_url, &env_file).await?;
            println!("API_URL set to {url}/ask_agent in {env_file}");
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,boxdesk=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("{} {err}", style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}
