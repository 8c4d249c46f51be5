use boxdesk::api;
use boxdesk::config::Config;
use boxdesk::error::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "boxdesk-api")]
#[command(about = "boxdesk HTTP API")]
struct Cli {
    #[arg(long, env = "BOXDESK_HOST")]
    host: Option<String>,

    #[arg(long, env = "BOXDESK_PORT")]
    port: Option<u16>,

    /// SQLite file; overrides the path chosen from ENV.
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,boxdesk=info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    api::run(config).await
}
