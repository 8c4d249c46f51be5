use boxdesk::bot;
use boxdesk::config::Config;
use boxdesk::error::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "boxdesk-bot")]
#[command(about = "boxdesk Discord bot")]
struct Cli {
    /// API endpoint; overrides API_URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Flat file of already announced feed posts.
    #[arg(long)]
    seen_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,boxdesk=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(api_url) = cli.api_url {
        config.monitoring.metrics_url = config
            .monitoring
            .metrics_url
            .or_else(|| boxdesk::config::derive_metrics_url(&api_url));
        config.discord.api_url = Some(api_url);
    }
    if let Some(seen_file) = cli.seen_file {
        config.feed.seen_file = seen_file;
    }

    tokio::select! {
        result = bot::run(config) => result,
        _ = boxdesk::api::shutdown_signal() => Ok(()),
    }
}
