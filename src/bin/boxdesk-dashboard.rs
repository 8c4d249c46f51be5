use boxdesk::client::ApiClient;
use boxdesk::dashboard;
use boxdesk::error::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "boxdesk-dashboard")]
#[command(about = "boxdesk reservations dashboard")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8501)]
    port: u16,

    /// Base URL of the boxdesk API.
    #[arg(long, env = "DASHBOARD_API_URL", default_value = "http://localhost:8000")]
    api_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,boxdesk=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let api = ApiClient::new(&cli.api_url)?;
    dashboard::run_with_shutdown(api, &cli.host, cli.port, boxdesk::api::shutdown_signal()).await
}
