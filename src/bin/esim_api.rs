use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use esimcheck::api::{router, AppState, RateLimit, RateLimiter};
use esimcheck::telemetry::init_tracing;
use esimcheck::{CheckArgs, Pipeline};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(
    name = "esim-api",
    version,
    about = "HTTP API answering whether a device model supports eSIM, from web evidence"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "ESIMCHECK_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Max /check requests per minute (0 disables rate limiting).
    #[arg(long, env = "ESIMCHECK_MAX_REQUESTS_PER_MINUTE", default_value_t = 60)]
    max_requests_per_minute: u32,

    /// Rate-limit burst size (tokens available instantly).
    #[arg(long, env = "ESIMCHECK_RATE_LIMIT_BURST", default_value_t = 10)]
    rate_limit_burst: u32,

    /// Emit newline-delimited JSON logs.
    #[arg(long, env = "ESIMCHECK_LOG_JSON", default_value_t = false)]
    log_json: bool,

    #[command(flatten)]
    check: CheckArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ApiCli::parse();
    init_tracing(cli.log_json, Level::INFO);

    let controls = cli.check.build_controls();
    let pipeline = Pipeline::new(controls).context("failed to build HTTP clients")?;
    let rate_limiter = RateLimiter::new(RateLimit {
        per_minute: cli.max_requests_per_minute,
        burst: cli.rate_limit_burst,
    });
    let app = router(AppState::new(Arc::new(pipeline), rate_limiter));

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "esim-api listening");
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}
