use anyhow::{Context, Result};
use clap::Parser;
use esimcheck::telemetry::init_tracing;
use esimcheck::{CheckArgs, Pipeline};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(
    name = "esim-check",
    version,
    about = "Check one device model for eSIM support and print the verdict as JSON"
)]
struct CheckCli {
    /// Device model name, e.g. "Galaxy S23".
    model: String,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    /// Emit newline-delimited JSON logs.
    #[arg(long, env = "ESIMCHECK_LOG_JSON", default_value_t = false)]
    log_json: bool,

    #[command(flatten)]
    check: CheckArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CheckCli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    init_tracing(cli.log_json, level);

    let pipeline =
        Pipeline::new(cli.check.build_controls()).context("failed to build HTTP clients")?;
    let verdict = pipeline.check(&cli.model).await?;
    let json = serde_json::to_string_pretty(&verdict).context("failed to serialize verdict")?;
    println!("{json}");
    Ok(())
}
