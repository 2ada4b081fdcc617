mod cli;

use anyhow::Context;
use clap::Parser;

use cli::CliArgs;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    let client = qualifire::Client::new(&args.client_config()).context("building client")?;
    let response = client
        .evaluate(args.evaluate_params())
        .context("running evaluation")?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn main() {
    init_tracing();
    let args = CliArgs::parse();

    if let Err(error) = run(args) {
        tracing::error!("{error:?}");
        std::process::exit(1);
    }
}
