use anyhow::Result;
use tracing_subscriber::EnvFilter;

use shellcard_cli::{Cli, Commands, Parser};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.global.load_config()?;
    init_tracing(&config.log_level, config.log_json);

    match cli.command {
        Commands::Review(args) => args.run(config).await,
        Commands::Deck { subcommand } => subcommand.run(config),
    }
}

fn init_tracing(log_level: &str, log_json: bool) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
