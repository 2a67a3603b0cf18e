//! affix - attachment lifecycle from the command line

use clap::Parser;

use af_cli::args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment
    dotenvy::dotenv().ok();
    af_cli::init_tracing();

    let cli = Cli::parse();
    af_cli::commands::run(cli).await
}
