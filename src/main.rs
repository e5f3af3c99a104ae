use clap::Parser;
use weather_collector::cli::{run, Cli};
use weather_collector::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
