use anyhow::Result;
use clap::Parser;

use coursetrack::app;
use coursetrack::cli::Cli;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    app::run(cli)
}
