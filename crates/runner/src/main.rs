#![forbid(unsafe_code)]

mod cli;
mod render;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    qc_runner::logging::init();
    cli.run()
}
