use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    mastery_kernel_cli::init_tracing();
    let cli = mastery_kernel_cli::Cli::parse();
    mastery_kernel_cli::run_cli(cli)
}
