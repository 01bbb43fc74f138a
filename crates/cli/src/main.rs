//! ResolutionGuard CLI, the main entry point.
//!
//! `resguard <message...>` runs one agent turn against the shared store and
//! prints the coach's reply. Log level comes from `RUST_LOG`.

use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(
    name = "resguard",
    about = "ResolutionGuard: an agent that keeps resolutions from drifting",
    version
)]
struct Cli {
    /// What to tell the agent, e.g. "I missed my workout today"
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    message: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    commands::init_tracing();

    commands::agent::run(cli.message.join(" ")).await
}
