//! ## forrad-cli
//! **Command line front end for the allocator simulator**
//!
//! ### Commands:
//! - `simulate`: run the deterministic pool workload and print its report
//! - `config`: print the effective configuration as YAML

use clap::Parser;

mod commands;

use commands::Cli;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    commands::run_command(cli)
}
