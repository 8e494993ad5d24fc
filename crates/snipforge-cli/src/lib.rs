pub mod cli;
pub mod commands;
pub mod terminal;

use clap::Parser;
use cli::SnipForge;
use commands::handle_command;
use std::process;

/// Run the snipforge CLI application
pub fn run_main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = SnipForge::parse();
    let result = handle_command(args.commands);

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
