use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "exportbox")]
#[command(about = "Change-triggered export and sync service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API, the change listener and the scheduler
    Serve(ServeArgs),
    /// Run one export now and print the attempt record as JSON
    Export(ExportArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (defaults to `server.bind_addr`)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Overwrite the configured object instead of writing a timestamped copy
    #[arg(long)]
    pub overwrite: bool,
}
