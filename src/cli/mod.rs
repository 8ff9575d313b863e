//! CLI module for the Market Data Gateway

pub mod serve;

use clap::{Parser, Subcommand};

/// Market Data Gateway - API key authentication and tiered rate limiting
#[derive(Parser)]
#[command(name = "marketdata-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway server
    Serve,
}
