//! Command-line surface for the `collab-server` example binary.

use std::net::IpAddr;

use clap::Parser;

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, env = "COLLAB_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on. Defaults to 8080.
    #[arg(long, env = "COLLAB_PORT")]
    pub port: Option<u16>,

    /// Simulated network delay applied before every edit is processed, in
    /// seconds (spec §6 `set_delay`). Defaults to 0.
    #[arg(long, env = "COLLAB_NETWORK_DELAY")]
    pub network_delay: Option<f64>,

    /// Enable debug-level logging.
    #[arg(long, env = "COLLAB_DEBUG")]
    pub debug: bool,
}

#[test]
fn verify() {
    use clap::CommandFactory as _;
    Cli::command().debug_assert();
}
