//! Runtime configuration for the `collab-server` binary: listen address and
//! the network-delay default (spec §6 `set_delay`). Only the example
//! binary reads this — the core crate takes these values as plain
//! arguments and has no notion of "configuration" itself.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub initial_network_delay: f64,
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080),
            initial_network_delay: 0.0,
            debug: false,
        }
    }
}

impl AppConfig {
    #[must_use]
    pub fn from_cli(cli: &crate::cli::Cli) -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: SocketAddr::new(cli.host, cli.port.unwrap_or(defaults.listen_addr.port())),
            initial_network_delay: cli.network_delay.unwrap_or(defaults.initial_network_delay),
            debug: cli.debug,
        }
    }
}
