// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Waypost discovery server binary.
//!
//! Centralized discovery for pub/sub networks where multicast presence
//! announcements are unavailable or too expensive:
//! - Cloud/Kubernetes deployments
//! - Corporate networks with multicast disabled
//! - WAN deployments with chained discovery servers
//!
//! # Usage
//!
//! ```bash
//! # Start server on the default locator (127.0.0.1:11811)
//! waypost
//!
//! # Custom locator and lease tuning
//! waypost --bind 0.0.0.0 --port 11811 --lease-duration 8 --announcement-period 2
//!
//! # Federate with another discovery server
//! waypost --remote 44.53.01.5f.45.50.52.4f.53.49.4d.41@10.0.0.2:11811
//! ```

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use waypost::{
    DiscoveryServer, Identity, Locator, RemoteServerDescriptor, ServerConfig,
};

/// Waypost - centralized discovery server for pub/sub peer networks
#[derive(Parser, Debug)]
#[command(name = "waypost")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// UDP port to listen on
    #[arg(short, long, default_value = "11811")]
    port: u16,

    /// Server identity prefix (dotted or plain hex, 12 bytes)
    #[arg(long)]
    prefix: Option<Identity>,

    /// Participant name advertised in announcements
    #[arg(short, long)]
    name: Option<String>,

    /// Lease duration in seconds
    #[arg(long, default_value = "8")]
    lease_duration: u64,

    /// Self-announcement period in seconds (must be < lease duration)
    #[arg(long, default_value = "2")]
    announcement_period: u64,

    /// Remote server to federate with, `prefix@host:port[,host:port...]`
    /// (repeatable)
    #[arg(long = "remote")]
    remotes: Vec<RemoteServerDescriptor>,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Load or build config; environment variables override both.
    let mut config = if let Some(config_path) = args.config {
        info!("Loading config from {:?}", config_path);
        ServerConfig::from_file(&config_path)?
    } else {
        let mut config = ServerConfig {
            listen_locators: vec![Locator::new(args.bind, args.port)],
            lease_duration_secs: args.lease_duration,
            announcement_period_secs: args.announcement_period,
            remote_servers: args.remotes,
            ..Default::default()
        };
        if let Some(prefix) = args.prefix {
            config.identity = prefix;
        }
        if let Some(name) = args.name {
            config.name = name;
        }
        config
    };
    config.apply_env()?;

    info!("+----------------------------------------------------+");
    info!(
        "|       Waypost Discovery Server v{}              |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Identity: {:38} |", config.identity.to_string());
    info!("|  Bind:     {:38} |", config.listen_locators[0].to_string());
    info!(
        "|  Lease:    {:38} |",
        format!(
            "{}s (announce every {}s)",
            config.lease_duration_secs, config.announcement_period_secs
        )
    );
    info!(
        "|  Remotes:  {:38} |",
        if config.remote_servers.is_empty() {
            "none".to_string()
        } else {
            config.remote_servers.len().to_string()
        }
    );
    info!("+----------------------------------------------------+");

    // Create and start server; config/bind/security errors are fatal
    // and exit nonzero.
    let server = DiscoveryServer::new(config)?;

    // Handle shutdown signals
    let server_handle = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping server...");
        server_handle.shutdown();
    });

    // Run server
    server.run().await?;

    info!("Discovery server stopped");
    Ok(())
}
