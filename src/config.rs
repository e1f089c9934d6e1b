//! Configuration for Lorehall
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

use crate::room::SweeperConfig;

/// Lorehall - campaign content tree and real-time room service
#[derive(Parser, Debug, Clone)]
#[command(name = "lorehall")]
#[command(about = "Campaign content tree and real-time room service")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Seconds a room may sit with no subscribers and no activity before
    /// the sweeper evicts it
    #[arg(long, env = "ROOM_IDLE_TIMEOUT_SECS", default_value = "600")]
    pub room_idle_timeout_secs: u64,

    /// Seconds between sweeper passes
    #[arg(long, env = "ROOM_SWEEP_INTERVAL_SECS", default_value = "60")]
    pub room_sweep_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable development mode (seeds demo campaign data)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.room_idle_timeout_secs == 0 {
            return Err("ROOM_IDLE_TIMEOUT_SECS must be greater than zero".to_string());
        }
        if self.room_sweep_interval_secs == 0 {
            return Err("ROOM_SWEEP_INTERVAL_SECS must be greater than zero".to_string());
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "invalid LOG_LEVEL '{}', expected one of {:?}",
                self.log_level, valid_levels
            ));
        }
        Ok(())
    }

    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            interval: Duration::from_secs(self.room_sweep_interval_secs),
            idle_timeout: Duration::from_secs(self.room_idle_timeout_secs),
        }
    }
}
