//! Server configuration from flags and environment

use chrono::Duration;
use clap::Parser;
use std::net::SocketAddr;

use crate::staging::manager::{DEFAULT_LEASE_MINUTES, DEFAULT_MAX_BATCH_SIZE};
use crate::staging::StagingSettings;

#[derive(Debug, Clone, Parser)]
#[command(name = "guard-staging")]
#[command(about = "Guard staging server - annotation workflow for keyword and rule proposals")]
#[command(version)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "GUARD_STAGING_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:guard-staging.db")]
    pub database_url: String,

    #[arg(long, env = "GUARD_STAGING_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Claim lease length in minutes
    #[arg(long, env = "GUARD_STAGING_LEASE_MINUTES", default_value_t = DEFAULT_LEASE_MINUTES,
          value_parser = clap::value_parser!(i64).range(1..))]
    pub lease_minutes: i64,

    /// Upper bound on a single claim
    #[arg(long, env = "GUARD_STAGING_MAX_BATCH", default_value_t = DEFAULT_MAX_BATCH_SIZE,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub max_batch_size: u32,

    /// Only the claim holder may review, and only before the lease expires
    #[arg(long, env = "GUARD_STAGING_STRICT_OWNERSHIP")]
    pub strict_ownership: bool,
}

impl Config {
    pub fn staging_settings(&self) -> StagingSettings {
        StagingSettings {
            lease: Duration::minutes(self.lease_minutes),
            max_batch_size: self.max_batch_size,
            strict_ownership: self.strict_ownership,
        }
    }
}
