// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI/env configuration surface: every tunable is a `clap` flag with an
//! `env` fallback.

use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "ariproxy", about = "Bridges a Switch API instance to a message-bus cluster")]
pub struct ProxyConfig {
    /// Bus connection URL (`nats://host:port` or `mem://name` for the in-process driver).
    #[arg(long, env = "ARIPROXY_BUS_URL", default_value = "nats://127.0.0.1:4222")]
    pub bus_url: String,

    /// Switch base URL, e.g. `http://127.0.0.1:8088`.
    #[arg(long, env = "ARIPROXY_SWITCH_BASE_URL")]
    pub switch_base_url: String,

    /// Switch auth token, if the Switch requires one.
    #[arg(long, env = "ARIPROXY_SWITCH_AUTH_TOKEN")]
    pub switch_auth_token: Option<String>,

    /// Control-plane application this proxy owns.
    #[arg(long, env = "ARIPROXY_APPLICATION")]
    pub application: String,

    /// Prefix prepended to every bus subject.
    #[arg(long, env = "ARIPROXY_SUBJECT_PREFIX", default_value = "ari.")]
    pub subject_prefix: String,

    /// Announce period, in milliseconds.
    #[arg(long, env = "ARIPROXY_ANNOUNCE_PERIOD_MS", default_value_t = 1000)]
    pub announce_period_ms: u64,

    /// Identity re-check period, in milliseconds.
    #[arg(long, env = "ARIPROXY_IDENTITY_CHECK_PERIOD_MS", default_value_t = 60_000)]
    pub identity_check_period_ms: u64,

    /// Shutdown grace period, in milliseconds.
    #[arg(long, env = "ARIPROXY_SHUTDOWN_GRACE_MS", default_value_t = 500)]
    pub shutdown_grace_ms: u64,
}

impl ProxyConfig {
    pub fn announce_period(&self) -> Duration {
        Duration::from_millis(self.announce_period_ms)
    }

    pub fn identity_check_period(&self) -> Duration {
        Duration::from_millis(self.identity_check_period_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
