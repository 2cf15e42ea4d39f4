// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ariproxy: bridges one Switch API instance to one message-bus cluster,
//! translating bus-originated RPC requests into Switch operations and
//! fanning Switch-originated events out to bus subscribers.

pub mod announcer;
pub mod broker;
pub mod bus;
pub mod config;
pub mod error;
pub mod event_pump;
pub mod identity;
pub mod lifecycle;
pub mod model;
pub mod operations;
pub mod registry;
pub mod subject;
pub mod switch;

use std::sync::Arc;

use crate::config::ProxyConfig;
use crate::lifecycle::{RuntimeConfig, Supervisor};
use crate::switch::http::HttpSwitchClient;

/// Process exit disposition, independent of `std::process::ExitCode` so it
/// stays comparable and testable inside the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Clean,
    Failed,
}

impl ExitOutcome {
    pub fn code(self) -> std::process::ExitCode {
        match self {
            Self::Clean => std::process::ExitCode::SUCCESS,
            Self::Failed => std::process::ExitCode::FAILURE,
        }
    }
}

/// Run the proxy until shutdown (external cancellation or identity drift),
/// using the concrete HTTP/WebSocket Switch client and the bus driver
/// selected by `config.bus_url`'s scheme.
pub async fn run(config: ProxyConfig) -> anyhow::Result<ExitOutcome> {
    let switch: Arc<dyn switch::SwitchClient> = Arc::new(HttpSwitchClient::connect(
        config.switch_base_url.clone(),
        config.switch_auth_token.clone(),
        config.application.clone(),
    ));
    let bus = bus::connect(&config.bus_url).await?;

    let runtime_config = RuntimeConfig {
        subject_prefix: config.subject_prefix.clone(),
        announce_period: config.announce_period(),
        identity_check_period: config.identity_check_period(),
        shutdown_grace: config.shutdown_grace(),
    };

    let mut supervisor = Supervisor::listen_on(switch, bus, runtime_config);
    supervisor.ready().await;
    tracing::info!("ariproxy ready");

    let cancel = supervisor.cancellation();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
        _ = cancel.cancelled() => {
            // identity checker (or another internal source) already requested shutdown
        }
    }

    Ok(supervisor.shutdown().await)
}
