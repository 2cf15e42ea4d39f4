// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use ariproxy::config::ProxyConfig;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let config = ProxyConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match ariproxy::run(config).await {
        Ok(outcome) => outcome.code(),
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
