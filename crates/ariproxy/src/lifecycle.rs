// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle / Supervisor: `New -> Connecting -> Ready -> ShuttingDown ->
//! Terminated`, owning every subscription and background task spawned at
//! start and responsible for cancelling them, in reverse order, within the
//! shutdown grace period.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bus::{Bus, Subscription};
use crate::registry::DialogRegistry;
use crate::switch::SwitchClient;
use crate::{announcer, broker, event_pump, identity, ExitOutcome};

/// Tunables the supervisor needs; everything else (subject prefix aside) is
/// resolved from the switch at `Connecting` time.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub subject_prefix: String,
    pub announce_period: Duration,
    pub identity_check_period: Duration,
    pub shutdown_grace: Duration,
}

/// A running proxy instance. Dropping this does not stop the proxy — call
/// [`Supervisor::shutdown`] or cancel the token returned by
/// [`Supervisor::cancellation`] to trigger `Ready -> ShuttingDown`.
pub struct Supervisor {
    cancel: CancellationToken,
    ready_rx: watch::Receiver<bool>,
    task: JoinHandle<ExitOutcome>,
}

impl Supervisor {
    /// Start connecting to `switch` and `bus` and establishing every
    /// subscription. Returns immediately; use [`Self::ready`] to wait for
    /// `Ready`.
    pub fn listen_on(switch: Arc<dyn SwitchClient>, bus: Arc<dyn Bus>, config: RuntimeConfig) -> Self {
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = watch::channel(false);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(run(switch, bus, config, task_cancel, ready_tx));
        Self { cancel, ready_rx, task }
    }

    /// A token that, when cancelled, moves this supervisor from `Ready` to
    /// `ShuttingDown`.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for `Ready`. Idempotent: resolves immediately if already ready.
    pub async fn ready(&mut self) {
        if *self.ready_rx.borrow() {
            return;
        }
        let _ = self.ready_rx.changed().await;
    }

    /// Trigger shutdown and wait for `Terminated`, returning the process
    /// exit outcome (failed on identity drift or shutdown-grace violation).
    pub async fn shutdown(self) -> ExitOutcome {
        self.cancel.cancel();
        self.task.await.unwrap_or(ExitOutcome::Failed)
    }

    /// Wait for the supervisor to terminate on its own (e.g. identity
    /// drift), without requesting shutdown.
    pub async fn join(self) -> ExitOutcome {
        self.task.await.unwrap_or(ExitOutcome::Failed)
    }
}

async fn run(
    switch: Arc<dyn SwitchClient>,
    bus: Arc<dyn Bus>,
    config: RuntimeConfig,
    cancel: CancellationToken,
    ready_tx: watch::Sender<bool>,
) -> ExitOutcome {
    // Connecting
    let connect_result = connect(&switch, &bus).await;
    let (node, application) = match connect_result {
        Ok(pair) => pair,
        Err(e) => {
            error!(err = ?e, "fatal error while connecting, aborting startup");
            return ExitOutcome::Failed;
        }
    };
    info!(node = %node, application = %application, "connected to switch and bus");

    let registry = Arc::new(DialogRegistry::new());

    let broker_subs = match broker::start(
        Arc::clone(&bus),
        Arc::clone(&switch),
        Arc::clone(&registry),
        &config.subject_prefix,
        &application,
        &node,
    )
    .await
    {
        Ok(subs) => subs,
        Err(e) => {
            error!(err = %e, "fatal error while establishing request broker subscriptions");
            return ExitOutcome::Failed;
        }
    };

    let announcer_handle = announcer::spawn(
        Arc::clone(&bus),
        Arc::clone(&switch),
        config.subject_prefix.clone(),
        application.clone(),
        node.clone(),
        config.announce_period,
        cancel.clone(),
    );
    let pump_handle = event_pump::spawn(
        Arc::clone(&bus),
        Arc::clone(&switch),
        Arc::clone(&registry),
        config.subject_prefix.clone(),
        application.clone(),
        node.clone(),
        cancel.clone(),
    );
    let (identity_handle, drift) =
        identity::spawn(Arc::clone(&switch), node.clone(), config.identity_check_period, cancel.clone());

    // Connecting -> Ready
    let _ = ready_tx.send(true);

    // Ready -> ShuttingDown: triggered either by an external caller
    // cancelling `cancel`, or by the identity checker cancelling it itself
    // on drift.
    cancel.cancelled().await;
    info!("shutting down");

    // ShuttingDown -> Terminated: cancel every subscription in reverse order
    // and join every background task, bounded by the grace period.
    let shutdown = async {
        for sub in broker_subs.into_iter().rev() {
            sub.unsubscribe().await;
        }
        let _ = tokio::join!(announcer_handle, pump_handle, identity_handle);
        let _ = switch.close().await;
        let _ = bus.close().await;
    };

    if tokio::time::timeout(config.shutdown_grace, shutdown).await.is_err() {
        error!(
            grace_ms = config.shutdown_grace.as_millis() as u64,
            "subscriptions did not close within the shutdown grace period; aborting"
        );
        return ExitOutcome::Failed;
    }

    info!("terminated");
    drift.outcome()
}

async fn connect(switch: &Arc<dyn SwitchClient>, bus: &Arc<dyn Bus>) -> anyhow::Result<(String, String)> {
    let info = switch.info().await.context("fetch switch info")?;
    if info.entity_id.is_empty() {
        anyhow::bail!("switch reported an empty entity id");
    }
    let application = switch.application_name().to_owned();
    bus.connect().await.context("connect to bus")?;
    Ok((info.entity_id, application))
}
