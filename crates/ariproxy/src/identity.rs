// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity Checker: periodically re-fetches the Switch's entity id and
//! exits the process if it drifts from the id captured at startup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::switch::SwitchClient;
use crate::ExitOutcome;

/// Set when identity drift has been detected; the supervisor polls this to
/// decide the process exit code after shutdown completes.
#[derive(Default, Clone)]
pub struct DriftFlag(Arc<AtomicBool>);

impl DriftFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn detected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn outcome(&self) -> ExitOutcome {
        if self.detected() {
            ExitOutcome::Failed
        } else {
            ExitOutcome::Clean
        }
    }
}

/// Spawn the identity checker task.
pub fn spawn(
    switch: Arc<dyn SwitchClient>,
    expected_node: String,
    period: Duration,
    cancel: CancellationToken,
) -> (tokio::task::JoinHandle<()>, DriftFlag) {
    let drift = DriftFlag::new();
    let task_drift = drift.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately; skip to honor the configured period

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match switch.info().await {
                Ok(info) if info.entity_id == expected_node => {}
                Ok(info) => {
                    error!(
                        expected = %expected_node,
                        observed = %info.entity_id,
                        "switch entity id drifted from the id captured at startup"
                    );
                    task_drift.0.store(true, Ordering::SeqCst);
                    cancel.cancel();
                    break;
                }
                Err(e) => {
                    warn!(err = %e, "transient identity check failure, ignoring");
                }
            }
        }
    });
    (handle, drift)
}
