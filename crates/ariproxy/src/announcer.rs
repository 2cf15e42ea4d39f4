// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Announcer: periodic presence broadcast and ping-reply.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bus::Bus;
use crate::model::Announcement;
use crate::subject::{Class, Subject};
use crate::switch::SwitchClient;

/// Spawn the announcer task. Publishes on every tick and immediately on
/// every ping delivery, as long as the Switch connection is live.
pub fn spawn(
    bus: Arc<dyn Bus>,
    switch: Arc<dyn SwitchClient>,
    prefix: String,
    application: String,
    node: String,
    period: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let subject = Subject::bare(&prefix, Class::Announce, &[]);
        let announcement = Announcement { node: node.clone(), application: application.clone() };

        let ping_subject = Subject::bare(&prefix, Class::Ping, &[]);
        let ping_bus = Arc::clone(&bus);
        let ping_switch = Arc::clone(&switch);
        let ping_announcement = announcement.clone();
        let ping_subject_out = subject.clone();
        let ping_sub = ping_bus
            .subscribe_ping(
                &ping_subject,
                Arc::new(move || {
                    let bus = Arc::clone(&ping_bus);
                    let switch = Arc::clone(&ping_switch);
                    let announcement = ping_announcement.clone();
                    let subject = ping_subject_out.clone();
                    Box::pin(async move {
                        if switch.connected() {
                            if let Err(e) = bus.publish_announce(&subject, &announcement).await {
                                warn!(err = %e, "failed to publish ping-triggered announcement");
                            }
                        }
                    })
                }),
            )
            .await;
        let ping_sub = match ping_sub {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(err = %e, "failed to subscribe to ping subject");
                None
            }
        };

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = bus.publish_announce(&subject, &announcement).await {
                        warn!(err = %e, "failed to publish periodic announcement");
                    }
                }
            }
        }

        if let Some(sub) = ping_sub {
            sub.unsubscribe().await;
        }
    })
}
