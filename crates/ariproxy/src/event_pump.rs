// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event Pump: subscribes to the Switch's "all events" stream and republishes
//! each event on the canonical subject, then on one `dialogevent` subject per
//! bound dialog, preserving Switch-stream order throughout.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bus::Bus;
use crate::registry::DialogRegistry;
use crate::subject::{Class, Subject};
use crate::switch::SwitchClient;

/// Spawn the event pump task.
pub fn spawn(
    bus: Arc<dyn Bus>,
    switch: Arc<dyn SwitchClient>,
    registry: Arc<DialogRegistry>,
    prefix: String,
    application: String,
    node: String,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = switch.subscribe_events();
        let canonical_subject =
            Subject::new(&prefix, Class::Event).with_app(&application).with_node(&node).build();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                recv = events.recv() => recv,
            };

            let event = match event {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event pump lagged behind switch event stream");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            if let Err(e) = bus.publish_event(&canonical_subject, &event).await {
                warn!(err = %e, "failed to publish canonical event");
            }

            let dialogs = registry.dialogs_for_event(&event).await;
            for dialog in dialogs {
                let dialog_event = event.for_dialog(&dialog);
                let dialog_subject = Subject::bare(&prefix, Class::DialogEvent, &[&dialog]);
                if let Err(e) = bus.publish_event(&dialog_subject, &dialog_event).await {
                    warn!(err = %e, dialog, "failed to publish dialog event");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryBus;
    use crate::model::{EntityKind, SwitchEvent};
    use crate::switch::{SwitchCallError, SwitchInfo};
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct StubSwitch {
        tx: broadcast::Sender<SwitchEvent>,
    }

    #[async_trait::async_trait]
    impl SwitchClient for StubSwitch {
        async fn info(&self) -> anyhow::Result<SwitchInfo> {
            Ok(SwitchInfo { entity_id: "ast1".to_owned() })
        }
        fn application_name(&self) -> &str {
            "voiceapp"
        }
        fn connected(&self) -> bool {
            true
        }
        async fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
        fn subscribe_events(&self) -> broadcast::Receiver<SwitchEvent> {
            self.tx.subscribe()
        }
        async fn call(
            &self,
            _kind: &str,
            _payload: &serde_json::Value,
        ) -> Result<serde_json::Value, SwitchCallError> {
            Ok(serde_json::Value::Null)
        }
    }

    #[tokio::test]
    async fn canonical_publish_precedes_dialog_publish() {
        let bus = Arc::new(MemoryBus::connect("event-pump-ordering").await.expect("connect bus"));
        let (tx, _) = broadcast::channel(16);
        let switch: Arc<dyn SwitchClient> = Arc::new(StubSwitch { tx: tx.clone() });
        let registry = Arc::new(DialogRegistry::new());
        registry.bind("d-9", EntityKind::Channel, "c-17").await;

        let mut canonical_rx = bus.subscribe_raw("ari.event.voiceapp.ast1").await;
        let mut dialog_rx = bus.subscribe_raw("ari.dialogevent.d-9").await;
        let cancel = CancellationToken::new();

        let handle = spawn(
            bus.clone(),
            switch,
            registry,
            "ari.".to_owned(),
            "voiceapp".to_owned(),
            "ast1".to_owned(),
            cancel.clone(),
        );

        let event = SwitchEvent {
            event_type: "ChannelHangupRequest".to_owned(),
            dialog: None,
            entities: vec![(EntityKind::Channel, "c-17".to_owned())],
            body: serde_json::Value::Null,
        };
        tx.send(event).expect("broadcast send");

        let canonical = tokio::time::timeout(Duration::from_millis(200), canonical_rx.recv())
            .await
            .expect("canonical publish timed out")
            .expect("canonical publish channel closed");
        let dialog = tokio::time::timeout(Duration::from_millis(200), dialog_rx.recv())
            .await
            .expect("dialog publish timed out")
            .expect("dialog publish channel closed");

        let canonical: SwitchEvent = serde_json::from_slice(&canonical).expect("deserialize event");
        let dialog: SwitchEvent = serde_json::from_slice(&dialog).expect("deserialize event");
        assert!(canonical.dialog.is_none());
        assert_eq!(dialog.dialog.as_deref(), Some("d-9"));

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn unbound_entity_yields_only_canonical_publish() {
        let bus = Arc::new(MemoryBus::connect("event-pump-unbound").await.expect("connect bus"));
        let (tx, _) = broadcast::channel(16);
        let switch: Arc<dyn SwitchClient> = Arc::new(StubSwitch { tx: tx.clone() });
        let registry = Arc::new(DialogRegistry::new());

        let mut canonical_rx = bus.subscribe_raw("ari.event.voiceapp.ast1").await;
        let mut dialog_rx = bus.subscribe_raw("ari.dialogevent.>").await;
        let cancel = CancellationToken::new();

        let handle = spawn(
            bus.clone(),
            switch,
            registry,
            "ari.".to_owned(),
            "voiceapp".to_owned(),
            "ast1".to_owned(),
            cancel.clone(),
        );

        let event = SwitchEvent {
            event_type: "ChannelHangupRequest".to_owned(),
            dialog: None,
            entities: vec![(EntityKind::Channel, "c-17".to_owned())],
            body: serde_json::Value::Null,
        };
        tx.send(event).expect("broadcast send");

        tokio::time::timeout(Duration::from_millis(200), canonical_rx.recv())
            .await
            .expect("canonical publish timed out")
            .expect("canonical publish channel closed");
        let no_dialog = tokio::time::timeout(Duration::from_millis(50), dialog_rx.recv()).await;
        assert!(no_dialog.is_err(), "no dialog publish expected for an unbound entity");

        cancel.cancel();
        let _ = handle.await;
    }
}
