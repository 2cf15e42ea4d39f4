// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request Broker: owns the nine `{get,data,command}` subscriptions and the
//! three `create`-class queue-group subscriptions, and dispatches each
//! delivered request onto an independent task.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

use crate::bus::{Bus, RequestHandler, Subscription};
use crate::error::ErrorKind;
use crate::model::{Request, Response};
use crate::operations;
use crate::registry::DialogRegistry;
use crate::subject::{subscribe_variants, Class};
use crate::switch::SwitchClient;

const CREATE_QUEUE_GROUP: &str = "ariproxy";

/// The `{get,data,command}` subscriptions deliberately subscribe to three
/// overlapping wildcard granularities (all-apps, this-app, this-app+this-node)
/// so a client can address at whatever precision it knows. On a single
/// proxy those three subscriptions can all match the *same* published
/// request, which would otherwise dispatch and reply to it more than once.
/// `Dedup` claims each request's reply subject once so only the first
/// delivery is handled; the rest are dropped as redundant.
struct Dedup {
    seen: Mutex<HashSet<String>>,
}

impl Dedup {
    fn new() -> Arc<Self> {
        Arc::new(Self { seen: Mutex::new(HashSet::new()) })
    }

    fn claim(&self, key: &str) -> bool {
        self.seen.lock().map(|mut seen| seen.insert(key.to_owned())).unwrap_or(true)
    }

    fn schedule_release(self: &Arc<Self>, key: String, delay: Duration) {
        let dedup = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Ok(mut seen) = dedup.seen.lock() {
                seen.remove(&key);
            }
        });
    }
}

/// Establish all broker subscriptions. Returns the handles the supervisor
/// must cancel at shutdown, in the order they were created.
pub async fn start(
    bus: Arc<dyn Bus>,
    switch: Arc<dyn SwitchClient>,
    registry: Arc<DialogRegistry>,
    prefix: &str,
    application: &str,
    node: &str,
) -> anyhow::Result<Vec<Subscription>> {
    let mut subs = Vec::with_capacity(12);

    for class in [Class::Get, Class::Data, Class::Command] {
        let variants = subscribe_variants(prefix, class, application, node);
        let subjects: Vec<String> = variants.iter().map(|s| s.build_for_subscribe("*")).collect();
        let dedup = Dedup::new();
        let handler =
            handler_for(Arc::clone(&bus), Arc::clone(&switch), Arc::clone(&registry), dedup);
        subs.push(bus.subscribe_requests(&subjects, handler).await?);
    }

    let create_variants = subscribe_variants(prefix, Class::Create, application, node);
    for variant in &create_variants {
        let subject = variant.build_for_subscribe("*");
        let dedup = Dedup::new();
        let handler =
            handler_for(Arc::clone(&bus), Arc::clone(&switch), Arc::clone(&registry), dedup);
        subs.push(bus.subscribe_create_request(&subject, CREATE_QUEUE_GROUP, handler).await?);
    }

    Ok(subs)
}

fn handler_for(
    bus: Arc<dyn Bus>,
    switch: Arc<dyn SwitchClient>,
    registry: Arc<DialogRegistry>,
    dedup: Arc<Dedup>,
) -> RequestHandler {
    Arc::new(move |_subject, reply_subject, request| {
        let bus = Arc::clone(&bus);
        let switch = Arc::clone(&switch);
        let registry = Arc::clone(&registry);
        let dedup = Arc::clone(&dedup);
        Box::pin(async move {
            if !dedup.claim(&reply_subject) {
                return;
            }
            handle_one(bus, switch, registry, reply_subject.clone(), request).await;
            dedup.schedule_release(reply_subject, Duration::from_secs(5));
        })
    })
}

async fn handle_one(
    bus: Arc<dyn Bus>,
    switch: Arc<dyn SwitchClient>,
    registry: Arc<DialogRegistry>,
    reply_subject: String,
    request: Request,
) {
    if !switch.connected() {
        let response = Response::error(ErrorKind::Transport, "ARI connection is down");
        if let Err(e) = bus.publish_response(&reply_subject, &response).await {
            warn!(err = %e, reply_subject, "failed to publish transport-down response");
        }
        return;
    }

    let response = operations::dispatch(switch.as_ref(), registry.as_ref(), &request).await;
    if let Err(e) = bus.publish_response(&reply_subject, &response).await {
        warn!(err = %e, reply_subject, kind = %request.kind, "failed to publish response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryBus;
    use crate::model::RequestMetadata;
    use crate::switch::SwitchInfo;
    use tokio::sync::broadcast;

    struct StubSwitch {
        connected: std::sync::atomic::AtomicBool,
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
            self.connected.load(std::sync::atomic::Ordering::Relaxed)
        }
        async fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
        fn subscribe_events(&self) -> broadcast::Receiver<crate::model::SwitchEvent> {
            let (_tx, rx) = broadcast::channel(1);
            rx
        }
        async fn call(
            &self,
            _kind: &str,
            _payload: &serde_json::Value,
        ) -> Result<serde_json::Value, crate::switch::SwitchCallError> {
            Ok(serde_json::json!({ "id": "c-17" }))
        }
    }

    #[tokio::test]
    async fn disconnected_switch_replies_transport_error_without_dispatch() {
        let bus = Arc::new(MemoryBus::connect("broker-disconnected").await.expect("connect bus"));
        let switch: Arc<dyn SwitchClient> =
            Arc::new(StubSwitch { connected: std::sync::atomic::AtomicBool::new(false) });
        let registry = Arc::new(DialogRegistry::new());
        let _subs = start(bus.clone(), switch, registry, "ari.", "voiceapp", "ast1")
            .await
            .expect("start broker");

        let mut reply_rx = bus.subscribe_raw("reply.1").await;
        let request = Request {
            kind: "ChannelGet".to_owned(),
            metadata: RequestMetadata::default(),
            payload: serde_json::json!({ "id": "c-17" }),
        };
        bus.publish_request("ari.get.voiceapp.ast1", "reply.1", &request).await;

        let bytes = tokio::time::timeout(std::time::Duration::from_millis(200), reply_rx.recv())
            .await
            .expect("reply timed out")
            .expect("reply channel closed");
        let response: Response = serde_json::from_slice(&bytes).expect("deserialize response");
        match response {
            Response::Error(e) => assert_eq!(e.kind, ErrorKind::Transport),
            _ => panic!("expected a transport error response"),
        }
    }

    #[tokio::test]
    async fn connected_switch_dispatches_and_replies() {
        let bus = Arc::new(MemoryBus::connect("broker-connected").await.expect("connect bus"));
        let switch: Arc<dyn SwitchClient> =
            Arc::new(StubSwitch { connected: std::sync::atomic::AtomicBool::new(true) });
        let registry = Arc::new(DialogRegistry::new());
        let _subs = start(bus.clone(), switch, registry, "ari.", "voiceapp", "ast1")
            .await
            .expect("start broker");

        let mut reply_rx = bus.subscribe_raw("reply.1").await;
        let request = Request {
            kind: "ChannelGet".to_owned(),
            metadata: RequestMetadata::default(),
            payload: serde_json::json!({ "id": "c-17" }),
        };
        bus.publish_request("ari.get.voiceapp.ast1", "reply.1", &request).await;

        let bytes = tokio::time::timeout(std::time::Duration::from_millis(200), reply_rx.recv())
            .await
            .expect("reply timed out")
            .expect("reply channel closed");
        let response: Response = serde_json::from_slice(&bytes).expect("deserialize response");
        match response {
            Response::Value(v) => assert_eq!(v["id"], "c-17"),
            _ => panic!("expected a value response"),
        }
    }

    #[tokio::test]
    async fn fully_addressed_request_replies_exactly_once() {
        // "ari.get.voiceapp.ast1" matches all three of this proxy's own
        // get-class subscriptions (all-apps, this-app, this-app+this-node),
        // so without deduplication it would dispatch and reply three times.
        let bus = Arc::new(MemoryBus::connect("broker-dedup").await.expect("connect bus"));
        let switch: Arc<dyn SwitchClient> =
            Arc::new(StubSwitch { connected: std::sync::atomic::AtomicBool::new(true) });
        let registry = Arc::new(DialogRegistry::new());
        let _subs = start(bus.clone(), switch, registry, "ari.", "voiceapp", "ast1")
            .await
            .expect("start broker");

        let mut reply_rx = bus.subscribe_raw("reply.1").await;
        let request = Request {
            kind: "ChannelGet".to_owned(),
            metadata: RequestMetadata::default(),
            payload: serde_json::json!({ "id": "c-17" }),
        };
        bus.publish_request("ari.get.voiceapp.ast1", "reply.1", &request).await;

        let first = tokio::time::timeout(std::time::Duration::from_millis(200), reply_rx.recv())
            .await
            .expect("reply timed out")
            .expect("reply channel closed");
        let response: Response = serde_json::from_slice(&first).expect("deserialize response");
        assert!(matches!(response, Response::Value(_)));

        let second = tokio::time::timeout(std::time::Duration::from_millis(100), reply_rx.recv()).await;
        assert!(second.is_err(), "expected exactly one reply, got a second");
    }
}
