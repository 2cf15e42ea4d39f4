// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process bus driver. Backs single-process demos and the test suite;
//! multiple [`MemoryBus`] handles that connect with the same `name` share one
//! [`Hub`], so tests can exercise multi-proxy scenarios (e.g. queue-group
//! fan-out across two "proxies") without a real broker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::{subject_matches, Bus, PingHandler, RequestHandler, Subscription};
use crate::model::{Announcement, Request, Response, SwitchEvent};

type PingEntry = (u64, String, PingHandler);
type RequestEntry = (u64, String, RequestHandler);
type CreateEntry = (u64, String, String, RequestHandler);
type RawEntry = (u64, String, mpsc::UnboundedSender<Vec<u8>>);

#[derive(Default)]
struct Hub {
    ping_subs: Mutex<Vec<PingEntry>>,
    request_subs: Mutex<Vec<RequestEntry>>,
    create_subs: Mutex<Vec<CreateEntry>>,
    raw_subs: Mutex<Vec<RawEntry>>,
    create_round_robin: Mutex<HashMap<String, usize>>,
    next_id: AtomicU64,
}

fn registry() -> &'static Mutex<HashMap<String, Arc<Hub>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<Hub>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

pub struct MemoryBus {
    hub: Arc<Hub>,
}

impl MemoryBus {
    /// Connect to the named in-process hub, creating it if this is the first connection.
    pub async fn connect(name: &str) -> anyhow::Result<Self> {
        let mut reg = registry().lock().await;
        let hub = reg.entry(name.to_owned()).or_insert_with(|| Arc::new(Hub::default())).clone();
        Ok(Self { hub })
    }

    /// Simulate a bus-side client publishing a request on `subject`, expecting
    /// a reply on `reply_subject`. Delivers to every matching plain
    /// subscriber and to exactly one matching queue-group subscriber per group.
    pub async fn publish_request(&self, subject: &str, reply_subject: &str, request: &Request) {
        for (_, pattern, handler) in self.hub.request_subs.lock().await.iter() {
            if subject_matches(pattern, subject) {
                tokio::spawn(handler(subject.to_owned(), reply_subject.to_owned(), request.clone()));
            }
        }

        let create_subs = self.hub.create_subs.lock().await;
        let mut by_group: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, (_, pattern, group, _)) in create_subs.iter().enumerate() {
            if subject_matches(pattern, subject) {
                by_group.entry(group.as_str()).or_default().push(idx);
            }
        }
        if by_group.is_empty() {
            return;
        }
        let mut rr = self.hub.create_round_robin.lock().await;
        for (group, idxs) in by_group {
            let counter = rr.entry(group.to_owned()).or_insert(0);
            let pick = idxs[*counter % idxs.len()];
            *counter += 1;
            let (_, _, _, handler) = &create_subs[pick];
            tokio::spawn(handler(subject.to_owned(), reply_subject.to_owned(), request.clone()));
        }
    }

    /// Publish a raw ping on `subject`.
    pub async fn publish_ping(&self, subject: &str) {
        for (_, pattern, handler) in self.hub.ping_subs.lock().await.iter() {
            if subject_matches(pattern, subject) {
                tokio::spawn(handler());
            }
        }
    }

    /// Test/observer hook: subscribe to raw bytes published on subjects
    /// matching `pattern` (announcements, events, responses). Not part of the
    /// `Bus` trait — this is the in-process stand-in for a bus client SDK.
    pub async fn subscribe_raw(&self, pattern: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);
        self.hub.raw_subs.lock().await.push((id, pattern.to_owned(), tx));
        rx
    }

    async fn publish_raw(&self, subject: &str, bytes: Vec<u8>) {
        for (_, pattern, tx) in self.hub.raw_subs.lock().await.iter() {
            if subject_matches(pattern, subject) {
                let _ = tx.send(bytes.clone());
            }
        }
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn subscribe_ping(
        &self,
        subject: &str,
        handler: PingHandler,
    ) -> anyhow::Result<Subscription> {
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);
        self.hub.ping_subs.lock().await.push((id, subject.to_owned(), handler));
        Ok(self.cancellable_removal(id, Removal::Ping))
    }

    async fn subscribe_requests(
        &self,
        subjects: &[String],
        handler: RequestHandler,
    ) -> anyhow::Result<Subscription> {
        let ids: Vec<u64> = {
            let mut subs = self.hub.request_subs.lock().await;
            subjects
                .iter()
                .map(|subject| {
                    let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);
                    subs.push((id, subject.clone(), handler.clone()));
                    id
                })
                .collect()
        };
        Ok(self.cancellable_removal_many(ids, Removal::Request))
    }

    async fn subscribe_create_request(
        &self,
        subject: &str,
        group: &str,
        handler: RequestHandler,
    ) -> anyhow::Result<Subscription> {
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);
        self.hub.create_subs.lock().await.push((id, subject.to_owned(), group.to_owned(), handler));
        Ok(self.cancellable_removal(id, Removal::Create))
    }

    async fn publish_response(&self, subject: &str, response: &Response) -> anyhow::Result<()> {
        self.publish_raw(subject, serde_json::to_vec(response)?).await;
        Ok(())
    }

    async fn publish_announce(&self, subject: &str, announcement: &Announcement) -> anyhow::Result<()> {
        self.publish_raw(subject, serde_json::to_vec(announcement)?).await;
        Ok(())
    }

    async fn publish_event(&self, subject: &str, event: &SwitchEvent) -> anyhow::Result<()> {
        self.publish_raw(subject, serde_json::to_vec(event)?).await;
        Ok(())
    }
}

enum Removal {
    Ping,
    Request,
    Create,
}

impl MemoryBus {
    fn cancellable_removal(&self, id: u64, kind: Removal) -> Subscription {
        self.cancellable_removal_many(vec![id], kind)
    }

    fn cancellable_removal_many(&self, ids: Vec<u64>, kind: Removal) -> Subscription {
        let hub = Arc::clone(&self.hub);
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let task = tokio::spawn(async move {
            child.cancelled().await;
            match kind {
                Removal::Ping => hub.ping_subs.lock().await.retain(|(i, _, _)| !ids.contains(i)),
                Removal::Request => hub.request_subs.lock().await.retain(|(i, _, _)| !ids.contains(i)),
                Removal::Create => hub.create_subs.lock().await.retain(|(i, _, _, _)| !ids.contains(i)),
            }
        });
        Subscription::new(cancel, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn queue_group_delivers_to_exactly_one_subscriber() {
        let bus_a = MemoryBus::connect("queue-group-test").await.expect("connect bus");
        let bus_b = MemoryBus::connect("queue-group-test").await.expect("connect bus");

        let hits = Arc::new(AtomicUsize::new(0));
        let h1 = hits.clone();
        let h2 = hits.clone();

        let _sub_a = bus_a
            .subscribe_create_request(
                "ari.create.voiceapp.",
                "ariproxy",
                Arc::new(move |_s, _r, _req| {
                    let h1 = h1.clone();
                    Box::pin(async move {
                        h1.fetch_add(1, Ordering::Relaxed);
                    })
                }),
            )
            .await
            .expect("subscribe create request");
        let _sub_b = bus_b
            .subscribe_create_request(
                "ari.create.voiceapp.",
                "ariproxy",
                Arc::new(move |_s, _r, _req| {
                    let h2 = h2.clone();
                    Box::pin(async move {
                        h2.fetch_add(1, Ordering::Relaxed);
                    })
                }),
            )
            .await
            .expect("subscribe create request");

        let request = Request {
            kind: "BridgeCreate".to_owned(),
            metadata: Default::default(),
            payload: serde_json::Value::Null,
        };
        bus_a.publish_request("ari.create.voiceapp.ast1", "reply.1", &request).await;
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(hits.load(Ordering::Relaxed), 1, "exactly one queue-group member should fire");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = MemoryBus::connect("unsub-test").await.expect("connect bus");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = bus
            .subscribe_ping(
                "ari.ping",
                Arc::new(move || {
                    let h = h.clone();
                    Box::pin(async move {
                        h.fetch_add(1, Ordering::Relaxed);
                    })
                }),
            )
            .await
            .expect("subscribe ping");

        bus.publish_ping("ari.ping").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        sub.unsubscribe().await;
        bus.publish_ping("ari.ping").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
