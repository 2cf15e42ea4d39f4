// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NATS bus driver.

use async_trait::async_trait;
use futures_util::stream::select_all;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Bus, PingHandler, RequestHandler, Subscription};
use crate::model::{Announcement, Request, Response, SwitchEvent};

/// Bus driver backed by a real NATS connection.
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Connect to `url` (e.g. `nats://127.0.0.1:4222`).
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = async_nats::ConnectOptions::new().retry_on_initial_connect().connect(url).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.client.flush().await?;
        Ok(())
    }

    async fn subscribe_ping(
        &self,
        subject: &str,
        handler: PingHandler,
    ) -> anyhow::Result<Subscription> {
        let mut sub = self.client.subscribe(subject.to_owned()).await?;
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    msg = sub.next() => {
                        if msg.is_none() {
                            break;
                        }
                        tokio::spawn(handler());
                    }
                }
            }
        });
        Ok(Subscription::new(cancel, task))
    }

    async fn subscribe_requests(
        &self,
        subjects: &[String],
        handler: RequestHandler,
    ) -> anyhow::Result<Subscription> {
        let mut subs = Vec::with_capacity(subjects.len());
        for subject in subjects {
            subs.push(self.client.subscribe(subject.clone()).await?);
        }
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let task = tokio::spawn(async move {
            let mut merged = select_all(subs);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    msg = merged.next() => {
                        let Some(msg) = msg else { break };
                        let Some(reply) = msg.reply.clone() else { continue };
                        let request: Request = match serde_json::from_slice(&msg.payload) {
                            Ok(r) => r,
                            Err(e) => {
                                debug!(err = %e, "malformed request payload, dropping");
                                continue;
                            }
                        };
                        tokio::spawn(handler(msg.subject.to_string(), reply.to_string(), request));
                    }
                }
            }
        });
        Ok(Subscription::new(cancel, task))
    }

    async fn subscribe_create_request(
        &self,
        subject: &str,
        group: &str,
        handler: RequestHandler,
    ) -> anyhow::Result<Subscription> {
        let mut sub = self.client.queue_subscribe(subject.to_owned(), group.to_owned()).await?;
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    msg = sub.next() => {
                        let Some(msg) = msg else { break };
                        let Some(reply) = msg.reply.clone() else { continue };
                        let request: Request = match serde_json::from_slice(&msg.payload) {
                            Ok(r) => r,
                            Err(e) => {
                                debug!(err = %e, "malformed create request payload, dropping");
                                continue;
                            }
                        };
                        tokio::spawn(handler(msg.subject.to_string(), reply.to_string(), request));
                    }
                }
            }
        });
        Ok(Subscription::new(cancel, task))
    }

    async fn publish_response(&self, subject: &str, response: &Response) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(response)?;
        self.client.publish(subject.to_owned(), bytes.into()).await?;
        Ok(())
    }

    async fn publish_announce(&self, subject: &str, announcement: &Announcement) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(announcement)?;
        self.client.publish(subject.to_owned(), bytes.into()).await?;
        Ok(())
    }

    async fn publish_event(&self, subject: &str, event: &SwitchEvent) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(event)?;
        self.client.publish(subject.to_owned(), bytes.into()).await?;
        Ok(())
    }
}
