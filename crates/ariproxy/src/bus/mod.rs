// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus Abstraction: a driver-agnostic connect/publish/subscribe/request-reply
//! surface. Two concrete drivers exist (`nats`, `memory`); callers pick one
//! via [`connect`], which dispatches on the connection URL's scheme.

pub mod memory;
pub mod nats;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::model::{Announcement, Request, Response, SwitchEvent};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler for a ping subscription: fired on every delivery, no payload.
pub type PingHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Handler for a request-style subscription: `(subject, reply_subject, request)`.
pub type RequestHandler = Arc<dyn Fn(String, String, Request) -> BoxFuture<'static, ()> + Send + Sync>;

/// A subscription handle returned by every `subscribe_*` call. Owns the
/// cancellation needed to stop delivery and join the driver's background task.
pub struct Subscription {
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Subscription {
    pub fn new(cancel: CancellationToken, task: tokio::task::JoinHandle<()>) -> Self {
        Self { cancel, task: Some(task) }
    }

    /// Cancel delivery and wait for the driver task to observe it and return.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Capability set the core consumes from a concrete bus driver.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn connect(&self) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;

    async fn subscribe_ping(&self, subject: &str, handler: PingHandler)
        -> anyhow::Result<Subscription>;

    /// Plain fan-in subscription across `subjects`, no queue group: every
    /// matching subscriber in the fleet receives each message.
    async fn subscribe_requests(
        &self,
        subjects: &[String],
        handler: RequestHandler,
    ) -> anyhow::Result<Subscription>;

    /// Queue-group subscription: among subscribers sharing `group`, at most
    /// one receives each message.
    async fn subscribe_create_request(
        &self,
        subject: &str,
        group: &str,
        handler: RequestHandler,
    ) -> anyhow::Result<Subscription>;

    async fn publish_response(&self, subject: &str, response: &Response) -> anyhow::Result<()>;
    async fn publish_announce(&self, subject: &str, announcement: &Announcement) -> anyhow::Result<()>;
    async fn publish_event(&self, subject: &str, event: &SwitchEvent) -> anyhow::Result<()>;
}

/// Connect to a bus driver chosen by `url`'s scheme: `nats://...` or `mem://name`.
pub async fn connect(url: &str) -> anyhow::Result<Arc<dyn Bus>> {
    if let Some(name) = url.strip_prefix("mem://") {
        return Ok(Arc::new(memory::MemoryBus::connect(name).await?));
    }
    if url.starts_with("nats://") || url.starts_with("tls://") {
        return Ok(Arc::new(nats::NatsBus::connect(url).await?));
    }
    anyhow::bail!("unsupported bus URL scheme: {url}")
}

/// Glob-style subject matching shared by drivers that need it: `*` matches
/// exactly one dot-delimited token, `>` matches the remainder of the subject.
pub(crate) fn subject_matches(pattern: &str, subject: &str) -> bool {
    let pat: Vec<&str> = pattern.split('.').collect();
    let sub: Vec<&str> = subject.split('.').collect();
    let mut pi = 0;
    let mut si = 0;
    while pi < pat.len() {
        match pat[pi] {
            ">" => return true,
            "*" => {
                if si >= sub.len() {
                    return false;
                }
                pi += 1;
                si += 1;
            }
            seg => {
                if si >= sub.len() || sub[si] != seg {
                    return false;
                }
                pi += 1;
                si += 1;
            }
        }
    }
    si == sub.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_token_wildcard_matches_one_segment() {
        assert!(subject_matches("ari.get.*.ast1", "ari.get.voiceapp.ast1"));
        assert!(!subject_matches("ari.get.*.ast1", "ari.get.a.b.ast1"));
    }

    #[test]
    fn trailing_wildcard_matches_remainder() {
        assert!(subject_matches("ari.session.>", "ari.session.sess-1.announce"));
        assert!(!subject_matches("ari.session.>", "ari.other.sess-1"));
    }

    proptest::proptest! {
        /// A wildcarded subscribe pattern must always accept a literal subject
        /// built from the same app/node it was derived from, for any
        /// dot-free token pair the broker might see at runtime. This is the
        /// property `broker::start`'s fan-in subscriptions depend on.
        #[test]
        fn wildcard_pattern_always_matches_its_own_exact_subject(
            app in "[a-zA-Z0-9_-]{1,12}",
            node in "[a-zA-Z0-9_-]{1,12}",
        ) {
            let exact = crate::subject::Subject::new("ari.", crate::subject::Class::Get)
                .with_app(&app)
                .with_node(&node);
            let wildcard_app = crate::subject::Subject::new("ari.", crate::subject::Class::Get)
                .with_node(&node);
            let wildcard_node = crate::subject::Subject::new("ari.", crate::subject::Class::Get)
                .with_app(&app);
            let wildcard_both = crate::subject::Subject::new("ari.", crate::subject::Class::Get);

            let exact_subject = exact.build();
            for pattern in [&wildcard_app, &wildcard_node, &wildcard_both] {
                prop_assert!(subject_matches(&pattern.build_for_subscribe("*"), &exact_subject));
            }
        }
    }
}
