// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Switch client capability: the surface the operation table and lifecycle
//! depend on, decoupled from any one Switch wire protocol.

pub mod http;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::model::SwitchEvent;

/// Identity/liveness snapshot returned by [`SwitchClient::info`].
#[derive(Debug, Clone)]
pub struct SwitchInfo {
    pub entity_id: String,
}

/// Failure disposition of a single Switch call.
#[derive(Debug, Clone)]
pub enum SwitchCallError {
    /// The referenced entity does not exist on this Switch.
    NotFound(String),
    /// The call reached the Switch but it reported failure.
    Failed(String),
}

impl std::fmt::Display for SwitchCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(m) => write!(f, "not found: {m}"),
            Self::Failed(m) => write!(f, "switch call failed: {m}"),
        }
    }
}

/// Capability the core consumes from a Switch connection. `call` is the
/// generic dispatch surface for the operation table's many kinds; payload
/// schemas are opaque to this crate, so the concrete implementation owns
/// translating `kind`/`payload` into its wire protocol.
#[async_trait]
pub trait SwitchClient: Send + Sync {
    async fn info(&self) -> anyhow::Result<SwitchInfo>;
    fn application_name(&self) -> &str;
    fn connected(&self) -> bool;
    async fn close(&self) -> anyhow::Result<()>;

    /// Subscribe to the "all events" stream. Each call yields an independent
    /// receiver backed by the same underlying broadcast.
    fn subscribe_events(&self) -> broadcast::Receiver<SwitchEvent>;

    /// Perform the Switch call corresponding to `kind` with `payload` and
    /// return its result value (or an empty `Value::Null` for no-reply
    /// commands).
    async fn call(&self, kind: &str, payload: &serde_json::Value) -> Result<serde_json::Value, SwitchCallError>;
}
