// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format data model shared by the bus and Switch sides of the proxy.

use serde::{Deserialize, Serialize};

use crate::error::ErrorBody;

/// Identity of one entity kind an event can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Channel,
    Bridge,
    Recording,
    Playback,
    DeviceState,
    Mailbox,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Bridge => "bridge",
            Self::Recording => "recording",
            Self::Playback => "playback",
            Self::DeviceState => "deviceState",
            Self::Mailbox => "mailbox",
        }
    }
}

/// An entity reference: a kind paired with its id, as bound in the dialog registry.
pub type EntityRef = (EntityKind, String);

/// Metadata carried on every bus request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog: Option<String>,
}

/// A bus-originated RPC request. `payload` is opaque to the broker; handlers
/// deserialize it into a kind-specific shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub kind: String,
    #[serde(default)]
    pub metadata: RequestMetadata,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// The single response published on a request's reply subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Value(serde_json::Value),
    Error(ErrorBody),
}

impl Response {
    pub fn empty_ack() -> Self {
        Self::Value(serde_json::Value::Null)
    }

    pub fn value(v: impl Serialize) -> Self {
        match serde_json::to_value(v) {
            Ok(v) => Self::Value(v),
            Err(e) => Self::Error(ErrorBody::new(
                crate::error::ErrorKind::Internal,
                format!("failed to encode response: {e}"),
            )),
        }
    }

    pub fn error(kind: crate::error::ErrorKind, message: impl Into<String>) -> Self {
        Self::Error(ErrorBody::new(kind, message))
    }
}

/// Presence announcement published on the `announce` subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub node: String,
    pub application: String,
}

/// A Switch-originated event, opaque beyond the fields the Event Pump and
/// Dialog Registry need to route it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    /// Stamped by the Event Pump when republishing on a per-dialog subject;
    /// absent on the canonical publish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog: Option<String>,
    /// Entities this event references, derived by the Switch client from the
    /// raw event body (channel id, bridge id, playback id, recording name...).
    #[serde(default)]
    pub entities: Vec<EntityRef>,
    /// Remaining event body, passed through verbatim.
    #[serde(flatten)]
    pub body: serde_json::Value,
}

impl SwitchEvent {
    /// Clone this event, stamping `dialog` for a per-dialog republish.
    pub fn for_dialog(&self, dialog: &str) -> Self {
        let mut clone = self.clone();
        clone.dialog = Some(dialog.to_owned());
        clone
    }
}
