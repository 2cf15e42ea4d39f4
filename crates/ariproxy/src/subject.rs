// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hierarchical bus subject codec.
//!
//! Most classes (`get`, `data`, `command`, `create`, `event`) have the shape
//! `<prefix><class>.<app>.<node>[.<extra>]`. An empty `app` or `node` position
//! encodes a wildcard match; the codec itself never emits a literal wildcard
//! token (`*`, `>`) — that substitution is the caller's job via
//! [`Subject::build_for_subscribe`], since bus drivers differ in wildcard
//! syntax. A handful of classes (`announce`, `ping`, `dialogevent`) don't
//! have that app/node shape at all — they're built with [`Subject::bare`]
//! instead, which joins `class` with whatever positions are actually given,
//! dropping empty ones rather than padding to a fixed width.

use serde::{Deserialize, Serialize};

/// One of the subject classes in the bus namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Class {
    Get,
    Data,
    Command,
    Create,
    Event,
    DialogEvent,
    Ping,
    Announce,
    Response,
}

impl Class {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Data => "data",
            Self::Command => "command",
            Self::Create => "create",
            Self::Event => "event",
            Self::DialogEvent => "dialogevent",
            Self::Ping => "ping",
            Self::Announce => "announce",
            Self::Response => "response",
        }
    }
}

/// A parsed/built subject tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub prefix: String,
    pub class: Class,
    pub app: String,
    pub node: String,
    pub extra: Option<String>,
}

impl Subject {
    pub fn new(prefix: impl Into<String>, class: Class) -> Self {
        Self { prefix: prefix.into(), class, app: String::new(), node: String::new(), extra: None }
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = app.into();
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Build the literal subject string. Empty `app`/`node` serialize as `""`.
    pub fn build(&self) -> String {
        let mut s = format!("{}{}.{}.{}", self.prefix, self.class.as_str(), self.app, self.node);
        if let Some(ref extra) = self.extra {
            s.push('.');
            s.push_str(extra);
        }
        s
    }

    /// Build the subject for subscribing with a driver-specific wildcard
    /// token substituted at empty positions (e.g. `"*"` for NATS).
    pub fn build_for_subscribe(&self, wildcard: &str) -> String {
        let app = if self.app.is_empty() { wildcard } else { &self.app };
        let node = if self.node.is_empty() { wildcard } else { &self.node };
        let mut s = format!("{}{}.{}.{}", self.prefix, self.class.as_str(), app, node);
        if let Some(ref extra) = self.extra {
            s.push('.');
            s.push_str(extra);
        }
        s
    }

    /// Build a subject for a class with no fixed app/node shape: `class`
    /// joined with `parts`, dropping any empty ones, so `bare(prefix,
    /// Announce, &[])` is `<prefix>announce` (no trailing dots) and
    /// `bare(prefix, DialogEvent, &[dialog])` is `<prefix>dialogevent.<dialog>`.
    pub fn bare(prefix: &str, class: Class, parts: &[&str]) -> String {
        let mut segments = vec![class.as_str()];
        segments.extend(parts.iter().copied().filter(|p| !p.is_empty()));
        format!("{prefix}{}", segments.join("."))
    }

    /// Parse a literal subject (as built by [`Self::build`]) back into its tuple.
    pub fn parse(prefix: &str, class: Class, subject: &str) -> Option<Self> {
        let rest = subject.strip_prefix(prefix)?;
        let rest = rest.strip_prefix(class.as_str())?;
        let rest = rest.strip_prefix('.')?;
        let mut parts = rest.splitn(3, '.');
        let app = parts.next()?.to_owned();
        let node = parts.next()?.to_owned();
        let extra = parts.next().map(str::to_owned);
        Some(Self { prefix: prefix.to_owned(), class, app, node, extra })
    }

    /// Whether an exact-match subscriber should accept a message delivered on
    /// `delivered`, given this subject's own (possibly wildcarded) positions.
    /// Used for the software fallback check when a bus driver's wildcard
    /// granularity is broader than the three canonical variants.
    pub fn matches(&self, delivered: &Subject) -> bool {
        self.class as u8 == delivered.class as u8
            && (self.app.is_empty() || self.app == delivered.app)
            && (self.node.is_empty() || self.node == delivered.node)
    }
}

/// The three wildcard variants the broker subscribes per `{get,data,command,create}` class.
pub fn subscribe_variants(prefix: &str, class: Class, app: &str, node: &str) -> [Subject; 3] {
    [
        Subject::new(prefix, class),
        Subject::new(prefix, class).with_app(app),
        Subject::new(prefix, class).with_app(app).with_node(node),
    ]
}
