// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kinds carried in a [`Response::Error`](crate::model::Response::Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Malformed payload for the request's kind.
    BadRequest,
    /// Unknown `Request.kind`.
    NotImplemented,
    /// Switch connection is not currently live.
    Transport,
    /// The entity does not exist on this Switch.
    NotFound,
    /// The Switch call itself returned failure.
    SwitchError,
    /// Anything else unexpected.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::NotImplemented => "not-implemented",
            Self::Transport => "transport",
            Self::NotFound => "not-found",
            Self::SwitchError => "switch-error",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body attached to a [`Response::Error`](crate::model::Response::Error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorBody {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}
