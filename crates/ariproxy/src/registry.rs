// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dialog Registry: a bidirectional index between dialogs and the Switch
//! entities bound to them, used to fan Switch events out to per-dialog bus
//! subjects.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::model::{EntityKind, EntityRef, SwitchEvent};

#[derive(Default)]
struct Indices {
    /// dialog -> bound entities
    by_dialog: HashMap<String, HashSet<EntityRef>>,
    /// entity -> bound dialogs
    by_entity: HashMap<EntityRef, HashSet<String>>,
}

/// Process-local, in-memory dialog binding table. Safe under concurrent
/// readers and writers: a single `RwLock` guards both indices so they never
/// observe a torn intermediate state.
pub struct DialogRegistry {
    inner: RwLock<Indices>,
}

impl DialogRegistry {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Indices::default()) }
    }

    /// Bind `dialog` to `(kind, id)`. Idempotent: binding the same pair twice
    /// has the same effect as binding it once.
    pub async fn bind(&self, dialog: &str, kind: EntityKind, id: &str) {
        let entity = (kind, id.to_owned());
        let mut idx = self.inner.write().await;
        idx.by_dialog.entry(dialog.to_owned()).or_default().insert(entity.clone());
        idx.by_entity.entry(entity).or_default().insert(dialog.to_owned());
    }

    /// Unbind `dialog` from `(kind, id)`. A no-op if the pair was never bound.
    pub async fn unbind(&self, dialog: &str, kind: EntityKind, id: &str) {
        let entity = (kind, id.to_owned());
        let mut idx = self.inner.write().await;
        if let Some(set) = idx.by_dialog.get_mut(dialog) {
            set.remove(&entity);
            if set.is_empty() {
                idx.by_dialog.remove(dialog);
            }
        }
        if let Some(set) = idx.by_entity.get_mut(&entity) {
            set.remove(dialog);
            if set.is_empty() {
                idx.by_entity.remove(&entity);
            }
        }
    }

    /// Dialogs currently bound to `(kind, id)`.
    pub async fn dialogs_for_entity(&self, kind: EntityKind, id: &str) -> HashSet<String> {
        let entity = (kind, id.to_owned());
        self.inner.read().await.by_entity.get(&entity).cloned().unwrap_or_default()
    }

    /// Union of dialogs bound to any entity the event references. Empty (not
    /// an error) when nothing is bound.
    pub async fn dialogs_for_event(&self, event: &SwitchEvent) -> HashSet<String> {
        let idx = self.inner.read().await;
        let mut out = HashSet::new();
        for entity in &event.entities {
            if let Some(dialogs) = idx.by_entity.get(entity) {
                out.extend(dialogs.iter().cloned());
            }
        }
        out
    }

    /// Remove every binding for `dialog`, in both directions.
    ///
    /// Full per-dialog teardown. Not called from the default run path: a
    /// dialog's entity bindings are reclaimed incrementally via `unbind` and
    /// `remove_entity` as `*Hangup`/`*Delete` handlers fire, which is
    /// sufficient for bounded registry growth in steady-state operation.
    /// This is the primitive a future periodic sweep (dialogs idle past some
    /// TTL) would call; kept public and tested so that sweep can be added
    /// without touching the index-maintenance logic.
    pub async fn remove(&self, dialog: &str) {
        let mut idx = self.inner.write().await;
        let Some(entities) = idx.by_dialog.remove(dialog) else { return };
        for entity in entities {
            if let Some(set) = idx.by_entity.get_mut(&entity) {
                set.remove(dialog);
                if set.is_empty() {
                    idx.by_entity.remove(&entity);
                }
            }
        }
    }

    /// Remove every binding referencing `(kind, id)`, regardless of dialog.
    /// Used for best-effort cleanup by `*Delete`/`*Hangup`-family handlers.
    pub async fn remove_entity(&self, kind: EntityKind, id: &str) {
        let entity = (kind, id.to_owned());
        let mut idx = self.inner.write().await;
        let Some(dialogs) = idx.by_entity.remove(&entity) else { return };
        for dialog in dialogs {
            if let Some(set) = idx.by_dialog.get_mut(&dialog) {
                set.remove(&entity);
                if set.is_empty() {
                    idx.by_dialog.remove(&dialog);
                }
            }
        }
    }
}

impl Default for DialogRegistry {
    fn default() -> Self {
        Self::new()
    }
}
