// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket `SwitchClient` implementation.
//!
//! Synchronous calls go over a `reqwest::Client` wrapping a single Switch
//! base URL; the event stream is a single reconnecting WebSocket task
//! (exponential backoff with jitter, `tokio::select!` against cancellation),
//! republishing parsed events on an internal broadcast channel the Event
//! Pump subscribes to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{SwitchCallError, SwitchClient, SwitchInfo};
use crate::model::{EntityKind, SwitchEvent};

/// HTTP/WebSocket Switch client.
pub struct HttpSwitchClient {
    base_url: String,
    auth_token: Option<String>,
    application: String,
    http: Client,
    connected: Arc<AtomicBool>,
    events_tx: broadcast::Sender<SwitchEvent>,
    _ws_cancel: CancellationToken,
}

impl HttpSwitchClient {
    /// Connect to a Switch instance at `base_url` for `application`, and
    /// start the background event stream task.
    pub fn connect(base_url: String, auth_token: Option<String>, application: String) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        let connected = Arc::new(AtomicBool::new(false));
        let (events_tx, _) = broadcast::channel(1024);
        let ws_cancel = CancellationToken::new();

        let ws_url = build_ws_url(&base_url, auth_token.as_deref(), &application);
        tokio::spawn(run_event_stream(
            ws_url,
            ws_cancel.clone(),
            Arc::clone(&connected),
            events_tx.clone(),
        ));

        Self { base_url, auth_token, application, http, connected, events_tx, _ws_cancel: ws_cancel }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl SwitchClient for HttpSwitchClient {
    async fn info(&self) -> anyhow::Result<SwitchInfo> {
        let req = self.http.get(self.url("/ari/asterisk/info"));
        let resp = self.apply_auth(req).send().await?.error_for_status()?;
        let value: serde_json::Value = resp.json().await?;
        let entity_id = value
            .get("system")
            .and_then(|s| s.get("entity_id"))
            .and_then(|v| v.as_str())
            .or_else(|| value.get("entity_id").and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_owned();
        Ok(SwitchInfo { entity_id })
    }

    fn application_name(&self) -> &str {
        &self.application
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn close(&self) -> anyhow::Result<()> {
        self._ws_cancel.cancel();
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<SwitchEvent> {
        self.events_tx.subscribe()
    }

    async fn call(
        &self,
        kind: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, SwitchCallError> {
        let req = self.http.post(self.url(&format!("/ari/_dispatch/{kind}"))).json(payload);
        let req = self.apply_auth(req);
        let resp = req.send().await.map_err(|e| SwitchCallError::Failed(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SwitchCallError::NotFound(kind.to_owned()));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SwitchCallError::Failed(format!("{status}: {body}")));
        }

        let bytes = resp.bytes().await.map_err(|e| SwitchCallError::Failed(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| SwitchCallError::Failed(e.to_string()))
    }
}

fn build_ws_url(base_url: &str, auth_token: Option<&str>, application: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_owned()
    };
    let mut url = format!("{ws_base}/ari/events?app={application}&subscribeAll=true");
    if let Some(token) = auth_token {
        url.push_str(&format!("&api_key={token}"));
    }
    url
}

async fn run_event_stream(
    url: String,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
    events_tx: broadcast::Sender<SwitchEvent>,
) {
    let mut backoff_ms = 100u64;
    let max_backoff_ms = 5000u64;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match tokio_tungstenite::connect_async(&url).await {
            Ok((ws_stream, _)) => {
                backoff_ms = 100;
                connected.store(true, Ordering::Relaxed);
                debug!("switch event stream connected");
                let (_write, mut read) = ws_stream.split();

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            connected.store(false, Ordering::Relaxed);
                            return;
                        }
                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    match parse_event(&text) {
                                        Some(event) => {
                                            let _ = events_tx.send(event);
                                        }
                                        None => debug!("dropping unparseable switch event"),
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    debug!("switch event stream closed");
                                    break;
                                }
                                Some(Err(e)) => {
                                    warn!(err = %e, "switch event stream error");
                                    break;
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!(err = %e, backoff_ms, "switch event stream connect failed, retrying");
            }
        }

        connected.store(false, Ordering::Relaxed);
        let jittered_ms = backoff_ms / 2 + rand::random_range(0..=backoff_ms / 2);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(std::time::Duration::from_millis(jittered_ms)) => {}
        }
        backoff_ms = (backoff_ms * 2).min(max_backoff_ms);
    }
}

/// Parse a raw Switch event payload and derive the entities it references.
fn parse_event(text: &str) -> Option<SwitchEvent> {
    let mut value: serde_json::Value = serde_json::from_str(text).ok()?;
    let event_type = value.get("type").and_then(|v| v.as_str())?.to_owned();
    let entities = derive_entities(&value);
    if let Some(obj) = value.as_object_mut() {
        obj.remove("type");
    }
    Some(SwitchEvent { event_type, dialog: None, entities, body: value })
}

/// Scan a raw event body for the entity references it carries, using the
/// field names the Switch's event schema conventionally nests them under.
fn derive_entities(value: &serde_json::Value) -> Vec<(EntityKind, String)> {
    let mut out = Vec::new();
    let mut push = |kind: EntityKind, field: &str| {
        if let Some(id) = value.get(field).and_then(|v| v.get("id")).and_then(|v| v.as_str()) {
            out.push((kind, id.to_owned()));
        }
    };
    push(EntityKind::Channel, "channel");
    push(EntityKind::Bridge, "bridge");
    push(EntityKind::Playback, "playback");
    push(EntityKind::DeviceState, "device_state");
    if let Some(name) = value
        .get("recording")
        .and_then(|v| v.get("name"))
        .and_then(|v| v.as_str())
    {
        out.push((EntityKind::Recording, name.to_owned()));
    }
    if let Some(name) = value.get("mailbox").and_then(|v| v.get("name")).and_then(|v| v.as_str()) {
        out.push((EntityKind::Mailbox, name.to_owned()));
    }
    out
}
