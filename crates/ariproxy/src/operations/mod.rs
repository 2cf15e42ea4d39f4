// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation Table: dispatch from `Request.kind` to the behavior that kind
//! implies, keyed by a static lookup table rather than a hand-written
//! branch per kind. Adding a kind means adding one row to [`TABLE`].

use std::collections::HashMap;
use std::sync::OnceLock;

use tracing::debug;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::model::{EntityKind, Request, Response};
use crate::registry::DialogRegistry;
use crate::switch::{SwitchCallError, SwitchClient};

/// What a kind does beyond "call the switch and relay the result": a
/// handful of cross-cutting behaviors that stage handles, bind or unbind
/// dialog bindings, or clean up bindings after a successful call.
#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Plain forward to the switch; the result (or its failure) becomes the response.
    Call,
    /// Allocates a local handle without contacting the switch.
    Stage,
    /// Binds `(Metadata.dialog, entity_kind, id)` in the dialog registry; no switch call.
    Subscribe(EntityKind),
    /// Unbinds the same tuple; no switch call.
    Unsubscribe(EntityKind),
    /// Forwards to the switch, then best-effort removes any bindings on the entity.
    CleanupCall(EntityKind),
}

fn id_field(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Channel | EntityKind::Bridge | EntityKind::Playback => "id",
        EntityKind::Recording | EntityKind::DeviceState | EntityKind::Mailbox => "name",
    }
}

/// Every `Request.kind` this proxy understands, paired with its behavior.
/// Grouped by resource family.
const TABLE: &[(&str, Behavior)] = &[
    // Application*
    ("ApplicationList", Behavior::Call),
    ("ApplicationGet", Behavior::Call),
    ("ApplicationSubscribe", Behavior::Call),
    ("ApplicationUnsubscribe", Behavior::Call),
    // AsteriskConfig*
    ("AsteriskConfigGet", Behavior::Call),
    ("AsteriskConfigUpdate", Behavior::Call),
    ("AsteriskConfigDelete", Behavior::Call),
    // AsteriskLogging*
    ("AsteriskLoggingList", Behavior::Call),
    ("AsteriskLoggingGet", Behavior::Call),
    ("AsteriskLoggingAdd", Behavior::Call),
    ("AsteriskLoggingDelete", Behavior::Call),
    ("AsteriskLoggingRotate", Behavior::Call),
    // AsteriskModule*
    ("AsteriskModuleList", Behavior::Call),
    ("AsteriskModuleGet", Behavior::Call),
    ("AsteriskModuleLoad", Behavior::Call),
    ("AsteriskModuleUnload", Behavior::Call),
    ("AsteriskModuleReload", Behavior::Call),
    // AsteriskInfo
    ("AsteriskInfo", Behavior::Call),
    // AsteriskVariable{Get,Set}
    ("AsteriskVariableGet", Behavior::Call),
    ("AsteriskVariableSet", Behavior::Call),
    // Bridge*
    ("BridgeList", Behavior::Call),
    ("BridgeGet", Behavior::Call),
    ("BridgeCreate", Behavior::Call),
    ("BridgeCreateWithID", Behavior::Call),
    ("BridgeDelete", Behavior::CleanupCall(EntityKind::Bridge)),
    ("BridgeAddChannel", Behavior::Call),
    ("BridgeRemoveChannel", Behavior::Call),
    ("BridgeSetVideoSource", Behavior::Call),
    ("BridgeClearVideoSource", Behavior::Call),
    ("BridgePlay", Behavior::Call),
    ("BridgePlayWithID", Behavior::Call),
    ("BridgeRecord", Behavior::Call),
    ("BridgeMoh", Behavior::Call),
    ("BridgeStopMoh", Behavior::Call),
    ("BridgeSubscribe", Behavior::Subscribe(EntityKind::Bridge)),
    ("BridgeUnsubscribe", Behavior::Unsubscribe(EntityKind::Bridge)),
    ("BridgeStageCreate", Behavior::Stage),
    ("BridgeStagePlay", Behavior::Stage),
    ("BridgeStageRecord", Behavior::Stage),
    // Channel*
    ("ChannelList", Behavior::Call),
    ("ChannelGet", Behavior::Call),
    ("ChannelOriginate", Behavior::Call),
    ("ChannelOriginateWithID", Behavior::Call),
    ("ChannelHangup", Behavior::CleanupCall(EntityKind::Channel)),
    ("ChannelContinue", Behavior::Call),
    ("ChannelMove", Behavior::Call),
    ("ChannelRedirect", Behavior::Call),
    ("ChannelAnswer", Behavior::Call),
    ("ChannelRing", Behavior::Call),
    ("ChannelRingStop", Behavior::Call),
    ("ChannelMute", Behavior::Call),
    ("ChannelUnmute", Behavior::Call),
    ("ChannelHold", Behavior::Call),
    ("ChannelUnhold", Behavior::Call),
    ("ChannelStartMoh", Behavior::Call),
    ("ChannelStopMoh", Behavior::Call),
    ("ChannelStartSilence", Behavior::Call),
    ("ChannelStopSilence", Behavior::Call),
    ("ChannelPlay", Behavior::Call),
    ("ChannelPlayWithID", Behavior::Call),
    ("ChannelRecord", Behavior::Call),
    ("ChannelDial", Behavior::Call),
    ("ChannelSnoop", Behavior::Call),
    ("ChannelSnoopWithID", Behavior::Call),
    ("ChannelExternalMedia", Behavior::Call),
    ("ChannelVariableGet", Behavior::Call),
    ("ChannelVariableSet", Behavior::Call),
    ("ChannelDtmf", Behavior::Call),
    ("ChannelSubscribe", Behavior::Subscribe(EntityKind::Channel)),
    ("ChannelUnsubscribe", Behavior::Unsubscribe(EntityKind::Channel)),
    ("ChannelStageCreate", Behavior::Stage),
    ("ChannelStagePlay", Behavior::Stage),
    ("ChannelStageRecord", Behavior::Stage),
    ("ChannelStageOriginate", Behavior::Stage),
    ("ChannelStageSnoop", Behavior::Stage),
    ("ChannelStageExternalMedia", Behavior::Stage),
    ("ChannelUserEvent", Behavior::Call),
    // DeviceState*
    ("DeviceStateList", Behavior::Call),
    ("DeviceStateGet", Behavior::Call),
    ("DeviceStateUpdate", Behavior::Call),
    ("DeviceStateDelete", Behavior::CleanupCall(EntityKind::DeviceState)),
    ("DeviceStateSubscribe", Behavior::Subscribe(EntityKind::DeviceState)),
    ("DeviceStateUnsubscribe", Behavior::Unsubscribe(EntityKind::DeviceState)),
    // Endpoint* (not a fan-out-bindable entity kind; plain pass-through)
    ("EndpointList", Behavior::Call),
    ("EndpointListByTech", Behavior::Call),
    ("EndpointGet", Behavior::Call),
    ("EndpointSendMessage", Behavior::Call),
    ("EndpointSubscribe", Behavior::Call),
    ("EndpointUnsubscribe", Behavior::Call),
    // Mailbox*
    ("MailboxList", Behavior::Call),
    ("MailboxGet", Behavior::Call),
    ("MailboxUpdate", Behavior::Call),
    ("MailboxDelete", Behavior::CleanupCall(EntityKind::Mailbox)),
    ("MailboxSubscribe", Behavior::Subscribe(EntityKind::Mailbox)),
    ("MailboxUnsubscribe", Behavior::Unsubscribe(EntityKind::Mailbox)),
    // Playback*
    ("PlaybackGet", Behavior::Call),
    ("PlaybackControl", Behavior::Call),
    ("PlaybackStop", Behavior::CleanupCall(EntityKind::Playback)),
    ("PlaybackSubscribe", Behavior::Subscribe(EntityKind::Playback)),
    ("PlaybackUnsubscribe", Behavior::Unsubscribe(EntityKind::Playback)),
    // RecordingStored*
    ("RecordingStoredList", Behavior::Call),
    ("RecordingStoredGet", Behavior::Call),
    ("RecordingStoredDelete", Behavior::CleanupCall(EntityKind::Recording)),
    ("RecordingStoredCopy", Behavior::Call),
    ("RecordingStoredGetFile", Behavior::Call),
    // RecordingLive*
    ("RecordingLiveGet", Behavior::Call),
    ("RecordingLiveCancel", Behavior::CleanupCall(EntityKind::Recording)),
    ("RecordingLiveStop", Behavior::CleanupCall(EntityKind::Recording)),
    ("RecordingLivePause", Behavior::Call),
    ("RecordingLiveUnpause", Behavior::Call),
    ("RecordingLiveMute", Behavior::Call),
    ("RecordingLiveUnmute", Behavior::Call),
    ("RecordingLiveSubscribe", Behavior::Subscribe(EntityKind::Recording)),
    ("RecordingLiveUnsubscribe", Behavior::Unsubscribe(EntityKind::Recording)),
    // Sound*
    ("SoundList", Behavior::Call),
    ("SoundGet", Behavior::Call),
];

fn table() -> &'static HashMap<&'static str, Behavior> {
    static TABLE_MAP: OnceLock<HashMap<&'static str, Behavior>> = OnceLock::new();
    TABLE_MAP.get_or_init(|| TABLE.iter().copied().collect())
}

/// Dispatch `request` to its handler, returning the single response to
/// publish on the reply subject.
pub async fn dispatch(
    switch: &dyn SwitchClient,
    registry: &DialogRegistry,
    request: &Request,
) -> Response {
    let Some(behavior) = table().get(request.kind.as_str()).copied() else {
        return Response::error(
            ErrorKind::NotImplemented,
            format!("unknown operation kind: {}", request.kind),
        );
    };

    match behavior {
        Behavior::Stage => stage(),
        Behavior::Subscribe(kind) => subscribe(registry, request, kind).await,
        Behavior::Unsubscribe(kind) => unsubscribe(registry, request, kind).await,
        Behavior::Call => call(switch, request).await,
        Behavior::CleanupCall(kind) => cleanup_call(switch, registry, request, kind).await,
    }
}

fn extract_id(request: &Request, field: &str) -> Option<String> {
    request.payload.get(field)?.as_str().map(str::to_owned)
}

fn stage() -> Response {
    let handle = Uuid::new_v4().to_string();
    Response::value(serde_json::json!({ "id": handle }))
}

async fn subscribe(registry: &DialogRegistry, request: &Request, kind: EntityKind) -> Response {
    let Some(dialog) = request.metadata.dialog.clone() else {
        return Response::error(ErrorKind::BadRequest, "subscribe requires metadata.dialog");
    };
    let Some(id) = extract_id(request, id_field(kind)) else {
        return Response::error(
            ErrorKind::BadRequest,
            format!("subscribe requires payload.{}", id_field(kind)),
        );
    };
    registry.bind(&dialog, kind, &id).await;
    Response::empty_ack()
}

async fn unsubscribe(registry: &DialogRegistry, request: &Request, kind: EntityKind) -> Response {
    let Some(dialog) = request.metadata.dialog.clone() else {
        return Response::error(ErrorKind::BadRequest, "unsubscribe requires metadata.dialog");
    };
    let Some(id) = extract_id(request, id_field(kind)) else {
        return Response::error(
            ErrorKind::BadRequest,
            format!("unsubscribe requires payload.{}", id_field(kind)),
        );
    };
    registry.unbind(&dialog, kind, &id).await;
    Response::empty_ack()
}

async fn call(switch: &dyn SwitchClient, request: &Request) -> Response {
    match switch.call(&request.kind, &request.payload).await {
        Ok(value) => Response::Value(value),
        Err(SwitchCallError::NotFound(msg)) => Response::error(ErrorKind::NotFound, msg),
        Err(SwitchCallError::Failed(msg)) => Response::error(ErrorKind::SwitchError, msg),
    }
}

async fn cleanup_call(
    switch: &dyn SwitchClient,
    registry: &DialogRegistry,
    request: &Request,
    kind: EntityKind,
) -> Response {
    let response = call(switch, request).await;
    if matches!(response, Response::Value(_)) {
        if let Some(id) = extract_id(request, id_field(kind)) {
            registry.remove_entity(kind, &id).await;
        } else {
            debug!(kind = %request.kind, "cleanup-eligible request had no extractable entity id");
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RequestMetadata;
    use crate::switch::SwitchInfo;
    use tokio::sync::broadcast;

    struct StubSwitch {
        result: Result<serde_json::Value, SwitchCallError>,
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
            true
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
        ) -> Result<serde_json::Value, SwitchCallError> {
            self.result.clone()
        }
    }

    fn request(kind: &str, dialog: Option<&str>, payload: serde_json::Value) -> Request {
        Request {
            kind: kind.to_owned(),
            metadata: RequestMetadata { dialog: dialog.map(str::to_owned), ..Default::default() },
            payload,
        }
    }

    #[tokio::test]
    async fn unknown_kind_is_not_implemented() {
        let switch = StubSwitch { result: Ok(serde_json::Value::Null) };
        let registry = DialogRegistry::new();
        let response = dispatch(&switch, &registry, &request("NoSuchKind", None, serde_json::Value::Null)).await;
        match response {
            Response::Error(e) => assert_eq!(e.kind, ErrorKind::NotImplemented),
            _ => panic!("expected error response"),
        }
    }

    #[tokio::test]
    async fn subscribe_binds_dialog_and_acks() {
        let switch = StubSwitch { result: Ok(serde_json::Value::Null) };
        let registry = DialogRegistry::new();
        let response = dispatch(
            &switch,
            &registry,
            &request("ChannelSubscribe", Some("d-9"), serde_json::json!({ "id": "c-17" })),
        )
        .await;
        assert!(matches!(response, Response::Value(serde_json::Value::Null)));
        let dialogs = registry.dialogs_for_entity(EntityKind::Channel, "c-17").await;
        assert!(dialogs.contains("d-9"));
    }

    #[tokio::test]
    async fn subscribe_without_dialog_is_bad_request() {
        let switch = StubSwitch { result: Ok(serde_json::Value::Null) };
        let registry = DialogRegistry::new();
        let response = dispatch(
            &switch,
            &registry,
            &request("ChannelSubscribe", None, serde_json::json!({ "id": "c-17" })),
        )
        .await;
        match response {
            Response::Error(e) => assert_eq!(e.kind, ErrorKind::BadRequest),
            _ => panic!("expected bad-request error"),
        }
    }

    #[tokio::test]
    async fn hangup_cleans_up_registry_on_success() {
        let switch = StubSwitch { result: Ok(serde_json::Value::Null) };
        let registry = DialogRegistry::new();
        registry.bind("d-9", EntityKind::Channel, "c-17").await;

        let response =
            dispatch(&switch, &registry, &request("ChannelHangup", None, serde_json::json!({ "id": "c-17" })))
                .await;
        assert!(matches!(response, Response::Value(_)));
        assert!(registry.dialogs_for_entity(EntityKind::Channel, "c-17").await.is_empty());
    }

    #[tokio::test]
    async fn hangup_does_not_clean_up_on_switch_failure() {
        let switch = StubSwitch { result: Err(SwitchCallError::Failed("boom".to_owned())) };
        let registry = DialogRegistry::new();
        registry.bind("d-9", EntityKind::Channel, "c-17").await;

        let response =
            dispatch(&switch, &registry, &request("ChannelHangup", None, serde_json::json!({ "id": "c-17" })))
                .await;
        match response {
            Response::Error(e) => assert_eq!(e.kind, ErrorKind::SwitchError),
            _ => panic!("expected switch-error"),
        }
        assert!(!registry.dialogs_for_entity(EntityKind::Channel, "c-17").await.is_empty());
    }

    #[tokio::test]
    async fn stage_allocates_handle_without_calling_switch() {
        let switch = StubSwitch { result: Err(SwitchCallError::Failed("should not be called".to_owned())) };
        let registry = DialogRegistry::new();
        let response =
            dispatch(&switch, &registry, &request("ChannelStageCreate", None, serde_json::Value::Null)).await;
        match response {
            Response::Value(v) => assert!(v.get("id").and_then(|v| v.as_str()).is_some()),
            _ => panic!("expected a value response carrying an allocated id"),
        }
    }

    #[tokio::test]
    async fn not_found_from_switch_maps_to_not_found_kind() {
        let switch = StubSwitch { result: Err(SwitchCallError::NotFound("c-17".to_owned())) };
        let registry = DialogRegistry::new();
        let response =
            dispatch(&switch, &registry, &request("ChannelGet", None, serde_json::json!({ "id": "c-17" }))).await;
        match response {
            Response::Error(e) => assert_eq!(e.kind, ErrorKind::NotFound),
            _ => panic!("expected not-found error"),
        }
    }
}
