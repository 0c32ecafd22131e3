use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use triage_core::domain::chat::{ChatRef, MessageRef, UserRef};
use triage_core::domain::reaction::ReactionEvent;
use triage_core::domain::trigger::TriggerMessage;

use crate::trigger::TriggerDetector;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    ReactionAdded(ReactionChangeEvent),
    ReactionRemoved(ReactionChangeEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::ReactionAdded(_) => SlackEventType::ReactionAdded,
            Self::ReactionRemoved(_) => SlackEventType::ReactionRemoved,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// Channel and message timestamp used to correlate log lines.
    pub fn message_coordinates(&self) -> Option<(&str, &str)> {
        match self {
            Self::Message(event) => Some((&event.channel_id, &event.ts)),
            Self::ReactionAdded(event) | Self::ReactionRemoved(event) => {
                Some((&event.channel_id, &event.message_ts))
            }
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    ReactionAdded,
    ReactionRemoved,
    Unsupported,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "channel")]
    pub channel_id: String,
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default, rename = "user")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionChangeEvent {
    pub channel_id: String,
    pub message_ts: String,
    pub user_id: String,
    pub reaction: String,
}

impl ReactionChangeEvent {
    fn chat_coordinates(&self) -> (ChatRef, MessageRef, UserRef) {
        (
            ChatRef(self.channel_id.clone()),
            MessageRef(self.message_ts.clone()),
            UserRef(self.user_id.clone()),
        )
    }
}

/// One decoded Socket Mode frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
    Ignored { frame_type: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed socket frame: {0}")]
pub struct FrameError(String);

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    payload: Option<RawPayload>,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    event: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawReaction {
    user: String,
    reaction: String,
    item: RawReactionItem,
}

#[derive(Deserialize)]
struct RawReactionItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

pub fn parse_socket_frame(raw: &str) -> Result<SocketFrame, FrameError> {
    let frame: RawFrame =
        serde_json::from_str(raw).map_err(|error| FrameError(error.to_string()))?;

    match frame.frame_type.as_str() {
        "hello" => Ok(SocketFrame::Hello),
        "disconnect" => Ok(SocketFrame::Disconnect {
            reason: frame.reason.unwrap_or_else(|| "unspecified".to_owned()),
        }),
        "events_api" => {
            let envelope_id = frame
                .envelope_id
                .ok_or_else(|| FrameError("events_api frame without envelope_id".to_owned()))?;
            let event = frame
                .payload
                .and_then(|payload| payload.event)
                .ok_or_else(|| FrameError("events_api frame without event".to_owned()))?;
            Ok(SocketFrame::Envelope(SlackEnvelope { envelope_id, event: decode_event(event)? }))
        }
        other => Ok(SocketFrame::Ignored { frame_type: other.to_owned() }),
    }
}

fn decode_event(event: serde_json::Value) -> Result<SlackEvent, FrameError> {
    let event_type = event.get("type").and_then(|value| value.as_str()).unwrap_or_default().to_owned();
    let malformed = |error: serde_json::Error| FrameError(format!("{event_type} event: {error}"));

    match event_type.as_str() {
        "message" => serde_json::from_value::<MessageEvent>(event)
            .map(SlackEvent::Message)
            .map_err(malformed),
        "reaction_added" | "reaction_removed" => {
            let raw = serde_json::from_value::<RawReaction>(event).map_err(malformed)?;
            let (Some(channel_id), Some(message_ts)) = (raw.item.channel, raw.item.ts) else {
                return Ok(SlackEvent::Unsupported { event_type: event_type.clone() });
            };
            if raw.item.item_type != "message" {
                return Ok(SlackEvent::Unsupported { event_type: event_type.clone() });
            }
            let change =
                ReactionChangeEvent { channel_id, message_ts, user_id: raw.user, reaction: raw.reaction };
            Ok(if event_type == "reaction_added" {
                SlackEvent::ReactionAdded(change)
            } else {
                SlackEvent::ReactionRemoved(change)
            })
        }
        _ => Ok(SlackEvent::Unsupported { event_type: event_type.clone() }),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("trigger was not accepted: {0}")]
    TriggerRejected(String),
    #[error("reaction was not accepted: {0}")]
    ReactionRejected(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Receives messages that passed trigger detection. Implementations must not block on the run.
#[async_trait]
pub trait TriggerSink: Send + Sync {
    async fn submit(&self, trigger: TriggerMessage) -> Result<(), EventHandlerError>;
}

#[async_trait]
pub trait ReactionSink: Send + Sync {
    async fn submit(&self, event: ReactionEvent) -> Result<(), EventHandlerError>;
}

/// Wires both handlers for a running bot.
pub fn workflow_dispatcher(
    detector: TriggerDetector,
    triggers: Arc<dyn TriggerSink>,
    reactions: Arc<dyn ReactionSink>,
) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(detector, triggers));
    dispatcher.register(ReactionHandler::added(reactions.clone()));
    dispatcher.register(ReactionHandler::removed(reactions));
    dispatcher
}

pub struct MessageHandler {
    detector: TriggerDetector,
    sink: Arc<dyn TriggerSink>,
}

impl MessageHandler {
    pub fn new(detector: TriggerDetector, sink: Arc<dyn TriggerSink>) -> Self {
        Self { detector, sink }
    }
}

#[async_trait]
impl EventHandler for MessageHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let Some(trigger) = self.detector.detect(event) else {
            return Ok(HandlerResult::Ignored);
        };

        debug!(
            event_name = "ingress.slack.trigger_detected",
            correlation_id = %ctx.correlation_id,
            chat_ref = %trigger.chat_ref,
            message_ref = %trigger.message_ref,
            priority = ?trigger.priority(),
            "message matched trigger"
        );
        self.sink.submit(trigger).await?;
        Ok(HandlerResult::Processed)
    }
}

/// Forwards reaction changes; one instance per direction since the dispatcher keys by type.
pub struct ReactionHandler {
    kind: SlackEventType,
    sink: Arc<dyn ReactionSink>,
}

impl ReactionHandler {
    pub fn added(sink: Arc<dyn ReactionSink>) -> Self {
        Self { kind: SlackEventType::ReactionAdded, sink }
    }

    pub fn removed(sink: Arc<dyn ReactionSink>) -> Self {
        Self { kind: SlackEventType::ReactionRemoved, sink }
    }
}

#[async_trait]
impl EventHandler for ReactionHandler {
    fn event_type(&self) -> SlackEventType {
        self.kind.clone()
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let event = match &envelope.event {
            SlackEvent::ReactionAdded(change) => {
                let (chat, message, user) = change.chat_coordinates();
                ReactionEvent::added(chat, message, user, change.reaction.clone())
            }
            SlackEvent::ReactionRemoved(change) => {
                let (chat, message, user) = change.chat_coordinates();
                ReactionEvent::removed(chat, message, user, change.reaction.clone())
            }
            _ => return Ok(HandlerResult::Ignored),
        };

        self.sink.submit(event).await?;
        Ok(HandlerResult::Processed)
    }
}
