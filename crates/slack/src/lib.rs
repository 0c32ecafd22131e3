//! Slack adapter for the triage bot.
//!
//! - **Socket Mode** (`socket`) - websocket event loop with reconnection
//! - **Events** (`events`) - envelope decoding and dispatch to trigger and reaction sinks
//! - **Triggers** (`trigger`) - hashtag and mention detection
//! - **Web API** (`web`) - reactions, threaded replies and deletions as a `ChatTransport`
//!
//! ```text
//! Socket Mode → EventDispatcher → TriggerSink   → work queue → WorkflowRuntime
//!                               → ReactionSink  → ReactionController
//! ```

pub mod events;
pub mod socket;
pub mod trigger;
pub mod web;
