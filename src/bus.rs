//! Bus entry points.
//!
//! The embedding process owns the message bus; it hands every delivered
//! message to [`FeedViewProcessor::handle_message`] as `(kind, action,
//! payload)` and sends the returned [`ResponseStatus`] back as the reply.
//!
//! Routed actions:
//! - `event ping` from the scheduler: no-op
//! - `command stopFeedViewRun`: acknowledged, not implemented (code 501)
//! - `command processFeedView`: blocking submission, `reset` defaults to true
//! - `event feedDataUpdated`: best-effort submission, `reset` defaults to false

use serde::{Deserialize, Serialize};

use crate::collector::ResponseStatus;
use crate::error::Error;
use crate::types::FeedTrigger;
use crate::worker::FeedViewProcessor;

/// Scheduler tick action
pub const ACTION_PING: &str = "ping";
/// Exclusive command stopping a feed view run
pub const ACTION_STOP_FEED_VIEW_RUN: &str = "stopFeedViewRun";
/// Explicit processing command
pub const ACTION_PROCESS_FEED_VIEW: &str = "processFeedView";
/// Data collector notification that new records were saved
pub const ACTION_FEED_DATA_UPDATED: &str = "feedDataUpdated";

/// Reply code: the queue did not take the job
pub const CODE_QUEUE: i64 = 1;
/// Reply code: unknown action
pub const CODE_UNKNOWN_ACTION: i64 = 404;
/// Reply code: unexpected failure handling the message
pub const CODE_INTERNAL: i64 = 500;
/// Reply code: recognised but not implemented
pub const CODE_NOT_IMPLEMENTED: i64 = 501;

/// Message kind as routed by the bus
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Request expecting a reply
    Command,
    /// Broadcast notification
    Event,
}

/// A classified bus message
#[derive(Clone, Debug, PartialEq)]
pub enum BusMessage {
    /// Periodic scheduler tick
    Ping,
    /// Request to stop an in-progress feed view run
    StopFeedViewRun,
    /// Explicit processing command
    ProcessFeedView(FeedTrigger),
    /// New data is available for a feed
    FeedDataUpdated(FeedTrigger),
    /// Anything this service does not route
    Unknown {
        /// Message kind
        kind: MessageKind,
        /// Routing action
        action: String,
    },
}

impl BusMessage {
    /// Classify a delivered message
    ///
    /// # Errors
    ///
    /// Returns a serialization error when a submission payload is not a trigger.
    pub fn classify(
        kind: MessageKind,
        action: &str,
        payload: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let message = match (kind, action) {
            (MessageKind::Event, ACTION_PING) => Self::Ping,
            (MessageKind::Command, ACTION_STOP_FEED_VIEW_RUN) => Self::StopFeedViewRun,
            (MessageKind::Command, ACTION_PROCESS_FEED_VIEW) => {
                Self::ProcessFeedView(FeedTrigger::deserialize(payload)?)
            }
            (MessageKind::Event, ACTION_FEED_DATA_UPDATED) => {
                Self::FeedDataUpdated(FeedTrigger::deserialize(payload)?)
            }
            (kind, action) => Self::Unknown {
                kind,
                action: action.to_string(),
            },
        };
        Ok(message)
    }
}

impl FeedViewProcessor {
    /// Handle one bus message and build its reply
    ///
    /// Never fails: every outcome, including a malformed payload, is
    /// reported through the reply status.
    pub async fn handle_message(
        &self,
        kind: MessageKind,
        action: &str,
        payload: &serde_json::Value,
    ) -> ResponseStatus {
        let message = match BusMessage::classify(kind, action, payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(action, error = %e, "Invalid message payload");
                return ResponseStatus::failure(CODE_INTERNAL, e.to_string());
            }
        };

        match message {
            BusMessage::Ping => ResponseStatus::success(),
            BusMessage::StopFeedViewRun => {
                tracing::info!("stopFeedViewRun received, not implemented");
                ResponseStatus::failure(CODE_NOT_IMPLEMENTED, "Not implemented")
            }
            BusMessage::ProcessFeedView(trigger) => {
                let reset = trigger.reset.unwrap_or(true);
                match self.add_to_queue(trigger, reset).await {
                    Ok(()) => ResponseStatus::success(),
                    Err(Error::ShuttingDown) => {
                        ResponseStatus::failure(CODE_QUEUE, "Processing queue closed")
                    }
                    Err(e) => ResponseStatus::failure(CODE_INTERNAL, e.to_string()),
                }
            }
            BusMessage::FeedDataUpdated(trigger) => {
                let reset = trigger.reset.unwrap_or(false);
                if self.is_stopping() {
                    ResponseStatus::failure(CODE_QUEUE, "Processing queue closed")
                } else if self.add_updates_to_queue(trigger, reset) {
                    ResponseStatus::success()
                } else {
                    ResponseStatus::failure(CODE_QUEUE, "Processing queue full")
                }
            }
            BusMessage::Unknown { kind, action } => {
                tracing::info!(?kind, action = %action, "Ignoring unknown action");
                ResponseStatus::failure(CODE_UNKNOWN_ACTION, "Unknown action")
            }
        }
    }
}
