//! Typed progress events, fanned out per parse job on `kg-parsing:<id>` rooms.
//!
//! The orchestrator emits into the hub; transports (SSE, tests) subscribe.
//! Events within one job are totally ordered, and the terminal `complete`,
//! `error`, or `cancel` event is always last.

use crate::types::ParsingProgress;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// One event on a parse job's progress channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Start {
        name: String,
        repository_url: Option<String>,
        local_path: Option<String>,
        estimated_duration: String,
    },
    Update {
        #[serde(flatten)]
        progress: ParsingProgress,
    },
    Complete {
        #[serde(flatten)]
        progress: ParsingProgress,
        repository_id: Uuid,
        statistics: Value,
    },
    Error {
        error_message: String,
    },
    Cancel {},
}

impl ProgressEvent {
    /// Terminal events end the room; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Error { .. } | ProgressEvent::Cancel {}
        )
    }
}

/// Per-job broadcast registry. Emitting without subscribers is a no-op.
#[derive(Default)]
pub struct ProgressHub {
    channels: DashMap<String, broadcast::Sender<ProgressEvent>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Room name for a parse job.
    pub fn room(parsing_id: Uuid) -> String {
        format!("kg-parsing:{parsing_id}")
    }

    pub fn subscribe(&self, parsing_id: Uuid) -> broadcast::Receiver<ProgressEvent> {
        self.sender(parsing_id).subscribe()
    }

    pub fn emit(&self, parsing_id: Uuid, event: ProgressEvent) {
        // A send error only means nobody is listening
        let _ = self.sender(parsing_id).send(event);
    }

    /// Drop a finished room. Subscribers still drain buffered events, then
    /// observe the closed channel.
    pub fn close(&self, parsing_id: Uuid) {
        self.channels.remove(&Self::room(parsing_id));
    }

    fn sender(&self, parsing_id: Uuid) -> broadcast::Sender<ProgressEvent> {
        self.channels
            .entry(Self::room(parsing_id))
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}
