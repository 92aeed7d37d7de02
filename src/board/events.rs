use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::models::{Lead, Stage};

/// Capacity of the engine's event channel. Slow subscribers see `Lagged` and should reload.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notifications published after the engine mutates its store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum BoardEvent {
    Loaded {
        owner: String,
        stage_count: usize,
        lead_count: usize,
    },
    LeadCreated {
        lead: Lead,
    },
    LeadUpdated {
        lead: Lead,
    },
    LeadMoved {
        lead_id: Uuid,
        from_stage: String,
        to_stage: String,
    },
    LeadDeleted {
        lead_id: Uuid,
    },
    StagesChanged {
        stages: Vec<Stage>,
    },
    /// A failed mutation was rolled back by reloading from the backing store.
    Reconciled {
        owner: String,
    },
}

/// Send to all subscribers, ignoring the no-receiver case.
pub fn publish(tx: &broadcast::Sender<BoardEvent>, event: BoardEvent) {
    let _ = tx.send(event);
}
