//! World metadata.
//!
//! `WorldState` is the single mutable summary record of a world instance:
//! the current tick, the id-allocation cursor, the effect watermark, and the
//! proposer-facing bookkeeping lists. Exactly one writer owns this record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::event::{EventId, TimeScale};

/// A flagged event eligible for a finer-scale drill-down.
///
/// Produced by the external proposer; this crate only tracks the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// The event that could be drilled into.
    pub event_id: EventId,

    /// The scale a drill-down would run at.
    pub target_scale: TimeScale,

    /// Why the proposer flagged it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Proposer-added fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An ongoing conflict tracked for the proposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveConflict {
    /// Polities at war.
    pub polities: Vec<EntityId>,

    /// The contested region.
    pub region: EntityId,

    /// Tick the conflict opened at.
    pub started_at_tick: u64,

    /// The `conflict.started` event, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_by: Option<EventId>,

    /// Proposer-added fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The mutable summary record of a world instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    /// Current coarse world tick.
    pub tick: u64,

    /// Ordinal of the most recently allocated event id. The next append
    /// takes `last_event_id + 1`.
    pub last_event_id: u64,

    /// Ordinal of the most recently *applied* event. Batch effect
    /// application only touches events above this watermark, which is what
    /// keeps delta handlers exactly-once under re-runs.
    #[serde(default)]
    pub last_applied_event_id: u64,

    /// Name of the scenario governing victory checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_scenario: Option<String>,

    /// Outstanding drill-down opportunities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drill_down_opportunities: Vec<Opportunity>,

    /// Ongoing conflicts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_conflicts: Vec<ActiveConflict>,

    /// When the world was created.
    pub created_at: DateTime<Utc>,

    /// When this record last changed.
    pub updated_at: DateTime<Utc>,

    /// Open settings map for the orchestration layer.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl WorldState {
    /// Creates a fresh world at tick 0 with no events.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            tick: 0,
            last_event_id: 0,
            last_applied_event_id: 0,
            active_scenario: None,
            drill_down_opportunities: Vec::new(),
            active_conflicts: Vec::new(),
            created_at: now,
            updated_at: now,
            settings: serde_json::Map::new(),
        }
    }

    /// The id the next append will receive, without allocating it.
    #[must_use]
    pub const fn next_event_id(&self) -> EventId {
        EventId::new(self.last_event_id + 1)
    }

    /// Allocates the next event id, advancing the cursor.
    pub fn allocate_event_id(&mut self) -> EventId {
        self.last_event_id += 1;
        self.touch();
        EventId::new(self.last_event_id)
    }

    /// The effect watermark as an id.
    #[must_use]
    pub const fn watermark(&self) -> EventId {
        EventId::new(self.last_applied_event_id)
    }

    /// Advances the world tick.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
        self.touch();
    }

    /// Updates the `updated_at` timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}
