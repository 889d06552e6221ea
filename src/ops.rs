//! Serializable operations and builders.
//!
//! Operations are the transportable surface of the core: an orchestration
//! loop (or a thin CLI wrapper outside this crate) constructs them, the
//! [`LoomEngine`](crate::engine::LoomEngine) executes them. Builders
//! validate required fields before an operation ever reaches the engine.

use serde::{Deserialize, Serialize};

use crate::chronicle::{EventDraft, EventFilter};
use crate::entity::EntityId;
use crate::error::AppendError;
use crate::event::{EventId, TimeScale};

/// What an apply-effects operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyTarget {
    /// One event by id.
    Event(EventId),
    /// Every event above the watermark.
    AllPending,
}

/// All supported operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "payload", rename_all = "snake_case")]
pub enum Operation {
    /// Append an event to the chronicle.
    Append {
        /// The event to append.
        draft: EventDraft,
        /// Validate and format without mutating the log.
        #[serde(default)]
        dry_run: bool,
    },

    /// Query the chronicle.
    Query {
        /// Conjunctive filter predicates plus a result limit.
        filter: EventFilter,
    },

    /// Apply event effects to the entity store.
    ApplyEffects {
        /// One event or all pending.
        target: ApplyTarget,
        /// Compute patches without writing them.
        #[serde(default)]
        dry_run: bool,
    },

    /// Check the active scenario's victory conditions.
    CheckVictory,
}

/// Builder for append operations.
///
/// # Example
/// ```rust,ignore
/// let draft = AppendBuilder::new()
///     .event_type("battle.resolved")
///     .location(EntityId::new("region.north-march")?)
///     .participant(EntityId::new("force.red")?)
///     .t_world(1203.0)
///     .importance(0.8)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppendBuilder {
    event_type: Option<String>,
    location: Option<EntityId>,
    who: Vec<EntityId>,
    t_world: Option<f64>,
    t_scale: Option<TimeScale>,
    t_parent: Option<EventId>,
    t_depth: u32,
    t_stream: Option<String>,
    data: serde_json::Map<String, serde_json::Value>,
    causes: Vec<EventId>,
    source: Option<String>,
    confidence: Option<f64>,
    importance: Option<f64>,
    narrative_summary: Option<String>,
}

impl AppendBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dotted `family.name` event type (required).
    #[must_use]
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Set where the event happens (required).
    #[must_use]
    pub fn location(mut self, location: EntityId) -> Self {
        self.location = Some(location);
        self
    }

    /// Add a participant (at least one required). Order is preserved.
    #[must_use]
    pub fn participant(mut self, id: EntityId) -> Self {
        self.who.push(id);
        self
    }

    /// Set the world-tick anchor (required).
    #[must_use]
    pub fn t_world(mut self, t_world: f64) -> Self {
        self.t_world = Some(t_world);
        self
    }

    /// Set the simulation scale.
    #[must_use]
    pub fn scale(mut self, scale: TimeScale) -> Self {
        self.t_scale = Some(scale);
        self
    }

    /// Set the drill-down parent and depth.
    #[must_use]
    pub fn nested_under(mut self, parent: EventId, depth: u32) -> Self {
        self.t_parent = Some(parent);
        self.t_depth = depth;
        self
    }

    /// Set the named sub-stream.
    #[must_use]
    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.t_stream = Some(stream.into());
        self
    }

    /// Set a payload field.
    #[must_use]
    pub fn data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Add a cause.
    #[must_use]
    pub fn caused_by(mut self, cause: EventId) -> Self {
        self.causes.push(cause);
        self
    }

    /// Set the proposer identity.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set proposer certainty.
    #[must_use]
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Set editorial weight.
    #[must_use]
    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Set the one-line summary.
    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.narrative_summary = Some(summary.into());
        self
    }

    /// Builds the draft.
    ///
    /// # Errors
    ///
    /// [`AppendError::MissingField`] for an unset required field and
    /// [`AppendError::NoParticipants`] for an empty `who` list. Deeper
    /// validation (cause existence, scalar ranges) happens at append time.
    pub fn build(self) -> Result<EventDraft, AppendError> {
        let event_type = self.event_type.ok_or_else(|| AppendError::MissingField {
            field: "type".to_string(),
        })?;
        let location = self.location.ok_or_else(|| AppendError::MissingField {
            field: "where".to_string(),
        })?;
        let t_world = self.t_world.ok_or_else(|| AppendError::MissingField {
            field: "t_world".to_string(),
        })?;
        if self.who.is_empty() {
            return Err(AppendError::NoParticipants);
        }

        Ok(EventDraft {
            event_type,
            location,
            who: self.who,
            t_world,
            t_scale: self.t_scale,
            t_parent: self.t_parent,
            t_depth: self.t_depth,
            t_stream: self.t_stream,
            data: self.data,
            causes: self.causes,
            source: self.source,
            confidence: self.confidence,
            importance: self.importance,
            narrative_summary: self.narrative_summary,
        })
    }
}
