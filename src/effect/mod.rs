//! The effect engine: deterministic event-to-patch application.
//!
//! Handlers are pure with respect to their inputs (the event and the current
//! store). They *compute* a patch set; the engine commits it, which is what
//! makes dry-run mode and replay cheap. Absolute-value writes are idempotent;
//! delta writes are not, so batch application is gated on the world's
//! `last_applied_event_id` watermark.

mod handlers;
mod resolve;

pub use resolve::{resolve_key, Resolution, Strategy};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::{Entity, EntityId};
use crate::error::{EffectError, LoomResult};
use crate::event::{ChronicleEvent, EventId};
use crate::storage::{EntityStore, EventStore};
use crate::world::WorldState;

/// Feedback from applying one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectResult {
    /// Entities whose records were rewritten.
    pub modified: Vec<EntityId>,

    /// Entities created by the event.
    pub created: Vec<EntityId>,

    /// Per-entity, non-fatal failures (typically unresolvable references).
    pub errors: Vec<String>,
}

impl EffectResult {
    /// Returns true if the event changed nothing and reported nothing.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.modified.is_empty() && self.created.is_empty() && self.errors.is_empty()
    }

    /// Folds another result into this one (batch summaries).
    pub fn absorb(&mut self, other: Self) {
        self.modified.extend(other.modified);
        self.created.extend(other.created);
        self.errors.extend(other.errors);
    }
}

/// A computed-but-uncommitted effect: full replacement records plus
/// per-entity errors.
#[derive(Debug, Clone, Default)]
pub struct PatchSet {
    writes: Vec<Entity>,
    creates: Vec<Entity>,
    errors: Vec<String>,
}

impl PatchSet {
    /// Creates an empty patch set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a replacement record for an existing entity.
    pub fn modify(&mut self, entity: Entity) {
        self.writes.push(entity);
    }

    /// Stages a new entity.
    pub fn create(&mut self, entity: Entity) {
        self.creates.push(entity);
    }

    /// Records a per-entity failure and moves on.
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// The staged replacement records.
    #[must_use]
    pub fn writes(&self) -> &[Entity] {
        &self.writes
    }

    /// Summarizes this patch set without committing it.
    #[must_use]
    pub fn to_result(&self) -> EffectResult {
        EffectResult {
            modified: self.writes.iter().map(|e| e.id.clone()).collect(),
            created: self.creates.iter().map(|e| e.id.clone()).collect(),
            errors: self.errors.clone(),
        }
    }
}

/// A pure effect handler: event + current store → patch set.
pub type Handler = fn(&ChronicleEvent, &dyn EntityStore) -> LoomResult<PatchSet>;

/// Registry mapping event types to handlers.
///
/// Events whose type has no registered handler are inert: most narrative
/// events carry no mechanical patch.
pub struct EffectEngine {
    handlers: HashMap<String, Handler>,
}

impl EffectEngine {
    /// Creates an engine with no handlers registered.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Creates an engine with the builtin handler set registered.
    #[must_use]
    pub fn new() -> Self {
        let mut engine = Self::empty();
        handlers::register_builtin(&mut engine);
        engine
    }

    /// Registers (or replaces) the handler for an event type.
    pub fn register(&mut self, event_type: impl Into<String>, handler: Handler) {
        self.handlers.insert(event_type.into(), handler);
    }

    /// Event types with a registered handler, sorted.
    #[must_use]
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Computes the patch an event would apply, without writing it.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn compute(
        &self,
        event: &ChronicleEvent,
        store: &dyn EntityStore,
    ) -> LoomResult<PatchSet> {
        match self.handlers.get(&event.event_type) {
            Some(handler) => handler(event, store),
            None => Ok(PatchSet::new()),
        }
    }

    /// Applies one event: computes its patch and commits it.
    ///
    /// Missing references are reported in [`EffectResult::errors`]; sibling
    /// patches in the same event still land, and nothing is rolled back.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn apply(
        &self,
        event: &ChronicleEvent,
        store: &dyn EntityStore,
    ) -> LoomResult<EffectResult> {
        let patch = self.compute(event, store)?;
        let result = patch.to_result();
        for entity in patch.creates {
            store.put(entity)?;
        }
        for entity in patch.writes {
            store.put(entity)?;
        }
        debug!(
            event = %event.id,
            modified = result.modified.len(),
            errors = result.errors.len(),
            "applied effects"
        );
        Ok(result)
    }

    /// Applies a single event by id, guarded by the watermark.
    ///
    /// The watermark advances only when this event is the next pending one;
    /// applying further ahead is allowed but leaves the watermark alone, and
    /// re-applying at or below it is rejected.
    ///
    /// # Errors
    ///
    /// [`EffectError::EventNotFound`] for an unknown id,
    /// [`EffectError::AlreadyApplied`] for an id at or below the watermark.
    pub fn apply_by_id(
        &self,
        id: EventId,
        events: &dyn EventStore,
        entities: &dyn EntityStore,
        world: &mut WorldState,
    ) -> LoomResult<EffectResult> {
        let event = events
            .get(id)?
            .ok_or(EffectError::EventNotFound { id })?;
        if id <= world.watermark() {
            return Err(EffectError::AlreadyApplied {
                id,
                watermark: world.watermark(),
            }
            .into());
        }
        let result = self.apply(&event, entities)?;
        if id == world.watermark().next() {
            world.last_applied_event_id = id.ordinal();
            world.touch();
        }
        Ok(result)
    }

    /// Applies every event above the watermark, in id order, advancing the
    /// watermark after each one. Running this twice in a row applies each
    /// event's deltas exactly once.
    ///
    /// Replaying a full chronicle against an empty store is this same call
    /// with a fresh `WorldState` cursor; determinism holds because handlers
    /// have no state beyond the store itself.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn apply_pending(
        &self,
        events: &dyn EventStore,
        entities: &dyn EntityStore,
        world: &mut WorldState,
    ) -> LoomResult<Vec<(EventId, EffectResult)>> {
        let mut applied = Vec::new();
        for event in events.snapshot()? {
            if event.id <= world.watermark() {
                continue;
            }
            let result = self.apply(&event, entities)?;
            world.last_applied_event_id = event.id.ordinal();
            applied.push((event.id, result));
        }
        if !applied.is_empty() {
            world.touch();
            debug!(count = applied.len(), watermark = world.last_applied_event_id, "batch apply");
        }
        Ok(applied)
    }
}

impl Default for EffectEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Digest of the full entity-store state.
///
/// Hashes every entity's canonical JSON in id order; two stores with the
/// same digest hold byte-identical state. Used to verify replay determinism.
///
/// # Errors
///
/// Propagates storage failures.
pub fn state_digest(store: &dyn EntityStore) -> LoomResult<String> {
    let mut hasher = blake3::Hasher::new();
    for id in store.ids()? {
        if let Some(entity) = store.get(&id)? {
            hasher.update(id.as_str().as_bytes());
            hasher.update(&[0]);
            let json = serde_json::to_vec(&entity)
                .map_err(|e| crate::error::LoomError::internal(format!("digest serialize: {e}")))?;
            hasher.update(&json);
            hasher.update(&[0]);
        }
    }
    Ok(hasher.finalize().to_hex().to_string())
}
