//! The chronicle: an append-only, causally linked event log.
//!
//! The chronicle is the single source of truth for *what happened*. It
//! infers nothing about current entity state; that is the effect engine's
//! job. Appends are validated as a whole and either land durably or not at
//! all, and `causes` may only cite strictly earlier events, so the causal
//! graph is acyclic by construction.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::EntityId;
use crate::error::{AppendError, LoomResult};
use crate::event::{ChronicleEvent, EventId, TimeScale};
use crate::storage::EventStore;
use crate::world::WorldState;

/// An event as submitted for append, before an id is allocated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Dotted `family.name` event type.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Where the event happens.
    #[serde(rename = "where")]
    pub location: EntityId,

    /// Ordered participants (at least one).
    pub who: Vec<EntityId>,

    /// World tick anchor; fractional values order within a tick.
    pub t_world: f64,

    /// Simulation resolution level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_scale: Option<TimeScale>,

    /// Drill-down trigger event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_parent: Option<EventId>,

    /// Drill-down nesting depth.
    #[serde(default)]
    pub t_depth: u32,

    /// Optional named sub-stream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_stream: Option<String>,

    /// Handler-specific payload.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,

    /// Earlier events this one follows from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<EventId>,

    /// Proposer identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Proposer certainty in [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Editorial weight in [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,

    /// One-line human summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative_summary: Option<String>,
}

/// Composable chronicle query.
///
/// All provided predicates must hold (logical AND). Results come back in
/// `t_world`-descending order, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Exact event type, or a `family.*` prefix pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// Event location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<EntityId>,

    /// Required participant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant: Option<EntityId>,

    /// Inclusive importance lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_importance: Option<f64>,

    /// Inclusive importance upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_importance: Option<f64>,

    /// Inclusive `t_world` lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_t_world: Option<f64>,

    /// Inclusive `t_world` upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_t_world: Option<f64>,

    /// Required simulation scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<TimeScale>,

    /// Required drill-down depth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,

    /// Only events cited as causes of this event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causes_of: Option<EventId>,

    /// Only events citing this event as a cause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<EventId>,

    /// Result-count limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl EventFilter {
    /// Creates an empty filter matching every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by exact type or `family.*` pattern.
    #[must_use]
    pub fn with_type(mut self, pattern: impl Into<String>) -> Self {
        self.event_type = Some(pattern.into());
        self
    }

    /// Filters by location.
    #[must_use]
    pub fn at(mut self, location: EntityId) -> Self {
        self.location = Some(location);
        self
    }

    /// Filters by participant membership.
    #[must_use]
    pub fn involving(mut self, participant: EntityId) -> Self {
        self.participant = Some(participant);
        self
    }

    /// Sets the inclusive importance lower bound.
    #[must_use]
    pub fn min_importance(mut self, min: f64) -> Self {
        self.min_importance = Some(min);
        self
    }

    /// Sets the inclusive `t_world` window.
    #[must_use]
    pub fn between_ticks(mut self, min: f64, max: f64) -> Self {
        self.min_t_world = Some(min);
        self.max_t_world = Some(max);
        self
    }

    /// Filters by simulation scale.
    #[must_use]
    pub fn at_scale(mut self, scale: TimeScale) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Filters by drill-down depth.
    #[must_use]
    pub fn at_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Caps the result count.
    #[must_use]
    pub fn take(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn type_matches(&self, event: &ChronicleEvent) -> bool {
        let Some(pattern) = &self.event_type else {
            return true;
        };
        pattern
            .strip_suffix(".*")
            .map_or(event.event_type == *pattern, |family| event.family() == family)
    }

    fn matches(&self, event: &ChronicleEvent, causes_of: Option<&HashSet<EventId>>) -> bool {
        if !self.type_matches(event) {
            return false;
        }
        if let Some(location) = &self.location {
            if event.location != *location {
                return false;
            }
        }
        if let Some(participant) = &self.participant {
            if !event.who.contains(participant) {
                return false;
            }
        }
        if self.min_importance.is_some() || self.max_importance.is_some() {
            // An event with no importance score never matches a bounded query.
            let Some(importance) = event.importance else {
                return false;
            };
            if self.min_importance.is_some_and(|min| importance < min)
                || self.max_importance.is_some_and(|max| importance > max)
            {
                return false;
            }
        }
        if self.min_t_world.is_some_and(|min| event.t_world < min)
            || self.max_t_world.is_some_and(|max| event.t_world > max)
        {
            return false;
        }
        if let Some(scale) = &self.scale {
            if event.t_scale.as_ref() != Some(scale) {
                return false;
            }
        }
        if self.depth.is_some_and(|depth| event.t_depth != depth) {
            return false;
        }
        if let Some(set) = causes_of {
            if !set.contains(&event.id) {
                return false;
            }
        }
        if let Some(effect) = self.caused_by {
            if !event.causes.contains(&effect) {
                return false;
            }
        }
        true
    }
}

/// The append-only event log.
#[derive(Clone)]
pub struct Chronicle {
    events: Arc<dyn EventStore>,
}

impl Chronicle {
    /// Creates a chronicle over an event store.
    #[must_use]
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    /// The underlying event store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.events
    }

    /// Validates a draft and formats the event it would append, without
    /// mutating the log or the id cursor. This is the dry-run path; `append`
    /// is `prepare` plus the durable write.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError`] when a required field is missing, the type is
    /// not `family.name`, or a cause is unknown or not strictly earlier.
    pub fn prepare(
        &self,
        draft: &EventDraft,
        world: &WorldState,
    ) -> LoomResult<ChronicleEvent> {
        let event_type = draft.event_type.trim();
        if event_type.is_empty() {
            return Err(AppendError::MissingField {
                field: "type".to_string(),
            }
            .into());
        }
        if !event_type
            .split_once('.')
            .is_some_and(|(f, n)| !f.is_empty() && !n.is_empty())
        {
            return Err(AppendError::MalformedType {
                event_type: event_type.to_string(),
            }
            .into());
        }
        if draft.who.is_empty() {
            return Err(AppendError::NoParticipants.into());
        }
        if !draft.t_world.is_finite() {
            return Err(AppendError::NonFiniteTime.into());
        }
        check_scalar("confidence", draft.confidence)?;
        check_scalar("importance", draft.importance)?;

        let next = world.next_event_id();
        for &cause in &draft.causes {
            if cause >= next {
                return Err(AppendError::ForwardCause { cause }.into());
            }
            if !self.events.contains(cause)? {
                return Err(AppendError::UnknownCause { cause }.into());
            }
        }

        Ok(ChronicleEvent {
            id: next,
            t_world: draft.t_world,
            t_scale: draft.t_scale.clone(),
            t_parent: draft.t_parent,
            t_depth: draft.t_depth,
            t_stream: draft.t_stream.clone(),
            event_type: event_type.to_string(),
            location: draft.location.clone(),
            who: draft.who.clone(),
            data: draft.data.clone(),
            causes: draft.causes.clone(),
            source: draft.source.clone(),
            confidence: draft.confidence,
            importance: draft.importance,
            narrative_summary: draft.narrative_summary.clone(),
        })
    }

    /// Appends a draft, allocating the next id from the world cursor.
    ///
    /// On any validation failure the log and cursor are untouched.
    ///
    /// # Errors
    ///
    /// See [`Chronicle::prepare`].
    pub fn append(&self, draft: &EventDraft, world: &mut WorldState) -> LoomResult<EventId> {
        let event = self.prepare(draft, world)?;
        let id = event.id;
        let event_type = event.event_type.clone();
        self.events.append(event)?;
        let allocated = world.allocate_event_id();
        debug_assert_eq!(allocated, id);
        debug!(%id, %event_type, "appended chronicle event");
        Ok(id)
    }

    /// Runs a composable query; all provided predicates must hold.
    ///
    /// Results are ordered by `t_world` descending (id descending as the
    /// tiebreak), truncated to `filter.limit`.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn query(&self, filter: &EventFilter) -> LoomResult<Vec<ChronicleEvent>> {
        let causes_of: Option<HashSet<EventId>> = match filter.causes_of {
            None => None,
            Some(id) => Some(
                self.events
                    .get(id)?
                    .map(|e| e.causes.into_iter().collect())
                    .unwrap_or_default(),
            ),
        };

        let mut hits: Vec<ChronicleEvent> = self
            .events
            .snapshot()?
            .into_iter()
            .filter(|e| filter.matches(e, causes_of.as_ref()))
            .collect();

        hits.sort_by(|a, b| {
            b.t_world
                .partial_cmp(&a.t_world)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.id.cmp(&a.id))
        });

        if let Some(limit) = filter.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    /// Returns the transitive closure of events linked to `root` through
    /// `t_parent` or `causes`, in id order: the full drill-down session that
    /// grew out of the root. The root itself is included; an unknown root
    /// yields an empty result.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn tree(&self, root: EventId) -> LoomResult<Vec<ChronicleEvent>> {
        if !self.events.contains(root)? {
            return Ok(Vec::new());
        }

        let log = self.events.snapshot()?;
        let mut member: HashSet<EventId> = HashSet::from([root]);
        // Events only link backwards, so one forward pass over the id-ordered
        // log reaches a fixpoint.
        for event in &log {
            let linked = event.t_parent.is_some_and(|p| member.contains(&p))
                || event.causes.iter().any(|c| member.contains(c));
            if linked {
                member.insert(event.id);
            }
        }

        Ok(log.into_iter().filter(|e| member.contains(&e.id)).collect())
    }
}

fn check_scalar(field: &str, value: Option<f64>) -> Result<(), AppendError> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(AppendError::ScalarOutOfRange {
            field: field.to_string(),
            value: v,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoomError;
    use crate::storage::InMemoryEventStore;

    fn chronicle() -> Chronicle {
        Chronicle::new(Arc::new(InMemoryEventStore::new()))
    }

    fn draft(event_type: &str, t_world: f64) -> EventDraft {
        EventDraft {
            event_type: event_type.to_string(),
            location: EntityId::new("region.north-march").unwrap(),
            who: vec![EntityId::new("polity.redstar").unwrap()],
            t_world,
            t_scale: None,
            t_parent: None,
            t_depth: 0,
            t_stream: None,
            data: serde_json::Map::new(),
            causes: Vec::new(),
            source: None,
            confidence: None,
            importance: None,
            narrative_summary: None,
        }
    }

    #[test]
    fn test_append_allocates_sequential_ids() {
        let log = chronicle();
        let mut world = WorldState::new();

        let a = log.append(&draft("rumor.spread", 1.0), &mut world).unwrap();
        let b = log.append(&draft("rumor.spread", 2.0), &mut world).unwrap();
        assert_eq!(a, EventId::new(1));
        assert_eq!(b, EventId::new(2));
        assert_eq!(world.last_event_id, 2);
    }

    #[test]
    fn test_prepare_is_dry_run() {
        let log = chronicle();
        let mut world = WorldState::new();

        let preview = log.prepare(&draft("rumor.spread", 1.0), &world).unwrap();
        assert_eq!(preview.id, EventId::new(1));
        assert_eq!(world.last_event_id, 0);
        assert_eq!(log.store().len().unwrap(), 0);

        // The real append lands on the id the dry run previewed.
        let id = log.append(&draft("rumor.spread", 1.0), &mut world).unwrap();
        assert_eq!(id, preview.id);
    }

    #[test]
    fn test_append_rejects_malformed_type() {
        let log = chronicle();
        let mut world = WorldState::new();
        let err = log.append(&draft("battle", 1.0), &mut world).unwrap_err();
        assert!(matches!(
            err,
            LoomError::Append(AppendError::MalformedType { .. })
        ));
        assert_eq!(world.last_event_id, 0);
    }

    #[test]
    fn test_append_requires_participants() {
        let log = chronicle();
        let mut world = WorldState::new();
        let mut d = draft("battle.resolved", 1.0);
        d.who.clear();
        let err = log.append(&d, &mut world).unwrap_err();
        assert!(matches!(err, LoomError::Append(AppendError::NoParticipants)));
    }

    #[test]
    fn test_append_rejects_unknown_and_forward_causes() {
        let log = chronicle();
        let mut world = WorldState::new();
        log.append(&draft("rumor.spread", 1.0), &mut world).unwrap();

        // evt_1 exists but evt_5 does not; evt_5 is also not earlier than evt_2.
        let mut d = draft("rumor.spread", 2.0);
        d.causes = vec![EventId::new(5)];
        let err = log.append(&d, &mut world).unwrap_err();
        assert!(matches!(
            err,
            LoomError::Append(AppendError::ForwardCause { .. })
        ));

        // Self-reference: the id the draft would get.
        let mut d = draft("rumor.spread", 2.0);
        d.causes = vec![EventId::new(2)];
        let err = log.append(&d, &mut world).unwrap_err();
        assert!(matches!(
            err,
            LoomError::Append(AppendError::ForwardCause { .. })
        ));

        let mut d = draft("rumor.spread", 2.0);
        d.causes = vec![EventId::new(1)];
        assert!(log.append(&d, &mut world).is_ok());
    }

    #[test]
    fn test_append_rejects_out_of_range_scalars() {
        let log = chronicle();
        let mut world = WorldState::new();
        let mut d = draft("rumor.spread", 1.0);
        d.importance = Some(1.2);
        let err = log.append(&d, &mut world).unwrap_err();
        assert!(matches!(
            err,
            LoomError::Append(AppendError::ScalarOutOfRange { .. })
        ));
    }

    #[test]
    fn test_append_only_law() {
        let log = chronicle();
        let mut world = WorldState::new();
        log.append(&draft("rumor.spread", 1.0), &mut world).unwrap();

        let before = serde_json::to_string(&log.store().get(EventId::new(1)).unwrap()).unwrap();
        log.append(&draft("battle.resolved", 2.0), &mut world).unwrap();
        let after = serde_json::to_string(&log.store().get(EventId::new(1)).unwrap()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_query_is_conjunctive() {
        let log = chronicle();
        let mut world = WorldState::new();

        let mut battle = draft("battle.resolved", 10.0);
        battle.importance = Some(0.9);
        log.append(&battle, &mut world).unwrap();

        let mut minor_battle = draft("battle.resolved", 11.0);
        minor_battle.importance = Some(0.2);
        log.append(&minor_battle, &mut world).unwrap();

        let mut rumor = draft("rumor.spread", 12.0);
        rumor.importance = Some(0.95);
        log.append(&rumor, &mut world).unwrap();

        // Each lone predicate matches two events; together they match one.
        let hits = log
            .query(
                &EventFilter::new()
                    .with_type("battle.resolved")
                    .min_importance(0.8),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, EventId::new(1));
    }

    #[test]
    fn test_query_family_prefix_and_order() {
        let log = chronicle();
        let mut world = WorldState::new();
        log.append(&draft("battle.joined", 5.0), &mut world).unwrap();
        log.append(&draft("battle.resolved", 9.0), &mut world).unwrap();
        log.append(&draft("rumor.spread", 7.0), &mut world).unwrap();

        let hits = log.query(&EventFilter::new().with_type("battle.*")).unwrap();
        let ids: Vec<u64> = hits.iter().map(|e| e.id.ordinal()).collect();
        // t_world descending
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_query_unscored_events_fail_importance_bounds() {
        let log = chronicle();
        let mut world = WorldState::new();
        log.append(&draft("rumor.spread", 1.0), &mut world).unwrap();

        assert!(log
            .query(&EventFilter::new().min_importance(0.0))
            .unwrap()
            .is_empty());
        assert_eq!(log.query(&EventFilter::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_query_causal_links() {
        let log = chronicle();
        let mut world = WorldState::new();
        log.append(&draft("border.incident", 1.0), &mut world).unwrap();
        let mut d = draft("conflict.started", 2.0);
        d.causes = vec![EventId::new(1)];
        log.append(&d, &mut world).unwrap();

        let causes = log
            .query(&EventFilter {
                causes_of: Some(EventId::new(2)),
                ..EventFilter::default()
            })
            .unwrap();
        assert_eq!(causes.len(), 1);
        assert_eq!(causes[0].id, EventId::new(1));

        let consequences = log
            .query(&EventFilter {
                caused_by: Some(EventId::new(1)),
                ..EventFilter::default()
            })
            .unwrap();
        assert_eq!(consequences.len(), 1);
        assert_eq!(consequences[0].id, EventId::new(2));
    }

    #[test]
    fn test_query_limit() {
        let log = chronicle();
        let mut world = WorldState::new();
        for i in 0..10 {
            log.append(&draft("rumor.spread", f64::from(i)), &mut world)
                .unwrap();
        }
        let hits = log.query(&EventFilter::new().take(3)).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].t_world, 9.0);
    }

    #[test]
    fn test_tree_reconstructs_drilldown() {
        let log = chronicle();
        let mut world = WorldState::new();

        // evt_1: the trigger. evt_2, evt_3: scene events under it.
        // evt_4: caused by evt_3. evt_5: unrelated.
        log.append(&draft("battle.joined", 1.0), &mut world).unwrap();

        let mut scene = draft("skirmish.opened", 1.1);
        scene.t_parent = Some(EventId::new(1));
        scene.t_depth = 1;
        log.append(&scene, &mut world).unwrap();

        let mut scene2 = draft("skirmish.flanked", 1.2);
        scene2.t_parent = Some(EventId::new(1));
        scene2.t_depth = 1;
        log.append(&scene2, &mut world).unwrap();

        let mut aftermath = draft("rout.begun", 1.3);
        aftermath.causes = vec![EventId::new(3)];
        log.append(&aftermath, &mut world).unwrap();

        log.append(&draft("rumor.spread", 2.0), &mut world).unwrap();

        let tree = log.tree(EventId::new(1)).unwrap();
        let ids: Vec<u64> = tree.iter().map(|e| e.id.ordinal()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        assert!(log.tree(EventId::new(99)).unwrap().is_empty());
    }
}
