//! In-memory storage backend.
//!
//! Thread-safe reference implementation of the storage traits, intended for
//! embedded worlds and tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use crate::entity::{Entity, EntityId, EntityKind};
use crate::event::{ChronicleEvent, EventId};
use crate::storage::traits::{EntityStore, EventStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct EntityState {
    by_id: BTreeMap<EntityId, Entity>,
    by_kind: HashMap<EntityKind, BTreeSet<EntityId>>,
}

/// In-memory entity store.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    state: RwLock<EntityState>,
}

impl InMemoryEntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for InMemoryEntityStore {
    fn put(&self, entity: Entity) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("entity put"))?;
        state
            .by_kind
            .entry(entity.kind)
            .or_default()
            .insert(entity.id.clone());
        state.by_id.insert(entity.id.clone(), entity);
        Ok(())
    }

    fn get(&self, id: &EntityId) -> Result<Option<Entity>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity get"))?;
        Ok(state.by_id.get(id).cloned())
    }

    fn ids(&self) -> Result<Vec<EntityId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity ids"))?;
        Ok(state.by_id.keys().cloned().collect())
    }

    fn by_kind(&self, kind: EntityKind) -> Result<Vec<Entity>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity by_kind"))?;
        let Some(ids) = state.by_kind.get(&kind) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| state.by_id.get(id).cloned())
            .collect())
    }

    fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity len"))?;
        Ok(state.by_id.len())
    }
}

#[derive(Debug, Default)]
struct EventState {
    log: Vec<ChronicleEvent>,
    by_id: HashMap<EventId, usize>,
}

/// In-memory append-only event store.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    state: RwLock<EventState>,
}

impl InMemoryEventStore {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, event: ChronicleEvent) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("event append"))?;
        if let Some(last) = state.log.last() {
            if event.id <= last.id {
                return Err(StorageError::NonMonotonicAppend {
                    id: event.id,
                    last: last.id,
                });
            }
        }
        let idx = state.log.len();
        state.by_id.insert(event.id, idx);
        state.log.push(event);
        Ok(())
    }

    fn get(&self, id: EventId) -> Result<Option<ChronicleEvent>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("event get"))?;
        Ok(state.by_id.get(&id).map(|&idx| state.log[idx].clone()))
    }

    fn snapshot(&self) -> Result<Vec<ChronicleEvent>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("event snapshot"))?;
        Ok(state.log.clone())
    }

    fn last_id(&self) -> Result<Option<EventId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("event last_id"))?;
        Ok(state.log.last().map(|e| e.id))
    }

    fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("event len"))?;
        Ok(state.log.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;

    fn event(id: u64) -> ChronicleEvent {
        ChronicleEvent {
            id: EventId::new(id),
            t_world: id as f64,
            t_scale: None,
            t_parent: None,
            t_depth: 0,
            t_stream: None,
            event_type: "rumor.spread".to_string(),
            location: EntityId::new("locale.port-vane").unwrap(),
            who: vec![EntityId::new("agent.vasquez").unwrap()],
            data: serde_json::Map::new(),
            causes: Vec::new(),
            source: None,
            confidence: None,
            importance: None,
            narrative_summary: None,
        }
    }

    #[test]
    fn test_entity_put_get() {
        let store = InMemoryEntityStore::new();
        let entity = Entity::new(EntityKind::Polity, "redstar", "The Redstar Compact");
        store.put(entity.clone()).unwrap();

        let got = store.get(&entity.id).unwrap().unwrap();
        assert_eq!(got.name, "The Redstar Compact");
        assert!(store.contains(&entity.id).unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_entity_put_is_upsert() {
        let store = InMemoryEntityStore::new();
        let mut entity = Entity::new(EntityKind::Agent, "vasquez", "Mara Vasquez");
        store.put(entity.clone()).unwrap();
        entity.attrs.status = Some("dead".to_string());
        store.put(entity.clone()).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        let got = store.get(&entity.id).unwrap().unwrap();
        assert_eq!(got.attrs.status.as_deref(), Some("dead"));
    }

    #[test]
    fn test_entity_by_kind() {
        let store = InMemoryEntityStore::new();
        store
            .put(Entity::new(EntityKind::Polity, "redstar", "Redstar"))
            .unwrap();
        store
            .put(Entity::new(EntityKind::Polity, "bluehelm", "Bluehelm"))
            .unwrap();
        store
            .put(Entity::new(EntityKind::Agent, "vasquez", "Vasquez"))
            .unwrap();

        let polities = store.by_kind(EntityKind::Polity).unwrap();
        assert_eq!(polities.len(), 2);
        // id order
        assert_eq!(polities[0].id.as_str(), "polity.bluehelm");
        assert!(store.by_kind(EntityKind::Holding).unwrap().is_empty());
    }

    #[test]
    fn test_event_append_and_get() {
        let store = InMemoryEventStore::new();
        store.append(event(1)).unwrap();
        store.append(event(2)).unwrap();

        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.last_id().unwrap(), Some(EventId::new(2)));
        assert!(store.get(EventId::new(1)).unwrap().is_some());
        assert!(store.get(EventId::new(3)).unwrap().is_none());
    }

    #[test]
    fn test_event_append_rejects_reuse() {
        let store = InMemoryEventStore::new();
        store.append(event(1)).unwrap();
        let err = store.append(event(1)).unwrap_err();
        assert!(matches!(err, StorageError::NonMonotonicAppend { .. }));

        let err = store.append(event(0)).unwrap_err();
        assert!(matches!(err, StorageError::NonMonotonicAppend { .. }));
    }

    #[test]
    fn test_event_snapshot_preserves_order() {
        let store = InMemoryEventStore::new();
        for i in 1..=5 {
            store.append(event(i)).unwrap();
        }
        let snap = store.snapshot().unwrap();
        let ids: Vec<u64> = snap.iter().map(|e| e.id.ordinal()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }
}
