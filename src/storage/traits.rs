//! Abstract storage traits.

use thiserror::Error;

use crate::entity::{Entity, EntityId, EntityKind};
use crate::event::{ChronicleEvent, EventId};

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// An id was appended out of order or reused.
    #[error("Event {id} does not extend the log (last id: {last})")]
    NonMonotonicAppend {
        /// The offending id.
        id: EventId,
        /// The current log head.
        last: EventId,
    },

    /// Backend failure.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// Storage contract for entities.
///
/// `put` is an upsert: entity mutation flows through the effect engine,
/// which writes whole replacement records. There is no delete.
pub trait EntityStore: Send + Sync {
    /// Inserts or replaces an entity.
    fn put(&self, entity: Entity) -> Result<(), StorageError>;

    /// Gets an entity by id.
    fn get(&self, id: &EntityId) -> Result<Option<Entity>, StorageError>;

    /// Returns true if the id is present.
    fn contains(&self, id: &EntityId) -> Result<bool, StorageError> {
        Ok(self.get(id)?.is_some())
    }

    /// All ids, in sorted order.
    fn ids(&self) -> Result<Vec<EntityId>, StorageError>;

    /// All entities of a kind, in id order.
    fn by_kind(&self, kind: EntityKind) -> Result<Vec<Entity>, StorageError>;

    /// Number of entities.
    fn len(&self) -> Result<usize, StorageError>;

    /// Returns true if the store holds no entities.
    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

/// Storage contract for chronicle events.
///
/// Append-only: there is no update and no delete, and appends must extend
/// the log with strictly increasing ids.
pub trait EventStore: Send + Sync {
    /// Appends an event. The id must be greater than every stored id.
    fn append(&self, event: ChronicleEvent) -> Result<(), StorageError>;

    /// Gets an event by id.
    fn get(&self, id: EventId) -> Result<Option<ChronicleEvent>, StorageError>;

    /// Returns true if the id is present.
    fn contains(&self, id: EventId) -> Result<bool, StorageError> {
        Ok(self.get(id)?.is_some())
    }

    /// The full log in append order.
    fn snapshot(&self) -> Result<Vec<ChronicleEvent>, StorageError>;

    /// The id at the head of the log, if any.
    fn last_id(&self) -> Result<Option<EventId>, StorageError>;

    /// Number of events.
    fn len(&self) -> Result<usize, StorageError>;

    /// Returns true if the log is empty.
    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}
