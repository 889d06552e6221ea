//! Participant resolution for effect handlers.
//!
//! Event payloads often name targets by short key (`"red"`) rather than full
//! id (`"force.red"`). Resolution tries an explicit strategy list in a fixed
//! order and logs which strategy matched, so the behavior is auditable
//! rather than implicit string guessing.

use std::fmt;

use tracing::debug;

use crate::entity::{EntityId, EntityKind};
use crate::error::LoomResult;
use crate::event::ChronicleEvent;
use crate::storage::EntityStore;

/// The resolution strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// The key is itself a full id present in the store.
    ExactId,
    /// A `who` entry whose slug (or trailing slug segment) equals the key.
    WhoSuffix,
    /// A constructed `kind.key` id present in the store.
    ConstructedId,
    /// A `who` entry containing the key as a substring.
    WhoSubstring,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExactId => "exact_id",
            Self::WhoSuffix => "who_suffix",
            Self::ConstructedId => "constructed_id",
            Self::WhoSubstring => "who_substring",
        };
        write!(f, "{name}")
    }
}

/// A successful resolution: the entity id and the strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The resolved entity id.
    pub id: EntityId,
    /// Which strategy matched.
    pub strategy: Strategy,
}

/// Resolves a payload key to an entity id.
///
/// Tries, in order: the key as a full id, the key against each `who` entry
/// (order-preserving), a constructed `kind.key` id, and finally a substring
/// scan over `who`. Every candidate must actually exist in the store.
///
/// # Errors
///
/// Propagates storage failures.
pub fn resolve_key(
    key: &str,
    kind: EntityKind,
    event: &ChronicleEvent,
    store: &dyn EntityStore,
) -> LoomResult<Option<Resolution>> {
    if let Ok(id) = EntityId::new(key) {
        if store.contains(&id)? {
            return found(key, id, Strategy::ExactId);
        }
    }

    for entry in &event.who {
        let slug = entry.slug();
        let tail = slug.rsplit('.').next().unwrap_or(slug);
        if (slug == key || tail == key) && store.contains(entry)? {
            return found(key, entry.clone(), Strategy::WhoSuffix);
        }
    }

    let constructed = EntityId::compose(kind, key);
    if store.contains(&constructed)? {
        return found(key, constructed, Strategy::ConstructedId);
    }

    for entry in &event.who {
        if entry.as_str().contains(key) && store.contains(entry)? {
            return found(key, entry.clone(), Strategy::WhoSubstring);
        }
    }

    debug!(key, event = %event.id, "participant resolution failed");
    Ok(None)
}

fn found(key: &str, id: EntityId, strategy: Strategy) -> LoomResult<Option<Resolution>> {
    debug!(key, %id, %strategy, "participant resolved");
    Ok(Some(Resolution { id, strategy }))
}
