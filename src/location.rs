//! Location resolution.
//!
//! A read-only convenience that enriches event metadata for the proposer:
//! given an entity id, find its location record and walk the parent chain,
//! collecting the first system-, body-, and site-level names plus the
//! nearest coordinates and orbital distance. It has no effect-engine role.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::{Entity, EntityId, EntityKind};
use crate::error::LoomResult;
use crate::storage::EntityStore;

/// Parent-chain walks stop after this many hops even without a cycle.
const MAX_HOPS: usize = 64;

/// A resolved location: the names and figures gathered walking the chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// First system-level name encountered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// First body- or locale-level name encountered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// First site-level name encountered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Coordinates from the nearest ancestor that defines them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<[f64; 3]>,

    /// Orbital distance from the nearest ancestor that defines it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orbital_au: Option<f64>,

    /// The records walked, nearest first.
    pub chain: Vec<EntityId>,
}

/// Resolves the location of an entity.
///
/// The location record is found by direct id match, then by the
/// `locale.<slug>` convention, then by scanning for an `entity_id`
/// attribute equal to the queried id. Returns `None` when no record
/// matches.
///
/// # Errors
///
/// Propagates storage failures.
pub fn resolve_location(
    id: &EntityId,
    store: &dyn EntityStore,
) -> LoomResult<Option<LocationFix>> {
    let Some(record) = find_record(id, store)? else {
        debug!(%id, "no location record");
        return Ok(None);
    };

    let mut fix = LocationFix::default();
    let mut visited: HashSet<EntityId> = HashSet::new();
    let mut current = record;

    for _ in 0..MAX_HOPS {
        if !visited.insert(current.id.clone()) {
            debug!(%current.id, "location parent chain cycle");
            break;
        }
        fix.chain.push(current.id.clone());
        collect(&mut fix, &current);

        let Some(parent) = current.attrs.parent_id.clone() else {
            break;
        };
        let Ok(parent_id) = EntityId::new(parent) else {
            break;
        };
        match store.get(&parent_id)? {
            Some(next) => current = next,
            None => {
                debug!(%parent_id, "location parent missing");
                break;
            }
        }
    }

    Ok(Some(fix))
}

fn find_record(id: &EntityId, store: &dyn EntityStore) -> LoomResult<Option<Entity>> {
    if let Some(direct) = store.get(id)? {
        return Ok(Some(direct));
    }

    let conventional = EntityId::compose(EntityKind::Locale, id.slug());
    if let Some(entity) = store.get(&conventional)? {
        return Ok(Some(entity));
    }

    for candidate_id in store.ids()? {
        if let Some(candidate) = store.get(&candidate_id)? {
            if candidate.attrs.entity_id.as_deref() == Some(id.as_str()) {
                return Ok(Some(candidate));
            }
        }
    }
    Ok(None)
}

fn collect(fix: &mut LocationFix, entity: &Entity) {
    match level_of(entity) {
        Some(Level::System) if fix.system.is_none() => fix.system = Some(entity.name.clone()),
        Some(Level::Body) if fix.body.is_none() => fix.body = Some(entity.name.clone()),
        Some(Level::Site) if fix.site.is_none() => fix.site = Some(entity.name.clone()),
        _ => {}
    }
    if fix.coordinates.is_none() {
        fix.coordinates = entity.attrs.coordinates;
    }
    if fix.orbital_au.is_none() {
        fix.orbital_au = entity.attrs.orbital_au;
    }
}

enum Level {
    System,
    Body,
    Site,
}

fn level_of(entity: &Entity) -> Option<Level> {
    match entity.attrs.level.as_deref() {
        Some("system") => return Some(Level::System),
        Some("body" | "locale") => return Some(Level::Body),
        Some("site") => return Some(Level::Site),
        Some(_) => return None,
        None => {}
    }
    // Without an explicit level, the entity kind decides.
    match entity.kind {
        EntityKind::Site => Some(Level::Site),
        EntityKind::Locale => Some(Level::Body),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryEntityStore;

    fn seeded_store() -> InMemoryEntityStore {
        let store = InMemoryEntityStore::new();

        let mut system = Entity::new(EntityKind::Feature, "vane-system", "The Vane System");
        system.attrs.level = Some("system".to_string());
        system.attrs.coordinates = Some([120.0, -42.0, 7.5]);
        store.put(system).unwrap();

        let mut body = Entity::new(EntityKind::Locale, "port-vane", "Port Vane");
        body.attrs.level = Some("body".to_string());
        body.attrs.parent_id = Some("feature.vane-system".to_string());
        body.attrs.orbital_au = Some(1.3);
        store.put(body).unwrap();

        let mut site = Entity::new(EntityKind::Site, "vane-docks", "The Vane Docks");
        site.attrs.parent_id = Some("locale.port-vane".to_string());
        store.put(site).unwrap();

        store
    }

    #[test]
    fn test_direct_match_walks_chain() {
        let store = seeded_store();
        let fix = resolve_location(&EntityId::new("site.vane-docks").unwrap(), &store)
            .unwrap()
            .unwrap();
        assert_eq!(fix.site.as_deref(), Some("The Vane Docks"));
        assert_eq!(fix.body.as_deref(), Some("Port Vane"));
        assert_eq!(fix.system.as_deref(), Some("The Vane System"));
        assert_eq!(fix.orbital_au, Some(1.3));
        assert_eq!(fix.coordinates, Some([120.0, -42.0, 7.5]));
        assert_eq!(fix.chain.len(), 3);
    }

    #[test]
    fn test_locale_convention_fallback() {
        let store = seeded_store();
        // agent.port-vane has no record of its own; the locale.<slug>
        // convention finds locale.port-vane.
        let fix = resolve_location(&EntityId::new("agent.port-vane").unwrap(), &store)
            .unwrap()
            .unwrap();
        assert_eq!(fix.body.as_deref(), Some("Port Vane"));
        assert_eq!(fix.system.as_deref(), Some("The Vane System"));
    }

    #[test]
    fn test_entity_id_scan_fallback() {
        let store = seeded_store();
        let mut marker = Entity::new(EntityKind::Feature, "vasquez-berth", "Vasquez's Berth");
        marker.attrs.entity_id = Some("agent.vasquez".to_string());
        marker.attrs.parent_id = Some("locale.port-vane".to_string());
        store.put(marker).unwrap();

        let fix = resolve_location(&EntityId::new("agent.vasquez").unwrap(), &store)
            .unwrap()
            .unwrap();
        assert_eq!(fix.chain[0].as_str(), "feature.vasquez-berth");
        assert_eq!(fix.body.as_deref(), Some("Port Vane"));
    }

    #[test]
    fn test_missing_record() {
        let store = seeded_store();
        let fix = resolve_location(&EntityId::new("agent.nobody").unwrap(), &store).unwrap();
        assert!(fix.is_none());
    }

    #[test]
    fn test_cycle_stops() {
        let store = InMemoryEntityStore::new();
        let mut a = Entity::new(EntityKind::Locale, "a", "A");
        a.attrs.parent_id = Some("locale.b".to_string());
        store.put(a).unwrap();
        let mut b = Entity::new(EntityKind::Locale, "b", "B");
        b.attrs.parent_id = Some("locale.a".to_string());
        store.put(b).unwrap();

        let fix = resolve_location(&EntityId::new("locale.a").unwrap(), &store)
            .unwrap()
            .unwrap();
        assert_eq!(fix.chain.len(), 2);
    }

    #[test]
    fn test_missing_parent_stops() {
        let store = InMemoryEntityStore::new();
        let mut lonely = Entity::new(EntityKind::Locale, "drift", "The Drift");
        lonely.attrs.parent_id = Some("feature.gone".to_string());
        store.put(lonely).unwrap();

        let fix = resolve_location(&EntityId::new("locale.drift").unwrap(), &store)
            .unwrap()
            .unwrap();
        assert_eq!(fix.chain.len(), 1);
        assert_eq!(fix.body.as_deref(), Some("The Drift"));
    }
}
