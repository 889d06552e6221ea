//! Builtin effect handlers.
//!
//! One handler per mechanically meaningful event type. Handlers never abort
//! a batch on a missing reference: the miss is recorded and the remaining
//! targets still patch. Every normalized write is clamped to [0, 1] before
//! storing, whatever the proposer supplied.

use crate::effect::resolve::resolve_key;
use crate::effect::{EffectEngine, PatchSet};
use crate::entity::{Entity, EntityId, EntityKind, NormalizedField};
use crate::error::LoomResult;
use crate::event::ChronicleEvent;
use crate::storage::EntityStore;

/// Registers the builtin handler table.
pub fn register_builtin(engine: &mut EffectEngine) {
    engine.register("battle.resolved", battle_resolved);
    engine.register("conflict.started", conflict_started);
    engine.register("conflict.ended", conflict_ended);
    engine.register("influence.changed", influence_changed);
    engine.register("control.changed", control_changed);
    engine.register("agent.killed", agent_killed);
    engine.register("agent.promoted", agent_promoted);
    engine.register("agent.defected", agent_defected);
    engine.register("infrastructure.completed", infrastructure_completed);
    engine.register("unrest.spike", unrest_spike);
}

/// The "at_war" state flag toggled by conflict events.
const AT_WAR: &str = "at_war";

fn battle_resolved(event: &ChronicleEvent, store: &dyn EntityStore) -> LoomResult<PatchSet> {
    let mut patch = PatchSet::new();
    let Some(losses) = event.data_object("losses") else {
        patch.error(format!("{}: battle.resolved carries no losses payload", event.id));
        return Ok(patch);
    };

    for (key, entry) in losses {
        let Some(strength_after) = entry.get("strength_after").and_then(|v| v.as_f64()) else {
            patch.error(format!("{}: losses['{key}'] has no strength_after", event.id));
            continue;
        };
        match resolve_key(key, EntityKind::Force, event, store)? {
            Some(resolution) => {
                if let Some(mut force) = store.get(&resolution.id)? {
                    force
                        .attrs
                        .set_normalized(NormalizedField::Strength, strength_after);
                    patch.modify(force);
                }
            }
            None => patch.error(format!("{}: could not resolve force '{key}'", event.id)),
        }
    }
    Ok(patch)
}

fn conflict_started(event: &ChronicleEvent, store: &dyn EntityStore) -> LoomResult<PatchSet> {
    toggle_war_state(event, store, true)
}

fn conflict_ended(event: &ChronicleEvent, store: &dyn EntityStore) -> LoomResult<PatchSet> {
    toggle_war_state(event, store, false)
}

fn toggle_war_state(
    event: &ChronicleEvent,
    store: &dyn EntityStore,
    at_war: bool,
) -> LoomResult<PatchSet> {
    let mut patch = PatchSet::new();
    let polities = polity_participants(event);
    if polities.is_empty() {
        patch.error(format!("{}: no polity participants", event.id));
        return Ok(patch);
    }

    for polity in polities {
        let presence_id = presence_for(polity, &event.location);
        match store.get(&presence_id)? {
            Some(mut presence) => {
                if at_war {
                    presence.attrs.add_state(AT_WAR);
                } else {
                    presence.attrs.remove_state(AT_WAR);
                }
                patch.modify(presence);
            }
            None => patch.error(format!("{}: presence {presence_id} not found", event.id)),
        }
    }
    Ok(patch)
}

fn influence_changed(event: &ChronicleEvent, store: &dyn EntityStore) -> LoomResult<PatchSet> {
    let mut patch = PatchSet::new();

    let new_value = event.data_f64("new_value");
    let delta = event.data_f64("delta");
    if new_value.is_none() && delta.is_none() {
        patch.error(format!(
            "{}: influence.changed carries neither new_value nor delta",
            event.id
        ));
        return Ok(patch);
    }

    // Presence participants are the targets; failing that, derive one
    // presence per polity participant from the event location.
    let mut targets: Vec<EntityId> = event
        .who
        .iter()
        .filter(|id| id.kind_prefix() == EntityKind::Presence.as_str())
        .cloned()
        .collect();
    if targets.is_empty() {
        targets = polity_participants(event)
            .into_iter()
            .map(|polity| presence_for(polity, &event.location))
            .collect();
    }
    if targets.is_empty() {
        patch.error(format!("{}: no presence or polity participants", event.id));
        return Ok(patch);
    }

    for target in targets {
        match store.get(&target)? {
            Some(mut presence) => {
                let next = new_value.unwrap_or_else(|| {
                    presence.attrs.influence.unwrap_or(0.0) + delta.unwrap_or(0.0)
                });
                presence.attrs.set_normalized(NormalizedField::Influence, next);
                patch.modify(presence);
            }
            None => patch.error(format!("{}: presence {target} not found", event.id)),
        }
    }
    Ok(patch)
}

fn control_changed(event: &ChronicleEvent, store: &dyn EntityStore) -> LoomResult<PatchSet> {
    let mut patch = PatchSet::new();
    let Some(new_controller) = event.data_str("new_controller") else {
        patch.error(format!("{}: control.changed carries no new_controller", event.id));
        return Ok(patch);
    };
    match store.get(&event.location)? {
        Some(mut place) => {
            place.attrs.owner_polity_id = Some(new_controller.to_string());
            patch.modify(place);
        }
        None => patch.error(format!("{}: location {} not found", event.id, event.location)),
    }
    Ok(patch)
}

fn agent_killed(event: &ChronicleEvent, store: &dyn EntityStore) -> LoomResult<PatchSet> {
    for_each_agent(event, store, |agent| {
        agent.attrs.status = Some("dead".to_string());
        agent.attrs.salience = Some(0.0);
    })
}

fn agent_promoted(event: &ChronicleEvent, store: &dyn EntityStore) -> LoomResult<PatchSet> {
    let Some(new_role) = event.data_str("new_role").map(String::from) else {
        return Ok(PatchSet::new());
    };
    for_each_agent(event, store, move |agent| {
        agent.attrs.role = Some(new_role.clone());
    })
}

fn agent_defected(event: &ChronicleEvent, store: &dyn EntityStore) -> LoomResult<PatchSet> {
    let Some(new_affiliation) = event.data_str("new_affiliation").map(String::from) else {
        return Ok(PatchSet::new());
    };
    for_each_agent(event, store, move |agent| {
        agent.attrs.affiliation = Some(new_affiliation.clone());
    })
}

fn infrastructure_completed(
    event: &ChronicleEvent,
    store: &dyn EntityStore,
) -> LoomResult<PatchSet> {
    let mut patch = PatchSet::new();
    let Some(kind) = event.data_str("infrastructure_type") else {
        patch.error(format!(
            "{}: infrastructure.completed carries no infrastructure_type",
            event.id
        ));
        return Ok(patch);
    };
    let level = event.data_f64("level").unwrap_or(1.0);
    match store.get(&event.location)? {
        Some(mut place) => {
            place.attrs.infrastructure.insert(kind.to_string(), level);
            patch.modify(place);
        }
        None => patch.error(format!("{}: location {} not found", event.id, event.location)),
    }
    Ok(patch)
}

fn unrest_spike(event: &ChronicleEvent, store: &dyn EntityStore) -> LoomResult<PatchSet> {
    let mut patch = PatchSet::new();
    let new_value = event.data_f64("new_value");
    let delta = event.data_f64("delta");
    if new_value.is_none() && delta.is_none() {
        patch.error(format!("{}: unrest.spike carries neither new_value nor delta", event.id));
        return Ok(patch);
    }
    match store.get(&event.location)? {
        Some(mut place) => {
            let next = new_value
                .unwrap_or_else(|| place.attrs.unrest.unwrap_or(0.0) + delta.unwrap_or(0.0));
            place.attrs.set_normalized(NormalizedField::Unrest, next);
            patch.modify(place);
        }
        None => patch.error(format!("{}: location {} not found", event.id, event.location)),
    }
    Ok(patch)
}

fn polity_participants(event: &ChronicleEvent) -> Vec<&EntityId> {
    event
        .who
        .iter()
        .filter(|id| id.kind_prefix() == EntityKind::Polity.as_str())
        .collect()
}

fn presence_for(polity: &EntityId, location: &EntityId) -> EntityId {
    EntityId::compose(
        EntityKind::Presence,
        &format!("{}.{}", polity.slug(), location.slug()),
    )
}

fn for_each_agent(
    event: &ChronicleEvent,
    store: &dyn EntityStore,
    mut mutate: impl FnMut(&mut Entity),
) -> LoomResult<PatchSet> {
    let mut patch = PatchSet::new();
    let mut any = false;
    for id in &event.who {
        if id.kind_prefix() != EntityKind::Agent.as_str() {
            continue;
        }
        any = true;
        match store.get(id)? {
            Some(mut agent) => {
                mutate(&mut agent);
                patch.modify(agent);
            }
            None => patch.error(format!("{}: agent {id} not found", event.id)),
        }
    }
    if !any {
        patch.error(format!("{}: no agent participants", event.id));
    }
    Ok(patch)
}
