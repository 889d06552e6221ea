//! The explicit world context.
//!
//! Every operation takes a `WorldContext` constructed once by the caller; no
//! operation discovers an "active world" by searching the filesystem. This
//! keeps multi-world and test setups safe: there is no hidden global state.
//!
//! Persistence is plain JSON documents in a world directory:
//!
//! ```text
//! <world>/world.json          world metadata
//! <world>/entities.json       entity records
//! <world>/chronicle.json      the event log, in append order
//! <world>/scenarios/<name>.json
//! ```

use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::chronicle::Chronicle;
use crate::entity::Entity;
use crate::error::{FatalError, LoomError, LoomResult};
use crate::event::ChronicleEvent;
use crate::scenario::Scenario;
use crate::storage::{EntityStore, EventStore, InMemoryEntityStore, InMemoryEventStore};
use crate::world::WorldState;

/// A world instance: entity store, chronicle, metadata, and scenario.
///
/// Exactly one writer may own a context per world; readers may share it.
pub struct WorldContext {
    entities: Arc<dyn EntityStore>,
    chronicle: Chronicle,
    world: RwLock<WorldState>,
    scenario: RwLock<Option<Scenario>>,
}

impl std::fmt::Debug for WorldContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldContext").finish_non_exhaustive()
    }
}

impl WorldContext {
    /// Creates an empty in-memory world.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_parts(
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(InMemoryEventStore::new()),
            WorldState::new(),
        )
    }

    /// Assembles a context from explicit parts.
    #[must_use]
    pub fn from_parts(
        entities: Arc<dyn EntityStore>,
        events: Arc<dyn EventStore>,
        world: WorldState,
    ) -> Self {
        Self {
            entities,
            chronicle: Chronicle::new(events),
            world: RwLock::new(world),
            scenario: RwLock::new(None),
        }
    }

    /// Opens a world directory.
    ///
    /// Nothing is mutated on failure: the context either loads completely or
    /// not at all.
    ///
    /// # Errors
    ///
    /// [`FatalError::WorldNotFound`] when `world.json` is absent,
    /// [`FatalError::ScenarioNotFound`] when the active scenario's file is
    /// absent, and [`FatalError::MalformedFile`] for undecodable documents.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, FatalError> {
        let dir = dir.as_ref();
        let world_path = dir.join("world.json");
        if !world_path.is_file() {
            return Err(FatalError::WorldNotFound {
                path: dir.display().to_string(),
            });
        }
        let world: WorldState = read_json(&world_path)?;

        let entities = InMemoryEntityStore::new();
        let entities_path = dir.join("entities.json");
        if entities_path.is_file() {
            let records: Vec<Entity> = read_json(&entities_path)?;
            for entity in records {
                entities.put(entity).map_err(|e| FatalError::MalformedFile {
                    path: entities_path.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
        }

        let events = InMemoryEventStore::new();
        let chronicle_path = dir.join("chronicle.json");
        if chronicle_path.is_file() {
            let records: Vec<ChronicleEvent> = read_json(&chronicle_path)?;
            for event in records {
                events.append(event).map_err(|e| FatalError::MalformedFile {
                    path: chronicle_path.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
        }

        let scenario = match &world.active_scenario {
            None => None,
            Some(name) => {
                let path = dir.join("scenarios").join(format!("{name}.json"));
                if !path.is_file() {
                    return Err(FatalError::ScenarioNotFound { name: name.clone() });
                }
                Some(read_json::<Scenario>(&path)?)
            }
        };

        let ctx = Self::from_parts(Arc::new(entities), Arc::new(events), world);
        *ctx.scenario.write().expect("fresh lock") = scenario;
        Ok(ctx)
    }

    /// Writes the world directory layout.
    ///
    /// # Errors
    ///
    /// Propagates I/O and serialization failures.
    pub fn save(&self, dir: impl AsRef<Path>) -> LoomResult<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(FatalError::Io)?;

        write_json(&dir.join("world.json"), &self.world()?)?;

        let mut records = Vec::new();
        for id in self.entities.ids()? {
            if let Some(entity) = self.entities.get(&id)? {
                records.push(entity);
            }
        }
        write_json(&dir.join("entities.json"), &records)?;
        write_json(&dir.join("chronicle.json"), &self.chronicle.store().snapshot()?)?;

        if let Some(scenario) = self.scenario()? {
            let scenarios = dir.join("scenarios");
            fs::create_dir_all(&scenarios).map_err(FatalError::Io)?;
            write_json(&scenarios.join(format!("{}.json", scenario.id)), &scenario)?;
        }
        Ok(())
    }

    /// The entity store.
    #[must_use]
    pub fn entities(&self) -> &Arc<dyn EntityStore> {
        &self.entities
    }

    /// The chronicle.
    #[must_use]
    pub fn chronicle(&self) -> &Chronicle {
        &self.chronicle
    }

    /// A snapshot of the world metadata.
    ///
    /// # Errors
    ///
    /// Fails when the world lock is poisoned.
    pub fn world(&self) -> LoomResult<WorldState> {
        Ok(self
            .world
            .read()
            .map_err(|_| LoomError::internal("world lock poisoned"))?
            .clone())
    }

    /// Runs a closure with mutable access to the world metadata.
    ///
    /// # Errors
    ///
    /// Fails when the world lock is poisoned.
    pub fn update_world<R>(&self, f: impl FnOnce(&mut WorldState) -> R) -> LoomResult<R> {
        let mut world = self
            .world
            .write()
            .map_err(|_| LoomError::internal("world lock poisoned"))?;
        Ok(f(&mut world))
    }

    /// The loaded scenario, if any.
    ///
    /// # Errors
    ///
    /// Fails when the scenario lock is poisoned.
    pub fn scenario(&self) -> LoomResult<Option<Scenario>> {
        Ok(self
            .scenario
            .read()
            .map_err(|_| LoomError::internal("scenario lock poisoned"))?
            .clone())
    }

    /// Installs a scenario and marks it active in the world metadata.
    ///
    /// # Errors
    ///
    /// Fails when a lock is poisoned.
    pub fn set_scenario(&self, scenario: Scenario) -> LoomResult<()> {
        self.update_world(|w| {
            w.active_scenario = Some(scenario.id.clone());
            w.touch();
        })?;
        *self
            .scenario
            .write()
            .map_err(|_| LoomError::internal("scenario lock poisoned"))? = Some(scenario);
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, FatalError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| FatalError::MalformedFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> LoomResult<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| LoomError::internal(format!("serialize {}: {e}", path.display())))?;
    fs::write(path, json).map_err(FatalError::Io)?;
    Ok(())
}
