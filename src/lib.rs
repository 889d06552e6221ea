//! # Worldloom - the canonical substrate for LLM-driven synthetic worlds
//!
//! Worldloom is the engineering core under a synthetic-world generator whose
//! gameplay "engines" are prompted language-model personas. The personas
//! propose; this crate is what they write into and read from:
//!
//! - **Entity store**: schema-validated records forming the world graph
//! - **Chronicle**: an append-only, causally linked event log with a
//!   hierarchical time model for nested simulation scales
//! - **Effect engine**: deterministic application of events as bounded
//!   entity patches
//! - **Condition evaluator**: declarative victory/stalemate expressions
//! - **Location resolver**: read-only spatial enrichment
//!
//! The proposer itself is out of scope. Its persona data rides along as an
//! opaque `ai` block on entities, preserved but never interpreted here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use worldloom::{AppendBuilder, EntityId, LoomEngine, Operation, WorldContext};
//!
//! let ctx = Arc::new(WorldContext::in_memory());
//! let engine = LoomEngine::new(ctx);
//!
//! let draft = AppendBuilder::new()
//!     .event_type("battle.resolved")
//!     .location(EntityId::new("region.north-march")?)
//!     .participant(EntityId::new("force.red")?)
//!     .t_world(1203.0)
//!     .build()?;
//! engine.execute(Operation::Append { draft, dry_run: false })?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod chronicle;
pub mod condition;
pub mod context;
pub mod effect;
pub mod engine;
pub mod entity;
pub mod error;
pub mod event;
pub mod location;
pub mod ops;
pub mod queue;
pub mod scenario;
pub mod schema;
pub mod storage;
pub mod world;

// Re-export primary types at crate root for convenience
pub use chronicle::{Chronicle, EventDraft, EventFilter};
pub use condition::{evaluate, parse, Evaluation, ParsedCondition};
pub use context::WorldContext;
pub use effect::{state_digest, EffectEngine, EffectResult, PatchSet};
pub use engine::{EngineResponse, LoomEngine, RunStatus};
pub use entity::{Attrs, Entity, EntityId, EntityKind, NormalizedField};
pub use error::{
    AppendError, EffectError, EvaluationError, FatalError, LoomError, LoomResult, SchemaError,
    SchemaWarning,
};
pub use event::{ChronicleEvent, EventId, TimeScale};
pub use location::{resolve_location, LocationFix};
pub use ops::{AppendBuilder, ApplyTarget, Operation};
pub use queue::AppendQueue;
pub use scenario::{Scenario, VictoryCondition};
pub use schema::{validate, ValidatedEntity};
pub use storage::{EntityStore, EventStore, InMemoryEntityStore, InMemoryEventStore, StorageError};
pub use world::{ActiveConflict, Opportunity, WorldState};
