//! The execution engine.
//!
//! A synchronous executor that applies [`Operation`]s against a
//! [`WorldContext`]: append, query, apply-effects, and victory check. All
//! work is sequential; nothing here suspends.

use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::condition;
use crate::context::WorldContext;
use crate::effect::{EffectEngine, EffectResult};
use crate::entity::EntityId;
use crate::error::{EffectError, FatalError, LoomResult};
use crate::event::{ChronicleEvent, EventId};
use crate::ops::{ApplyTarget, Operation};

/// Outcome of a victory check.
///
/// Serializes to the external report shape:
/// `{"continue": bool, "status": "...", "winner"?, "condition_id"?}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// No condition holds; the run continues.
    Running,
    /// A victory condition holds.
    Victory {
        /// The winning polity.
        winner: EntityId,
        /// The condition that fired.
        condition_id: String,
    },
    /// The stalemate horizon was reached with no winner.
    Stalemate,
}

impl RunStatus {
    /// Whether the orchestration loop should keep ticking.
    #[must_use]
    pub const fn should_continue(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Process exit code: 0 continue, 10 victory, 11 stalemate. Errors are
    /// 1, by way of [`LoomError::exit_code`](crate::error::LoomError).
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Running => 0,
            Self::Victory { .. } => 10,
            Self::Stalemate => 11,
        }
    }

    /// The wire name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Victory { .. } => "victory",
            Self::Stalemate => "stalemate",
        }
    }
}

impl Serialize for RunStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = match self {
            Self::Victory { .. } => 4,
            _ => 2,
        };
        let mut out = serializer.serialize_struct("RunStatus", fields)?;
        out.serialize_field("continue", &self.should_continue())?;
        out.serialize_field("status", self.as_str())?;
        if let Self::Victory {
            winner,
            condition_id,
        } = self
        {
            out.serialize_field("winner", winner)?;
            out.serialize_field("condition_id", condition_id)?;
        }
        out.end()
    }
}

/// Result of executing an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineResponse {
    /// Result of an append.
    Appended {
        /// The allocated event id.
        event_id: EventId,
    },

    /// Result of a dry-run append: the event that would have landed.
    AppendPreview {
        /// The formatted event, including the id it would take.
        event: ChronicleEvent,
    },

    /// Result of a query.
    Events {
        /// Matching events, newest first.
        events: Vec<ChronicleEvent>,
    },

    /// Result of applying effects.
    Effects {
        /// Per-event results, in application order.
        applied: Vec<(EventId, EffectResult)>,
    },

    /// Result of a dry-run apply: computed patches, nothing written.
    EffectsPreview {
        /// Per-event previews. For all-pending previews each patch is
        /// computed against the *current* store, so chained deltas are not
        /// composed.
        previewed: Vec<(EventId, EffectResult)>,
    },

    /// Result of a victory check.
    Victory {
        /// The run status.
        status: RunStatus,
    },
}

/// The worldloom execution engine.
#[derive(Clone)]
pub struct LoomEngine {
    ctx: Arc<WorldContext>,
    effects: Arc<EffectEngine>,
}

impl LoomEngine {
    /// Creates an engine over a context with the builtin effect handlers.
    #[must_use]
    pub fn new(ctx: Arc<WorldContext>) -> Self {
        Self::with_effects(ctx, EffectEngine::new())
    }

    /// Creates an engine with a custom effect registry.
    #[must_use]
    pub fn with_effects(ctx: Arc<WorldContext>, effects: EffectEngine) -> Self {
        Self {
            ctx,
            effects: Arc::new(effects),
        }
    }

    /// The context this engine executes against.
    #[must_use]
    pub fn context(&self) -> &Arc<WorldContext> {
        &self.ctx
    }

    /// Executes one operation.
    ///
    /// # Errors
    ///
    /// Validation errors for rejected appends, effect errors for bad apply
    /// targets, fatal errors for victory checks without a scenario, and
    /// storage failures throughout.
    pub fn execute(&self, operation: Operation) -> LoomResult<EngineResponse> {
        match operation {
            Operation::Append { draft, dry_run } => {
                if dry_run {
                    let world = self.ctx.world()?;
                    let event = self.ctx.chronicle().prepare(&draft, &world)?;
                    Ok(EngineResponse::AppendPreview { event })
                } else {
                    let event_id = self
                        .ctx
                        .update_world(|w| self.ctx.chronicle().append(&draft, w))??;
                    Ok(EngineResponse::Appended { event_id })
                }
            }

            Operation::Query { filter } => {
                let events = self.ctx.chronicle().query(&filter)?;
                Ok(EngineResponse::Events { events })
            }

            Operation::ApplyEffects { target, dry_run } => self.apply_effects(target, dry_run),

            Operation::CheckVictory => {
                let status = self.check_victory()?;
                Ok(EngineResponse::Victory { status })
            }
        }
    }

    fn apply_effects(&self, target: ApplyTarget, dry_run: bool) -> LoomResult<EngineResponse> {
        let entities = self.ctx.entities();
        let events = self.ctx.chronicle().store();

        if dry_run {
            let previewed = match target {
                ApplyTarget::Event(id) => {
                    let event = events.get(id)?.ok_or(EffectError::EventNotFound { id })?;
                    vec![(
                        id,
                        self.effects.compute(&event, entities.as_ref())?.to_result(),
                    )]
                }
                ApplyTarget::AllPending => {
                    let watermark = self.ctx.world()?.watermark();
                    let mut previewed = Vec::new();
                    for event in events.snapshot()? {
                        if event.id <= watermark {
                            continue;
                        }
                        let patch = self.effects.compute(&event, entities.as_ref())?;
                        previewed.push((event.id, patch.to_result()));
                    }
                    previewed
                }
            };
            return Ok(EngineResponse::EffectsPreview { previewed });
        }

        let applied = match target {
            ApplyTarget::Event(id) => {
                let result = self.ctx.update_world(|w| {
                    self.effects
                        .apply_by_id(id, events.as_ref(), entities.as_ref(), w)
                })??;
                vec![(id, result)]
            }
            ApplyTarget::AllPending => self.ctx.update_world(|w| {
                self.effects
                    .apply_pending(events.as_ref(), entities.as_ref(), w)
            })??,
        };
        Ok(EngineResponse::Effects { applied })
    }

    /// Checks the active scenario's victory conditions in order; the first
    /// that holds wins. With no winner, the stalemate horizon decides.
    ///
    /// # Errors
    ///
    /// [`FatalError::NoActiveScenario`] when the context carries no
    /// scenario; storage failures during evaluation.
    pub fn check_victory(&self) -> LoomResult<RunStatus> {
        let scenario = self.ctx.scenario()?.ok_or(FatalError::NoActiveScenario)?;
        let world = self.ctx.world()?;
        let entities = self.ctx.entities();

        for cond in &scenario.victory_conditions {
            let eval = condition::evaluate(&cond.expression, entities.as_ref(), &world)?;
            debug!(condition = %cond.id, result = eval.result, "victory condition");
            if eval.result {
                info!(condition = %cond.id, winner = %cond.winner, "victory");
                return Ok(RunStatus::Victory {
                    winner: cond.winner.clone(),
                    condition_id: cond.id.clone(),
                });
            }
        }

        if scenario.is_stalemated_at(world.tick) {
            info!(tick = world.tick, "stalemate");
            return Ok(RunStatus::Stalemate);
        }
        Ok(RunStatus::Running)
    }
}
