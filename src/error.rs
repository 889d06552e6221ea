//! Error types for worldloom.
//!
//! Each pipeline stage has its own strongly typed error enum, so callers can
//! pattern-match on the exact failure instead of parsing messages. The tiers
//! follow the pipeline: schema validation, chronicle append, effect
//! application, condition evaluation, and fatal world/scenario loading.

use thiserror::Error;

use crate::event::EventId;

/// Entity validation failures.
///
/// A raw record failing structural or semantic validation is rejected before
/// any store write; violations are collected, never applied partially.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Required field '{field}' is missing")]
    MissingField { field: String },

    #[error("Field '{field}' has the wrong type: expected {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("Unknown entity type '{kind}'")]
    UnknownKind { kind: String },

    #[error("Entity id '{id}' is not of the form type.slug")]
    MalformedId { id: String },

    #[error("Entity id '{id}' does not match declared type '{kind}'")]
    KindMismatch { id: String, kind: String },

    #[error("Normalized field '{field}' is {value}, outside [0.0, 1.0]")]
    OutOfRange { field: String, value: f64 },
}

/// Chronicle append failures.
///
/// The whole append is rejected; the log remains untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AppendError {
    #[error("Required field '{field}' is missing")]
    MissingField { field: String },

    #[error("Event must name at least one participant")]
    NoParticipants,

    #[error("Event type '{event_type}' is not of the form family.name")]
    MalformedType { event_type: String },

    #[error("Cause {cause} is not present in the chronicle")]
    UnknownCause { cause: EventId },

    #[error("Cause {cause} does not precede the event being appended")]
    ForwardCause { cause: EventId },

    #[error("Field '{field}' is {value}, outside [0.0, 1.0]")]
    ScalarOutOfRange { field: String, value: f64 },

    #[error("t_world must be a finite number")]
    NonFiniteTime,

    #[error("Append queue is saturated")]
    QueueSaturated,

    #[error("Append queue writer has shut down")]
    WriterGone,
}

/// Effect application failures.
///
/// Per-entity resolution misses are *not* errors at this level; they are
/// recorded in [`EffectResult::errors`](crate::effect::EffectResult) so one
/// bad reference cannot stall a tick. This enum covers failures of the
/// operation itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EffectError {
    #[error("Event {id} is not present in the chronicle")]
    EventNotFound { id: EventId },

    #[error("Event {id} was already applied (watermark at {watermark})")]
    AlreadyApplied { id: EventId, watermark: EventId },
}

/// Condition evaluation failures.
///
/// Term-level problems degrade to a false term and a trace entry; only an
/// expression the parser cannot make any sense of is an error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("Condition expression is empty")]
    EmptyExpression,

    #[error("Malformed 'for N ticks' suffix: {reason}")]
    MalformedSustainSuffix { reason: String },
}

/// Fatal world/scenario loading failures.
///
/// These abort the pipeline before any partial state is written.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("World not found at '{path}'")]
    WorldNotFound { path: String },

    #[error("Scenario '{name}' not found")]
    ScenarioNotFound { name: String },

    #[error("No active scenario is set for this world")]
    NoActiveScenario,

    #[error("Malformed world file '{path}': {reason}")]
    MalformedFile { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error type for worldloom operations.
#[derive(Debug, Error)]
pub enum LoomError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Append error: {0}")]
    Append(#[from] AppendError),

    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Fatal error: {0}")]
    Fatal(#[from] FatalError),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LoomError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error aborts the pipeline outright.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Returns true if the input was rejected by validation.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Schema(_) | Self::Append(_))
    }

    /// Process exit code for CLI-style callers. Every error maps to 1; the
    /// non-error codes live on [`RunStatus`](crate::engine::RunStatus).
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }
}

/// Result type alias for worldloom operations.
pub type LoomResult<T> = Result<T, LoomError>;

/// A non-fatal warning produced by semantic validation.
///
/// Reference-shaped fields that do not look like `type.slug` ids warn rather
/// than error, because cross-type references are not resolved at this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaWarning {
    /// The attribute or key that triggered the warning.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl std::fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
