//! Chronicle event types and hierarchical time.
//!
//! Events are immutable facts. Once appended they are never updated or
//! deleted; consequence is expressed by later events citing earlier ones as
//! causes.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::entity::EntityId;

/// Monotonic chronicle event identifier.
///
/// Serialized as the token `evt_<n>`; ids are allocated by the single
/// writer from the world's `last_event_id` cursor and never reused.
///
/// # Examples
///
/// ```
/// use worldloom::EventId;
///
/// let id = EventId::new(42);
/// assert_eq!(id.to_string(), "evt_42");
/// assert_eq!(id.ordinal(), 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    /// Creates an event id from its ordinal.
    #[must_use]
    pub const fn new(ordinal: u64) -> Self {
        Self(ordinal)
    }

    /// The numeric ordinal inside the token.
    #[must_use]
    pub const fn ordinal(self) -> u64 {
        self.0
    }

    /// The id that would follow this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt_{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ordinal = s
            .strip_prefix("evt_")
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| format!("'{s}' is not an evt_<n> token"))?;
        Ok(Self(ordinal))
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// Simulation resolution level of an event.
///
/// Drill-downs nest finer scales under coarser ones; `t_parent`/`t_depth`
/// on the event record who triggered the nesting and how deep it goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeScale {
    /// Whole-setting sweep.
    Galactic,
    /// Region-by-region resolution.
    Continental,
    /// Settlement resolution.
    City,
    /// Moment-to-moment dramatic scenes.
    Scene,
    /// Single actions within a scene.
    Action,
    /// An application-defined scale.
    Custom(String),
}

impl TimeScale {
    /// The wire name of this scale.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Galactic => "galactic",
            Self::Continental => "continental",
            Self::City => "city",
            Self::Scene => "scene",
            Self::Action => "action",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for TimeScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(name) => write!(f, "custom:{name}"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// An immutable fact in the chronicle.
///
/// `causes` may only reference strictly earlier events, which keeps the
/// causal graph acyclic by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChronicleEvent {
    /// Monotonic id, assigned by the writer.
    pub id: EventId,

    /// Coarse world tick the event is anchored at. Fractional values order
    /// events within a tick.
    pub t_world: f64,

    /// Simulation resolution level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_scale: Option<TimeScale>,

    /// The event that triggered a drill-down into this scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_parent: Option<EventId>,

    /// Drill-down nesting depth; 0 is top level.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub t_depth: u32,

    /// Optional named sub-stream within a scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_stream: Option<String>,

    /// Dotted `family.name` event type.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Where the event happened.
    #[serde(rename = "where")]
    pub location: EntityId,

    /// Ordered participants. Order is significant for some handlers.
    pub who: Vec<EntityId>,

    /// Handler-specific payload.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,

    /// Earlier events this one is a consequence of.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<EventId>,

    /// Who proposed the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Proposer certainty, in [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Editorial weight, in [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,

    /// One-line human summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative_summary: Option<String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl ChronicleEvent {
    /// The family portion of the event type (before the first dot).
    #[must_use]
    pub fn family(&self) -> &str {
        self.event_type.split('.').next().unwrap_or_default()
    }

    /// Returns true if this event sits at the top simulation level.
    #[must_use]
    pub const fn is_top_level(&self) -> bool {
        self.t_depth == 0
    }

    /// Reads a numeric payload field.
    #[must_use]
    pub fn data_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Reads a string payload field.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// Reads an object payload field.
    #[must_use]
    pub fn data_object(&self, key: &str) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.data.get(key).and_then(serde_json::Value::as_object)
    }
}
