//! Entity types and identity.
//!
//! Entities are the nodes of the world graph. Without stable entity ids,
//! events cannot name participants, effects cannot find their targets, and
//! conditions cannot resolve attribute paths.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Clamps a value into [0.0, 1.0].
///
/// Every write to a normalized attribute goes through this, regardless of
/// what the proposer supplied.
#[must_use]
pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Stable, semantic entity identifier of the form `type.slug`.
///
/// The prefix (up to the first dot) names the entity kind; the slug may
/// itself contain dots for compound ids such as `presence.<polity>.<region>`.
///
/// # Examples
///
/// ```
/// use worldloom::EntityId;
///
/// let id = EntityId::new("polity.redstar").unwrap();
/// assert_eq!(id.kind_prefix(), "polity");
/// assert_eq!(id.slug(), "redstar");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an entity id, validating the `type.slug` shape.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MalformedId`] if the string has no dot or an
    /// empty prefix/slug.
    pub fn new(raw: impl Into<String>) -> Result<Self, SchemaError> {
        let raw = raw.into();
        match raw.split_once('.') {
            Some((prefix, slug)) if !prefix.is_empty() && !slug.is_empty() => Ok(Self(raw)),
            _ => Err(SchemaError::MalformedId { id: raw }),
        }
    }

    /// Composes an id from a kind and a slug. Always well-formed.
    #[must_use]
    pub fn compose(kind: EntityKind, slug: &str) -> Self {
        Self(format!("{}.{slug}", kind.as_str()))
    }

    /// The portion before the first dot, naming the entity kind.
    #[must_use]
    pub fn kind_prefix(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    /// The portion after the first dot (may itself contain dots).
    #[must_use]
    pub fn slug(&self) -> &str {
        self.0.split_once('.').map_or("", |(_, s)| s)
    }

    /// The full id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The closed set of entity kinds.
///
/// The set is fixed: proposers extend entities through open attributes, not
/// through new kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A sovereign faction or state.
    Polity,
    /// A coarse geographic division.
    Region,
    /// A polity's footprint in a region.
    Presence,
    /// A military or paramilitary formation.
    Force,
    /// A settlement-scale place.
    Locale,
    /// A terrain or environmental feature.
    Feature,
    /// A connection between places.
    Link,
    /// A point of interest within a locale.
    Site,
    /// A named character.
    Agent,
    /// An owned economic asset.
    Holding,
}

impl EntityKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Polity,
        Self::Region,
        Self::Presence,
        Self::Force,
        Self::Locale,
        Self::Feature,
        Self::Link,
        Self::Site,
        Self::Agent,
        Self::Holding,
    ];

    /// The lowercase wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Polity => "polity",
            Self::Region => "region",
            Self::Presence => "presence",
            Self::Force => "force",
            Self::Locale => "locale",
            Self::Feature => "feature",
            Self::Link => "link",
            Self::Site => "site",
            Self::Agent => "agent",
            Self::Holding => "holding",
        }
    }

    /// Parses a wire name into a kind.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The six numeric attributes declared normalized: always within [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizedField {
    /// Political sway of a presence.
    Influence,
    /// Combat capability of a force.
    Strength,
    /// Internal safety of a place.
    Security,
    /// Economic health of a place.
    Prosperity,
    /// Civil discontent of a place.
    Unrest,
    /// Environmental danger of a place.
    Hazard,
}

impl NormalizedField {
    /// All normalized fields.
    pub const ALL: [Self; 6] = [
        Self::Influence,
        Self::Strength,
        Self::Security,
        Self::Prosperity,
        Self::Unrest,
        Self::Hazard,
    ];

    /// The attribute name of this field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Influence => "influence",
            Self::Strength => "strength",
            Self::Security => "security",
            Self::Prosperity => "prosperity",
            Self::Unrest => "unrest",
            Self::Hazard => "hazard",
        }
    }

    /// Looks up a field by attribute name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

/// Entity attributes: a typed subset plus an open extension map.
///
/// The fields the invariants and builtin effect handlers touch are typed, so
/// range checks are enforced statically on the known subset; anything else a
/// proposer attaches round-trips verbatim through `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attrs {
    /// Political sway, normalized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub influence: Option<f64>,

    /// Combat capability, normalized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,

    /// Internal safety, normalized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<f64>,

    /// Economic health, normalized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prosperity: Option<f64>,

    /// Civil discontent, normalized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrest: Option<f64>,

    /// Environmental danger, normalized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hazard: Option<f64>,

    /// Lifecycle status. Entities are never deleted; terminal ones are
    /// marked (e.g. `"dead"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// An agent's current role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// An agent's polity affiliation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,

    /// Narrative prominence of an agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salience: Option<f64>,

    /// Controlling polity of a place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_polity_id: Option<String>,

    /// Active state flags (e.g. `"at_war"`) on a presence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states_active: Vec<String>,

    /// Built infrastructure levels by type.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub infrastructure: BTreeMap<String, f64>,

    /// Named relationships to other entities.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, String>,

    /// For location records: the entity this record locates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// For location records: the enclosing location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// For location records: the hierarchy level (`system`, `body`, `site`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Absolute coordinates, where defined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<[f64; 3]>,

    /// Orbital distance in AU, where defined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orbital_au: Option<f64>,

    /// Proposer-added attributes, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Attrs {
    /// Reads a normalized field.
    #[must_use]
    pub const fn normalized(&self, field: NormalizedField) -> Option<f64> {
        match field {
            NormalizedField::Influence => self.influence,
            NormalizedField::Strength => self.strength,
            NormalizedField::Security => self.security,
            NormalizedField::Prosperity => self.prosperity,
            NormalizedField::Unrest => self.unrest,
            NormalizedField::Hazard => self.hazard,
        }
    }

    /// Writes a normalized field, clamping into [0.0, 1.0].
    pub fn set_normalized(&mut self, field: NormalizedField, value: f64) {
        let v = Some(clamp01(value));
        match field {
            NormalizedField::Influence => self.influence = v,
            NormalizedField::Strength => self.strength = v,
            NormalizedField::Security => self.security = v,
            NormalizedField::Prosperity => self.prosperity = v,
            NormalizedField::Unrest => self.unrest = v,
            NormalizedField::Hazard => self.hazard = v,
        }
    }

    /// Adds a state flag if not already present.
    pub fn add_state(&mut self, state: impl Into<String>) {
        let state = state.into();
        if !self.states_active.contains(&state) {
            self.states_active.push(state);
        }
    }

    /// Removes a state flag if present.
    pub fn remove_state(&mut self, state: &str) {
        self.states_active.retain(|s| s != state);
    }

    /// Resolves a dotted attribute path to a JSON value.
    ///
    /// The first segment is tried against the typed fields, then against the
    /// extension map; deeper segments traverse nested JSON objects.
    #[must_use]
    pub fn lookup(&self, path: &[&str]) -> Option<serde_json::Value> {
        let (first, rest) = path.split_first()?;
        let head = self.known_field(first).or_else(|| self.extra.get(*first).cloned())?;
        let mut current = head;
        for segment in rest {
            current = current.as_object()?.get(*segment)?.clone();
        }
        Some(current)
    }

    fn known_field(&self, name: &str) -> Option<serde_json::Value> {
        use serde_json::json;

        if let Some(field) = NormalizedField::from_name(name) {
            return self.normalized(field).map(|v| json!(v));
        }
        match name {
            "status" => self.status.as_ref().map(|v| json!(v)),
            "role" => self.role.as_ref().map(|v| json!(v)),
            "affiliation" => self.affiliation.as_ref().map(|v| json!(v)),
            "salience" => self.salience.map(|v| json!(v)),
            "owner_polity_id" => self.owner_polity_id.as_ref().map(|v| json!(v)),
            "states_active" => (!self.states_active.is_empty()).then(|| json!(self.states_active)),
            "infrastructure" => {
                (!self.infrastructure.is_empty()).then(|| json!(self.infrastructure))
            }
            "relationships" => (!self.relationships.is_empty()).then(|| json!(self.relationships)),
            "entity_id" => self.entity_id.as_ref().map(|v| json!(v)),
            "parent_id" => self.parent_id.as_ref().map(|v| json!(v)),
            "level" => self.level.as_ref().map(|v| json!(v)),
            "coordinates" => self.coordinates.map(|v| json!(v)),
            "orbital_au" => self.orbital_au.map(|v| json!(v)),
            _ => None,
        }
    }
}

/// A node in the world graph.
///
/// Entities are created by the orchestration loop and mutated only through
/// the effect engine. There is no delete: terminal entities are marked via
/// `attrs.status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Stable semantic id; its prefix must equal `kind`.
    pub id: EntityId,

    /// The entity's kind, serialized as the external `type` field.
    #[serde(rename = "type")]
    pub kind: EntityKind,

    /// Display name.
    pub name: String,

    /// Free-form tags.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Typed-plus-open attribute map.
    #[serde(default)]
    pub attrs: Attrs,

    /// Opaque persona block for the external proposer. Preserved verbatim,
    /// never interpreted by this crate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai: Option<serde_json::Value>,
}

impl Entity {
    /// Creates an entity with an id composed from the kind and slug.
    #[must_use]
    pub fn new(kind: EntityKind, slug: &str, name: impl Into<String>) -> Self {
        Self {
            id: EntityId::compose(kind, slug),
            kind,
            name: name.into(),
            tags: BTreeSet::new(),
            attrs: Attrs::default(),
            ai: None,
        }
    }

    /// Returns true if the id prefix agrees with the declared kind.
    #[must_use]
    pub fn id_matches_kind(&self) -> bool {
        self.id.kind_prefix() == self.kind.as_str()
    }

    /// Returns true if this entity has been marked terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.attrs.status.as_deref() == Some("dead")
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl std::hash::Hash for Entity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
