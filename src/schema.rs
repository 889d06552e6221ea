//! Entity schema validation.
//!
//! Validation is two-tiered. The structural tier checks required fields, the
//! closed kind set, and normalized numeric ranges; the semantic tier checks
//! id/kind agreement and the dotted shape of reference-named fields. All
//! violations are collected before returning; a record is never partially
//! accepted.
//!
//! Reference-shaped fields (`*_id`, `affiliation`, `location`, keys of a
//! `relationships` map) produce *warnings*, not errors, when they lack the
//! `type.slug` dotted shape: cross-type references are not resolved at this
//! layer, and the proposer routinely writes short keys.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::entity::{Entity, EntityKind, NormalizedField};
use crate::error::{SchemaError, SchemaWarning};

/// Dotted `type.slug` reference shape.
fn ref_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)+$").expect("static regex"))
}

/// A successfully validated entity plus any semantic warnings.
#[derive(Debug, Clone)]
pub struct ValidatedEntity {
    /// The typed entity, ready for the store.
    pub entity: Entity,
    /// Non-fatal reference-shape warnings.
    pub warnings: Vec<SchemaWarning>,
}

/// Validates a raw JSON record into a typed [`Entity`].
///
/// Unknown attribute keys are preserved verbatim; the proposer layer adds ad
/// hoc fields and rejecting them would lose information.
///
/// # Errors
///
/// Returns every violation found, not just the first.
pub fn validate(raw: &Value) -> Result<ValidatedEntity, Vec<SchemaError>> {
    let mut errors = Vec::new();

    let Some(obj) = raw.as_object() else {
        return Err(vec![SchemaError::WrongType {
            field: "$".to_string(),
            expected: "object",
        }]);
    };

    check_string_field(obj, "id", &mut errors);
    check_string_field(obj, "name", &mut errors);

    let kind = match obj.get("type") {
        None => {
            errors.push(SchemaError::MissingField {
                field: "type".to_string(),
            });
            None
        }
        Some(Value::String(s)) => {
            let kind = EntityKind::from_name(s);
            if kind.is_none() {
                errors.push(SchemaError::UnknownKind { kind: s.clone() });
            }
            kind
        }
        Some(_) => {
            errors.push(SchemaError::WrongType {
                field: "type".to_string(),
                expected: "string",
            });
            None
        }
    };

    if let Some(Value::String(id)) = obj.get("id") {
        if !id.split_once('.').is_some_and(|(p, s)| !p.is_empty() && !s.is_empty()) {
            errors.push(SchemaError::MalformedId { id: id.clone() });
        } else if let Some(kind) = kind {
            // Semantic tier: the id prefix must name the declared kind.
            let prefix = id.split('.').next().unwrap_or_default();
            if prefix != kind.as_str() {
                errors.push(SchemaError::KindMismatch {
                    id: id.clone(),
                    kind: kind.as_str().to_string(),
                });
            }
        }
    }

    if let Some(tags) = obj.get("tags") {
        match tags.as_array() {
            Some(items) if items.iter().all(Value::is_string) => {}
            _ => errors.push(SchemaError::WrongType {
                field: "tags".to_string(),
                expected: "array of strings",
            }),
        }
    }

    let mut warnings = Vec::new();
    match obj.get("attrs") {
        None => {}
        Some(Value::Object(attrs)) => {
            check_normalized_ranges(attrs, &mut errors);
            collect_reference_warnings(attrs, &mut warnings);
        }
        Some(_) => errors.push(SchemaError::WrongType {
            field: "attrs".to_string(),
            expected: "object",
        }),
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let entity: Entity = serde_json::from_value(raw.clone()).map_err(|e| {
        vec![SchemaError::WrongType {
            field: format!("$ ({e})"),
            expected: "entity record",
        }]
    })?;

    Ok(ValidatedEntity { entity, warnings })
}

fn check_string_field(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    errors: &mut Vec<SchemaError>,
) {
    match obj.get(field) {
        None => errors.push(SchemaError::MissingField {
            field: field.to_string(),
        }),
        Some(Value::String(s)) if !s.is_empty() => {}
        Some(Value::String(_)) => errors.push(SchemaError::MissingField {
            field: field.to_string(),
        }),
        Some(_) => errors.push(SchemaError::WrongType {
            field: field.to_string(),
            expected: "string",
        }),
    }
}

fn check_normalized_ranges(
    attrs: &serde_json::Map<String, Value>,
    errors: &mut Vec<SchemaError>,
) {
    for field in NormalizedField::ALL {
        let Some(value) = attrs.get(field.as_str()) else {
            continue;
        };
        match value.as_f64() {
            Some(v) if (0.0..=1.0).contains(&v) => {}
            Some(v) => errors.push(SchemaError::OutOfRange {
                field: field.as_str().to_string(),
                value: v,
            }),
            None => errors.push(SchemaError::WrongType {
                field: field.as_str().to_string(),
                expected: "number",
            }),
        }
    }
}

fn collect_reference_warnings(
    attrs: &serde_json::Map<String, Value>,
    warnings: &mut Vec<SchemaWarning>,
) {
    for (key, value) in attrs {
        if key == "relationships" {
            if let Some(rels) = value.as_object() {
                for rel_key in rels.keys() {
                    warn_if_undotted(&format!("relationships.{rel_key}"), rel_key, warnings);
                }
            }
            continue;
        }
        if !(key.ends_with("_id") || key == "affiliation" || key == "location") {
            continue;
        }
        if let Some(s) = value.as_str() {
            warn_if_undotted(key, s, warnings);
        }
    }
}

fn warn_if_undotted(field: &str, value: &str, warnings: &mut Vec<SchemaWarning>) {
    if !ref_shape().is_match(value) {
        warnings.push(SchemaWarning {
            field: field.to_string(),
            message: format!("value '{value}' does not look like a type.slug reference"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_presence() -> Value {
        json!({
            "id": "presence.redstar.north-march",
            "type": "presence",
            "name": "Redstar presence in the North March",
            "tags": ["military"],
            "attrs": {
                "influence": 0.55,
                "owner_polity_id": "polity.redstar",
                "garrison_notes": "two depleted brigades"
            }
        })
    }

    #[test]
    fn test_valid_record_roundtrips() {
        let raw = valid_presence();
        let validated = validate(&raw).unwrap();
        assert_eq!(validated.entity.id.as_str(), "presence.redstar.north-march");
        assert_eq!(validated.entity.attrs.influence, Some(0.55));
        assert!(validated.warnings.is_empty());

        // Serialize-then-validate yields the same record.
        let reserialized = serde_json::to_value(&validated.entity).unwrap();
        let again = validate(&reserialized).unwrap();
        assert_eq!(serde_json::to_value(&again.entity).unwrap(), reserialized);
    }

    #[test]
    fn test_missing_fields_all_collected() {
        let errs = validate(&json!({"attrs": {}})).unwrap_err();
        assert_eq!(errs.len(), 3);
        assert!(errs.iter().any(
            |e| matches!(e, SchemaError::MissingField { field } if field == "id")
        ));
        assert!(errs.iter().any(
            |e| matches!(e, SchemaError::MissingField { field } if field == "type")
        ));
        assert!(errs.iter().any(
            |e| matches!(e, SchemaError::MissingField { field } if field == "name")
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let errs = validate(&json!({
            "id": "starship.nebula",
            "type": "starship",
            "name": "Nebula"
        }))
        .unwrap_err();
        assert!(errs
            .iter()
            .any(|e| matches!(e, SchemaError::UnknownKind { kind } if kind == "starship")));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let errs = validate(&json!({
            "id": "region.north-march",
            "type": "presence",
            "name": "North March"
        }))
        .unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, SchemaError::KindMismatch { .. })));
    }

    #[test]
    fn test_normalized_range_enforced() {
        let mut raw = valid_presence();
        raw["attrs"]["influence"] = json!(1.4);
        let errs = validate(&raw).unwrap_err();
        assert!(errs.iter().any(|e| matches!(
            e,
            SchemaError::OutOfRange { field, .. } if field == "influence"
        )));
    }

    #[test]
    fn test_reference_shape_warns_not_errors() {
        let mut raw = valid_presence();
        raw["attrs"]["owner_polity_id"] = json!("redstar");
        let validated = validate(&raw).unwrap();
        assert_eq!(validated.warnings.len(), 1);
        assert_eq!(validated.warnings[0].field, "owner_polity_id");
    }

    #[test]
    fn test_relationship_keys_warn() {
        let mut raw = valid_presence();
        raw["attrs"]["relationships"] = json!({
            "polity.bluehelm": "rival",
            "vasquez": "patron"
        });
        let validated = validate(&raw).unwrap();
        assert_eq!(validated.warnings.len(), 1);
        assert_eq!(validated.warnings[0].field, "relationships.vasquez");
    }

    #[test]
    fn test_unknown_attrs_preserved() {
        let validated = validate(&valid_presence()).unwrap();
        assert_eq!(
            validated.entity.attrs.extra.get("garrison_notes"),
            Some(&json!("two depleted brigades"))
        );
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(validate(&json!("presence.redstar.north")).is_err());
    }
}
