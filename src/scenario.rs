//! Scenario records: victory conditions and stalemate rules.
//!
//! A scenario declares, not hard-codes, how a run ends. Conditions are small
//! boolean expressions over entity attribute paths and the world tick,
//! evaluated by [`condition`](crate::condition).

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// A declarative end-of-run condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VictoryCondition {
    /// Stable condition id, reported back on victory.
    pub id: String,

    /// The polity declared the winner when this condition holds.
    pub winner: EntityId,

    /// The condition expression (see the evaluator grammar).
    pub expression: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A scenario governing a world run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Stable scenario id.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Conditions checked in order; the first that holds wins.
    #[serde(default)]
    pub victory_conditions: Vec<VictoryCondition>,

    /// Tick at which an undecided run is declared a stalemate. Worlds
    /// without a horizon run until a condition holds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stalemate_after_tick: Option<u64>,
}

impl Scenario {
    /// Returns true if the tick has reached the stalemate horizon.
    #[must_use]
    pub fn is_stalemated_at(&self, tick: u64) -> bool {
        self.stalemate_after_tick.is_some_and(|horizon| tick >= horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn border_war() -> Scenario {
        Scenario {
            id: "border-war".to_string(),
            name: "The Border War".to_string(),
            victory_conditions: vec![VictoryCondition {
                id: "red-dominance".to_string(),
                winner: EntityId::new("polity.redstar").unwrap(),
                expression: "presence.redstar.north-march.influence >= 0.9".to_string(),
                description: Some("Redstar dominates the North March".to_string()),
            }],
            stalemate_after_tick: Some(2000),
        }
    }

    #[test]
    fn test_stalemate_horizon() {
        let scenario = border_war();
        assert!(!scenario.is_stalemated_at(1999));
        assert!(scenario.is_stalemated_at(2000));
        assert!(scenario.is_stalemated_at(2500));
    }

    #[test]
    fn test_no_horizon_never_stalemates() {
        let mut scenario = border_war();
        scenario.stalemate_after_tick = None;
        assert!(!scenario.is_stalemated_at(u64::MAX));
    }

    #[test]
    fn test_scenario_roundtrip() {
        let scenario = border_war();
        let json = serde_json::to_string(&scenario).unwrap();
        let back: Scenario = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scenario);
    }
}
