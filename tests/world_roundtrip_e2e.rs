use std::sync::Arc;

use worldloom::{
    AppendBuilder, Entity, EntityId, EntityKind, FatalError, LoomEngine, Operation, Scenario,
    VictoryCondition, WorldContext,
};

fn seeded_context() -> Arc<WorldContext> {
    let ctx = Arc::new(WorldContext::in_memory());

    let mut polity = Entity::new(EntityKind::Polity, "redstar", "Redstar");
    polity.ai = Some(serde_json::json!({
        "persona": "expansionist",
        "version": 3,
        "prompt_seed": "cold, patient, territorial"
    }));
    ctx.entities().put(polity).unwrap();

    let mut locale = Entity::new(EntityKind::Locale, "port-vane", "Port Vane");
    locale.attrs.prosperity = Some(0.7);
    locale
        .attrs
        .extra
        .insert("founding_myth".to_string(), serde_json::json!("built on a wreck"));
    ctx.entities().put(locale).unwrap();

    ctx
}

#[test]
fn save_open_roundtrips_every_record_kind() {
    let ctx = seeded_context();
    let engine = LoomEngine::new(ctx.clone());

    engine
        .execute(Operation::Append {
            draft: AppendBuilder::new()
                .event_type("trade.opened")
                .location(EntityId::new("locale.port-vane").unwrap())
                .participant(EntityId::new("polity.redstar").unwrap())
                .t_world(1.0)
                .summary("Redstar opens the Port Vane route")
                .build()
                .unwrap(),
            dry_run: false,
        })
        .unwrap();
    ctx.set_scenario(Scenario {
        id: "trade-dominance".to_string(),
        name: "Trade Dominance".to_string(),
        victory_conditions: vec![VictoryCondition {
            id: "rich-port".to_string(),
            winner: EntityId::new("polity.redstar").unwrap(),
            expression: "locale.port-vane.prosperity >= 0.95".to_string(),
            description: None,
        }],
        stalemate_after_tick: None,
    })
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    ctx.save(dir.path()).unwrap();

    let reopened = WorldContext::open(dir.path()).unwrap();

    // World metadata survived.
    let world = reopened.world().unwrap();
    assert_eq!(world.last_event_id, 1);
    assert_eq!(world.active_scenario.as_deref(), Some("trade-dominance"));

    // The ai block and unknown attrs survived verbatim.
    let polity = reopened
        .entities()
        .get(&EntityId::new("polity.redstar").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(
        polity.ai.as_ref().unwrap()["prompt_seed"],
        "cold, patient, territorial"
    );
    let locale = reopened
        .entities()
        .get(&EntityId::new("locale.port-vane").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(
        locale.attrs.extra.get("founding_myth"),
        Some(&serde_json::json!("built on a wreck"))
    );

    // The chronicle is byte-identical at the JSON level.
    let original = serde_json::to_value(ctx.chronicle().store().snapshot().unwrap()).unwrap();
    let restored = serde_json::to_value(reopened.chronicle().store().snapshot().unwrap()).unwrap();
    assert_eq!(original, restored);

    // And saving the reopened world reproduces identical documents.
    let dir2 = tempfile::tempdir().unwrap();
    reopened.save(dir2.path()).unwrap();
    for file in ["entities.json", "chronicle.json"] {
        let a = std::fs::read(dir.path().join(file)).unwrap();
        let b = std::fs::read(dir2.path().join(file)).unwrap();
        assert_eq!(a, b, "{file} differs across save cycles");
    }
}

#[test]
fn missing_world_is_fatal_and_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("no-such-world");

    let err = WorldContext::open(&target).unwrap_err();
    assert!(matches!(err, FatalError::WorldNotFound { .. }));
    assert!(!target.exists(), "open created state on failure");
}

#[test]
fn corrupt_world_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("world.json"), b"{ not json").unwrap();

    let err = WorldContext::open(dir.path()).unwrap_err();
    assert!(matches!(err, FatalError::MalformedFile { .. }));
}

#[test]
fn named_but_missing_scenario_is_fatal() {
    let ctx = Arc::new(WorldContext::in_memory());
    ctx.update_world(|w| w.active_scenario = Some("ghost-scenario".to_string()))
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    ctx.save(dir.path()).unwrap();

    let err = WorldContext::open(dir.path()).unwrap_err();
    let FatalError::ScenarioNotFound { name } = err else {
        panic!("expected ScenarioNotFound, got {err:?}");
    };
    assert_eq!(name, "ghost-scenario");
}
