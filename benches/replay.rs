use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use worldloom::{
    AppendBuilder, ApplyTarget, EffectEngine, Entity, EntityId, EntityKind, EntityStore,
    EventFilter, LoomEngine, Operation, WorldContext, WorldState,
};

const REGIONS: usize = 8;
const EVENTS_PER_REGION: u32 = 64;

fn seed(store: &dyn EntityStore) {
    for r in 0..REGIONS {
        store
            .put(Entity::new(
                EntityKind::Region,
                &format!("region-{r}"),
                format!("Region {r}"),
            ))
            .unwrap();
        let mut presence = Entity::new(
            EntityKind::Presence,
            &format!("redstar.region-{r}"),
            format!("Redstar in region {r}"),
        );
        presence.attrs.influence = Some(0.5);
        store.put(presence).unwrap();
    }
}

fn make_engine_with_log() -> LoomEngine {
    let ctx = Arc::new(WorldContext::in_memory());
    seed(ctx.entities().as_ref());
    let engine = LoomEngine::new(ctx);

    for r in 0..REGIONS {
        for i in 0..EVENTS_PER_REGION {
            let draft = AppendBuilder::new()
                .event_type("influence.changed")
                .location(EntityId::new(format!("region.region-{r}")).unwrap())
                .participant(EntityId::new(format!("presence.redstar.region-{r}")).unwrap())
                .t_world(f64::from(i))
                .data("delta", serde_json::json!(0.001))
                .importance(f64::from(i % 10) / 10.0)
                .build()
                .unwrap();
            engine
                .execute(Operation::Append {
                    draft,
                    dry_run: false,
                })
                .unwrap();
        }
    }
    engine
}

fn bench_batch_replay(c: &mut Criterion) {
    let engine = make_engine_with_log();
    let total = (REGIONS as u64) * u64::from(EVENTS_PER_REGION);

    let mut group = c.benchmark_group("replay");
    group.throughput(Throughput::Elements(total));
    group.bench_function("apply_pending_from_scratch", |b| {
        b.iter(|| {
            // Fresh store and cursor per iteration so every run replays the
            // whole chronicle.
            let fresh = worldloom::InMemoryEntityStore::new();
            seed(&fresh);
            let mut cursor = WorldState::new();
            cursor.last_event_id = total;

            let effects = EffectEngine::new();
            effects
                .apply_pending(
                    engine.context().chronicle().store().as_ref(),
                    &fresh,
                    &mut cursor,
                )
                .unwrap()
        });
    });
    group.finish();
}

fn bench_filtered_query(c: &mut Criterion) {
    let engine = make_engine_with_log();

    let mut group = c.benchmark_group("query");
    group.bench_function("type_and_importance", |b| {
        b.iter(|| {
            engine
                .execute(Operation::Query {
                    filter: EventFilter::new()
                        .with_type("influence.*")
                        .min_importance(0.8)
                        .take(50),
                })
                .unwrap()
        });
    });
    group.finish();
}

fn bench_dry_run_apply(c: &mut Criterion) {
    let engine = make_engine_with_log();

    let mut group = c.benchmark_group("dry_run");
    group.bench_function("preview_all_pending", |b| {
        b.iter(|| {
            engine
                .execute(Operation::ApplyEffects {
                    target: ApplyTarget::AllPending,
                    dry_run: true,
                })
                .unwrap()
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_batch_replay,
    bench_filtered_query,
    bench_dry_run_apply
);
criterion_main!(benches);
