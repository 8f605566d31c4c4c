use std::sync::Arc;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use idgraph::{
    Entity, GroupRequest, IdentityConfig, IdentityStore, InMemStorage, MountInfo, Namespace,
    NamespaceId, StaticMounts, StaticNamespaces,
};

const USERPASS: &str = "auth_userpass_b2c31f";

fn make_store(storage: Arc<InMemStorage>) -> IdentityStore {
    let mounts = StaticMounts::new();
    mounts.register(MountInfo {
        accessor: USERPASS.to_string(),
        mount_type: "userpass".to_string(),
        path: "auth/userpass/".to_string(),
        local: false,
    });
    IdentityStore::new(
        storage,
        Arc::new(StaticNamespaces::new()),
        Arc::new(mounts),
        IdentityConfig::default(),
    )
    .unwrap()
}

fn seeded_store(logins: usize) -> IdentityStore {
    let store = make_store(Arc::new(InMemStorage::new()));
    store.load_artifacts().unwrap();
    let ns = Namespace::root();
    for i in 0..logins {
        store
            .create_or_fetch_entity(&ns, USERPASS, &format!("user-{i}"), None)
            .unwrap();
    }
    store
}

fn bench_login_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("login");
    group.throughput(Throughput::Elements(1));

    group.bench_function("fetch_existing", |b| {
        let store = seeded_store(1024);
        let ns = Namespace::root();
        b.iter(|| {
            store
                .create_or_fetch_entity(&ns, USERPASS, "user-512", None)
                .unwrap()
        });
    });

    group.bench_function("create_new", |b| {
        b.iter_custom(|iters| {
            // Fresh state per sample so the image does not grow across samples.
            let store = seeded_store(0);
            let ns = Namespace::root();

            let start = Instant::now();
            for i in 0..iters {
                store
                    .create_or_fetch_entity(&ns, USERPASS, &format!("bench-user-{i}"), None)
                    .unwrap();
            }
            start.elapsed()
        });
    });

    group.finish();
}

fn bench_policy_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("groups");
    group.throughput(Throughput::Elements(1));

    group.bench_function("policies_through_8_levels", |b| {
        let store = seeded_store(0);
        let ns = Namespace::root();
        let member = store
            .create_entity(&ns, Entity::new("bench-member", NamespaceId::root()))
            .unwrap();

        // A chain of nested groups with the member at the bottom.
        let mut child_id = None;
        for level in 0..8 {
            let outcome = store
                .update_group(
                    &ns,
                    GroupRequest {
                        name: Some(format!("level-{level}")),
                        policies: Some(vec![format!("policy-{level}")]),
                        member_entity_ids: (level == 0).then(|| vec![member.id]),
                        member_group_ids: child_id.map(|id| vec![id]),
                        ..GroupRequest::default()
                    },
                )
                .unwrap();
            child_id = Some(outcome.id);
        }

        b.iter(|| store.group_policies_by_entity(member.id));
    });

    group.finish();
}

fn bench_restore(c: &mut Criterion) {
    let mut group = c.benchmark_group("restore");

    let storage = Arc::new(InMemStorage::new());
    {
        let seeder = make_store(Arc::clone(&storage));
        seeder.load_artifacts().unwrap();
        let ns = Namespace::root();
        for i in 0..512 {
            seeder
                .create_or_fetch_entity(&ns, USERPASS, &format!("user-{i}"), None)
                .unwrap();
        }
    }

    group.throughput(Throughput::Elements(512));
    group.bench_function("load_512_entities", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let store = make_store(Arc::clone(&storage));
                store.load_artifacts().unwrap();
            }
            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(
    identity,
    bench_login_fetch,
    bench_policy_resolution,
    bench_restore
);
criterion_main!(identity);
