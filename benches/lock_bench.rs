//! Benchmarks for the lease mutex protocol.
//!
//! Benchmarks cover:
//! - Uncontended lock/unlock round trips
//! - Create-and-lock for fresh identities
//! - Contended locking with a full retry budget
//! - Repository take / put back cycles

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use docmutex::builders::build_repository;
use docmutex::config::{MutexConfig, RepositoryConfig};
use docmutex::core::{Entity, Identity, JsonCodec, MutexService};
use docmutex::infra::{DocumentLockStore, InMemoryCollection, InMemoryDatabase};

use tokio::runtime::Runtime;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct BenchEntity {
    id: u64,
    data: String,
}

impl Entity for BenchEntity {
    fn identity(&self) -> Identity {
        Identity::Int(i64::try_from(self.id).unwrap_or(i64::MAX))
    }
}

fn service(cfg: MutexConfig) -> MutexService<DocumentLockStore<InMemoryCollection>> {
    MutexService::new(
        DocumentLockStore::new(InMemoryCollection::new("mutexes_bench")),
        cfg,
    )
}

// ============================================================================
// Mutex Benchmarks
// ============================================================================

fn bench_uncontended_lock_unlock(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let svc = Arc::new(service(MutexConfig::default()));
    let id = Identity::from("hot");
    rt.block_on(async {
        svc.create_and_lock(&id).await.unwrap();
        svc.unlock_all(&[id.clone()]).await;
    });

    c.bench_function("uncontended_lock_unlock", |b| {
        b.to_async(&rt).iter(|| {
            let svc = Arc::clone(&svc);
            let id = id.clone();
            async move {
                let outcome = svc.lock(&id).await.unwrap();
                svc.unlock_all(&[id]).await;
                black_box(outcome);
            }
        });
    });
}

fn bench_create_and_lock(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_and_lock");

    for size in [100_u64, 1_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let svc = service(MutexConfig::default());
                for i in 0..size {
                    let id = Identity::Int(i64::try_from(i).unwrap_or(i64::MAX));
                    black_box(svc.create_and_lock(&id).await.unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_contended_retry_budget(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_retry_budget");

    for retries in [0_u32, 30, 300] {
        let rt = Runtime::new().unwrap();
        let svc = Arc::new(service(
            MutexConfig::default().with_lock_retry_count(retries),
        ));
        let id = Identity::from("held");
        rt.block_on(async {
            svc.create_and_lock(&id).await.unwrap();
        });

        group.bench_with_input(BenchmarkId::from_parameter(retries), &retries, |b, _| {
            b.to_async(&rt).iter(|| {
                let svc = Arc::clone(&svc);
                let id = id.clone();
                async move { black_box(svc.lock(&id).await.unwrap()) }
            });
        });
    }
    group.finish();
}

// ============================================================================
// Repository Benchmarks
// ============================================================================

fn bench_take_put_back(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let db = InMemoryDatabase::new();
    let repo = Arc::new(
        build_repository(
            &RepositoryConfig::new("bench"),
            &db,
            JsonCodec::<BenchEntity>::new(),
        )
        .unwrap(),
    );
    rt.block_on(async {
        repo.put_if_absent(BenchEntity {
            id: 1,
            data: "payload".into(),
        })
        .await
        .unwrap();
    });

    c.bench_function("take_put_back", |b| {
        b.to_async(&rt).iter(|| {
            let repo = Arc::clone(&repo);
            async move {
                let held = repo.take(&Identity::Int(1)).await.unwrap().into_held();
                if let Some(entity) = held {
                    repo.put_back(&[entity]).await.unwrap();
                }
            }
        });
    });
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(
    mutex_benches,
    bench_uncontended_lock_unlock,
    bench_create_and_lock,
    bench_contended_retry_budget
);

criterion_group!(repository_benches, bench_take_put_back);

criterion_main!(mutex_benches, repository_benches);
