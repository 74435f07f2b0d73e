use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use moldb_core::Identifier;
use moldb_store::{open_store, Backend, RecordStore, StoreConfig};

const RECORDS: usize = 50_000;

fn populate(store: &dyn RecordStore) -> Vec<Identifier> {
    let content = Bytes::from_static(b"3\n\nO 0.000 0.000 0.000\nH 0.757 0.586 0.000\nH -0.757 0.586 0.000\n");
    let pairs: Vec<_> = (0..RECORDS)
        .map(|i| {
            let id = Identifier::new(format!("InChI=1S/C{}H{}O/bench{i}", i % 40, i % 90)).unwrap();
            (id, content.clone())
        })
        .collect();
    store.put_many(&pairs).unwrap();
    pairs.into_iter().map(|(id, _)| id).collect()
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    for backend in [Backend::Lmdb, Backend::Sqlite] {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(backend, dir.path().join(format!("bench.{backend}")))
            .initial_map_size(256 * 1024 * 1024)
            .durable(false);
        let store = open_store(&config).unwrap();
        let ids = populate(store.as_ref());

        group.bench_function(BenchmarkId::from_parameter(backend), |b| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 7919) % ids.len();
                black_box(store.get(&ids[i]).unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_get);
criterion_main!(benches);
