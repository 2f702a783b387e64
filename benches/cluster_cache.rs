//! Benchmarks for blob reads with and without the cluster cache

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use zimfile_rs::{Archive, ArchiveBuilder, Compression, ReaderConfig};

const ARTICLES: usize = 2_048;
const PER_CLUSTER: usize = 32;

fn build_archive(compression: Compression, cache_bytes: usize) -> Archive {
    let mut builder = ArchiveBuilder::new()
        .compression(compression)
        .blobs_per_cluster(PER_CLUSTER);
    for i in 0..ARTICLES {
        let body = format!("<p>Article number {} with some filler text.</p>", i).repeat(20);
        builder = builder.add_article('A', format!("a{:05}", i), "", "text/html", body.into_bytes());
    }
    let config = ReaderConfig::default().with_cluster_cache_bytes(cache_bytes);
    Archive::from_bytes_with_config(builder.build().unwrap(), &config).unwrap()
}

fn benchmark_read_blob(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_blob");
    let clusters = (ARTICLES / PER_CLUSTER) as u32;

    for compression in [Compression::None, Compression::Zip, Compression::Zstd, Compression::Lzma] {
        for (label, cache) in [("cached", 64 << 20), ("uncached", 0)] {
            let archive = build_archive(compression, cache);
            let id = BenchmarkId::new(compression.name(), label);
            group.bench_function(id, |b| {
                let mut rng = rand::thread_rng();
                b.iter(|| {
                    let cluster = rng.gen_range(0..clusters);
                    let blob = rng.gen_range(0..PER_CLUSTER as u32);
                    black_box(archive.read_blob(cluster, blob).unwrap());
                });
            });
        }
    }

    group.finish();
}

fn benchmark_sequential_content(c: &mut Criterion) {
    let archive = build_archive(Compression::Zstd, 8 << 20);

    c.bench_function("iterate_and_read_all", |b| {
        b.iter(|| {
            let mut total = 0usize;
            for dirent in archive.iter() {
                total += archive.content(&dirent.unwrap()).unwrap().len();
            }
            black_box(total);
        });
    });
}

criterion_group!(benches, benchmark_read_blob, benchmark_sequential_content);
criterion_main!(benches);
