//! Benchmarks for title and URL lookups

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use zimfile_rs::{Archive, ArchiveBuilder, ArticleSearch, Compression, ReaderConfig};

fn build_archive(entries: usize, dirent_cache: usize) -> Archive {
    let mut builder = ArchiveBuilder::new()
        .compression(Compression::None)
        .blobs_per_cluster(64);
    for i in 0..entries {
        builder = builder.add_article(
            'A',
            format!("Article_{:06}", i),
            format!("Article {:06}", i),
            "text/html",
            Vec::new(),
        );
    }
    let config = ReaderConfig::default().with_dirent_cache_entries(dirent_cache);
    Archive::from_bytes_with_config(builder.build().unwrap(), &config).unwrap()
}

fn benchmark_find_by_title(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_by_title");

    for size in [1_000, 10_000, 100_000].iter() {
        let archive = build_archive(*size, 0);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut i = 0;
            b.iter(|| {
                let title = format!("Article {:06}", i % size);
                i += 7919;
                black_box(archive.find_by_title('A', &title).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_find_by_url_cached(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_by_url_cached");

    for size in [1_000, 10_000].iter() {
        let archive = build_archive(*size, 4096);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let url = format!("Article_{:06}", size / 2);
                black_box(archive.find_by_url('A', &url).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_search(c: &mut Criterion) {
    let archive = build_archive(10_000, 0);

    c.bench_function("search_10k_titles", |b| {
        b.iter(|| {
            let search = ArticleSearch::new(&archive);
            black_box(search.search(black_box("00042")).unwrap());
        });
    });
}

criterion_group!(
    benches,
    benchmark_find_by_title,
    benchmark_find_by_url_cached,
    benchmark_search
);
criterion_main!(benches);
