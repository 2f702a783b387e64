#![no_main]
use libfuzzer_sys::fuzz_target;
use zimfile_rs::{Archive, ArticleSearch, ReaderConfig};

// Arbitrary bytes as an archive image: open must fail cleanly or yield an
// archive whose every accessor returns instead of panicking.
fuzz_target!(|data: &[u8]| {
    let config = ReaderConfig::default()
        .with_verify_checksum(false)
        .with_cluster_cache_bytes(1 << 20);
    let archive = match Archive::from_bytes_with_config(data.to_vec(), &config) {
        Ok(a) => a,
        Err(_) => return,
    };

    for dirent in archive.iter().take(256) {
        if let Ok(dirent) = dirent {
            let _ = archive.content(&dirent);
            let _ = archive.find_by_title(dirent.namespace(), dirent.title());
        }
    }
    let _ = archive.namespaces();
    let _ = archive.main_page();
    let _ = ArticleSearch::new(&archive).search_report("a");
});
