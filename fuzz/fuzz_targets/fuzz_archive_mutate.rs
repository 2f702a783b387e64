#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use zimfile_rs::{Archive, ArchiveBuilder, Compression, ReaderConfig};

#[derive(Arbitrary, Debug)]
struct Mutation {
    offset: u16,
    value: u8,
}

// Flip bytes inside a valid archive so the fuzzer explores damage past the
// header checks.
fuzz_target!(|mutations: Vec<Mutation>| {
    let mut bytes = match ArchiveBuilder::new()
        .compression(Compression::Zip)
        .blobs_per_cluster(2)
        .uuid([0; 16])
        .with_checksum(false)
        .add_article('A', "Cat", "", "text/html", b"meow".to_vec())
        .add_article('A', "Dog", "", "text/html", b"woof".to_vec())
        .add_redirect('A', "Kitty", "", 'A', "Cat")
        .add_article('M', "Title", "", "text/plain", b"Pets".to_vec())
        .build()
    {
        Ok(b) => b,
        Err(_) => return,
    };

    for m in mutations.iter().take(16) {
        let at = m.offset as usize % bytes.len();
        bytes[at] = m.value;
    }

    let config = ReaderConfig::default().with_verify_checksum(false);
    if let Ok(archive) = Archive::from_bytes_with_config(bytes, &config) {
        for dirent in archive.iter().flatten() {
            let _ = archive.content(&dirent);
        }
        let _ = archive.lookup('A', "Dog");
    }
});
