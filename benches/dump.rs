#![feature(test)]
extern crate chunkdump;
extern crate tempdir;
extern crate test;
#[macro_use]
extern crate trackable;

use chunkdump::dump::DumpCoordinator;
use chunkdump::partition;
use chunkdump::registry::{Registry, RegistryBuilder};
use tempdir::TempDir;
use test::Bencher;

fn registry(chunks: usize, chunk_size: u64) -> Registry {
    let mut registry = track_try_unwrap!(RegistryBuilder::new().chunk_size(chunk_size).build());
    for _ in 0..chunks {
        track_try_unwrap!(registry.allocate());
    }
    registry
}

#[bench]
fn allocate_and_release_1mb(b: &mut Bencher) {
    let mut registry = registry(0, 1024 * 1024);
    b.iter(|| {
        track_try_unwrap!(registry.allocate());
        registry.release_all();
    });
}

#[bench]
fn assign_100_chunks_to_32_destinations(b: &mut Bencher) {
    let destinations = (0..32).map(|i| format!("dest{}", i)).collect::<Vec<_>>();
    b.iter(|| track_try_unwrap!(partition::assign(100, &destinations)));
}

#[bench]
fn file_dump_4mb_to_one_destination(b: &mut Bencher) {
    let dir = TempDir::new("chunkdump_bench").unwrap();
    let registry = registry(4, 1024 * 1024);
    let coordinator = DumpCoordinator::new();
    b.iter(|| track_try_unwrap!(coordinator.dump(&registry, &[dir.path()])));
}

#[bench]
fn file_dump_4mb_to_four_destinations(b: &mut Bencher) {
    let dir = TempDir::new("chunkdump_bench").unwrap();
    let destinations = (0..4)
        .map(|i| {
            let path = dir.path().join(i.to_string());
            std::fs::create_dir(&path).unwrap();
            path
        })
        .collect::<Vec<_>>();
    let registry = registry(4, 1024 * 1024);
    let coordinator = DumpCoordinator::new();
    b.iter(|| track_try_unwrap!(coordinator.dump(&registry, &destinations)));
}
