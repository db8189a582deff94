//! Benchmarks for volume-walker
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fs;
use tempfile::tempdir;

/// Build one `linux_dirent64` record, padded to 8 bytes
fn dirent_record(inode: u64, name: &str, d_type: u8) -> Vec<u8> {
    let reclen = (19 + name.len() + 1 + 7) & !7;
    let mut rec = Vec::with_capacity(reclen);
    rec.extend_from_slice(&inode.to_ne_bytes());
    rec.extend_from_slice(&0i64.to_ne_bytes());
    rec.extend_from_slice(&(reclen as u16).to_ne_bytes());
    rec.push(d_type);
    rec.extend_from_slice(name.as_bytes());
    rec.resize(reclen, 0);
    rec
}

fn benchmark_dirent_decode(c: &mut Criterion) {
    use volume_walker::storage::dirent::DirentDecoder;

    let mut buf = Vec::new();
    for i in 0..1000u64 {
        let d_type = if i % 3 == 0 { 4 } else { 8 };
        buf.extend(dirent_record(i + 1, &format!("object-{:06}", i), d_type));
    }

    c.bench_function("dirent_decode_1000", |b| {
        b.iter(|| {
            let count = DirentDecoder::new(black_box(&buf))
                .filter_map(Result::ok)
                .count();
            black_box(count);
        })
    });
}

fn benchmark_walk(c: &mut Criterion) {
    use volume_walker::walker::{CountingSink, DiskWalker, WalkDirOptions};

    let disk = tempdir().unwrap();
    let bucket = disk.path().join("bucket");
    for p in 0..20 {
        for o in 0..50 {
            let dir = bucket.join(format!("prefix-{:02}/object-{:03}", p, o));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("xl.meta"), b"XL2 \x01\x00\x03\x00payload").unwrap();
        }
    }

    let walker = DiskWalker::new(disk.path());
    let opts = WalkDirOptions::new("bucket").recursive(true);

    c.bench_function("walk_1000_objects", |b| {
        b.iter(|| {
            let mut sink = CountingSink::default();
            walker.walk_dir(&opts, &mut sink).unwrap();
            black_box(sink.count);
        })
    });
}

criterion_group!(benches, benchmark_dirent_decode, benchmark_walk);
criterion_main!(benches);
