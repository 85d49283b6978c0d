// Host-to-device and device-to-host throughput over a range of
// transfer sizes.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::Rng;

use cl_session::{AccessMode, DeviceKind, QueueOptions, Selector, Session};

const SIZES: &[(&str, usize)] = &[
    ("64KiB", 64 * 1024),
    ("1MiB", 1024 * 1024),
    ("16MiB", 16 * 1024 * 1024),
];

fn bench_bandwidth(c: &mut Criterion) {
    let Ok(session) = Session::create(
        &Selector::new().kind(DeviceKind::Any),
        QueueOptions::default(),
    ) else {
        eprintln!("no OpenCL device, skipping bandwidth bench");
        return;
    };

    let mut rng = rand::thread_rng();

    let mut h2d = c.benchmark_group("h2d");
    for &(label, bytes) in SIZES {
        let host: Vec<u8> = (0..bytes).map(|_| rng.r#gen()).collect();
        h2d.throughput(Throughput::Bytes(bytes as u64));
        h2d.bench_function(label, |bench| {
            bench.iter(|| {
                let buf = session
                    .alloc(bytes, AccessMode::ReadWrite)
                    .expect("alloc")
                    .write(session.queue(), &host)
                    .expect("upload");
                drop(buf);
            });
        });
    }
    h2d.finish();

    let mut d2h = c.benchmark_group("d2h");
    for &(label, bytes) in SIZES {
        let host: Vec<u8> = (0..bytes).map(|_| rng.r#gen()).collect();
        let buf = session
            .alloc_from(&host, AccessMode::ReadWrite)
            .expect("alloc");
        let mut back = vec![0_u8; bytes];
        d2h.throughput(Throughput::Bytes(bytes as u64));
        d2h.bench_function(label, |bench| {
            bench.iter(|| {
                buf.read(session.queue(), &mut back).expect("download");
            });
        });
        drop(buf);
    }
    d2h.finish();
}

criterion_group!(benches, bench_bandwidth);
criterion_main!(benches);
