use bytemuck::{cast_slice, cast_slice_mut};
use criterion::{Criterion, criterion_group, criterion_main};

use cl_session::{AccessMode, DeviceKind, QueueOptions, Selector, Session};

const SRC: &str = include_str!("../examples/vec_add.cl");

fn bench_vec_add(c: &mut Criterion) {
    let Ok(session) = Session::create(
        &Selector::new().kind(DeviceKind::Any),
        QueueOptions::default(),
    ) else {
        eprintln!("no OpenCL device, skipping vec_add bench");
        return;
    };
    let kernel = session.build_kernel(SRC, "", "vec_add").expect("build vec_add");

    let n = 1 << 20;
    let bytes = n * std::mem::size_of::<f32>();
    let h_a = vec![1.0_f32; n];
    let h_b = vec![2.0_f32; n];
    let mut h_out = vec![0.0_f32; n];

    let a = session
        .alloc_from(cast_slice(&h_a), AccessMode::ReadOnly)
        .expect("alloc a");
    let b = session
        .alloc_from(cast_slice(&h_b), AccessMode::ReadOnly)
        .expect("alloc b");

    c.bench_function("vec_add_4MiB", |bench| {
        bench.iter(|| {
            let out = session
                .alloc(bytes, AccessMode::WriteOnly)
                .expect("alloc out")
                .launch();
            let done = kernel
                .launch()
                .arg_buffer(0, &a)
                .expect("bind a")
                .arg_buffer(1, &b)
                .expect("bind b")
                .arg_buffer(2, &out)
                .expect("bind out")
                .global(&[n])
                .enqueue(session.queue())
                .expect("dispatch");
            let out = out.into_ready(done).expect("complete");
            out.read(session.queue(), cast_slice_mut(&mut h_out))
                .expect("read back");
            assert!((h_out[0] - 3.0).abs() < 1e-6);
        });
    });
}

criterion_group!(benches, bench_vec_add);
criterion_main!(benches);
