// 2025 Thomas Bicanic – MIT License
//
// Vector addition through the session API.

use bytemuck::{cast_slice, cast_slice_mut};
use cl_session::{AccessMode, DeviceKind, QueueOptions, Selector, Session};

#[cfg(feature = "memtrace")]
use cl_session::{Dir, flush_csv, start as trace_start};
#[cfg(feature = "metrics")]
use cl_session::metrics::summary;

const SRC: &str = include_str!("vec_add.cl");

fn main() -> cl_session::Result<()> {
    /* ---------- 1. Session ---------------------------------- */
    let session = Session::create(
        &Selector::new().kind(DeviceKind::Any),
        QueueOptions::default(),
    )?;
    println!("running on {}", session.profile().name);

    /* ---------- 2. Host data -------------------------------- */
    let n = 1 << 22;
    let size_bytes = n * std::mem::size_of::<f32>();
    let h_a = vec![1.0_f32; n];
    let h_b = vec![2.0_f32; n];
    let mut h_out = vec![0.0_f32; n];

    /* ---------- 3. Device buffers --------------------------- */
    #[cfg(feature = "memtrace")]
    let tok_h2d = trace_start(Dir::H2D, 2 * size_bytes);
    let a = session.alloc_from(cast_slice(&h_a), AccessMode::ReadOnly)?;
    let b = session.alloc_from(cast_slice(&h_b), AccessMode::ReadOnly)?;
    #[cfg(feature = "memtrace")]
    tok_h2d.finish();
    let out = session.alloc(size_bytes, AccessMode::WriteOnly)?.launch();

    /* ---------- 4. Kernel ----------------------------------- */
    #[cfg(feature = "memtrace")]
    let tok_kernel = trace_start(Dir::Kernel, 0);
    let kernel = session.build_kernel(SRC, "", "vec_add")?;
    let done = kernel
        .launch()
        .arg_buffer(0, &a)?
        .arg_buffer(1, &b)?
        .arg_buffer(2, &out)?
        .global(&[n])
        .enqueue(session.queue())?;
    let out = out.into_ready(done)?;
    #[cfg(feature = "memtrace")]
    tok_kernel.finish();

    /* ---------- 5. Device → host ---------------------------- */
    #[cfg(feature = "memtrace")]
    let tok_d2h = trace_start(Dir::D2H, size_bytes);
    let (read, guard) = out.enqueue_read(session.queue(), cast_slice_mut(&mut h_out))?;
    let out = read.into_ready(guard)?;
    #[cfg(feature = "memtrace")]
    tok_d2h.finish();

    /* ---------- 6. Verify ----------------------------------- */
    assert!(h_out.iter().all(|&x| (x - 3.0).abs() < 1e-6));
    println!("vec_add OK, first element = {}", h_out[0]);

    #[cfg(feature = "metrics")]
    summary();
    #[cfg(feature = "memtrace")]
    flush_csv("memtrace.csv").expect("write memtrace.csv");

    drop((a, b, out, kernel));
    session.close()
}
