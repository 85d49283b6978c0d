// Event handling and per-command profiling: two kernels and two reads,
// timed through the queue's profiling counters.

use bytemuck::{cast_slice, cast_slice_mut};
use cl_session::{AccessMode, DeviceKind, EventTimings, QueueOptions, Selector, Session};

const SRC: &str = r#"
__kernel void vec_add(__global const float *a,
                      __global const float *b,
                      __global float *c)
{
    int gid = get_global_id(0);
    c[gid] = a[gid] + b[gid];
}

__kernel void vec_mul(__global const float *a,
                      __global const float *b,
                      __global float *c)
{
    int gid = get_global_id(0);
    c[gid] = a[gid] * b[gid];
}
"#;

fn main() -> cl_session::Result<()> {
    let session = Session::create(
        &Selector::new().kind(DeviceKind::Any),
        QueueOptions::default().profiling(true),
    )?;
    let queue = session.queue();

    let n = 1 << 20;
    let src: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let mut sum = vec![0.0_f32; n];
    let mut product = vec![0.0_f32; n];

    let a = session.alloc_from(cast_slice(&src), AccessMode::ReadOnly)?;
    let b = session.alloc_from(cast_slice(&src), AccessMode::ReadOnly)?;
    let dst0 = session
        .alloc(n * std::mem::size_of::<f32>(), AccessMode::ReadWrite)?
        .launch();
    let dst1 = session
        .alloc(n * std::mem::size_of::<f32>(), AccessMode::ReadWrite)?
        .launch();

    let add = session.build_kernel(SRC, "", "vec_add")?;
    let mul = session.build_kernel(SRC, "", "vec_mul")?;

    println!("enqueueing kernels...");
    let add_done = add
        .launch()
        .arg_buffer(0, &a)?
        .arg_buffer(1, &b)?
        .arg_buffer(2, &dst0)?
        .global(&[n])
        .enqueue(queue)?;
    let mul_done = mul
        .launch()
        .arg_buffer(0, &a)?
        .arg_buffer(1, &b)?
        .arg_buffer(2, &dst1)?
        .global(&[n])
        .enqueue(queue)?;

    println!("waiting for events...");
    session.finish()?;
    let t_add = add_done.timings()?;
    let t_mul = mul_done.timings()?;

    println!("enqueueing output reads...");
    let dst0 = dst0.into_ready(add_done)?;
    let dst1 = dst1.into_ready(mul_done)?;
    let (r0, read0) = dst0.enqueue_read(queue, cast_slice_mut(&mut sum))?;
    let (r1, read1) = dst1.enqueue_read(queue, cast_slice_mut(&mut product))?;

    println!("waiting for events...");
    session.finish()?;

    let stamps = [
        ("kernel0", t_add),
        ("kernel1", t_mul),
        ("  read0", read0.timings()?),
        ("  read1", read1.timings()?),
    ];
    print_statistics(&stamps);

    drop((read0, read1));
    print_result(&sum, 10);
    print_result(&product, 10);

    drop((a, b, r0, r1, add, mul));
    session.close()
}

fn print_statistics(stamps: &[(&str, EventTimings)]) {
    let base = stamps.iter().map(|(_, t)| t.queued).min().unwrap_or(0);
    for (name, t) in stamps {
        let t = t.normalized(base);
        println!("event {name}:");
        println!("  queued : {:>10.3} ms", t.queued as f64 / 1e6);
        println!("  submit : {:>10.3} ms", t.submitted as f64 / 1e6);
        println!("  start  : {:>10.3} ms", t.started as f64 / 1e6);
        println!("  end    : {:>10.3} ms", t.ended as f64 / 1e6);
        println!("  time   : {:>10.3} ms", t.duration_ms());
    }
}

fn print_result(result: &[f32], max: usize) {
    let shown = &result[..max.min(result.len())];
    print!("result: ");
    for (i, v) in shown.iter().enumerate() {
        if i > 0 {
            print!(", ");
        }
        print!("{v}");
    }
    if result.len() > shown.len() {
        print!(" ...");
    }
    println!();
}
