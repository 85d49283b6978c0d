// Mapped buffers over a host-aliased allocation: poke values through a
// host view, unmap, then let a kernel consume the modified contents.

use bytemuck::{cast_slice, cast_slice_mut};
use cl_session::{AccessMode, DeviceKind, QueueOptions, Selector, Session};

const SRC: &str = r#"
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
        QueueOptions::default(),
    )?;

    let n = 10;
    let mut backing: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let h_b: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let mut h_out = vec![0.0_f32; n];

    // Safety: `backing` outlives `a` and is not touched again until the
    // buffer is dropped; all host access goes through the mapped view.
    let mut a =
        unsafe { session.alloc_shared(cast_slice_mut(&mut backing), AccessMode::ReadWrite)? };
    let b = session.alloc_from(cast_slice(&h_b), AccessMode::ReadOnly)?;
    let out = session
        .alloc(n * std::mem::size_of::<f32>(), AccessMode::ReadWrite)?
        .launch();

    // modify a few elements through the mapped view
    {
        let mut view = a.map(session.queue())?;
        let floats: &mut [f32] = cast_slice_mut(&mut view[..]);
        floats[4] = 40.0;
        floats[5] = 50.0;
        floats[6] = 60.0;
        view.unmap()?;
    }

    let mut expected: Vec<f32> = (0..n).map(|i| i as f32).collect();
    expected[4] = 40.0;
    expected[5] = 50.0;
    expected[6] = 60.0;

    let kernel = session.build_kernel(SRC, "", "vec_mul")?;
    let done = kernel
        .launch()
        .arg_buffer(0, &a)?
        .arg_buffer(1, &b)?
        .arg_buffer(2, &out)?
        .global(&[n])
        .enqueue(session.queue())?;
    let out = out.into_ready(done)?;
    out.read(session.queue(), cast_slice_mut(&mut h_out))?;

    let passed = h_out
        .iter()
        .zip(expected.iter().zip(&h_b))
        .all(|(&x, (&a, &b))| (x - a * b).abs() <= 1e-7 * x.abs());
    println!("test {}", if passed { "PASSED" } else { "FAILED" });
    println!("result: {h_out:?}");

    drop((a, b, out, kernel));
    session.close()
}
