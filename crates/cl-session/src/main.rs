use bytemuck::{cast_slice, cast_slice_mut};
use cl_session::{AccessMode, DeviceKind, QueueOptions, Selector, Session};

const VEC_ADD_SRC: &str = include_str!("../examples/vec_add.cl");

fn main() -> cl_session::Result<()> {
    let session = Session::create(
        &Selector::new().kind(DeviceKind::Any),
        QueueOptions::default(),
    )?;
    let profile = session.profile();
    println!("device         : {} ({})", profile.name, profile.vendor);
    println!("version        : {}", profile.version);
    println!("global memory  : {} MiB", profile.global_mem_size / 1024 / 1024);
    println!("local memory   : {} KiB", profile.local_mem_size / 1024);
    println!("max work-group : {}", profile.max_work_group_size);

    // smoke test: one small vector addition
    let n = 1024;
    let h_a = vec![1.0_f32; n];
    let h_b = vec![2.0_f32; n];
    let mut h_out = vec![0.0_f32; n];

    let a = session.alloc_from(cast_slice(&h_a), AccessMode::ReadOnly)?;
    let b = session.alloc_from(cast_slice(&h_b), AccessMode::ReadOnly)?;
    let out = session
        .alloc(n * std::mem::size_of::<f32>(), AccessMode::WriteOnly)?
        .launch();

    let kernel = session.build_kernel(VEC_ADD_SRC, "", "vec_add")?;
    let done = kernel
        .launch()
        .arg_buffer(0, &a)?
        .arg_buffer(1, &b)?
        .arg_buffer(2, &out)?
        .global(&[n])
        .enqueue(session.queue())?;
    let out = out.into_ready(done)?;

    out.read(session.queue(), cast_slice_mut(&mut h_out))?;
    assert!(h_out.iter().all(|&x| (x - 3.0).abs() < 1e-6));
    println!("vec_add OK, first element = {}", h_out[0]);

    drop((a, b, out, kernel));
    session.close()
}
