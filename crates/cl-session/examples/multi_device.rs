// One session per device, all running the same workload concurrently.
// Each device gets its own copy of the buffers; there is no cross-device
// synchronization.

use std::thread;
use std::time::Instant;

use bytemuck::{cast_slice, cast_slice_mut};
use cl_session::{AccessMode, DeviceKind, QueueOptions, Session, discover_all};

const SRC: &str = r#"
__kernel void workload(__global const float *input,
                       __global float *output,
                       int size)
{
    int gid = get_global_id(0);
    float acc = 0.0f;
    for (int i = 0; i < size; i++) {
        acc += input[i];
    }
    output[gid] = acc;
}
"#;

fn main() -> cl_session::Result<()> {
    let devices = discover_all(0, DeviceKind::Any)?;
    println!("found {} device(s) on platform 0", devices.len());

    let mut sessions = Vec::new();
    for device in devices {
        sessions.push(Session::from_device(device, QueueOptions::default())?);
    }

    let handles: Vec<_> = sessions
        .into_iter()
        .map(|session| thread::spawn(move || run_workload(session)))
        .collect();

    for handle in handles {
        match handle.join().expect("worker panicked") {
            Ok((name, first, elapsed_ms)) => {
                println!("{name}: output[0] = {first}  ({elapsed_ms:.1} ms)");
            }
            Err(e) => eprintln!("worker failed: {e}"),
        }
    }
    Ok(())
}

fn run_workload(session: Session) -> cl_session::Result<(String, f32, f64)> {
    let n = 10_000;
    let input = vec![1.0_f32; n];
    let mut output = vec![0.0_f32; n];

    let t = Instant::now();
    let input_buf = session.alloc_from(cast_slice(&input), AccessMode::ReadOnly)?;
    let output_buf = session
        .alloc(n * std::mem::size_of::<f32>(), AccessMode::ReadWrite)?
        .launch();

    let kernel = session.build_kernel(SRC, "", "workload")?;
    let done = kernel
        .launch()
        .arg_buffer(0, &input_buf)?
        .arg_buffer(1, &output_buf)?
        .arg(2, &(n as i32))?
        .global(&[n])
        .enqueue(session.queue())?;
    let output_buf = output_buf.into_ready(done)?;
    output_buf.read(session.queue(), cast_slice_mut(&mut output))?;
    let elapsed_ms = t.elapsed().as_secs_f64() * 1e3;

    let name = session.profile().name.clone();
    drop((input_buf, output_buf, kernel));
    session.close()?;
    Ok((name, output[0], elapsed_ms))
}
