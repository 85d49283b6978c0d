// Two-phase sum reduction: per-work-group partial sums on the device,
// Kahan-summed finish on the host.

use bytemuck::{cast_slice, cast_slice_mut};
use cl_session::{AccessMode, DeviceKind, QueueOptions, Selector, Session};

const SRC: &str = include_str!("reduction.cl");

const LOCAL_SIZE: usize = 128;
const NUM_GROUPS: usize = 64;

fn main() -> cl_session::Result<()> {
    let session = Session::create(
        &Selector::new().kind(DeviceKind::Any),
        QueueOptions::default(),
    )?;

    let n = 100_000;
    let input: Vec<f32> = (0..n).map(|i| i as f32).collect();

    let gpu = reduce(&session, &input)?;
    let cpu = kahan_sum(&input);
    println!("GPU {gpu}");
    println!("CPU {cpu}");

    session.close()
}

fn reduce(session: &Session, input: &[f32]) -> cl_session::Result<f32> {
    let input_buf = session.alloc_from(cast_slice(input), AccessMode::ReadOnly)?;
    let output_buf = session
        .alloc(NUM_GROUPS * std::mem::size_of::<f32>(), AccessMode::ReadWrite)?
        .launch();

    let kernel = session.build_kernel(SRC, "", "reduce")?;
    let done = kernel
        .launch()
        .arg_buffer(0, &input_buf)?
        .arg_local(1, LOCAL_SIZE * std::mem::size_of::<f32>())?
        .arg(2, &(input.len() as i32))?
        .arg_buffer(3, &output_buf)?
        .global(&[NUM_GROUPS * LOCAL_SIZE])
        .local(&[LOCAL_SIZE])
        .enqueue(session.queue())?;
    let output_buf = output_buf.into_ready(done)?;

    let mut partial = vec![0.0_f32; NUM_GROUPS];
    output_buf.read(session.queue(), cast_slice_mut(&mut partial))?;
    Ok(kahan_sum(&partial))
}

/// Compensated summation keeps the host-side finish exact enough to
/// compare against the device result.
fn kahan_sum(values: &[f32]) -> f32 {
    let mut sum = 0.0_f32;
    let mut c = 0.0_f32;
    for &v in values {
        let y = v - c;
        let t = sum + y;
        c = (t - sum) - y;
        sum = t;
    }
    sum
}
