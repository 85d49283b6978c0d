// Sub-buffer regions: carve a window out of a buffer, modify it, and
// observe the change through the parent.

use bytemuck::{cast_slice, cast_slice_mut};
use cl_session::{AccessMode, DeviceKind, QueueOptions, Selector, Session};

fn main() -> cl_session::Result<()> {
    let session = Session::create(
        &Selector::new().kind(DeviceKind::Any),
        QueueOptions::default(),
    )?;
    let queue = session.queue();
    let float = std::mem::size_of::<f32>();

    let full: Vec<f32> = (0..8).map(|i| i as f32).collect();
    println!("full input array  : {full:?}");

    let full_buf = session.alloc_from(cast_slice(&full), AccessMode::ReadWrite)?;

    // window of 4 elements starting at element 2
    let mut sub = full_buf.sub_buffer(2 * float, 4 * float, AccessMode::ReadWrite)?;

    let mut window = vec![0.0_f32; 4];
    sub.read(queue, cast_slice_mut(&mut window))?;
    println!("read sub-array    : {window:?}");

    let modified = [-5.0_f32, -4.0, -3.0, -2.0];
    sub.write_at(queue, 0, cast_slice(&modified))?;
    println!("modified sub-array: {modified:?}");

    let mut result = vec![0.0_f32; 8];
    full_buf.read(queue, cast_slice_mut(&mut result))?;
    println!("full result array : {result:?}");

    drop(sub);
    drop(full_buf);
    session.close()
}
