// End-to-end lifecycle tests. Every test acquires its own session and
// skips cleanly when the machine has no OpenCL runtime or device.

use bytemuck::{cast_slice, cast_slice_mut};
use cl_session::{
    AccessMode, DeviceKind, Error, QueueOptions, Selector, Session, await_all,
};

const VEC_ADD_SRC: &str = include_str!("../examples/vec_add.cl");
const REDUCTION_SRC: &str = include_str!("../examples/reduction.cl");

fn session() -> Option<Session> {
    match Session::create(
        &Selector::new().kind(DeviceKind::Any),
        QueueOptions::default(),
    ) {
        Ok(s) => Some(s),
        Err(e) => {
            eprintln!("no usable OpenCL device ({e}); skipping");
            None
        }
    }
}

#[test]
fn rediscovery_is_stable() {
    let Some(first) = session() else { return };
    let name = first.profile().name.clone();
    first.close().unwrap();

    // the same selector must keep resolving to an acquirable device
    let second = session().expect("second discovery failed");
    assert_eq!(second.profile().name, name);
    second.close().unwrap();
}

#[test]
fn byte_round_trip() {
    let Some(session) = session() else { return };
    let data: Vec<u8> = (0..=255).collect();

    let buf = session.alloc_from(&data, AccessMode::ReadWrite).unwrap();
    let mut back = vec![0_u8; data.len()];
    buf.read(session.queue(), &mut back).unwrap();
    assert_eq!(back, data);

    drop(buf);
    session.close().unwrap();
}

#[test]
fn ranged_write_leaves_surrounding_bytes_unchanged() {
    let Some(session) = session() else { return };
    let data = vec![7_u8; 64];

    let mut buf = session.alloc_from(&data, AccessMode::ReadWrite).unwrap();
    buf.write_at(session.queue(), 16, &[1, 2, 3, 4]).unwrap();

    let mut back = vec![0_u8; 64];
    buf.read(session.queue(), &mut back).unwrap();
    assert_eq!(&back[..16], &data[..16]);
    assert_eq!(&back[16..20], &[1, 2, 3, 4]);
    assert_eq!(&back[20..], &data[20..]);

    drop(buf);
    session.close().unwrap();
}

#[test]
fn out_of_bounds_range_is_rejected() {
    let Some(session) = session() else { return };
    let mut buf = session.alloc_from(&[0_u8; 16], AccessMode::ReadWrite).unwrap();

    let err = buf.write_at(session.queue(), 12, &[0_u8; 8]).unwrap_err();
    assert!(matches!(err, Error::InvalidSize(_)));

    drop(buf);
    session.close().unwrap();
}

#[test]
fn sub_buffer_window_aliases_parent() {
    let Some(session) = session() else { return };
    let queue = session.queue();
    let float = std::mem::size_of::<f32>();

    let full: Vec<f32> = (0..8).map(|i| i as f32).collect();
    let full_buf = session
        .alloc_from(cast_slice(&full), AccessMode::ReadWrite)
        .unwrap();
    // devices with a coarse base-address alignment refuse this carve
    let mut sub = match full_buf.sub_buffer(2 * float, 4 * float, AccessMode::ReadWrite) {
        Ok(sub) => sub,
        Err(Error::Api(code)) => {
            eprintln!("device refused the sub-buffer carve (status {code}); skipping");
            drop(full_buf);
            session.close().unwrap();
            return;
        }
        Err(other) => panic!("sub-buffer carve failed: {other}"),
    };

    let mut window = vec![0.0_f32; 4];
    sub.read(queue, cast_slice_mut(&mut window)).unwrap();
    assert_eq!(window, [2.0, 3.0, 4.0, 5.0]);

    sub.write_at(queue, 0, cast_slice(&[-5.0_f32, -4.0, -3.0, -2.0]))
        .unwrap();
    let mut result = vec![0.0_f32; 8];
    full_buf.read(queue, cast_slice_mut(&mut result)).unwrap();
    assert_eq!(result, [0.0, 1.0, -5.0, -4.0, -3.0, -2.0, 6.0, 7.0]);

    drop(sub);
    drop(full_buf);
    session.close().unwrap();
}

#[test]
fn mapped_view_round_trip() {
    let Some(session) = session() else { return };
    let data = vec![0_u8; 32];
    let mut buf = session.alloc_from(&data, AccessMode::ReadWrite).unwrap();

    {
        let mut view = buf.map(session.queue()).unwrap();
        view[..4].copy_from_slice(&[9, 8, 7, 6]);
        view.unmap().unwrap();
    }

    let mut back = vec![0_u8; 32];
    buf.read(session.queue(), &mut back).unwrap();
    assert_eq!(&back[..4], &[9, 8, 7, 6]);
    assert_eq!(&back[4..], &data[4..]);

    drop(buf);
    session.close().unwrap();
}

#[test]
fn vec_add_end_to_end() {
    let Some(session) = session() else { return };

    let h_a = [0.0_f32, 1.0, 2.0, 3.0];
    let h_b = [0.0_f32, 1.0, 2.0, 3.0];
    let mut h_out = [0.0_f32; 4];

    let a = session
        .alloc_from(cast_slice(&h_a), AccessMode::ReadOnly)
        .unwrap();
    let b = session
        .alloc_from(cast_slice(&h_b), AccessMode::ReadOnly)
        .unwrap();
    let out = session
        .alloc(4 * std::mem::size_of::<f32>(), AccessMode::WriteOnly)
        .unwrap()
        .launch();

    let kernel = session.build_kernel(VEC_ADD_SRC, "", "vec_add").unwrap();
    let done = kernel
        .launch()
        .arg_buffer(0, &a)
        .unwrap()
        .arg_buffer(1, &b)
        .unwrap()
        .arg_buffer(2, &out)
        .unwrap()
        .global(&[4])
        .enqueue(session.queue())
        .unwrap();
    let out = out.into_ready(done).unwrap();

    out.read(session.queue(), cast_slice_mut(&mut h_out)).unwrap();
    assert_eq!(h_out, [0.0, 2.0, 4.0, 6.0]);

    drop((a, b, out, kernel));
    session.close().unwrap();
}

#[test]
fn reduction_sums_the_input() {
    let Some(session) = session() else { return };

    let n = 100_000;
    let input: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let local = 128_usize;
    let groups = 64_usize;

    let input_buf = session
        .alloc_from(cast_slice(&input), AccessMode::ReadOnly)
        .unwrap();
    let output_buf = session
        .alloc(groups * std::mem::size_of::<f32>(), AccessMode::ReadWrite)
        .unwrap()
        .launch();

    let kernel = session.build_kernel(REDUCTION_SRC, "", "reduce").unwrap();
    let done = kernel
        .launch()
        .arg_buffer(0, &input_buf)
        .unwrap()
        .arg_local(1, local * std::mem::size_of::<f32>())
        .unwrap()
        .arg(2, &(n as i32))
        .unwrap()
        .arg_buffer(3, &output_buf)
        .unwrap()
        .global(&[groups * local])
        .local(&[local])
        .enqueue(session.queue())
        .unwrap();
    let output_buf = output_buf.into_ready(done).unwrap();

    let mut partial = vec![0.0_f32; groups];
    output_buf
        .read(session.queue(), cast_slice_mut(&mut partial))
        .unwrap();
    let total: f64 = partial.iter().map(|&p| p as f64).sum();

    let expected = 4_999_950_000.0_f64;
    assert!(
        (total - expected).abs() / expected < 1e-4,
        "got {total}, expected ~{expected}"
    );

    drop((input_buf, output_buf, kernel));
    session.close().unwrap();
}

#[test]
fn unbound_argument_slot_is_rejected() {
    let Some(session) = session() else { return };

    let a = session
        .alloc_from(&[0_u8; 16], AccessMode::ReadOnly)
        .unwrap();
    let kernel = session.build_kernel(VEC_ADD_SRC, "", "vec_add").unwrap();

    // slots 1 and 2 left unbound
    let err = kernel
        .launch()
        .arg_buffer(0, &a)
        .unwrap()
        .global(&[4])
        .enqueue(session.queue())
        .unwrap_err();
    assert!(matches!(err, Error::ArgumentBinding(_)));

    drop((a, kernel));
    session.close().unwrap();
}

#[test]
fn non_dividing_local_size_fails_before_submission() {
    let Some(session) = session() else { return };

    let a = session
        .alloc_from(&[0_u8; 4000], AccessMode::ReadOnly)
        .unwrap();
    let b = session
        .alloc_from(&[0_u8; 4000], AccessMode::ReadOnly)
        .unwrap();
    let out = session.alloc(4000, AccessMode::WriteOnly).unwrap();
    let kernel = session.build_kernel(VEC_ADD_SRC, "", "vec_add").unwrap();

    let err = kernel
        .launch()
        .arg_buffer(0, &a)
        .unwrap()
        .arg_buffer(1, &b)
        .unwrap()
        .arg_buffer(2, &out)
        .unwrap()
        .global(&[1000])
        .local(&[128])
        .enqueue(session.queue())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidWorkSize(_)));

    drop((a, b, out, kernel));
    session.close().unwrap();
}

#[test]
fn missing_entry_point_is_reported_by_name() {
    let Some(session) = session() else { return };

    let err = session
        .build_kernel(VEC_ADD_SRC, "", "no_such_kernel")
        .unwrap_err();
    assert!(matches!(err, Error::EntryPointNotFound(name) if name == "no_such_kernel"));

    session.close().unwrap();
}

#[test]
fn broken_source_surfaces_the_build_log() {
    let Some(session) = session() else { return };

    let err = session
        .build_kernel("__kernel void broken(__global float *x) { x[0] = ; }", "", "broken")
        .unwrap_err();
    match err {
        Error::Compile { log } => assert!(!log.is_empty()),
        other => panic!("expected a compile failure, got {other}"),
    }

    session.close().unwrap();
}

#[test]
fn close_refuses_while_dependents_are_live() {
    let Some(session) = session() else { return };

    let buf = session.alloc(64, AccessMode::ReadWrite).unwrap();
    let err = session.close().unwrap_err();
    assert!(matches!(err, Error::ResourceStillInUse(1)));

    // the buffer keeps the context alive and is still usable
    drop(buf);
}

#[test]
fn close_succeeds_after_dependents_drop() {
    let Some(session) = session() else { return };

    let buf = session.alloc(64, AccessMode::ReadWrite).unwrap();
    drop(buf);
    session.close().unwrap();
}

#[test]
fn await_all_collects_multiple_transfers() {
    let Some(session) = session() else { return };

    let data_a = vec![1_u8; 4096];
    let data_b = vec![2_u8; 4096];
    let a = session.alloc(4096, AccessMode::ReadWrite).unwrap();
    let b = session.alloc(4096, AccessMode::ReadWrite).unwrap();

    let (a, guard_a) = a.enqueue_write(session.queue(), &data_a).unwrap();
    let (b, guard_b) = b.enqueue_write(session.queue(), &data_b).unwrap();
    await_all(vec![guard_a, guard_b]).unwrap();

    drop((a, b));
    session.close().unwrap();
}

#[test]
fn completion_callback_fires_once() {
    let Some(session) = session() else { return };

    let data = vec![3_u8; 1024];
    let buf = session.alloc(1024, AccessMode::ReadWrite).unwrap();
    let (tx, rx) = std::sync::mpsc::channel();

    let (buf, guard) = buf.enqueue_write(session.queue(), &data).unwrap();
    guard
        .on_complete(move |status| {
            let _ = tx.send(status);
        })
        .unwrap();
    guard.wait().unwrap();

    // the callback runs on a backend thread, some time after completion
    let status = rx
        .recv_timeout(std::time::Duration::from_secs(10))
        .expect("callback never fired");
    assert!(status >= 0, "callback reported failure {status}");
    assert!(rx.try_recv().is_err(), "callback fired more than once");

    drop(buf);
    session.close().unwrap();
}

#[test]
fn image_region_round_trip() {
    let Some(session) = session() else { return };

    let (w, h) = (8_usize, 8_usize);
    let mut image = match session.alloc_image2d(w, h, AccessMode::ReadWrite) {
        Ok(img) => img,
        Err(e) => {
            eprintln!("device rejected image allocation ({e}); skipping");
            return;
        }
    };

    // fill, then overwrite a 2x2 window at (2, 3)
    let base = vec![0x11_u8; w * h * 4];
    image
        .write_region(session.queue(), (0, 0), (w, h), 0, &base)
        .unwrap();
    let patch = vec![0xEE_u8; 2 * 2 * 4];
    image
        .write_region(session.queue(), (2, 3), (2, 2), 0, &patch)
        .unwrap();

    let mut back = vec![0_u8; w * h * 4];
    image.read(session.queue(), &mut back).unwrap();
    for y in 0..h {
        for x in 0..w {
            let texel = &back[(y * w + x) * 4..][..4];
            let expected = if (2..4).contains(&x) && (3..5).contains(&y) {
                0xEE
            } else {
                0x11
            };
            assert!(texel.iter().all(|&c| c == expected), "texel ({x},{y})");
        }
    }

    drop(image);
    session.close().unwrap();
}
