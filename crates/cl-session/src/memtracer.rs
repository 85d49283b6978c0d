#![cfg(feature = "memtrace")]

//! CSV timeline of transfers and kernel runs.

use once_cell::sync::Lazy;
use std::{fs::File, io, io::Write, path::Path, sync::Mutex, time::Instant};

use opencl3::event::{CL_COMPLETE, Event};
use opencl3::types::{cl_event, cl_int};
use std::ffi::c_void;

/// Transfer direction or kernel execution.
#[derive(Clone, Copy)]
pub enum Dir {
    H2D,
    D2H,
    Kernel,
}

impl Dir {
    fn as_str(self) -> &'static str {
        match self {
            Dir::H2D => "H2D",
            Dir::D2H => "D2H",
            Dir::Kernel => "Kernel",
        }
    }
}

/// Zero point of the timeline, fixed by the first `start()`.
static T0: Lazy<Instant> = Lazy::new(Instant::now);

/// Log rows: (start_us, end_us, bytes, dir, idle_us).
static LOG: Lazy<Mutex<Vec<(u128, u128, usize, &'static str, u128)>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

/// Holds start time, size and direction of one operation.
pub struct CopyToken {
    start: Instant,
    bytes: usize,
    dir: Dir,
}

/// Begin timing one transfer or kernel run.
pub fn start(dir: Dir, bytes: usize) -> CopyToken {
    Lazy::force(&T0);
    CopyToken {
        start: Instant::now(),
        bytes,
        dir,
    }
}

impl CopyToken {
    /// End the operation; appends one row including the idle gap since
    /// the previous row ended.
    pub fn finish(self) {
        let t0 = *T0;
        let s = self.start.duration_since(t0).as_micros();
        let e = Instant::now().duration_since(t0).as_micros();

        let mut log = LOG.lock().unwrap();
        let prev_end = log.last().map(|row| row.1).unwrap_or(0);
        let idle = s.saturating_sub(prev_end);
        log.push((s, e, self.bytes, self.dir.as_str(), idle));
    }
}

/// Close a token when `evt` completes, from the backend's callback
/// thread. Falls back to finishing inline if registration is refused.
pub(crate) fn attach(evt: &Event, token: Box<CopyToken>) {
    let user_data = Box::into_raw(token) as *mut c_void;
    if let Err(e) = evt.set_callback(CL_COMPLETE, transfer_done, user_data) {
        log::warn!("trace callback rejected: {e}");
        // Safety: reclaims the box handed out above
        unsafe { Box::from_raw(user_data.cast::<CopyToken>()) }.finish();
    }
}

pub extern "C" fn transfer_done(_evt: cl_event, _status: cl_int, user_data: *mut c_void) {
    // Safety: produced by Box::into_raw in `attach`
    let token: Box<CopyToken> = unsafe { Box::from_raw(user_data.cast()) };
    token.finish();
}

/// Write the collected timeline; call once at the end of a run.
pub fn flush_csv<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let mut f = File::create(path)?;
    writeln!(f, "t_start_us,t_end_us,bytes,dir,idle_us")?;
    for (s, e, bytes, dir, idle) in LOG.lock().unwrap().iter() {
        writeln!(f, "{s},{e},{bytes},{dir},{idle}")?;
    }
    Ok(())
}
