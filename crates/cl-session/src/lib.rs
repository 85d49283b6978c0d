//! Safe lifecycle wrapper around an OpenCL compute backend.
//!
//! A [`Session`] owns one device's context and command queue. Kernels,
//! buffers and images are created from it and keep the context alive
//! until the last of them drops; events are handed out as wait-on-drop
//! guards, so no operation can fall out of scope unsynchronized.

// ─── Feature modules ─────────────────────────────────────────────────
#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "memtrace")]
pub mod memtracer;
#[cfg(feature = "memtrace")]
pub use memtracer::{CopyToken, Dir, flush_csv, start};

// ─── Core modules ────────────────────────────────────────────────────
mod buffer;
mod error;
mod event;
mod image;
mod kernel;
mod select;
mod session;

pub use buffer::{AccessMode, GpuBuffer, InFlight, MappedView, Queued, Ready, State};
pub use error::Error;
pub use event::{EventGuard, EventTimings, await_all};
pub use image::Image2d;
pub use kernel::{Launch, SessionKernel};
pub use select::{DeviceKind, DeviceProfile, Selector, discover, discover_all};
pub use session::{QueueOptions, Session};

pub type Result<T> = std::result::Result<T, Error>;
