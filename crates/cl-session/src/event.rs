//! Completion guards and event-based synchronization.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr;

use opencl3::event::{CL_COMPLETE, Event, wait_for_events};
use opencl3::types::{cl_event, cl_int};

use crate::{Error, Result};

/// Completion handle for one submitted operation.
///
/// The guard waits on drop, so an operation cannot fall out of scope
/// unsynchronized. The `'h` lifetime pins any host slice the operation
/// still reads or writes: the borrow ends only once the guard is waited
/// on or dropped.
#[derive(Debug)]
pub struct EventGuard<'h> {
    evt: Event,
    _host: PhantomData<&'h ()>,
}

impl<'h> EventGuard<'h> {
    pub(crate) fn new(evt: Event) -> Self {
        Self {
            evt,
            _host: PhantomData,
        }
    }

    pub(crate) fn raw(&self) -> cl_event {
        self.evt.get()
    }

    /// Block until the operation is terminal; a device-reported failure
    /// surfaces instead of being swallowed by drop.
    pub fn wait(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        // Safety: `this` is never dropped, the event is moved out once
        let evt = unsafe { ptr::read(&this.evt) };
        evt.wait()?;
        terminal_status(&evt)
    }

    /// Completion status as reported by the backend; negative values are
    /// execution faults.
    pub fn status(&self) -> Result<i32> {
        Ok(self.evt.command_execution_status()?.0)
    }

    /// Device timestamps of the command; requires the queue to have been
    /// acquired with profiling enabled.
    pub fn timings(&self) -> Result<EventTimings> {
        Ok(EventTimings {
            queued: self.evt.profiling_command_queued()?,
            submitted: self.evt.profiling_command_submit()?,
            started: self.evt.profiling_command_start()?,
            ended: self.evt.profiling_command_end()?,
        })
    }

    /// Register `f` to run once the event is terminal.
    ///
    /// At-most-once invocation on a backend-managed thread; no ordering
    /// guarantee relative to the submitting thread unless an explicit
    /// wait is used.
    pub fn on_complete<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(i32) + Send + 'static,
    {
        let boxed: Box<Box<dyn FnOnce(i32) + Send>> = Box::new(Box::new(f));
        let user_data = Box::into_raw(boxed) as *mut c_void;
        if let Err(e) = self.evt.set_callback(CL_COMPLETE, completion_trampoline, user_data) {
            // Safety: reclaims the box handed out two lines above
            drop(unsafe { Box::from_raw(user_data as *mut Box<dyn FnOnce(i32) + Send>) });
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for EventGuard<'_> {
    fn drop(&mut self) {
        let _ = self.evt.wait();
    }
}

extern "C" fn completion_trampoline(_evt: cl_event, status: cl_int, user_data: *mut c_void) {
    // Safety: produced by Box::into_raw in `on_complete`
    let f = unsafe { Box::from_raw(user_data as *mut Box<dyn FnOnce(i32) + Send>) };
    f(status);
}

fn terminal_status(evt: &Event) -> Result<()> {
    let status = evt.command_execution_status()?;
    if status.0 < 0 {
        return Err(Error::KernelExecution(status.0));
    }
    Ok(())
}

/// Block until every guard's event reaches a terminal state; the first
/// device-reported failure is surfaced.
pub fn await_all(guards: Vec<EventGuard<'_>>) -> Result<()> {
    if guards.is_empty() {
        return Ok(());
    }
    let raw: Vec<cl_event> = guards.iter().map(|g| g.raw()).collect();
    wait_for_events(&raw)?;
    for guard in &guards {
        let status = guard.status()?;
        if status < 0 {
            return Err(Error::KernelExecution(status));
        }
    }
    Ok(())
}

/// Device timestamps for one command, in nanoseconds of the device
/// clock: when it was queued, submitted, started and ended.
#[derive(Debug, Clone, Copy)]
pub struct EventTimings {
    pub queued: u64,
    pub submitted: u64,
    pub started: u64,
    pub ended: u64,
}

impl EventTimings {
    /// Execution time in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        (self.ended - self.started) as f64 / 1e6
    }

    /// Shift all stamps so `base` becomes zero, for printing several
    /// commands relative to the first queued one.
    pub fn normalized(self, base: u64) -> Self {
        Self {
            queued: self.queued.saturating_sub(base),
            submitted: self.submitted.saturating_sub(base),
            started: self.started.saturating_sub(base),
            ended: self.ended.saturating_sub(base),
        }
    }
}
