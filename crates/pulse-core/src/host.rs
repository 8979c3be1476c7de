//! Host primitives consumed by the frame loop.
//!
//! A host provides two one-shot scheduling primitives: a frame request that
//! runs its callback before the next repaint, and a timer that runs its
//! callback after a delay. Both return an id that can later cancel the
//! pending callback. Hosts are cheap handles; clones refer to the same
//! underlying clock.

use std::fmt;
use std::time::Duration;

/// Callback run once when a requested frame fires.
pub type FrameCallback = Box<dyn FnOnce() + 'static>;

/// Callback run once when a timer elapses.
pub type TimerCallback = Box<dyn FnOnce() + 'static>;

/// Identifier of a pending frame request.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// Identifier of a pending timer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Frame-request primitive.
pub trait FrameHost {
    /// Run `callback` once, asynchronously, on the next frame.
    ///
    /// Implementations must never invoke the callback synchronously from
    /// inside this call.
    fn request_frame(&self, callback: FrameCallback) -> FrameId;

    /// Cancel a pending frame request. Unknown or already-fired ids are ignored.
    fn cancel_frame(&self, id: FrameId);
}

/// Timer primitive.
pub trait TimerHost {
    /// Run `callback` once after at least `delay` has elapsed.
    fn set_timer(&self, callback: TimerCallback, delay: Duration) -> TimerId;

    /// Clear a pending timer. Unknown or already-fired ids are ignored.
    fn clear_timer(&self, id: TimerId);
}

/// Everything a frame loop needs from its environment.
pub trait Host: FrameHost + TimerHost + Clone + 'static {}

impl<T> Host for T where T: FrameHost + TimerHost + Clone + 'static {}
