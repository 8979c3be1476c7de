//! Per-frame callback loop with start delay and timeout.
//!
//! A [`FrameLoop`] arms a delay timer, then requests frames one at a time,
//! invoking its callback on each. A bounded timeout force-stops the loop:
//! the pending frame is cancelled and the callback runs one final time.
//! Stopping the loop by hand (or dropping it) tears everything down with no
//! final call.
//!
//! ```text
//!  Idle ──(never-start delay)
//!  Delaying ──delay fires──▶ Looping ──frame──▶ Looping
//!  Delaying | Looping ──timeout──▶ Stopped   (final callback)
//!  Delaying | Looping ──stop────▶ Stopped   (no callback)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pulse_core::{FrameLoop, ManualHost, ScheduleRequest};
//!
//! let host = ManualHost::new();
//! let frame_loop = FrameLoop::start(
//!     host.clone(),
//!     ScheduleRequest::new().timeout_ms(1000).callback(|| println!("frame")),
//! );
//! host.advance(std::time::Duration::from_secs(2));
//! assert!(frame_loop.is_stopped());
//! ```

use crate::host::{FrameId, Host, TimerId};
use crate::reactive::Signal;
use crate::schedule::{Delay, LoopCallback, LoopState, ScheduleRequest, Timeout, TimeoutOrigin};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Pending host ids and the stop flag of one active loop.
#[derive(Debug, Default)]
struct LoopHandle {
    frame: Option<FrameId>,
    delay_timer: Option<TimerId>,
    timeout_timer: Option<TimerId>,
    started: bool,
    stopped: bool,
}

struct LoopShared<H: Host> {
    host: H,
    handle: RefCell<LoopHandle>,
    callback: LoopCallback,
    timeout: Timeout,
    never_start: bool,
}

/// A running frame loop.
///
/// Owns its loop exclusively: dropping it is the same as calling
/// [`FrameLoop::stop`].
pub struct FrameLoop<H: Host> {
    shared: Rc<LoopShared<H>>,
    ticks: Signal<u64>,
}

impl<H: Host> FrameLoop<H> {
    /// Start a loop on `host`.
    ///
    /// Without a callback in `request`, each frame increments
    /// [`FrameLoop::ticks`] instead.
    pub fn start<D>(host: H, request: ScheduleRequest<D>) -> Self {
        let ticks = Signal::new(0u64);
        let callback = request.callback.unwrap_or_else(|| {
            let ticks = ticks.clone();
            LoopCallback::new(move || ticks.update(|n| *n += 1))
        });

        let shared = Rc::new(LoopShared {
            host,
            handle: RefCell::new(LoopHandle::default()),
            callback,
            timeout: request.timeout,
            never_start: request.delay == Delay::Never,
        });

        let Delay::After(delay) = request.delay else {
            tracing::debug!("frame loop never starts");
            return Self { shared, ticks };
        };

        let weak = Rc::downgrade(&shared);
        let origin = request.timeout_origin;
        let delay_timer = shared.host.set_timer(
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    on_start(&shared, origin);
                }
            }),
            delay,
        );
        shared.handle.borrow_mut().delay_timer = Some(delay_timer);

        if origin == TimeoutOrigin::Schedule {
            arm_timeout(&shared);
        }

        tracing::debug!(?delay, timeout = ?request.timeout, ?origin, "frame loop scheduled");
        Self { shared, ticks }
    }

    /// Tear the loop down: clear both timers, cancel any pending frame.
    ///
    /// Never invokes the callback. Stopping twice is a no-op.
    pub fn stop(&self) {
        let (frame, delay_timer, timeout_timer) = {
            let mut handle = self.shared.handle.borrow_mut();
            if handle.stopped {
                return;
            }
            handle.stopped = true;
            (
                handle.frame.take(),
                handle.delay_timer.take(),
                handle.timeout_timer.take(),
            )
        };

        let host = &self.shared.host;
        if let Some(id) = timeout_timer {
            host.clear_timer(id);
        }
        if let Some(id) = delay_timer {
            host.clear_timer(id);
        }
        if let Some(id) = frame {
            host.cancel_frame(id);
        }
        tracing::debug!("frame loop torn down");
    }

    pub fn state(&self) -> LoopState {
        let handle = self.shared.handle.borrow();
        if handle.stopped {
            LoopState::Stopped
        } else if self.shared.never_start {
            LoopState::Idle
        } else if handle.started {
            LoopState::Looping
        } else {
            LoopState::Delaying
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.handle.borrow().stopped
    }

    /// Incremented once per callback slot when no callback was supplied.
    pub fn ticks(&self) -> Signal<u64> {
        self.ticks.clone()
    }

    /// The callback shared with the running loop.
    pub fn callback(&self) -> &LoopCallback {
        &self.shared.callback
    }

    pub fn timeout(&self) -> Timeout {
        self.shared.timeout
    }
}

impl<H: Host> Drop for FrameLoop<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<H: Host> fmt::Debug for FrameLoop<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLoop")
            .field("state", &self.state())
            .field("handle", &*self.shared.handle.borrow())
            .finish()
    }
}

fn arm_timeout<H: Host>(shared: &Rc<LoopShared<H>>) {
    let Some(timeout) = shared.timeout.duration() else {
        return;
    };
    let weak = Rc::downgrade(shared);
    let id = shared.host.set_timer(
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                on_timeout(&shared, timeout);
            }
        }),
        timeout,
    );
    shared.handle.borrow_mut().timeout_timer = Some(id);
}

fn on_start<H: Host>(shared: &Rc<LoopShared<H>>, origin: TimeoutOrigin) {
    {
        let mut handle = shared.handle.borrow_mut();
        handle.delay_timer = None;
        if handle.stopped {
            return;
        }
        handle.started = true;
    }
    if origin == TimeoutOrigin::LoopStart {
        arm_timeout(shared);
    }
    tracing::debug!("frame loop started");
    request_next(shared);
}

/// Request the next frame unless the loop has stopped.
fn request_next<H: Host>(shared: &Rc<LoopShared<H>>) {
    if shared.handle.borrow().stopped {
        return;
    }
    let weak: Weak<LoopShared<H>> = Rc::downgrade(shared);
    let id = shared.host.request_frame(Box::new(move || {
        if let Some(shared) = weak.upgrade() {
            on_frame(&shared);
        }
    }));
    shared.handle.borrow_mut().frame = Some(id);
}

fn on_frame<H: Host>(shared: &Rc<LoopShared<H>>) {
    shared.handle.borrow_mut().frame = None;
    shared.callback.invoke();
    request_next(shared);
}

fn on_timeout<H: Host>(shared: &Rc<LoopShared<H>>, timeout: Duration) {
    let (frame, delay_timer) = {
        let mut handle = shared.handle.borrow_mut();
        handle.timeout_timer = None;
        (handle.frame.take(), handle.delay_timer.take())
    };

    if let Some(id) = frame {
        shared.host.cancel_frame(id);
    }
    if let Some(id) = delay_timer {
        shared.host.clear_timer(id);
    }

    shared.callback.invoke();
    shared.handle.borrow_mut().stopped = true;
    tracing::debug!(?timeout, "frame loop timed out");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manual::{HostStats, ManualHost};
    use crate::reactive::Effect;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl FnMut() + 'static) {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = Rc::clone(&calls);
        (calls, move || calls_clone.set(calls_clone.get() + 1))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn runs_every_frame_then_once_more_on_timeout() {
        let host = ManualHost::new();
        let (calls, callback) = counter();

        let frame_loop = FrameLoop::start(
            host.clone(),
            ScheduleRequest::new().timeout_ms(1000).delay_ms(Some(0)).callback(callback),
        );
        assert_eq!(frame_loop.state(), LoopState::Delaying);

        // Frames at 16, 32, ..., 992.
        host.advance(ms(999));
        assert_eq!(calls.get(), 62);
        assert_eq!(frame_loop.state(), LoopState::Looping);

        host.advance(ms(1));
        assert_eq!(calls.get(), 63);
        assert_eq!(frame_loop.state(), LoopState::Stopped);

        host.advance(ms(5000));
        assert_eq!(calls.get(), 63);
        assert!(host.is_idle());
    }

    #[test]
    fn call_count_matches_remaining_time_after_delay() {
        let cases = [
            (500, 90, 16),
            (1000, 245, 10),
            (333, 0, 7),
            (90, 40, 20),
            // Timeout lands exactly on a frame.
            (160, 0, 16),
            (100, 20, 16),
            (1000, 200, 16),
        ];
        for (timeout, delay, interval) in cases {
            let host = ManualHost::with_frame_interval(ms(interval));
            let (calls, callback) = counter();

            let _frame_loop = FrameLoop::start(
                host.clone(),
                ScheduleRequest::new()
                    .timeout_ms(timeout as i64)
                    .delay_ms(Some(delay))
                    .callback(callback),
            );
            host.advance(ms(10_000));

            let expected = (timeout - delay) / interval + 1;
            assert_eq!(
                calls.get() as u64,
                expected,
                "timeout={timeout} delay={delay} interval={interval}"
            );
        }
    }

    #[test]
    fn negative_timeout_never_stops() {
        let host = ManualHost::new();
        let (calls, callback) = counter();

        let frame_loop = FrameLoop::start(
            host.clone(),
            ScheduleRequest::new().timeout_ms(-1).callback(callback),
        );
        host.advance(ms(16 * 1000));

        assert_eq!(calls.get(), 1000);
        assert_eq!(frame_loop.state(), LoopState::Looping);
        // Only the delay timer was ever armed.
        assert_eq!(host.stats().timers_armed, 1);
        assert_eq!(host.pending_frames(), 1);
    }

    #[test]
    fn never_start_arms_nothing() {
        let host = ManualHost::new();
        let (calls, callback) = counter();

        let frame_loop = FrameLoop::start(
            host.clone(),
            ScheduleRequest::new().timeout_ms(-1).delay_ms(None).callback(callback),
        );
        assert_eq!(frame_loop.state(), LoopState::Idle);

        host.advance(ms(60_000));
        assert_eq!(calls.get(), 0);
        assert_eq!(host.stats(), HostStats::default());
    }

    #[test]
    fn never_start_with_bounded_timeout_arms_nothing() {
        let host = ManualHost::new();
        let (calls, callback) = counter();

        let _frame_loop = FrameLoop::start(
            host.clone(),
            ScheduleRequest::new().timeout_ms(100).delay_ms(None).callback(callback),
        );
        host.advance(ms(1000));

        assert_eq!(calls.get(), 0);
        assert_eq!(host.stats().timers_armed, 0);
    }

    #[test]
    fn stop_before_delay_elapses_invokes_nothing() {
        let host = ManualHost::new();
        let (calls, callback) = counter();

        let frame_loop = FrameLoop::start(
            host.clone(),
            ScheduleRequest::new().timeout_ms(500).delay_ms(Some(100)).callback(callback),
        );
        host.advance(ms(50));
        frame_loop.stop();
        host.advance(ms(2000));

        assert_eq!(calls.get(), 0);
        assert_eq!(frame_loop.state(), LoopState::Stopped);
        let stats = host.stats();
        assert_eq!(stats.timers_cleared, 2);
        assert_eq!(stats.frames_requested, 0);
        assert!(host.is_idle());
    }

    #[test]
    fn timeout_cancels_exactly_one_pending_frame() {
        let host = ManualHost::new();
        let (calls, callback) = counter();

        let _frame_loop = FrameLoop::start(
            host.clone(),
            ScheduleRequest::new().timeout_ms(200).callback(callback),
        );
        host.advance(ms(199));
        let regular = calls.get();
        assert_eq!(host.pending_frames(), 1);

        host.advance(ms(1));
        assert_eq!(calls.get(), regular + 1);
        assert_eq!(host.stats().frames_cancelled, 1);
        assert_eq!(host.pending_frames(), 0);
    }

    #[test]
    fn frame_due_with_timeout_runs_before_it() {
        let host = ManualHost::new();
        let (calls, callback) = counter();

        let frame_loop = FrameLoop::start(
            host.clone(),
            ScheduleRequest::new().timeout_ms(160).callback(callback),
        );
        host.advance(ms(159));
        assert_eq!(calls.get(), 9);

        // The tenth frame and the timeout are both due at 160: the frame
        // runs, its re-arm is cancelled, then the final call runs.
        host.advance(ms(1));
        assert_eq!(calls.get(), 11);
        assert_eq!(frame_loop.state(), LoopState::Stopped);
        let stats = host.stats();
        assert_eq!(stats.frames_fired, 10);
        assert_eq!(stats.frames_requested, 11);
        assert_eq!(stats.frames_cancelled, 1);

        host.advance(ms(1000));
        assert_eq!(calls.get(), 11);
        assert!(host.is_idle());
    }

    #[test]
    fn manual_stop_adds_no_final_call() {
        let host = ManualHost::new();
        let (calls, callback) = counter();

        let frame_loop = FrameLoop::start(
            host.clone(),
            ScheduleRequest::new().timeout_ms(10_000).callback(callback),
        );
        host.advance(ms(16 * 5));
        assert_eq!(calls.get(), 5);

        frame_loop.stop();
        frame_loop.stop();
        host.advance(ms(20_000));

        assert_eq!(calls.get(), 5);
        assert_eq!(host.stats().frames_cancelled, 1);
        assert!(host.is_idle());
    }

    #[test]
    fn drop_tears_the_loop_down() {
        let host = ManualHost::new();
        let (calls, callback) = counter();

        {
            let _frame_loop =
                FrameLoop::start(host.clone(), ScheduleRequest::new().callback(callback));
            host.advance(ms(48));
        }
        host.advance(ms(1000));

        assert_eq!(calls.get(), 3);
        assert!(host.is_idle());
    }

    #[test]
    fn timeout_measured_from_schedule_time_by_default() {
        let host = ManualHost::new();
        let (calls, callback) = counter();

        let _frame_loop = FrameLoop::start(
            host.clone(),
            ScheduleRequest::new().timeout_ms(100).delay_ms(Some(60)).callback(callback),
        );
        host.advance(ms(1000));

        // Frames at 76 and 92, final call at 100.
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn timeout_from_loop_start_keeps_full_budget() {
        let host = ManualHost::new();
        let (calls, callback) = counter();

        let _frame_loop = FrameLoop::start(
            host.clone(),
            ScheduleRequest::new()
                .timeout_ms(100)
                .delay_ms(Some(60))
                .timeout_origin(TimeoutOrigin::LoopStart)
                .callback(callback),
        );
        host.advance(ms(1000));

        // Frames at 76..=156, final call at 160.
        assert_eq!(calls.get(), 7);
    }

    #[test]
    fn timeout_before_delay_calls_back_once_and_never_loops() {
        let host = ManualHost::new();
        let (calls, callback) = counter();

        let frame_loop = FrameLoop::start(
            host.clone(),
            ScheduleRequest::new().timeout_ms(50).delay_ms(Some(200)).callback(callback),
        );
        host.advance(ms(1000));

        assert_eq!(calls.get(), 1);
        assert_eq!(frame_loop.state(), LoopState::Stopped);
        assert_eq!(host.stats().frames_requested, 0);
        assert_eq!(host.stats().timers_cleared, 1);
    }

    #[test]
    fn callback_stopping_its_own_loop_requests_no_more_frames() {
        let host = ManualHost::new();
        let slot: Rc<RefCell<Option<FrameLoop<ManualHost>>>> = Rc::new(RefCell::new(None));
        let calls = Rc::new(Cell::new(0));

        let slot_clone = Rc::clone(&slot);
        let calls_clone = Rc::clone(&calls);
        let frame_loop = FrameLoop::start(
            host.clone(),
            ScheduleRequest::new().callback(move || {
                calls_clone.set(calls_clone.get() + 1);
                if calls_clone.get() == 3
                    && let Some(frame_loop) = slot_clone.borrow().as_ref()
                {
                    frame_loop.stop();
                }
            }),
        );
        *slot.borrow_mut() = Some(frame_loop);

        host.advance(ms(1000));
        assert_eq!(calls.get(), 3);
        assert!(host.is_idle());
    }

    #[test]
    fn ticks_replace_a_missing_callback() {
        let host = ManualHost::new();
        let frame_loop = FrameLoop::start(host.clone(), ScheduleRequest::new().timeout_ms(100));

        let ticks = frame_loop.ticks();
        let observed = Rc::new(Cell::new(0u64));
        let observed_clone = Rc::clone(&observed);
        let subscription = Effect::new(move || observed_clone.set(ticks.get()));

        host.advance(ms(1000));

        // Six frames plus the final call at 100ms.
        assert_eq!(frame_loop.ticks().peek(), 7);
        assert_eq!(observed.get(), 7);
        subscription.dispose();
    }
}
