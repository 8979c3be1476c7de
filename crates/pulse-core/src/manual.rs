//! Deterministic host driven by a virtual clock.
//!
//! `ManualHost` never fires anything on its own. Time only moves when
//! [`ManualHost::advance`] or [`ManualHost::advance_to`] is called, which
//! makes frame and timer ordering fully reproducible in tests and headless
//! stepping.
//!
//! A frame fires one frame interval after it was requested. A timer fires
//! `delay` after it was armed. At the same instant frames fire before
//! timers, so a timeout landing exactly on a frame cancels the frame's
//! re-arm, not the frame itself. Otherwise same-instant callbacks fire in
//! the order they were armed.

use crate::host::{FrameCallback, FrameHost, FrameId, TimerCallback, TimerHost, TimerId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

/// Counters for every primitive call that had an effect.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct HostStats {
    pub frames_requested: usize,
    pub frames_fired: usize,
    /// Only cancellations that removed a pending frame.
    pub frames_cancelled: usize,
    pub timers_armed: usize,
    pub timers_fired: usize,
    /// Only clears that removed a pending timer.
    pub timers_cleared: usize,
}

enum Pending {
    Frame(FrameCallback),
    Timer(TimerCallback),
}

/// Delivery rank at equal due times.
const FRAME_RANK: u8 = 0;
const TIMER_RANK: u8 = 1;

/// (due time, rank, id); ids grow monotonically so ties keep arming order.
type QueueKey = (Duration, u8, u64);

struct ManualInner {
    now: Duration,
    frame_interval: Duration,
    next_id: u64,
    queue: BTreeMap<QueueKey, Pending>,
    stats: HostStats,
}

impl ManualInner {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Remove the pending entry with this id if it has the expected kind.
    fn remove(&mut self, id: u64, frame: bool) -> bool {
        let key = self
            .queue
            .iter()
            .find(|((_, _, seq), pending)| {
                *seq == id && matches!(pending, Pending::Frame(_)) == frame
            })
            .map(|(key, _)| *key);

        match key {
            Some(key) => self.queue.remove(&key).is_some(),
            None => false,
        }
    }
}

/// Host with a virtual clock, stepped explicitly.
#[derive(Clone)]
pub struct ManualHost {
    inner: Rc<RefCell<ManualInner>>,
}

impl ManualHost {
    /// Default frame interval: 16ms.
    pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

    pub fn new() -> Self {
        Self::with_frame_interval(Self::DEFAULT_FRAME_INTERVAL)
    }

    /// Panics on a zero interval: every frame would be due immediately and
    /// a running loop would never let the clock advance.
    pub fn with_frame_interval(frame_interval: Duration) -> Self {
        assert!(
            !frame_interval.is_zero(),
            "pulse ManualHost error: frame interval must be non-zero"
        );
        Self {
            inner: Rc::new(RefCell::new(ManualInner {
                now: Duration::ZERO,
                frame_interval,
                next_id: 1,
                queue: BTreeMap::new(),
                stats: HostStats::default(),
            })),
        }
    }

    /// Virtual time elapsed since the host was created.
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    pub fn frame_interval(&self) -> Duration {
        self.inner.borrow().frame_interval
    }

    pub fn stats(&self) -> HostStats {
        self.inner.borrow().stats
    }

    pub fn pending_frames(&self) -> usize {
        self.inner
            .borrow()
            .queue
            .values()
            .filter(|p| matches!(p, Pending::Frame(_)))
            .count()
    }

    pub fn pending_timers(&self) -> usize {
        self.inner
            .borrow()
            .queue
            .values()
            .filter(|p| matches!(p, Pending::Timer(_)))
            .count()
    }

    /// No frame or timer is pending.
    pub fn is_idle(&self) -> bool {
        self.inner.borrow().queue.is_empty()
    }

    /// Move the clock forward by `by`, firing everything that falls due.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        self.advance_to(target);
    }

    /// Move the clock to `target`, firing everything due at or before it.
    ///
    /// Callbacks run with no borrow held, so they may request frames or arm
    /// timers; anything they schedule at or before `target` also fires.
    /// Targets in the past are ignored.
    pub fn advance_to(&self, target: Duration) {
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                let first = inner.queue.first_key_value().map(|(key, _)| *key);
                match first {
                    Some(key @ (due, _, _)) if due <= target => {
                        let pending = inner.queue.remove(&key);
                        inner.now = inner.now.max(due);
                        match &pending {
                            Some(Pending::Frame(_)) => inner.stats.frames_fired += 1,
                            Some(Pending::Timer(_)) => inner.stats.timers_fired += 1,
                            None => {}
                        }
                        pending
                    }
                    _ => None,
                }
            };

            match next {
                Some(Pending::Frame(callback)) => callback(),
                Some(Pending::Timer(callback)) => callback(),
                None => break,
            }
        }

        let mut inner = self.inner.borrow_mut();
        inner.now = inner.now.max(target);
    }

    /// Advance frame by frame until nothing is pending or `limit` elapses.
    pub fn run_until_idle(&self, limit: Duration) {
        let deadline = self.now() + limit;
        while !self.is_idle() && self.now() < deadline {
            let step = self.frame_interval().max(Duration::from_millis(1));
            self.advance_to((self.now() + step).min(deadline));
        }
    }
}

impl Default for ManualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHost for ManualHost {
    fn request_frame(&self, callback: FrameCallback) -> FrameId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id();
        let due = inner.now + inner.frame_interval;
        inner.queue.insert((due, FRAME_RANK, id), Pending::Frame(callback));
        inner.stats.frames_requested += 1;
        FrameId(id)
    }

    fn cancel_frame(&self, id: FrameId) {
        let mut inner = self.inner.borrow_mut();
        if inner.remove(id.0, true) {
            inner.stats.frames_cancelled += 1;
        }
    }
}

impl TimerHost for ManualHost {
    fn set_timer(&self, callback: TimerCallback, delay: Duration) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id();
        let due = inner.now + delay;
        inner.queue.insert((due, TIMER_RANK, id), Pending::Timer(callback));
        inner.stats.timers_armed += 1;
        TimerId(id)
    }

    fn clear_timer(&self, id: TimerId) {
        let mut inner = self.inner.borrow_mut();
        if inner.remove(id.0, false) {
            inner.stats.timers_cleared += 1;
        }
    }
}
