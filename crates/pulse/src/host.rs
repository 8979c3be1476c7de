//! Tokio-backed frame and timer host.
//!
//! Timers are local tasks sleeping on the tokio clock. Frames are collected
//! into a queue and flushed in batches by a frame driver task that ticks
//! every `frame_interval`; a frame requested while a batch is running lands
//! in the next batch. The driver exits when the queue drains and is
//! respawned by the next request.
//!
//! All tasks are spawned with [`tokio::task::spawn_local`], so the host
//! must be used from inside a [`tokio::task::LocalSet`].

use crate::config::FrameClockConfig;
use crate::error::Result;
use pulse_core::host::{FrameCallback, FrameHost, FrameId, TimerCallback, TimerHost, TimerId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

struct TokioInner {
    frame_interval: Duration,
    next_id: u64,
    timers: HashMap<u64, JoinHandle<()>>,
    /// Pending frame callbacks in request order.
    frames: BTreeMap<u64, FrameCallback>,
    driver: Option<JoinHandle<()>>,
    idle: Rc<Notify>,
}

impl TokioInner {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn is_idle(&self) -> bool {
        self.timers.is_empty() && self.frames.is_empty()
    }
}

impl Drop for TokioInner {
    fn drop(&mut self) {
        for (_, task) in self.timers.drain() {
            task.abort();
        }
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Frame and timer host running on the tokio clock.
#[derive(Clone)]
pub struct TokioHost {
    inner: Rc<RefCell<TokioInner>>,
}

impl TokioHost {
    /// Create a host on the current tokio runtime.
    ///
    /// Fails if the config is invalid or no runtime is entered.
    pub fn new(config: FrameClockConfig) -> Result<Self> {
        config.validate()?;
        tokio::runtime::Handle::try_current()?;

        Ok(Self {
            inner: Rc::new(RefCell::new(TokioInner {
                frame_interval: config.frame_interval,
                next_id: 1,
                timers: HashMap::new(),
                frames: BTreeMap::new(),
                driver: None,
                idle: Rc::new(Notify::new()),
            })),
        })
    }

    pub fn frame_interval(&self) -> Duration {
        self.inner.borrow().frame_interval
    }

    pub fn pending_frames(&self) -> usize {
        self.inner.borrow().frames.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    /// No timer or frame is pending.
    pub fn is_idle(&self) -> bool {
        self.inner.borrow().is_idle()
    }

    /// Resolve once no timer or frame is pending.
    pub async fn idle(&self) {
        loop {
            if self.is_idle() {
                return;
            }
            let idle = Rc::clone(&self.inner.borrow().idle);
            idle.notified().await;
        }
    }

    fn notify_if_idle(inner: &Rc<RefCell<TokioInner>>) {
        let inner = inner.borrow();
        if inner.is_idle() {
            inner.idle.notify_one();
        }
    }
}

async fn drive_frames(weak: Weak<RefCell<TokioInner>>, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
            return;
        };

        let batch: Vec<u64> = inner.borrow().frames.keys().copied().collect();
        for id in batch {
            // Re-check each entry: an earlier callback may have cancelled it.
            let callback = inner.borrow_mut().frames.remove(&id);
            if let Some(callback) = callback {
                callback();
            }
        }

        let drained = {
            let mut guard = inner.borrow_mut();
            if guard.frames.is_empty() {
                guard.driver = None;
                true
            } else {
                false
            }
        };
        if drained {
            TokioHost::notify_if_idle(&inner);
            return;
        }
    }
}

impl FrameHost for TokioHost {
    fn request_frame(&self, callback: FrameCallback) -> FrameId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id();
        inner.frames.insert(id, callback);

        if inner.driver.is_none() {
            let period = inner.frame_interval;
            let weak = Rc::downgrade(&self.inner);
            inner.driver = Some(tokio::task::spawn_local(drive_frames(weak, period)));
        }
        FrameId(id)
    }

    fn cancel_frame(&self, id: FrameId) {
        let removed = self.inner.borrow_mut().frames.remove(&id.0).is_some();
        if removed {
            Self::notify_if_idle(&self.inner);
        }
    }
}

impl TimerHost for TokioHost {
    fn set_timer(&self, callback: TimerCallback, delay: Duration) -> TimerId {
        let id = self.inner.borrow_mut().next_id();
        let weak = Rc::downgrade(&self.inner);

        let task = tokio::task::spawn_local(async move {
            time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // A timer cleared after waking but before running is no longer in the map.
            let armed = inner.borrow_mut().timers.remove(&id).is_some();
            if armed {
                callback();
                TokioHost::notify_if_idle(&inner);
            }
        });

        self.inner.borrow_mut().timers.insert(id, task);
        TimerId(id)
    }

    fn clear_timer(&self, id: TimerId) {
        let task = self.inner.borrow_mut().timers.remove(&id.0);
        if let Some(task) = task {
            task.abort();
            Self::notify_if_idle(&self.inner);
        }
    }
}
