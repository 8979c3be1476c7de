//! Schedule configuration for frame loops.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Maximum lifetime of a frame loop.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum Timeout {
    /// The loop never stops on its own.
    #[default]
    Unbounded,
    /// The loop is force-stopped once this much time has elapsed.
    After(Duration),
}

impl Timeout {
    /// Interpret a millisecond count; any negative value means unbounded.
    pub fn from_millis(ms: i64) -> Self {
        if ms < 0 {
            Timeout::Unbounded
        } else {
            Timeout::After(Duration::from_millis(ms as u64))
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Timeout::Unbounded => None,
            Timeout::After(d) => Some(*d),
        }
    }
}

/// Wait before the first frame is requested.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Delay {
    /// Never start. No timer, frame or callback is ever scheduled.
    Never,
    /// Start once this much time has elapsed.
    After(Duration),
}

impl Delay {
    /// `None` is the "never start" sentinel.
    pub fn from_millis(ms: Option<u64>) -> Self {
        match ms {
            Some(ms) => Delay::After(Duration::from_millis(ms)),
            None => Delay::Never,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Delay::Never => None,
            Delay::After(d) => Some(*d),
        }
    }
}

impl Default for Delay {
    fn default() -> Self {
        Delay::After(Duration::ZERO)
    }
}

impl From<Option<Duration>> for Delay {
    fn from(value: Option<Duration>) -> Self {
        value.map_or(Delay::Never, Delay::After)
    }
}

/// When the timeout clock starts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum TimeoutOrigin {
    /// Armed together with the delay timer, so the delay counts against the
    /// timeout.
    #[default]
    Schedule,
    /// Armed when the delay elapses and the first frame is requested.
    LoopStart,
}

/// Observable lifecycle of a frame loop.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LoopState {
    /// Nothing armed; the delay was the never-start sentinel.
    Idle,
    /// Delay timer armed, no frame requested yet.
    Delaying,
    /// Frames are being requested one after another.
    Looping,
    /// Terminal. No further timers or frames.
    Stopped,
}

/// Shared, replaceable per-frame callback.
///
/// Clones point at the same slot, so the procedure can be swapped while a
/// loop is running without restarting it. The slot is not borrowed while
/// the procedure runs: a callback may replace itself, and a replacement
/// made during the call takes effect from the next invocation.
#[derive(Clone)]
pub struct LoopCallback {
    inner: Rc<CallbackSlot>,
}

struct CallbackSlot {
    f: RefCell<Option<Box<dyn FnMut()>>>,
    /// Bumped by every `replace`.
    generation: Cell<u64>,
}

impl LoopCallback {
    pub fn new(f: impl FnMut() + 'static) -> Self {
        Self {
            inner: Rc::new(CallbackSlot {
                f: RefCell::new(Some(Box::new(f))),
                generation: Cell::new(0),
            }),
        }
    }

    /// A callback that does nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Swap in a new procedure for every holder of this callback.
    pub fn replace(&self, f: impl FnMut() + 'static) {
        *self.inner.f.borrow_mut() = Some(Box::new(f));
        self.inner.generation.set(self.inner.generation.get() + 1);
    }

    /// Run the current procedure. A nested call on the same slot while it
    /// is already running does nothing.
    pub fn invoke(&self) {
        let taken = self.inner.f.borrow_mut().take();
        let Some(mut f) = taken else {
            return;
        };

        let generation = self.inner.generation.get();
        f();

        // Put it back unless it was replaced while running.
        if self.inner.generation.get() == generation {
            *self.inner.f.borrow_mut() = Some(f);
        }
    }

    /// Whether two handles share the same slot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for LoopCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopCallback")
            .field("holders", &Rc::strong_count(&self.inner))
            .finish()
    }
}

/// Configuration for one frame loop.
///
/// # Example
///
/// ```ignore
/// let request = ScheduleRequest::new()
///     .timeout_ms(1000)
///     .delay_ms(Some(100))
///     .callback(|| println!("frame"));
/// ```
#[derive(Debug)]
pub struct ScheduleRequest<D = ()> {
    pub timeout: Timeout,
    pub delay: Delay,
    /// `None` makes the loop bump its tick signal instead.
    pub callback: Option<LoopCallback>,
    /// Compared by value to decide whether an active loop must restart.
    pub dependency_key: D,
    pub timeout_origin: TimeoutOrigin,
}

impl ScheduleRequest<()> {
    pub fn new() -> Self {
        Self {
            timeout: Timeout::default(),
            delay: Delay::default(),
            callback: None,
            dependency_key: (),
            timeout_origin: TimeoutOrigin::default(),
        }
    }
}

impl Default for ScheduleRequest<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> ScheduleRequest<D> {
    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Negative values mean unbounded.
    pub fn timeout_ms(self, ms: i64) -> Self {
        self.timeout(Timeout::from_millis(ms))
    }

    pub fn delay(mut self, delay: Delay) -> Self {
        self.delay = delay;
        self
    }

    /// `None` never starts the loop.
    pub fn delay_ms(self, ms: Option<u64>) -> Self {
        self.delay(Delay::from_millis(ms))
    }

    pub fn callback(mut self, f: impl FnMut() + 'static) -> Self {
        self.callback = Some(LoopCallback::new(f));
        self
    }

    pub fn loop_callback(mut self, callback: LoopCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn timeout_origin(mut self, origin: TimeoutOrigin) -> Self {
        self.timeout_origin = origin;
        self
    }

    /// Replace the dependency key, changing its type.
    pub fn deps<K>(self, dependency_key: K) -> ScheduleRequest<K> {
        ScheduleRequest {
            timeout: self.timeout,
            delay: self.delay,
            callback: self.callback,
            dependency_key,
            timeout_origin: self.timeout_origin,
        }
    }
}
