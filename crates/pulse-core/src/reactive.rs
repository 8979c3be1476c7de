//! Reactive primitives: signals and effects.
//!
//! Frame loops publish ticks through a [`Signal`]; anything that needs to
//! react to a tick (a re-render request, a progress readout) subscribes by
//! reading the signal inside an [`Effect`].
//!
//! # Example
//!
//! ```ignore
//! use pulse_core::reactive::*;
//!
//! let ticks = Signal::new(0u64);
//!
//! let watched = ticks.clone();
//! Effect::new(move || {
//!     println!("tick {}", watched.get());
//! });
//!
//! ticks.update(|n| *n += 1); // Prints: "tick 1"
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

// ============================================================================
// Runtime Context
// ============================================================================

// Per-thread bookkeeping for reactive subscriptions:
// - the stack of effects currently running
// - effects waiting to run after a signal changed
thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

struct Runtime {
    /// Stack of currently executing observers
    observer_stack: Vec<ObserverId>,

    /// Effects that need to run
    pending_effects: Vec<ObserverId>,

    /// Counter for generating unique IDs
    next_id: usize,
}

impl Runtime {
    fn new() -> Self {
        Self {
            observer_stack: Vec::new(),
            pending_effects: Vec::new(),
            next_id: 0,
        }
    }

    fn next_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Unique identifier for an effect.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct ObserverId(usize);

// ============================================================================
// Signal
// ============================================================================

/// A reactive container that notifies subscribed effects when it changes.
///
/// Reading a signal inside an effect subscribes that effect. Setting or
/// updating the signal re-runs every subscriber synchronously.
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T> {
    value: RefCell<T>,
    subscribers: RefCell<HashSet<ObserverId>>,
}

impl<T> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                value: RefCell::new(value),
                subscribers: RefCell::new(HashSet::new()),
            }),
        }
    }

    /// Subscribe the current observer (if any) to this signal.
    fn track(&self) {
        RUNTIME.with(|rt| {
            let rt = rt.borrow();
            if let Some(&observer) = rt.observer_stack.last() {
                self.inner.subscribers.borrow_mut().insert(observer);
            }
        });
    }

    /// Queue all live subscribers and flush them. Disposed effects are
    /// dropped from the subscriber set here.
    fn notify(&self) {
        let subscribers: Vec<_> = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            subscribers.retain(|&id| effect_is_live(id));
            subscribers.iter().copied().collect()
        };

        RUNTIME.with(|rt| {
            let mut rt = rt.borrow_mut();
            for observer in subscribers {
                if !rt.pending_effects.contains(&observer) {
                    rt.pending_effects.push(observer);
                }
            }
        });

        flush_effects();
    }

    /// Number of effects subscribed to this signal.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }
}

impl<T: Clone> Signal<T> {
    /// Get the current value, subscribing the running effect if there is one.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.borrow().clone()
    }

    /// Get the current value without subscribing.
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T> Signal<T> {
    /// Read the value by reference, subscribing the running effect.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&*self.inner.value.borrow())
    }

    /// Set the signal to a new value and notify subscribers.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.notify();
    }

    /// Update the value in place and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut *self.inner.value.borrow_mut());
        self.notify();
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

impl<T: fmt::Display> fmt::Display for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner.value.borrow(), f)
    }
}

// ============================================================================
// Effect
// ============================================================================

// Storage for all live effects. Ids are never reused, so a stale id in a
// subscriber set can only miss.
thread_local! {
    static EFFECTS: RefCell<HashMap<ObserverId, Rc<EffectInner>>> = RefCell::new(HashMap::new());
}

fn effect_is_live(id: ObserverId) -> bool {
    EFFECTS.with(|effects| effects.borrow().contains_key(&id))
}

/// A side-effect that re-runs whenever a signal it read changes.
///
/// Effects outlive their handles; call [`Effect::dispose`] to stop one.
pub struct Effect {
    id: ObserverId,
}

struct EffectInner {
    f: RefCell<Box<dyn FnMut()>>,
    disposed: Cell<bool>,
}

impl Effect {
    /// Create an effect that runs immediately and re-runs when dependencies change.
    pub fn new<F: FnMut() + 'static>(f: F) -> Self {
        let id = RUNTIME.with(|rt| ObserverId(rt.borrow_mut().next_id()));

        let inner = Rc::new(EffectInner {
            f: RefCell::new(Box::new(f)),
            disposed: Cell::new(false),
        });

        EFFECTS.with(|effects| {
            effects.borrow_mut().insert(id, inner);
        });

        run_effect(id);

        Effect { id }
    }

    /// Manually trigger this effect to run.
    pub fn run(&self) {
        run_effect(self.id);
    }

    /// Dispose of this effect, preventing it from running again.
    pub fn dispose(&self) {
        let inner = EFFECTS.with(|effects| effects.borrow_mut().remove(&self.id));
        if let Some(inner) = inner {
            inner.disposed.set(true);
        }
    }

    pub fn is_disposed(&self) -> bool {
        EFFECTS.with(|effects| {
            effects
                .borrow()
                .get(&self.id)
                .is_none_or(|inner| inner.disposed.get())
        })
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id.0)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Run a specific effect by ID
fn run_effect(id: ObserverId) {
    let effect = EFFECTS.with(|effects| effects.borrow().get(&id).cloned());

    if let Some(inner) = effect {
        if inner.disposed.get() {
            return;
        }

        RUNTIME.with(|rt| {
            rt.borrow_mut().observer_stack.push(id);
        });

        // An effect that re-triggers itself while running is skipped rather
        // than re-entered.
        if let Ok(mut f) = inner.f.try_borrow_mut() {
            f();
        }

        RUNTIME.with(|rt| {
            rt.borrow_mut().observer_stack.pop();
        });
    }
}

/// Flush all pending effects
fn flush_effects() {
    loop {
        let effect_id = RUNTIME.with(|rt| rt.borrow_mut().pending_effects.pop());

        match effect_id {
            Some(id) => run_effect(id),
            None => break,
        }
    }
}
