//! React-style hooks for keeping state and frame loops alive across renders.
//!
//! An app function is re-run on every render. Hooks let it keep values,
//! effects and frame loops between those runs. Hooks are identified by
//! their position in the call sequence, so they must be called in the
//! **same order** on every render.
//!
//! # Available Hooks
//!
//! | Hook | Purpose |
//! |------|---------|
//! | [`use_signal`] | Reactive state persisted across renders |
//! | [`use_ref`] | Mutable value that is not reactive |
//! | [`use_effect_cleanup`] | Setup/cleanup pair re-run when dependencies change |
//! | [`use_mount`] | Setup/cleanup pair run once |
//! | [`use_raf`] | Per-frame callback loop with delay and timeout |
//! | [`use_context`] | Value shared by [`create_context`] |
//!
//! # Lifecycle
//!
//! ```ignore
//! begin_render();
//! app();          // calls hooks
//! end_render();
//! // ...more renders...
//! clear_hooks();  // unmount: every pending cleanup runs, loops stop
//! ```
//!
//! Effect cleanups are guaranteed to run exactly once: before the effect
//! re-runs for new dependencies, or when the hook state is dropped.
//!
//! # Example
//!
//! ```ignore
//! use pulse_core::*;
//!
//! fn spinner(host: &ManualHost) -> String {
//!     let ticks = use_raf(host, ScheduleRequest::new().timeout_ms(2000));
//!     let glyph = ["|", "/", "-", "\\"][(ticks.get() % 4) as usize];
//!     format!("{glyph} loading")
//! }
//! ```
//!
//! # Error Messages
//!
//! Misuse panics with a diagnostic:
//!
//! ```text
//! pulse hooks error: `use_signal` called outside of render!
//! pulse hooks error: Hook count mismatch!
//! pulse hooks error: Hook order mismatch at index 1!
//! ```

use crate::frame_loop::FrameLoop;
use crate::host::Host;
use crate::reactive::Signal;
use crate::schedule::{Delay, LoopCallback, ScheduleRequest, Timeout, TimeoutOrigin};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

// ============================================================================
// Hook Registry
// ============================================================================

/// Metadata about a hook for debugging purposes.
#[derive(Debug, Clone)]
pub struct HookMeta {
    /// The hook function name (e.g., "use_signal", "use_raf")
    pub hook_type: &'static str,
    /// The type of value stored (from std::any::type_name)
    pub value_type: &'static str,
}

/// Internal storage for a single hook.
struct HookEntry {
    value: Box<dyn Any>,
    meta: HookMeta,
}

/// Registry that manages hook state across renders.
///
/// The registry maintains a list of hooks and tracks the current position
/// during rendering. Hooks are identified by their index in the call order.
pub struct HookRegistry {
    /// Stored hook values, indexed by call order
    hooks: Vec<HookEntry>,
    /// Current hook index during rendering (reset to 0 each render)
    current_index: usize,
    /// Whether we're currently inside a render cycle
    is_rendering: bool,
    /// Expected hook count from previous render (for mismatch detection)
    expected_count: Option<usize>,
    /// Number of completed renders (for debugging)
    render_count: usize,
}

impl HookRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            hooks: Vec::new(),
            current_index: 0,
            is_rendering: false,
            expected_count: None,
            render_count: 0,
        }
    }

    /// Reset hook index and begin a new render cycle.
    fn begin_render(&mut self) {
        self.current_index = 0;
        self.is_rendering = true;
    }

    /// Validate hook count and end the render cycle.
    fn end_render(&mut self) {
        // Check for hook count mismatch
        if let Some(expected) = self.expected_count
            && self.current_index != expected
        {
            panic!(
                "\n\n\x1b[1;31mpulse hooks error: Hook count mismatch!\x1b[0m\n\
                Previous render had {} hooks, current render has {} hooks.\n\
                Render number: {}\n\n\
                This usually happens when:\n\
                - A hook is called inside a conditional (if/match)\n\
                - A hook is called inside a loop with varying iterations\n\
                - A hook is called inside an early return\n\n\
                Hooks must be called in the exact same order every render.\n",
                expected, self.current_index, self.render_count
            );
        }

        // Remember hook count for next render
        self.expected_count = Some(self.current_index);
        self.is_rendering = false;
        self.render_count += 1;
    }

    /// Core hook implementation - gets or creates a hook at the current index.
    fn use_hook<T: Clone + 'static>(
        &mut self,
        hook_type: &'static str,
        init: impl FnOnce() -> T,
    ) -> T {
        // Check that we're inside a render
        if !self.is_rendering {
            panic!(
                "\n\n\x1b[1;31mpulse hooks error: `{}` called outside of render!\x1b[0m\n\
                Hooks can only be called during component rendering.\n\
                Make sure you're not calling hooks in:\n\
                - Event handlers\n\
                - Async callbacks\n\
                - Static initializers\n",
                hook_type
            );
        }

        let index = self.current_index;
        self.current_index += 1;

        if index < self.hooks.len() {
            // Hook already exists - validate type and return
            let entry = &self.hooks[index];

            // Check hook type matches
            if entry.meta.hook_type != hook_type {
                panic!(
                    "\n\n\x1b[1;31mpulse hooks error: Hook order mismatch at index {}!\x1b[0m\n\
                    Previous render: `{}`\n\
                    Current render: `{}`\n\n\
                    Hooks must be called in the exact same order every render.\n",
                    index, entry.meta.hook_type, hook_type
                );
            }

            // Extract the value
            entry
                .value
                .downcast_ref::<T>()
                .expect("Hook value type mismatch - this is a bug in pulse")
                .clone()
        } else {
            // First render - create new hook
            let value = init();
            let meta = HookMeta {
                hook_type,
                value_type: std::any::type_name::<T>(),
            };

            self.hooks.push(HookEntry {
                value: Box::new(value.clone()),
                meta,
            });

            value
        }
    }

    /// Reset the registry, handing back the hook state so the caller can
    /// drop it (running effect cleanups) once the registry is released.
    fn clear(&mut self) -> Vec<HookEntry> {
        let hooks = std::mem::take(&mut self.hooks);
        self.current_index = 0;
        self.is_rendering = false;
        self.expected_count = None;
        self.render_count = 0;
        hooks
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Thread-local hook registry
thread_local! {
    static HOOK_REGISTRY: RefCell<HookRegistry> = RefCell::new(HookRegistry::new());
}

// ============================================================================
// Context Store
// ============================================================================

// Thread-local context store for sharing values with every hook caller
thread_local! {
    static CONTEXT_STORE: RefCell<HashMap<TypeId, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Create a context value accessible from any render.
///
/// The runtime uses this to hand its host to app functions.
///
/// # Example
///
/// ```ignore
/// create_context(host.clone());
///
/// fn app() -> String {
///     let host = use_context::<ManualHost>().expect("host context");
///     let ticks = use_raf(&host, ScheduleRequest::new());
///     format!("{}", ticks.get())
/// }
/// ```
pub fn create_context<T: Clone + 'static>(value: T) -> T {
    CONTEXT_STORE.with(|store| {
        store
            .borrow_mut()
            .insert(TypeId::of::<T>(), Box::new(value.clone()));
    });
    value
}

/// Retrieve a context value by type.
pub fn use_context<T: Clone + 'static>() -> Option<T> {
    CONTEXT_STORE.with(|store| {
        store
            .borrow()
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<T>())
            .cloned()
    })
}

/// Clear all context (called internally during unmount).
fn clear_context() {
    // Take the map out first so context values drop with no borrow held.
    let values = CONTEXT_STORE.with(|store| std::mem::take(&mut *store.borrow_mut()));
    drop(values);
}

// ============================================================================
// Public API - Lifecycle functions
// ============================================================================

/// Begin a render cycle. Call this before running the app function.
pub fn begin_render() {
    HOOK_REGISTRY.with(|registry| {
        registry.borrow_mut().begin_render();
    });
}

/// End a render cycle. Call this after running the app function.
///
/// Panics if the app called a different number of hooks than last time.
pub fn end_render() {
    HOOK_REGISTRY.with(|registry| {
        registry.borrow_mut().end_render();
    });
}

/// Drop all hook state and context: the unmount step.
///
/// Every pending effect cleanup runs, so every frame loop started through
/// [`use_raf`] is torn down.
pub fn clear_hooks() {
    let hooks = HOOK_REGISTRY.with(|registry| registry.borrow_mut().clear());
    drop(hooks);
    clear_context();
}

/// Get debug information about registered hooks.
pub fn get_hooks_debug_info() -> Vec<HookMeta> {
    HOOK_REGISTRY.with(|registry| {
        registry
            .borrow()
            .hooks
            .iter()
            .map(|entry| entry.meta.clone())
            .collect()
    })
}

// ============================================================================
// Public API - Hook functions
// ============================================================================

/// Create or retrieve a persistent reactive signal.
///
/// The initializer only runs on the first render.
pub fn use_signal<T: Clone + 'static>(init: impl FnOnce() -> T) -> Signal<T> {
    HOOK_REGISTRY.with(|registry| {
        registry
            .borrow_mut()
            .use_hook("use_signal", || Signal::new(init()))
    })
}

/// Create or retrieve a mutable value that persists across renders.
///
/// Mutating it never notifies anything.
pub fn use_ref<T: 'static>(init: impl FnOnce() -> T) -> RefHandle<T> {
    let cell = HOOK_REGISTRY.with(|registry| {
        registry
            .borrow_mut()
            .use_hook("use_ref", || Rc::new(RefCell::new(init())))
    });
    RefHandle { inner: cell }
}

/// Handle to a ref value created by `use_ref`.
pub struct RefHandle<T> {
    inner: Rc<RefCell<T>>,
}

impl<T> Clone for RefHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> RefHandle<T> {
    /// Get a reference to the current value.
    pub fn borrow(&self) -> std::cell::Ref<'_, T> {
        self.inner.borrow()
    }

    /// Get a mutable reference to the current value.
    pub fn borrow_mut(&self) -> std::cell::RefMut<'_, T> {
        self.inner.borrow_mut()
    }

    /// Set the value directly.
    pub fn set(&self, value: T) {
        *self.inner.borrow_mut() = value;
    }
}

impl<T: Clone> RefHandle<T> {
    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.inner.borrow().clone()
    }
}

/// Storage for effect dependencies and cleanup function.
struct EffectState<D> {
    deps: Option<D>,
    cleanup: Option<Box<dyn FnOnce()>>,
}

impl<D> Drop for EffectState<D> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

fn effect_hook<F, C, D>(hook_type: &'static str, effect_fn: F, deps: D)
where
    F: FnOnce() -> C + 'static,
    C: FnOnce() + 'static,
    D: PartialEq + Clone + 'static,
{
    let state_ref = HOOK_REGISTRY.with(|registry| {
        registry
            .borrow_mut()
            .use_hook::<Rc<RefCell<EffectState<D>>>>(hook_type, || {
                Rc::new(RefCell::new(EffectState {
                    deps: None,
                    cleanup: None,
                }))
            })
    });

    let mut state = state_ref.borrow_mut();

    let should_run = match &state.deps {
        None => true, // First run
        Some(old_deps) => old_deps != &deps,
    };

    if should_run {
        if let Some(cleanup) = state.cleanup.take() {
            cleanup();
        }

        state.deps = Some(deps);

        let cleanup = effect_fn();
        state.cleanup = Some(Box::new(cleanup));
    }
}

/// Run a side effect with a cleanup function when dependencies change.
///
/// The cleanup runs before the effect re-runs with new dependencies, and
/// on unmount ([`clear_hooks`]).
///
/// # Example
///
/// ```ignore
/// use_effect_cleanup(|| {
///     let subscription = subscribe(id);
///     move || subscription.cancel()
/// }, id);
/// ```
pub fn use_effect_cleanup<F, C, D>(effect_fn: F, deps: D)
where
    F: FnOnce() -> C + 'static,
    C: FnOnce() + 'static,
    D: PartialEq + Clone + 'static,
{
    effect_hook("use_effect_cleanup", effect_fn, deps);
}

/// Run a setup/cleanup pair once, on the first render.
pub fn use_mount<F, C>(effect_fn: F)
where
    F: FnOnce() -> C + 'static,
    C: FnOnce() + 'static,
{
    // Unit deps never change
    effect_hook("use_mount", effect_fn, ());
}

/// Value compared between renders to decide whether a frame loop restarts.
#[derive(Clone, PartialEq, Debug)]
struct RafKey<D> {
    timeout: Timeout,
    delay: Delay,
    origin: TimeoutOrigin,
    deps: D,
}

/// Run a per-frame callback loop on `host` for as long as the caller stays
/// mounted.
///
/// The loop restarts whenever `timeout`, `delay`, `timeout_origin` or the
/// dependency key change by value. A new callback on a later render is
/// picked up by the running loop without restarting it.
///
/// Returns the tick signal. Without a callback, every frame (and the final
/// timeout call) increments it; subscribe with an `Effect` to react.
///
/// # Example
///
/// ```ignore
/// fn progress(host: &TokioHost, level: u32) -> String {
///     let ticks = use_raf(
///         host,
///         ScheduleRequest::new().timeout_ms(1500).delay_ms(Some(200)).deps(level),
///     );
///     format!("level {level}: {} frames", ticks.get())
/// }
/// ```
pub fn use_raf<H, D>(host: &H, request: ScheduleRequest<D>) -> Signal<u64>
where
    H: Host,
    D: PartialEq + Clone + 'static,
{
    let ticks = use_signal(|| 0u64);
    let current = use_ref(LoopCallback::noop).get();

    match request.callback {
        Some(callback) => current.replace(move || callback.invoke()),
        None => {
            let ticks = ticks.clone();
            current.replace(move || ticks.update(|n| *n += 1));
        }
    }

    let key = RafKey {
        timeout: request.timeout,
        delay: request.delay,
        origin: request.timeout_origin,
        deps: request.dependency_key,
    };
    let (timeout, delay, origin) = (key.timeout, key.delay, key.origin);
    let host = host.clone();

    effect_hook(
        "use_raf",
        move || {
            let frame_loop = FrameLoop::start(
                host,
                ScheduleRequest::new()
                    .timeout(timeout)
                    .delay(delay)
                    .timeout_origin(origin)
                    .loop_callback(current),
            );
            move || frame_loop.stop()
        },
        key,
    );

    ticks
}
