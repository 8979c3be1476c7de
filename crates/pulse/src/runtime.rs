//! Runtime - render loop and app lifecycle.
//!
//! The runtime mounts an app function, re-runs it whenever a render is
//! requested, hands each output to a presenter and unmounts once the host
//! has nothing left to do.

use crate::config::FrameClockConfig;
use crate::error::Result;
use crate::host::TokioHost;
use pulse_core::hooks::{
    begin_render, clear_hooks, create_context, end_render, get_hooks_debug_info,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::sync::Notify;
use tokio::task::LocalSet;

/// Shared state for the render context.
struct RenderContextInner {
    notify: Notify,
    needs_render: Cell<bool>,
}

/// Context for triggering re-renders from anywhere in the app.
#[derive(Clone)]
pub struct RenderContext {
    inner: Rc<RenderContextInner>,
}

impl RenderContext {
    fn new() -> Self {
        Self {
            inner: Rc::new(RenderContextInner {
                notify: Notify::new(),
                needs_render: Cell::new(false),
            }),
        }
    }

    /// Request a re-render of the app. Repeated requests before the next
    /// render collapse into one.
    pub fn request_render(&self) {
        if !self.inner.needs_render.replace(true) {
            self.inner.notify.notify_one();
        }
    }

    fn take_request(&self) -> bool {
        self.inner.needs_render.replace(false)
    }

    async fn requested(&self) {
        self.inner.notify.notified().await;
    }
}

// Thread-local render context for triggering re-renders
thread_local! {
    static RENDER_CONTEXT: RefCell<Option<RenderContext>> = const { RefCell::new(None) };
}

/// Request a re-render of the app.
///
/// Typically called from an `Effect` that reads a `use_raf` tick signal.
/// Does nothing when no runtime is active on this thread.
pub fn request_render() {
    RENDER_CONTEXT.with(|ctx| {
        if let Some(ctx) = ctx.borrow().as_ref() {
            ctx.request_render();
        }
    });
}

/// Receives every rendered output.
pub type Presenter = Box<dyn FnMut(&str)>;

/// The pulse application runtime.
pub struct Runtime {
    host: TokioHost,
    app_fn: Box<dyn Fn() -> String>,
    presenter: Presenter,
    render_context: RenderContext,
    render_count: usize,
}

impl Runtime {
    pub fn new<F: Fn() -> String + 'static>(host: TokioHost, app: F) -> Self {
        let render_context = RenderContext::new();

        // Set global render context
        RENDER_CONTEXT.with(|ctx| {
            *ctx.borrow_mut() = Some(render_context.clone());
        });

        Self {
            host,
            app_fn: Box::new(app),
            presenter: Box::new(|output| println!("{output}")),
            render_context,
            render_count: 0,
        }
    }

    /// Replace the default stdout presenter.
    pub fn with_presenter(mut self, presenter: impl FnMut(&str) + 'static) -> Self {
        self.presenter = Box::new(presenter);
        self
    }

    pub fn host(&self) -> &TokioHost {
        &self.host
    }

    pub fn render_context(&self) -> &RenderContext {
        &self.render_context
    }

    /// Re-run the app function and present its output.
    fn render(&mut self) {
        self.render_context.take_request();

        begin_render();
        let output = (self.app_fn)();
        end_render();

        self.render_count += 1;
        if self.render_count == 1 {
            let hooks: Vec<&str> = get_hooks_debug_info()
                .iter()
                .map(|meta| meta.hook_type)
                .collect();
            tracing::debug!(?hooks, "app mounted");
        }
        tracing::debug!(render = self.render_count, "rendered");
        (self.presenter)(&output);
    }

    /// Mount the app and render until the host is idle with no render
    /// pending, then unmount. Returns the number of renders.
    ///
    /// Must run inside a [`LocalSet`].
    pub async fn run(mut self) -> usize {
        clear_hooks();
        create_context(self.host.clone());

        self.render();
        loop {
            if self.render_context.take_request() {
                self.render();
                continue;
            }
            if self.host.is_idle() {
                break;
            }
            tokio::select! {
                _ = self.render_context.requested() => {}
                _ = self.host.idle() => {}
            }
        }

        tracing::debug!(renders = self.render_count, "host idle, unmounting");
        clear_hooks();
        self.render_count
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        RENDER_CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            if ctx
                .as_ref()
                .is_some_and(|current| Rc::ptr_eq(&current.inner, &self.render_context.inner))
            {
                *ctx = None;
            }
        });
    }
}

/// Run the app on a fresh single-threaded tokio runtime until it goes idle.
///
/// # Example
///
/// ```ignore
/// use pulse::prelude::*;
///
/// fn app() -> String {
///     let host = use_context::<TokioHost>().expect("runtime provides a host");
///     let ticks = use_raf(&host, ScheduleRequest::new().timeout_ms(1000));
///     format!("{} frames", ticks.get())
/// }
///
/// fn main() -> pulse::Result<()> {
///     pulse::run(FrameClockConfig::default(), app)
/// }
/// ```
pub fn run<F>(config: FrameClockConfig, app: F) -> Result<()>
where
    F: Fn() -> String + 'static,
{
    // Initialize tracing
    let _ = tracing_subscriber::fmt::try_init();

    config.validate()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let local = LocalSet::new();
    local.block_on(&runtime, async move {
        let host = TokioHost::new(config)?;
        let renders = Runtime::new(host, app).run().await;
        tracing::info!(renders, "app finished");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{Effect, ScheduleRequest, use_context, use_mount, use_raf};
    use std::cell::Cell;

    fn tick_count(output: &str) -> u64 {
        output
            .trim_start_matches("ticks=")
            .parse()
            .unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn renders_on_every_tick_until_timeout() {
        LocalSet::new()
            .run_until(async {
                let host = TokioHost::new(FrameClockConfig::default()).unwrap();
                let outputs = Rc::new(RefCell::new(Vec::new()));
                let sink = Rc::clone(&outputs);

                let app = || {
                    let host = use_context::<TokioHost>().unwrap();
                    let ticks = use_raf(&host, ScheduleRequest::new().timeout_ms(200));
                    let watched = ticks.clone();
                    use_mount(move || {
                        let effect = Effect::new(move || {
                            let _ = watched.get();
                            request_render();
                        });
                        move || effect.dispose()
                    });
                    format!("ticks={}", ticks.get())
                };

                let renders = Runtime::new(host.clone(), app)
                    .with_presenter(move |output| sink.borrow_mut().push(output.to_string()))
                    .run()
                    .await;

                let outputs = outputs.borrow();
                assert_eq!(outputs.len(), renders);
                assert_eq!(outputs.first().map(String::as_str), Some("ticks=0"));

                // 12 frames at 16ms plus the final call at 200ms.
                let last = outputs.last().map(|o| tick_count(o)).unwrap_or_default();
                assert!((12..=14).contains(&last), "last output {last}");
                assert!(host.is_idle());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn app_without_loops_renders_once() {
        LocalSet::new()
            .run_until(async {
                let host = TokioHost::new(FrameClockConfig::default()).unwrap();
                let renders = Runtime::new(host, || "static".to_string())
                    .with_presenter(|_| {})
                    .run()
                    .await;
                assert_eq!(renders, 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_stops_unbounded_loops() {
        LocalSet::new()
            .run_until(async {
                let host = TokioHost::new(FrameClockConfig::default()).unwrap();
                let frames = Rc::new(Cell::new(0u32));
                let counted = Rc::clone(&frames);

                // The callback never requests a render, so the runtime only
                // exits because the delay is "never start".
                let app = move || {
                    let host = use_context::<TokioHost>().unwrap();
                    let counted = Rc::clone(&counted);
                    use_raf(
                        &host,
                        ScheduleRequest::new()
                            .delay_ms(None)
                            .callback(move || counted.set(counted.get() + 1)),
                    );
                    String::new()
                };

                let renders = Runtime::new(host.clone(), app)
                    .with_presenter(|_| {})
                    .run()
                    .await;
                assert_eq!(renders, 1);
                assert_eq!(frames.get(), 0);
                assert!(host.is_idle());
            })
            .await;
    }

    #[test]
    fn request_render_without_runtime_is_ignored() {
        request_render();
    }
}
