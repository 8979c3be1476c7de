//! Pulse - frame-synchronized callback loops for render-driven apps.
//!
//! Pulse runs a callback once per display frame, optionally after a start
//! delay, and stops it automatically after a timeout with one last call.
//! Loops are bound to a component lifecycle through the [`use_raf`] hook
//! and are torn down on unmount.
//!
//! # Quick Start
//!
//! ```ignore
//! use pulse::prelude::*;
//!
//! fn app() -> String {
//!     let host = use_context::<TokioHost>().expect("runtime provides a host");
//!     let ticks = use_raf(&host, ScheduleRequest::new().timeout_ms(1000));
//!
//!     let watched = ticks.clone();
//!     use_mount(move || {
//!         let effect = Effect::new(move || {
//!             let _ = watched.get();
//!             request_render();
//!         });
//!         move || effect.dispose()
//!     });
//!
//!     format!("{} frames", ticks.get())
//! }
//!
//! fn main() -> pulse::Result<()> {
//!     pulse::run(FrameClockConfig::default(), app)
//! }
//! ```
//!
//! # Hosts
//!
//! | Host | Clock |
//! |------|-------|
//! | [`TokioHost`] | tokio time, frames every [`FrameClockConfig::frame_interval`] |
//! | [`ManualHost`] | virtual clock stepped by hand, for tests and headless stepping |
//!
//! [`use_raf`]: prelude::use_raf
//! [`ManualHost`]: prelude::ManualHost

pub mod config;
pub mod error;
pub mod host;
pub mod runtime;

pub mod prelude {
    //! Common imports for pulse applications.
    pub use crate::config::FrameClockConfig;
    pub use crate::host::TokioHost;
    pub use crate::runtime::{Runtime, request_render, run};
    pub use pulse_core::{Effect, Signal};
    pub use pulse_core::{
        Delay, FrameLoop, LoopCallback, LoopState, ManualHost, ScheduleRequest, Timeout,
        TimeoutOrigin,
    };
    // Hooks for binding loops to the app lifecycle
    pub use pulse_core::{
        RefHandle, create_context, use_context, use_effect_cleanup, use_mount, use_raf, use_ref,
        use_signal,
    };
}

pub use config::FrameClockConfig;
pub use error::{Error, Result};
pub use host::TokioHost;
pub use runtime::{Runtime, request_render, run};

pub use pulse_core as core;
