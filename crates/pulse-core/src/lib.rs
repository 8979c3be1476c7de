//! Core types and traits for pulse.

pub mod frame_loop;
pub mod hooks;
pub mod host;
pub mod manual;
pub mod reactive;
pub mod schedule;

// Re-export reactive types for convenience
pub use reactive::{Effect, Signal};

// Re-export hooks for ergonomic state management
pub use hooks::{
    begin_render, clear_hooks, create_context, end_render, get_hooks_debug_info, use_context,
    use_effect_cleanup, use_mount, use_raf, use_ref, use_signal, HookMeta, RefHandle,
};

// Re-export scheduling types
pub use frame_loop::FrameLoop;
pub use host::{FrameCallback, FrameHost, FrameId, Host, TimerCallback, TimerHost, TimerId};
pub use manual::{HostStats, ManualHost};
pub use schedule::{Delay, LoopCallback, LoopState, ScheduleRequest, Timeout, TimeoutOrigin};
