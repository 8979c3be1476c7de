//! ticker - A terminal progress bar driven by pulse frame loops.
//!
//! This demo shows:
//! - use_raf with a start delay and a timeout
//! - A per-frame callback swapped on every render without restarting the loop
//! - Re-rendering from an Effect subscribed to the tick signal

use pulse::prelude::*;
use std::time::Duration;

const RUN_FOR_MS: i64 = 2000;
const START_AFTER_MS: u64 = 250;
const BAR_WIDTH: usize = 40;
const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

fn bar(fraction: f64) -> String {
    let filled = ((fraction.clamp(0.0, 1.0)) * BAR_WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), " ".repeat(BAR_WIDTH - filled))
}

fn app() -> String {
    let Some(host) = use_context::<TokioHost>() else {
        return "no frame host".to_string();
    };

    // Progress: no callback, so every frame bumps the tick signal.
    let ticks = use_raf(
        &host,
        ScheduleRequest::new()
            .timeout_ms(RUN_FOR_MS)
            .delay_ms(Some(START_AFTER_MS))
            .timeout_origin(TimeoutOrigin::LoopStart),
    );

    // Spinner: a callback loop that keeps its own frame count and stops
    // together with the progress loop.
    let spins = use_signal(|| 0u64);
    let spin = spins.clone();
    use_raf(
        &host,
        ScheduleRequest::new()
            .timeout_ms(RUN_FOR_MS + START_AFTER_MS as i64)
            .callback(move || spin.update(|n| *n += 1)),
    );

    let watched = ticks.clone();
    use_mount(move || {
        let effect = Effect::new(move || {
            let _ = watched.get();
            request_render();
        });
        move || effect.dispose()
    });

    let elapsed = host.frame_interval() * ticks.get() as u32;
    let fraction = elapsed.as_secs_f64() / Duration::from_millis(RUN_FOR_MS as u64).as_secs_f64();
    let glyph = SPINNER[(spins.peek() % SPINNER.len() as u64) as usize];

    format!(
        "{glyph} {} {:>3}% ({} frames)",
        bar(fraction),
        (fraction.min(1.0) * 100.0) as u32,
        ticks.get()
    )
}

fn main() -> pulse::Result<()> {
    pulse::run(FrameClockConfig::default().with_refresh_rate(60), app)?;
    tracing::info!("ticker finished");
    Ok(())
}
