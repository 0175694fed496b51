//! Streams silence to the default communications output until Ctrl+C.
//!
//! Exercises the engine's hot-swap path end to end: while this runs, change
//! the OS default output device or unplug the bound device and watch the
//! engine rebind.

use render_audio::RenderEngine;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let engine = RenderEngine::builder()
        .on_event(|event| tracing::info!(?event, "engine event"))
        .start()?;

    tracing::info!(
        device = ?engine.current_device(),
        "rendering silence - press Ctrl+C to stop"
    );

    // Await the cancellation signal instead of polling
    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    let _ = rx.recv();

    tracing::info!(stats = ?engine.stats(), "shutting down");
    engine.stop()?;
    Ok(())
}
