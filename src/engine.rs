//! Render engine lifecycle and the realtime render loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{create_backend, ReadySignal, RenderBackend};
use crate::notify::SwitchListener;
use crate::session::RenderSession;
use crate::signal::{Signal, SignalSet, SwitchSlot};
use crate::staging::StagingBuffer;
use crate::thread_priority;
use crate::{
    DeviceId, EngineConfig, EngineEvent, EventCallback, RenderAudioError, StreamFormat,
};

/// Statistics about a running engine.
#[derive(Debug, Clone, Default)]
pub struct RenderStats {
    /// Total frames delivered to the device in steady state.
    pub frames_written: u64,
    /// Buffer-ready cycles serviced.
    pub cycles: u64,
    /// Completed device switches after the initial bind.
    pub switches: u64,
}

/// State shared between the engine handle and the render loop thread.
struct EngineState {
    running: AtomicBool,
    playing: AtomicBool,
    frames_written: AtomicU64,
    cycles: AtomicU64,
    switches: AtomicU64,
    current_device: Mutex<Option<DeviceId>>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            playing: AtomicBool::new(true),
            frames_written: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            switches: AtomicU64::new(0),
            current_device: Mutex::new(None),
        }
    }
}

/// Handle to a running render engine.
///
/// Returned by [`RenderEngineBuilder::start()`]. The engine owns a single
/// render loop thread that performs all device I/O; the handle's methods
/// only flip flags and raise signals, so they are safe to call from any
/// thread at any time.
///
/// # Example
///
/// ```no_run
/// use render_audio::{DeviceId, RenderEngine};
///
/// # fn main() -> Result<(), render_audio::RenderAudioError> {
/// let engine = RenderEngine::builder().start()?;
///
/// // Hot-swap to a specific device; returns immediately, the switch is
/// // applied by the render loop.
/// engine.set_device(DeviceId::new("USB Headset"));
///
/// engine.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct RenderEngine {
    state: Arc<EngineState>,
    signals: Arc<SignalSet>,
    pending: Arc<SwitchSlot>,
    thread: Option<JoinHandle<()>>,
}

impl RenderEngine {
    /// Creates a builder with default configuration.
    pub fn builder() -> RenderEngineBuilder {
        RenderEngineBuilder::new()
    }

    /// Requests a switch to another output device.
    ///
    /// Constant-time: writes the pending-switch slot and signals the render
    /// loop; does not wait for the switch to complete. Rapid consecutive
    /// requests coalesce - only the latest target is applied.
    pub fn set_device(&self, device: DeviceId) {
        self.pending.request(device);
        self.signals.raise_switch();
    }

    /// Suspends content delivery. While paused the engine keeps servicing
    /// the device with silence but leaves staged content untouched.
    pub fn pause(&self) {
        self.state.playing.store(false, Ordering::SeqCst);
    }

    /// Resumes content delivery after [`pause()`](Self::pause).
    pub fn resume(&self) {
        self.state.playing.store(true, Ordering::SeqCst);
    }

    /// `true` while content delivery is active (not paused).
    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst)
    }

    /// `true` while the render loop thread is alive.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Identity of the currently bound device, or `None` while unbound
    /// (e.g. after a failed switch).
    pub fn current_device(&self) -> Option<DeviceId> {
        self.state.current_device.lock().clone()
    }

    /// Returns current engine statistics.
    pub fn stats(&self) -> RenderStats {
        RenderStats {
            frames_written: self.state.frames_written.load(Ordering::SeqCst),
            cycles: self.state.cycles.load(Ordering::SeqCst),
            switches: self.state.switches.load(Ordering::SeqCst),
        }
    }

    /// Stops the engine: signals shutdown, joins the render loop thread,
    /// and releases all device resources.
    ///
    /// Safe to call at any point in the lifecycle; shutdown wins over any
    /// pending switch or buffer work, so teardown latency stays bounded.
    pub fn stop(mut self) -> Result<(), RenderAudioError> {
        self.signals.raise_shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.state.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        // Dropped without explicit stop(): signal the loop to tear down in
        // the background rather than blocking the dropping thread on a join.
        if self.state.running.load(Ordering::SeqCst) {
            self.signals.raise_shutdown();
        }
    }
}

/// Builder for configuring and starting a [`RenderEngine`].
pub struct RenderEngineBuilder {
    config: EngineConfig,
    backend: Option<Box<dyn RenderBackend>>,
    events: Option<EventCallback>,
}

impl RenderEngineBuilder {
    fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            backend: None,
            events: None,
        }
    }

    /// Sets the device to bind at startup. Defaults to the default-tracking
    /// sentinel.
    #[must_use]
    pub fn device(mut self, device: DeviceId) -> Self {
        self.config.device = device;
        self
    }

    /// Sets the stream format. Fixed for the engine's lifetime.
    #[must_use]
    pub fn format(mut self, format: StreamFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Sets the latency hint passed to the device.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.config.latency = latency;
        self
    }

    /// Sets the staging buffer capacity.
    #[must_use]
    pub fn staging_capacity(mut self, capacity: Duration) -> Self {
        self.config.staging_capacity = capacity;
        self
    }

    /// Sets the silence fill granularity.
    #[must_use]
    pub fn silence_chunk(mut self, chunk: Duration) -> Self {
        self.config.silence_chunk = chunk;
        self
    }

    /// Registers a callback for runtime events.
    #[must_use]
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(EngineEvent) + Send + Sync + 'static,
    {
        self.events = Some(Arc::new(f));
        self
    }

    /// Overrides the platform backend. Primarily for tests; the default is
    /// [`create_backend()`](crate::backend::create_backend).
    #[must_use]
    pub fn with_backend(mut self, backend: Box<dyn RenderBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Starts the engine: spawns the render loop thread and binds the
    /// configured device on it.
    ///
    /// # Errors
    ///
    /// Returns any resolution or initialization error from the initial
    /// bind, or `BackendUnavailable` when no platform backend exists.
    pub fn start(self) -> Result<RenderEngine, RenderAudioError> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => create_backend()?,
        };

        let signals = Arc::new(SignalSet::new());
        let pending = Arc::new(SwitchSlot::new());
        let state = Arc::new(EngineState::new());
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);

        let thread = {
            let signals = signals.clone();
            let pending = pending.clone();
            let state = state.clone();
            let config = self.config;
            let events = self.events;
            std::thread::Builder::new()
                .name("audio-render".to_string())
                .spawn(move || {
                    render_loop(backend, config, state, signals, pending, events, &ack_tx);
                })
                .map_err(|e| RenderAudioError::BackendError(e.to_string()))?
        };

        match ack_rx.recv() {
            Ok(Ok(())) => Ok(RenderEngine {
                state,
                signals,
                pending,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(RenderAudioError::BackendError(
                    "render thread exited during startup".to_string(),
                ))
            }
        }
    }
}

fn emit(events: &Option<EventCallback>, event: EngineEvent) {
    if let Some(events) = events {
        events(event);
    }
}

/// Body of the render loop thread. Owns the session and all device I/O.
#[allow(clippy::too_many_arguments)]
fn render_loop(
    backend: Box<dyn RenderBackend>,
    config: EngineConfig,
    state: Arc<EngineState>,
    signals: Arc<SignalSet>,
    pending: Arc<SwitchSlot>,
    events: Option<EventCallback>,
    ack: &crossbeam_channel::Sender<Result<(), RenderAudioError>>,
) {
    let priority = thread_priority::set_realtime_priority();
    tracing::debug!(?priority, "render thread priority");

    let tracking = Arc::new(AtomicBool::new(false));
    let listener = Arc::new(SwitchListener::new(
        signals.clone(),
        pending.clone(),
        tracking.clone(),
        events.clone(),
    ));
    if let Err(e) = backend.register_device_events(listener.clone()) {
        let _ = ack.send(Err(e));
        state.running.store(false, Ordering::SeqCst);
        return;
    }

    let ready: ReadySignal = {
        let signals = signals.clone();
        Arc::new(move || signals.raise_data_ready())
    };
    let mut session = RenderSession::new(
        config.format,
        config.latency,
        ready,
        listener,
        tracking,
    );
    let mut staging = StagingBuffer::new(
        config.staging_capacity_bytes(),
        config.silence_chunk_bytes(),
    );

    match session.rebind(backend.as_ref(), &config.device) {
        Ok(resolved_id) => {
            *state.current_device.lock() = Some(config.device.clone());
            emit(
                &events,
                EngineEvent::DeviceBound {
                    device: config.device.clone(),
                    resolved_id,
                },
            );
            let _ = ack.send(Ok(()));
        }
        Err(e) => {
            let _ = backend.unregister_device_events();
            let _ = ack.send(Err(e));
            state.running.store(false, Ordering::SeqCst);
            return;
        }
    }

    loop {
        match signals.wait() {
            Signal::Shutdown => break,
            Signal::Switch => {
                // Drain the slot before rebinding so a request raised during
                // the rebind is observed as a fresh switch
                let Some(target) = pending.take() else {
                    continue;
                };
                match session.rebind(backend.as_ref(), &target) {
                    Ok(resolved_id) => {
                        state.switches.fetch_add(1, Ordering::SeqCst);
                        *state.current_device.lock() = Some(target.clone());
                        tracing::info!(device = %target, "output device switched");
                        emit(
                            &events,
                            EngineEvent::DeviceBound {
                                device: target,
                                resolved_id,
                            },
                        );
                    }
                    Err(e) => {
                        *state.current_device.lock() = None;
                        tracing::warn!(device = %target, error = %e, "device switch failed");
                        emit(
                            &events,
                            EngineEvent::SwitchFailed {
                                device: target,
                                error: e.to_string(),
                            },
                        );
                    }
                }
            }
            Signal::DataReady => {
                let paused = !state.playing.load(Ordering::SeqCst);
                match session.service_cycle(&mut staging, paused) {
                    Ok(frames) => {
                        state.cycles.fetch_add(1, Ordering::SeqCst);
                        state
                            .frames_written
                            .fetch_add(u64::from(frames), Ordering::SeqCst);
                    }
                    Err(e) => {
                        // Drop this cycle's frames; the device plays silence
                        // and delivery resumes next cycle
                        tracing::warn!(error = %e, "buffer delivery failed");
                        emit(
                            &events,
                            EngineEvent::DeliveryError {
                                error: e.to_string(),
                            },
                        );
                    }
                }
            }
        }
    }

    session.unbind();
    if let Err(e) = backend.unregister_device_events() {
        tracing::warn!(error = %e, "failed to unregister device notifications");
    }
    state.running.store(false, Ordering::SeqCst);
}
