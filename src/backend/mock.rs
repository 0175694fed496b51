//! Mock render backend for testing without hardware.
//!
//! Provides a scripted device set with controllable buffer capacity and
//! padding, counters proving open/close pairing, and injection points for
//! default-device-changed and session-disconnected notifications. Drives
//! all engine-level tests so they run in CI without audio hardware.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    DataFlow, DeviceNotificationSink, DeviceRole, DisconnectReason, OutputDevice, OutputStream,
    ReadySignal, RenderBackend, SessionEventSink,
};
use crate::{DeviceId, RenderAudioError, StreamFormat};

/// Default scripted device buffer capacity in frames (10ms at 48kHz).
const MOCK_BUFFER_FRAMES: u32 = 480;

/// Shared scripted state behind a [`MockBackend`] and its [`MockHandle`].
struct MockState {
    devices: Vec<String>,
    default_id: Option<String>,
    buffer_frames: u32,
    padding: u32,
    /// Streams currently open. The engine invariant is that this never
    /// exceeds one.
    open_streams: u32,
    max_concurrent_open: u32,
    opens: u32,
    closes: u32,
    starts: u32,
    stops: u32,
    /// Frame counts of every delivery, in order.
    delivered: Vec<u32>,
    /// Whether every delivered byte so far was zero.
    all_silence: bool,
    /// Fail the next `resolve` call regardless of id.
    fail_next_resolve: bool,
    device_sink: Option<Arc<dyn DeviceNotificationSink>>,
    session_sink: Option<Arc<dyn SessionEventSink>>,
    ready: Option<ReadySignal>,
}

/// Mock render backend with a scripted device set.
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Creates a mock backend with one device (`"mock-out"`) that is also
    /// the system default.
    pub fn new() -> Self {
        Self::with_devices(&["mock-out"], Some("mock-out"))
    }

    /// Creates a mock backend with the given active devices and default.
    pub fn with_devices(devices: &[&str], default_id: Option<&str>) -> Self {
        let state = MockState {
            devices: devices.iter().map(|d| (*d).to_string()).collect(),
            default_id: default_id.map(str::to_string),
            buffer_frames: MOCK_BUFFER_FRAMES,
            padding: 0,
            open_streams: 0,
            max_concurrent_open: 0,
            opens: 0,
            closes: 0,
            starts: 0,
            stops: 0,
            delivered: Vec::new(),
            all_silence: true,
            fail_next_resolve: false,
            device_sink: None,
            session_sink: None,
            ready: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Returns a handle for driving and inspecting this backend from tests.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: self.state.clone(),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for MockBackend {
    fn resolve(&self, id: &DeviceId) -> Result<Box<dyn OutputDevice>, RenderAudioError> {
        let mut state = self.state.lock();
        if state.fail_next_resolve {
            state.fail_next_resolve = false;
            return Err(RenderAudioError::BackendError(
                "scripted resolve failure".to_string(),
            ));
        }

        let resolved = if id.is_default() {
            state
                .default_id
                .clone()
                .ok_or(RenderAudioError::NoDefaultDevice)?
        } else {
            state
                .devices
                .iter()
                .find(|d| d.as_str() == id.as_str())
                .cloned()
                .ok_or_else(|| RenderAudioError::DeviceNotFound {
                    id: id.as_str().to_string(),
                })?
        };

        Ok(Box::new(MockDevice {
            id: resolved,
            state: self.state.clone(),
        }))
    }

    fn register_device_events(
        &self,
        sink: Arc<dyn DeviceNotificationSink>,
    ) -> Result<(), RenderAudioError> {
        self.state.lock().device_sink = Some(sink);
        Ok(())
    }

    fn unregister_device_events(&self) -> Result<(), RenderAudioError> {
        self.state.lock().device_sink = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "MockRender"
    }
}

struct MockDevice {
    id: String,
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice").field("id", &self.id).finish()
    }
}

impl OutputDevice for MockDevice {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn open_output(
        &self,
        format: &StreamFormat,
        _latency: Duration,
        ready: ReadySignal,
    ) -> Result<Box<dyn OutputStream>, RenderAudioError> {
        let mut state = self.state.lock();
        state.opens += 1;
        state.open_streams += 1;
        state.max_concurrent_open = state.max_concurrent_open.max(state.open_streams);
        state.ready = Some(ready);

        Ok(Box::new(MockStream {
            state: self.state.clone(),
            block_align: format.block_align(),
        }))
    }
}

struct MockStream {
    state: Arc<Mutex<MockState>>,
    block_align: usize,
}

impl OutputStream for MockStream {
    fn buffer_frames(&self) -> u32 {
        self.state.lock().buffer_frames
    }

    fn padding(&self) -> Result<u32, RenderAudioError> {
        Ok(self.state.lock().padding)
    }

    fn write_frames(&mut self, data: &[u8]) -> Result<(), RenderAudioError> {
        let mut state = self.state.lock();
        let frames = (data.len() / self.block_align) as u32;
        state.delivered.push(frames);
        if data.iter().any(|&b| b != 0) {
            state.all_silence = false;
        }
        Ok(())
    }

    fn register_session_events(
        &mut self,
        sink: Arc<dyn SessionEventSink>,
    ) -> Result<(), RenderAudioError> {
        self.state.lock().session_sink = Some(sink);
        Ok(())
    }

    fn start(&mut self) -> Result<(), RenderAudioError> {
        self.state.lock().starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RenderAudioError> {
        self.state.lock().stops += 1;
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.closes += 1;
        state.open_streams = state.open_streams.saturating_sub(1);
        state.session_sink = None;
        state.ready = None;
    }
}

/// Handle for driving a [`MockBackend`] from tests.
///
/// Cloneable; all handles share the backend's scripted state.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Adds a device to the active set.
    pub fn add_device(&self, id: &str) {
        self.state.lock().devices.push(id.to_string());
    }

    /// Changes which device the sentinel resolves to.
    pub fn set_default(&self, id: Option<&str>) {
        self.state.lock().default_id = id.map(str::to_string);
    }

    /// Sets the scripted device buffer capacity in frames.
    pub fn set_buffer_frames(&self, frames: u32) {
        self.state.lock().buffer_frames = frames;
    }

    /// Sets the padding reported on the next cycles.
    pub fn set_padding(&self, frames: u32) {
        self.state.lock().padding = frames;
    }

    /// Makes the next `resolve` call fail with a backend error.
    pub fn fail_next_resolve(&self) {
        self.state.lock().fail_next_resolve = true;
    }

    /// Invokes the registered ready signal, as the device would when buffer
    /// space becomes available. Returns `false` if no stream is open.
    pub fn fire_data_ready(&self) -> bool {
        let ready = self.state.lock().ready.clone();
        match ready {
            Some(ready) => {
                ready();
                true
            }
            None => false,
        }
    }

    /// Delivers a default-device-changed notification to the registered
    /// device sink, as the platform would from one of its own threads.
    pub fn fire_default_device_changed(&self, flow: DataFlow, role: DeviceRole, new_id: &str) {
        let sink = self.state.lock().device_sink.clone();
        if let Some(sink) = sink {
            sink.on_default_device_changed(flow, role, new_id);
        }
    }

    /// Delivers a session-disconnected notification to the stream's session
    /// sink.
    pub fn fire_session_disconnected(&self, reason: DisconnectReason) -> bool {
        let sink = self.state.lock().session_sink.clone();
        match sink {
            Some(sink) => {
                sink.on_session_disconnected(reason);
                true
            }
            None => false,
        }
    }

    /// Number of `open_output` calls so far.
    pub fn opens(&self) -> u32 {
        self.state.lock().opens
    }

    /// Number of stream releases so far.
    pub fn closes(&self) -> u32 {
        self.state.lock().closes
    }

    /// Streams currently open.
    pub fn open_streams(&self) -> u32 {
        self.state.lock().open_streams
    }

    /// Highest number of streams ever open at the same time.
    pub fn max_concurrent_open(&self) -> u32 {
        self.state.lock().max_concurrent_open
    }

    /// Number of `start` calls so far.
    pub fn starts(&self) -> u32 {
        self.state.lock().starts
    }

    /// Number of `stop` calls so far.
    pub fn stops(&self) -> u32 {
        self.state.lock().stops
    }

    /// Frame counts of every delivery, in order.
    pub fn delivered(&self) -> Vec<u32> {
        self.state.lock().delivered.clone()
    }

    /// Total frames delivered.
    pub fn delivered_frames(&self) -> u64 {
        self.state.lock().delivered.iter().map(|&f| u64::from(f)).sum()
    }

    /// `true` while every byte delivered so far was zero.
    pub fn all_silence(&self) -> bool {
        self.state.lock().all_silence
    }

    /// `true` if a device notification sink is registered.
    pub fn has_device_sink(&self) -> bool {
        self.state.lock().device_sink.is_some()
    }

    /// `true` if a session event sink is registered on the open stream.
    pub fn has_session_sink(&self) -> bool {
        self.state.lock().session_sink.is_some()
    }
}
