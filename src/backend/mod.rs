//! Platform render backend abstraction.
//!
//! A backend covers the platform collaborator contracts the engine consumes:
//! device enumeration/resolution, output stream lifecycle (open, prefill,
//! start/stop, buffer exchange), and device/session lifecycle notifications.
//! Implementations exist for Windows (WASAPI), any platform cpal supports
//! (`backend-cpal` feature), and tests (mock).

#[cfg(windows)]
mod wasapi;

#[cfg(feature = "backend-cpal")]
mod cpal_render;

#[cfg(any(test, feature = "backend-mock"))]
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use crate::{DeviceId, RenderAudioError, StreamFormat};

/// Direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFlow {
    /// Output endpoint.
    Render,
    /// Input endpoint.
    Capture,
}

/// Role an endpoint is the system default for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    /// General system sounds.
    Console,
    /// Music and media playback.
    Multimedia,
    /// Voice and communications streams.
    Communications,
}

/// Why the platform invalidated the active audio session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The bound device was removed.
    DeviceRemoved,
    /// The audio server shut down.
    ServerShutdown,
    /// The device's mix format changed.
    FormatChanged,
    /// The user session logged off.
    SessionLoggedOff,
    /// The session was disconnected by policy.
    SessionReplaced,
    /// Another client took exclusive control of the device.
    ExclusiveModeOverride,
}

/// Receiver for device-level lifecycle notifications.
///
/// Callbacks arrive on platform-internal threads, possibly concurrently with
/// the render loop. Implementations must only perform constant-time work
/// (flag writes, signal raises) - no blocking, no I/O, no device calls.
/// All methods are infallible; callbacks that aren't interesting default to
/// no-ops so the platform always sees success.
pub trait DeviceNotificationSink: Send + Sync {
    /// The system default device for `role` changed to `new_id`.
    fn on_default_device_changed(&self, flow: DataFlow, role: DeviceRole, new_id: &str);

    /// A device was added to the system.
    fn on_device_added(&self, _id: &str) {}

    /// A device was removed from the system.
    fn on_device_removed(&self, _id: &str) {}

    /// A device transitioned between active and inactive states.
    fn on_device_state_changed(&self, _id: &str, _active: bool) {}
}

/// Receiver for session-level lifecycle notifications on the bound stream.
///
/// Same constraints as [`DeviceNotificationSink`]: constant-time work only.
pub trait SessionEventSink: Send + Sync {
    /// The active session was invalidated.
    fn on_session_disconnected(&self, reason: DisconnectReason);

    /// The session's activity state changed.
    fn on_session_state_changed(&self, _active: bool) {}
}

/// Callback the backend invokes each time the device has buffer space to
/// fill. Bound to the render loop's data-ready signal.
pub type ReadySignal = Arc<dyn Fn() + Send + Sync>;

/// Platform device discovery and notification registration.
pub trait RenderBackend: Send {
    /// Resolves a device identity to a concrete output device.
    ///
    /// The default-tracking sentinel resolves to the platform's current
    /// default communications render device; an explicit id is matched by a
    /// linear scan of active render devices (first match wins).
    ///
    /// # Errors
    ///
    /// `NoDefaultDevice` if the sentinel is requested and no default exists;
    /// `DeviceNotFound` if an explicit id matches no active device.
    fn resolve(&self, id: &DeviceId) -> Result<Box<dyn OutputDevice>, RenderAudioError>;

    /// Subscribes to device-level notifications (default-device changes).
    fn register_device_events(
        &self,
        sink: Arc<dyn DeviceNotificationSink>,
    ) -> Result<(), RenderAudioError>;

    /// Drops the device-level notification subscription.
    fn unregister_device_events(&self) -> Result<(), RenderAudioError>;

    /// Backend name for logging/debugging.
    fn name(&self) -> &'static str;
}

/// A resolved output device, ready to open a stream against.
pub trait OutputDevice: std::fmt::Debug {
    /// Concrete platform identifier of this device.
    fn id(&self) -> String;

    /// Opens a shared-mode output stream in the given format.
    ///
    /// The stream is event-driven: the backend invokes `ready` whenever the
    /// device reports buffer space. The stream is created stopped; the
    /// caller pre-fills it with silence and then calls
    /// [`OutputStream::start`].
    fn open_output(
        &self,
        format: &StreamFormat,
        latency: Duration,
        ready: ReadySignal,
    ) -> Result<Box<dyn OutputStream>, RenderAudioError>;
}

/// An open output stream bound to one device.
///
/// Exclusively owned and driven by the render loop thread. Dropping the
/// stream unregisters its session events and releases all device handles.
pub trait OutputStream {
    /// Total device buffer capacity in frames.
    fn buffer_frames(&self) -> u32;

    /// Frames currently queued in the device buffer.
    ///
    /// Available space for the current cycle is
    /// `buffer_frames() - padding()`.
    fn padding(&self) -> Result<u32, RenderAudioError>;

    /// Delivers PCM bytes to the device buffer.
    ///
    /// `data.len()` must be a whole number of frames and no more than the
    /// space the device last reported. The buffer is released with
    /// "has content" semantics even when the content is silence.
    fn write_frames(&mut self, data: &[u8]) -> Result<(), RenderAudioError>;

    /// Subscribes to session lifecycle notifications on this stream.
    fn register_session_events(
        &mut self,
        sink: Arc<dyn SessionEventSink>,
    ) -> Result<(), RenderAudioError>;

    /// Starts playback.
    fn start(&mut self) -> Result<(), RenderAudioError>;

    /// Stops playback.
    fn stop(&mut self) -> Result<(), RenderAudioError>;
}

/// Creates the render backend for the current platform.
///
/// # Errors
///
/// Returns `BackendUnavailable` if no backend is compiled in for this
/// platform/feature combination.
#[allow(unreachable_code)]
pub fn create_backend() -> Result<Box<dyn RenderBackend>, RenderAudioError> {
    #[cfg(windows)]
    {
        return Ok(Box::new(wasapi::WasapiBackend::new()?));
    }

    #[cfg(feature = "backend-cpal")]
    {
        return Ok(Box::new(cpal_render::CpalBackend::new()));
    }

    Err(RenderAudioError::BackendUnavailable {
        reason: "no render backend for this platform - enable the `backend-cpal` feature"
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_reason_copy() {
        let reason = DisconnectReason::DeviceRemoved;
        let copied = reason;
        assert_eq!(reason, copied);
    }

    #[test]
    #[cfg(not(any(windows, feature = "backend-cpal")))]
    fn test_create_backend_unavailable() {
        let result = create_backend();
        assert!(matches!(
            result,
            Err(RenderAudioError::BackendUnavailable { .. })
        ));
    }
}
