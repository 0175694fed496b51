//! Render session: ownership of the live device binding.
//!
//! The session is exclusively owned and mutated by the render loop thread.
//! Other threads request changes via the switch slot; they never touch the
//! stream handle directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{OutputStream, ReadySignal, RenderBackend};
use crate::notify::SwitchListener;
use crate::staging::StagingBuffer;
use crate::{DeviceId, RenderAudioError, StreamFormat};

/// The active device binding and its rebind state machine.
///
/// `Unbound -> rebind(id) -> Bound(id) -> rebind(id') -> Bound(id')`, with
/// `Unbound` also the terminal state on teardown. A failed rebind leaves
/// the session `Unbound` and surfaces the typed error; the render thread
/// stays alive and a later switch request can recover.
pub(crate) struct RenderSession {
    format: StreamFormat,
    latency: Duration,
    ready: ReadySignal,
    listener: Arc<SwitchListener>,
    tracking_default: Arc<AtomicBool>,
    stream: Option<Box<dyn OutputStream>>,
    current: Option<DeviceId>,
    /// Copy scratch, sized to the device buffer at bind time so the
    /// data-ready path never allocates.
    scratch: Vec<u8>,
}

impl RenderSession {
    pub(crate) fn new(
        format: StreamFormat,
        latency: Duration,
        ready: ReadySignal,
        listener: Arc<SwitchListener>,
        tracking_default: Arc<AtomicBool>,
    ) -> Self {
        Self {
            format,
            latency,
            ready,
            listener,
            tracking_default,
            stream: None,
            current: None,
            scratch: Vec::new(),
        }
    }

    /// `true` while a device stream is bound and active.
    pub(crate) fn is_bound(&self) -> bool {
        self.stream.is_some()
    }

    /// Identity the current binding was requested with.
    #[allow(dead_code)]
    pub(crate) fn current(&self) -> Option<&DeviceId> {
        self.current.as_ref()
    }

    /// Releases the current binding: stop the stream, then drop it, which
    /// unregisters session events and releases the device handles.
    pub(crate) fn unbind(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.stop() {
                tracing::warn!(error = %e, "failed to stop stream during unbind");
            }
        }
        self.current = None;
    }

    /// Tears down the current binding (if any) and binds to `id`.
    ///
    /// The prior binding is fully released before the new device is touched,
    /// so at most one device stream is ever open. The new stream's buffer is
    /// pre-filled with silence before it starts, avoiding an initial
    /// underrun glitch.
    ///
    /// Returns the concrete id the backend resolved.
    pub(crate) fn rebind(
        &mut self,
        backend: &dyn RenderBackend,
        id: &DeviceId,
    ) -> Result<String, RenderAudioError> {
        self.unbind();

        let device = backend.resolve(id)?;
        let resolved_id = device.id();
        tracing::info!(requested = %id, resolved = %resolved_id, "binding output device");

        let mut stream = device.open_output(&self.format, self.latency, self.ready.clone())?;

        let capacity_bytes = self.format.frames_to_bytes(stream.buffer_frames());
        self.scratch.clear();
        self.scratch.resize(capacity_bytes, 0);
        stream.write_frames(&self.scratch)?;

        stream.register_session_events(self.listener.clone())?;
        stream.start()?;

        self.tracking_default.store(id.is_default(), Ordering::SeqCst);
        self.current = Some(id.clone());
        self.stream = Some(stream);
        Ok(resolved_id)
    }

    /// Services one buffer-ready cycle.
    ///
    /// Delivers exactly `capacity - padding` frames: staged bytes topped up
    /// with silence, or pure silence while paused (staged content is left
    /// untouched). Returns the number of frames delivered; `Ok(0)` when
    /// unbound or when the device reports no space.
    pub(crate) fn service_cycle(
        &mut self,
        staging: &mut StagingBuffer,
        paused: bool,
    ) -> Result<u32, RenderAudioError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };

        let padding = stream.padding()?;
        let frames = stream.buffer_frames().saturating_sub(padding);
        if frames == 0 {
            return Ok(0);
        }

        let bytes = self.format.frames_to_bytes(frames);
        let out = &mut self.scratch[..bytes];
        if paused {
            out.fill(0);
        } else {
            staging.fill_silence_to(bytes);
            staging.read_into(out);
        }

        stream.write_frames(out)?;
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::signal::{SignalSet, SwitchSlot};

    fn session() -> (RenderSession, Arc<AtomicBool>) {
        let signals = Arc::new(SignalSet::new());
        let pending = Arc::new(SwitchSlot::new());
        let tracking = Arc::new(AtomicBool::new(false));
        let listener = Arc::new(SwitchListener::new(
            signals.clone(),
            pending,
            tracking.clone(),
            None,
        ));
        let ready: ReadySignal = {
            let signals = signals.clone();
            Arc::new(move || signals.raise_data_ready())
        };
        let session = RenderSession::new(
            StreamFormat::default(),
            Duration::from_millis(60),
            ready,
            listener,
            tracking.clone(),
        );
        (session, tracking)
    }

    #[test]
    fn test_rebind_prefills_and_starts() {
        let backend = MockBackend::new();
        let handle = backend.handle();
        let (mut session, tracking) = session();

        let resolved = session.rebind(&backend, &DeviceId::default_output()).unwrap();

        assert_eq!(resolved, "mock-out");
        assert!(session.is_bound());
        assert!(tracking.load(Ordering::SeqCst));
        assert_eq!(handle.starts(), 1);
        assert!(handle.has_session_sink());
        // Entire device buffer pre-filled with silence before start
        assert_eq!(handle.delivered(), vec![480]);
        assert!(handle.all_silence());
    }

    #[test]
    fn test_rebind_explicit_clears_tracking_flag() {
        let backend = MockBackend::with_devices(&["pinned"], Some("pinned"));
        let (mut session, tracking) = session();

        session.rebind(&backend, &DeviceId::new("pinned")).unwrap();

        assert!(!tracking.load(Ordering::SeqCst));
    }

    #[test]
    fn test_rebind_releases_before_acquiring() {
        let backend = MockBackend::with_devices(&["a", "b"], Some("a"));
        let handle = backend.handle();
        let (mut session, _) = session();

        session.rebind(&backend, &DeviceId::new("a")).unwrap();
        session.rebind(&backend, &DeviceId::new("b")).unwrap();
        session.rebind(&backend, &DeviceId::default_output()).unwrap();

        assert_eq!(handle.opens(), 3);
        assert_eq!(handle.closes(), 2);
        // Each prior binding was stopped before its replacement was opened
        assert_eq!(handle.stops(), 2);
        // No two device streams were ever open concurrently
        assert_eq!(handle.max_concurrent_open(), 1);
    }

    #[test]
    fn test_scripted_resolve_failure_surfaces() {
        let backend = MockBackend::new();
        let handle = backend.handle();
        let (mut session, _) = session();

        handle.fail_next_resolve();
        let err = session.rebind(&backend, &DeviceId::default_output()).unwrap_err();

        assert!(matches!(err, RenderAudioError::BackendError(_)));
        assert!(!session.is_bound());
    }

    #[test]
    fn test_rebind_failure_leaves_session_unbound() {
        let backend = MockBackend::new();
        let handle = backend.handle();
        let (mut session, _) = session();

        session.rebind(&backend, &DeviceId::default_output()).unwrap();
        let err = session.rebind(&backend, &DeviceId::new("missing")).unwrap_err();

        assert!(matches!(err, RenderAudioError::DeviceNotFound { .. }));
        assert!(!session.is_bound());
        assert_eq!(handle.open_streams(), 0);
    }

    #[test]
    fn test_service_cycle_delivers_capacity_minus_padding() {
        let backend = MockBackend::new();
        let handle = backend.handle();
        let (mut session, _) = session();
        let mut staging = StagingBuffer::new(96000, 1920);

        session.rebind(&backend, &DeviceId::default_output()).unwrap();
        handle.set_padding(100);

        let frames = session.service_cycle(&mut staging, false).unwrap();

        assert_eq!(frames, 380);
        // delivered[0] is the bind-time prefill
        assert_eq!(handle.delivered(), vec![480, 380]);
    }

    #[test]
    fn test_service_cycle_full_padding_delivers_nothing() {
        let backend = MockBackend::new();
        let handle = backend.handle();
        let (mut session, _) = session();
        let mut staging = StagingBuffer::new(96000, 1920);

        session.rebind(&backend, &DeviceId::default_output()).unwrap();
        handle.set_padding(480);

        assert_eq!(session.service_cycle(&mut staging, false).unwrap(), 0);
        assert_eq!(handle.delivered(), vec![480]);
    }

    #[test]
    fn test_service_cycle_paused_leaves_staging_untouched() {
        let backend = MockBackend::new();
        let (mut session, _) = session();
        let mut staging = StagingBuffer::new(96000, 1920);
        staging.push_pcm(&[0x55u8; 500]);

        session.rebind(&backend, &DeviceId::default_output()).unwrap();
        let frames = session.service_cycle(&mut staging, true).unwrap();

        assert_eq!(frames, 480);
        assert_eq!(staging.len(), 500);
    }

    #[test]
    fn test_service_cycle_unbound_is_noop() {
        let (mut session, _) = session();
        let mut staging = StagingBuffer::new(96000, 1920);

        assert_eq!(session.service_cycle(&mut staging, false).unwrap(), 0);
    }

    #[test]
    fn test_unbind_without_bind_is_safe() {
        let (mut session, _) = session();
        session.unbind();
        assert!(!session.is_bound());
    }
}
