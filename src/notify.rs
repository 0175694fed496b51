//! Notification listener turning platform events into switch requests.
//!
//! One concrete listener implements both capability traits. Its callbacks
//! run on platform-internal threads, so the only work done here is writing
//! the pending-switch slot and raising the switch signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::{
    DataFlow, DeviceNotificationSink, DeviceRole, DisconnectReason, SessionEventSink,
};
use crate::signal::{SignalSet, SwitchSlot};
use crate::{DeviceId, EngineEvent, EventCallback};

/// Routes device/session lifecycle events into pending switch requests.
///
/// Two gates, both keyed on whether the bound session is currently tracking
/// the OS default:
/// - a default-device change requests a switch only while tracking the
///   default (a pinned device must not react);
/// - a session disconnect requests a fallback to the default only while
///   NOT tracking it (a disconnect while already tracking is followed by a
///   default-changed event, so reacting twice would double-switch).
pub(crate) struct SwitchListener {
    signals: Arc<SignalSet>,
    pending: Arc<SwitchSlot>,
    /// Set by the render session after each successful bind.
    tracking_default: Arc<AtomicBool>,
    events: Option<EventCallback>,
}

impl SwitchListener {
    pub(crate) fn new(
        signals: Arc<SignalSet>,
        pending: Arc<SwitchSlot>,
        tracking_default: Arc<AtomicBool>,
        events: Option<EventCallback>,
    ) -> Self {
        Self {
            signals,
            pending,
            tracking_default,
            events,
        }
    }

    fn request_default(&self) {
        self.pending.request(DeviceId::default_output());
        self.signals.raise_switch();
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            events(event);
        }
    }
}

impl DeviceNotificationSink for SwitchListener {
    fn on_default_device_changed(&self, flow: DataFlow, role: DeviceRole, new_id: &str) {
        if flow != DataFlow::Render || role != DeviceRole::Communications {
            return;
        }
        if !self.tracking_default.load(Ordering::SeqCst) {
            // Pinned to an explicit device: default changes are ignored
            return;
        }

        tracing::debug!(new_id, "default communications device changed");
        self.emit(EngineEvent::DefaultDeviceChanged {
            new_id: new_id.to_string(),
        });
        self.request_default();
    }
}

impl SessionEventSink for SwitchListener {
    fn on_session_disconnected(&self, reason: DisconnectReason) {
        tracing::debug!(?reason, "audio session disconnected");
        self.emit(EngineEvent::SessionDisconnected { reason });

        if !self.tracking_default.load(Ordering::SeqCst) {
            // Pinned device lost its session: fall back to the default.
            // While tracking the default, a default-changed notification
            // follows and handles the switch.
            self.request_default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(tracking: bool) -> (SwitchListener, Arc<SignalSet>, Arc<SwitchSlot>) {
        let signals = Arc::new(SignalSet::new());
        let pending = Arc::new(SwitchSlot::new());
        let listener = SwitchListener::new(
            signals.clone(),
            pending.clone(),
            Arc::new(AtomicBool::new(tracking)),
            None,
        );
        (listener, signals, pending)
    }

    #[test]
    fn test_default_change_requests_switch_while_tracking() {
        let (listener, _signals, pending) = listener(true);

        listener.on_default_device_changed(DataFlow::Render, DeviceRole::Communications, "new");

        assert_eq!(pending.take(), Some(DeviceId::default_output()));
    }

    #[test]
    fn test_default_change_ignored_when_pinned() {
        let (listener, _signals, pending) = listener(false);

        listener.on_default_device_changed(DataFlow::Render, DeviceRole::Communications, "new");

        assert_eq!(pending.take(), None);
    }

    #[test]
    fn test_default_change_filters_flow_and_role() {
        let (listener, _signals, pending) = listener(true);

        listener.on_default_device_changed(DataFlow::Capture, DeviceRole::Communications, "x");
        listener.on_default_device_changed(DataFlow::Render, DeviceRole::Multimedia, "x");
        listener.on_default_device_changed(DataFlow::Render, DeviceRole::Console, "x");

        assert_eq!(pending.take(), None);
    }

    #[test]
    fn test_disconnect_falls_back_to_default_when_pinned() {
        let (listener, _signals, pending) = listener(false);

        listener.on_session_disconnected(DisconnectReason::DeviceRemoved);

        assert_eq!(pending.take(), Some(DeviceId::default_output()));
    }

    #[test]
    fn test_disconnect_noop_while_tracking_default() {
        let (listener, _signals, pending) = listener(true);

        listener.on_session_disconnected(DisconnectReason::FormatChanged);

        assert_eq!(pending.take(), None);
    }

    #[test]
    fn test_disconnect_fallback_for_any_reason() {
        for reason in [
            DisconnectReason::DeviceRemoved,
            DisconnectReason::ServerShutdown,
            DisconnectReason::FormatChanged,
            DisconnectReason::SessionLoggedOff,
            DisconnectReason::SessionReplaced,
            DisconnectReason::ExclusiveModeOverride,
        ] {
            let (listener, _signals, pending) = listener(false);
            listener.on_session_disconnected(reason);
            assert_eq!(pending.take(), Some(DeviceId::default_output()));
        }
    }

    #[test]
    fn test_events_emitted_on_disconnect() {
        use parking_lot::Mutex;

        let seen: Arc<Mutex<Vec<EngineEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let signals = Arc::new(SignalSet::new());
        let pending = Arc::new(SwitchSlot::new());
        let listener = SwitchListener::new(
            signals,
            pending,
            Arc::new(AtomicBool::new(false)),
            Some(Arc::new(move |e| seen_clone.lock().push(e))),
        );

        listener.on_session_disconnected(DisconnectReason::DeviceRemoved);

        let seen = seen.lock();
        assert!(matches!(
            seen[0],
            EngineEvent::SessionDisconnected {
                reason: DisconnectReason::DeviceRemoved
            }
        ));
    }
}
