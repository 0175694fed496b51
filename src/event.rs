//! Runtime events for monitoring the render engine.
//!
//! Events are non-fatal notifications about engine behavior. The engine
//! continues running after events are emitted - they're for logging/metrics,
//! not error handling.

use std::sync::Arc;

use crate::backend::DisconnectReason;
use crate::DeviceId;

/// Runtime events emitted by the render engine.
///
/// These are informational events, not errors. The render loop continues
/// running after any event is emitted. Use the [`EventCallback`] to log
/// these or update metrics.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The engine bound to a new output device.
    ///
    /// Emitted for the initial bind and for every completed hot-swap.
    DeviceBound {
        /// Identifier the bind was requested with.
        device: DeviceId,
        /// Concrete id of the device the backend resolved.
        resolved_id: String,
    },

    /// A requested device switch failed.
    ///
    /// The session is left unbound; a later switch request (explicit or from
    /// a notification) can recover it.
    SwitchFailed {
        /// Target of the failed switch.
        device: DeviceId,
        /// Description of the failure.
        error: String,
    },

    /// The OS default communications output device changed.
    ///
    /// Only emitted while the engine is in default-tracking mode, alongside
    /// the switch request it triggers.
    DefaultDeviceChanged {
        /// Id of the new default device.
        new_id: String,
    },

    /// The active audio session was disconnected by the platform.
    SessionDisconnected {
        /// Why the session was invalidated.
        reason: DisconnectReason,
    },

    /// A buffer exchange failed during steady-state delivery.
    ///
    /// The affected cycle's frames were dropped (the device plays silence);
    /// delivery resumes on the next cycle.
    DeliveryError {
        /// Description of the failed exchange.
        error: String,
    },
}

/// Callback type for receiving runtime events.
///
/// Register an event callback via
/// [`RenderEngineBuilder::on_event()`](crate::RenderEngineBuilder::on_event)
/// to observe device switches, disconnects, and delivery errors.
pub type EventCallback = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// Convenience for creating event callbacks without manually wrapping in
/// `Arc`.
///
/// # Example
///
/// ```
/// use render_audio::{event_callback, EngineEvent};
///
/// let callback = event_callback(|event| {
///     println!("engine event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(EngineEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_debug() {
        let event = EngineEvent::DefaultDeviceChanged {
            new_id: "speakers".to_string(),
        };
        let debug = format!("{:?}", event);
        assert!(debug.contains("DefaultDeviceChanged"));
        assert!(debug.contains("speakers"));
    }

    #[test]
    fn test_engine_event_clone() {
        let event = EngineEvent::SwitchFailed {
            device: DeviceId::new("gone"),
            error: "device not found: gone".to_string(),
        };
        let cloned = event.clone();
        if let EngineEvent::SwitchFailed { device, error } = cloned {
            assert_eq!(device.as_str(), "gone");
            assert!(error.contains("gone"));
        } else {
            panic!("Expected SwitchFailed variant");
        }
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(EngineEvent::DeliveryError {
            error: "test".to_string(),
        });
        assert!(called.load(Ordering::SeqCst));
    }
}
