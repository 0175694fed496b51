//! Error types for render-audio.
//!
//! Errors are split along the lifecycle of a device binding:
//! - **Resolution**: the requested device could not be found
//! - **Initialization**: the device rejected the stream format or mode
//! - **Delivery**: a buffer exchange failed mid-stream
//!
//! Delivery errors are recoverable - the render loop drops the affected
//! cycle's frames and keeps running, surfacing the problem via the
//! [`EventCallback`](crate::EventCallback) instead of dying.

/// Errors surfaced by the render engine and its backends.
#[derive(Debug, thiserror::Error)]
pub enum RenderAudioError {
    /// The requested output device was not found among active render devices.
    #[error("device not found: {id}")]
    DeviceNotFound {
        /// Identifier of the device that wasn't found.
        id: String,
    },

    /// No default communications output device is configured on this system.
    #[error("no default communications output device configured")]
    NoDefaultDevice,

    /// The device rejected stream initialization (format or mode negotiation).
    #[error("failed to initialize output on '{device}': {reason}")]
    InitializationFailed {
        /// Device the engine attempted to bind.
        device: String,
        /// Why initialization was rejected.
        reason: String,
    },

    /// The requested sample format is not supported by the device.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// A buffer get/release exchange failed during steady-state delivery.
    #[error("buffer delivery failed: {reason}")]
    BufferIo {
        /// Description of the failed exchange.
        reason: String,
    },

    /// No render backend is available on this platform or configuration.
    #[error("render backend unavailable: {reason}")]
    BackendUnavailable {
        /// Why no backend could be created.
        reason: String,
    },

    /// An error from the underlying platform audio library.
    #[error("audio backend error: {0}")]
    BackendError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_not_found_display() {
        let err = RenderAudioError::DeviceNotFound {
            id: "USB Headset".to_string(),
        };
        assert_eq!(err.to_string(), "device not found: USB Headset");
    }

    #[test]
    fn test_no_default_device_display() {
        let err = RenderAudioError::NoDefaultDevice;
        assert!(err.to_string().contains("default communications"));
    }

    #[test]
    fn test_initialization_failed_display() {
        let err = RenderAudioError::InitializationFailed {
            device: "Speakers".to_string(),
            reason: "format rejected".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to initialize output on 'Speakers': format rejected"
        );
    }

    #[test]
    fn test_buffer_io_display() {
        let err = RenderAudioError::BufferIo {
            reason: "release failed".to_string(),
        };
        assert_eq!(err.to_string(), "buffer delivery failed: release failed");
    }
}
