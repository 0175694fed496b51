//! Output device identification.

use std::sync::Arc;

/// The sentinel identifier that tracks the OS default communications device.
const DEFAULT_SENTINEL: &str = "default";

/// Identifier for an audio output device.
///
/// A `DeviceId` is an opaque string token. The distinguished value returned
/// by [`DeviceId::default_output()`] tracks the operating system's current
/// default communications render device, following it when the default
/// changes at runtime. Any other value pins the engine to that specific
/// device; a pinned binding never follows default changes.
///
/// Uses `Arc<str>` internally so clones are cheap (pointer copy, no heap
/// allocation) - device ids travel across the switch-request slot.
///
/// # Example
///
/// ```
/// use render_audio::DeviceId;
///
/// let tracked = DeviceId::default_output();
/// let pinned = DeviceId::new("USB Headset");
///
/// assert!(tracked.is_default());
/// assert!(!pinned.is_default());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Creates a device id from an explicit identifier string.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the sentinel id that follows the OS default communications
    /// output device.
    pub fn default_output() -> Self {
        Self::new(DEFAULT_SENTINEL)
    }

    /// Returns `true` if this id is the default-tracking sentinel.
    pub fn is_default(&self) -> bool {
        &*self.0 == DEFAULT_SENTINEL
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sentinel() {
        let id = DeviceId::default_output();
        assert!(id.is_default());
        assert_eq!(id.as_str(), "default");
    }

    #[test]
    fn test_explicit_id_not_default() {
        let id = DeviceId::new("Speakers (Realtek Audio)");
        assert!(!id.is_default());
    }

    #[test]
    fn test_device_id_equality() {
        let a = DeviceId::new("headset");
        let b = DeviceId::new("headset");
        let c = DeviceId::new("speakers");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(DeviceId::default_output(), DeviceId::new("default"));
    }

    #[test]
    fn test_device_id_display() {
        let id = DeviceId::new("monitor-out");
        assert_eq!(format!("{id}"), "monitor-out");
    }

    #[test]
    fn test_device_id_from_str() {
        let id: DeviceId = "test".into();
        assert_eq!(id.as_str(), "test");
    }

    #[test]
    fn test_device_id_from_string() {
        let id: DeviceId = String::from("default").into();
        assert!(id.is_default());
    }
}
