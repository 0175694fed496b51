//! Cross-thread signaling for the render loop.
//!
//! The render loop blocks in a single multi-signal wait. Three signals
//! exist: shutdown, switch-requested, and data-ready. When more than one is
//! pending, shutdown wins, then switch, then data-ready - shutdown must win
//! so teardown latency stays bounded.

use parking_lot::{Condvar, Mutex};

use crate::DeviceId;

const SHUTDOWN: u8 = 0b001;
const SWITCH: u8 = 0b010;
const DATA_READY: u8 = 0b100;

/// A consumed signal, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    /// Tear down the render loop. One-shot: once raised it stays set.
    Shutdown,
    /// A device switch request is pending.
    Switch,
    /// The device has buffer space to fill.
    DataReady,
}

/// Condition-variable rendition of the loop's multi-event wait.
///
/// Raising is constant-time and never blocks on the render loop; safe to
/// call from platform notification callbacks.
pub(crate) struct SignalSet {
    pending: Mutex<u8>,
    cond: Condvar,
}

impl SignalSet {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Raises the shutdown signal. Sticky: never cleared by `wait`.
    pub(crate) fn raise_shutdown(&self) {
        self.raise(SHUTDOWN);
    }

    /// Raises the switch-requested signal.
    pub(crate) fn raise_switch(&self) {
        self.raise(SWITCH);
    }

    /// Raises the data-ready signal.
    pub(crate) fn raise_data_ready(&self) {
        self.raise(DATA_READY);
    }

    fn raise(&self, bit: u8) {
        let mut pending = self.pending.lock();
        *pending |= bit;
        self.cond.notify_one();
    }

    /// Blocks until a signal is pending and consumes the highest-priority
    /// one. Shutdown is returned without being cleared, so every subsequent
    /// wait also observes it.
    pub(crate) fn wait(&self) -> Signal {
        let mut pending = self.pending.lock();
        while *pending == 0 {
            self.cond.wait(&mut pending);
        }

        if *pending & SHUTDOWN != 0 {
            Signal::Shutdown
        } else if *pending & SWITCH != 0 {
            *pending &= !SWITCH;
            Signal::Switch
        } else {
            *pending &= !DATA_READY;
            Signal::DataReady
        }
    }
}

/// Single-slot pending switch request.
///
/// Not a queue: a second request overwrites the first, so rapid consecutive
/// switch triggers coalesce into the latest target. Cleared once consumed
/// by the render loop.
pub(crate) struct SwitchSlot {
    target: Mutex<Option<DeviceId>>,
}

impl SwitchSlot {
    pub(crate) fn new() -> Self {
        Self {
            target: Mutex::new(None),
        }
    }

    /// Stores the next switch target. Last writer wins.
    pub(crate) fn request(&self, device: DeviceId) {
        *self.target.lock() = Some(device);
    }

    /// Drains the slot, clearing it.
    pub(crate) fn take(&self) -> Option<DeviceId> {
        self.target.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_priority_order_when_all_pending() {
        let signals = SignalSet::new();
        signals.raise_data_ready();
        signals.raise_switch();
        signals.raise_shutdown();

        // Shutdown wins over switch and data-ready
        assert_eq!(signals.wait(), Signal::Shutdown);
    }

    #[test]
    fn test_switch_beats_data_ready() {
        let signals = SignalSet::new();
        signals.raise_data_ready();
        signals.raise_switch();

        assert_eq!(signals.wait(), Signal::Switch);
        assert_eq!(signals.wait(), Signal::DataReady);
    }

    #[test]
    fn test_shutdown_is_sticky() {
        let signals = SignalSet::new();
        signals.raise_shutdown();

        assert_eq!(signals.wait(), Signal::Shutdown);
        assert_eq!(signals.wait(), Signal::Shutdown);
    }

    #[test]
    fn test_consumed_signals_clear() {
        let signals = Arc::new(SignalSet::new());
        signals.raise_data_ready();
        assert_eq!(signals.wait(), Signal::DataReady);

        // Nothing pending now: wait() should block until the next raise
        let waiter = {
            let signals = signals.clone();
            std::thread::spawn(move || signals.wait())
        };
        std::thread::sleep(Duration::from_millis(50));
        signals.raise_switch();
        assert_eq!(waiter.join().unwrap(), Signal::Switch);
    }

    #[test]
    fn test_wait_wakes_on_raise_from_other_thread() {
        let signals = Arc::new(SignalSet::new());
        let waiter = {
            let signals = signals.clone();
            std::thread::spawn(move || signals.wait())
        };

        std::thread::sleep(Duration::from_millis(20));
        signals.raise_shutdown();
        assert_eq!(waiter.join().unwrap(), Signal::Shutdown);
    }

    #[test]
    fn test_switch_slot_last_writer_wins() {
        let slot = SwitchSlot::new();
        slot.request(DeviceId::new("a"));
        slot.request(DeviceId::new("b"));

        // Coalesced: only the latest target survives
        assert_eq!(slot.take(), Some(DeviceId::new("b")));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_switch_slot_cleared_once_consumed() {
        let slot = SwitchSlot::new();
        slot.request(DeviceId::default_output());

        assert!(slot.take().is_some());
        assert!(slot.take().is_none());
    }
}
