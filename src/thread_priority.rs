//! Best-effort scheduling priority elevation for the render loop thread.
//!
//! Elevation failing is not an error: the engine runs fine at normal
//! priority, it just tolerates less scheduling jitter per cycle. The result
//! is reported so callers can log it.

/// Outcome of a priority elevation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorityResult {
    /// The calling thread now runs at elevated priority.
    Elevated,
    /// The OS refused the request (typically missing privileges).
    Denied(String),
    /// No elevation mechanism exists on this platform.
    Unsupported,
}

/// Raises the calling thread's scheduling priority for audio work.
///
/// Call at the start of the render loop thread. Best-effort: a denied
/// request leaves the thread at its current priority.
pub fn set_realtime_priority() -> PriorityResult {
    imp::set_realtime_priority()
}

#[cfg(windows)]
mod imp {
    use super::PriorityResult;

    use windows::Win32::System::Threading::{
        GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_HIGHEST,
    };

    pub(super) fn set_realtime_priority() -> PriorityResult {
        let result = unsafe { SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_HIGHEST) };
        match result {
            Ok(()) => PriorityResult::Elevated,
            Err(e) => PriorityResult::Denied(e.to_string()),
        }
    }
}

#[cfg(unix)]
mod imp {
    use super::PriorityResult;

    pub(super) fn set_realtime_priority() -> PriorityResult {
        let policy = libc::SCHED_RR;
        let max = unsafe { libc::sched_get_priority_max(policy) };
        let min = unsafe { libc::sched_get_priority_min(policy) };
        if max < 0 || min < 0 {
            return PriorityResult::Denied("SCHED_RR priority range unavailable".to_string());
        }

        // Middle of the round-robin range: above normal threads, below
        // system-critical realtime work
        let param = libc::sched_param {
            sched_priority: min + (max - min) / 2,
        };
        let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), policy, &param) };
        if rc == 0 {
            PriorityResult::Elevated
        } else {
            PriorityResult::Denied(std::io::Error::from_raw_os_error(rc).to_string())
        }
    }
}

#[cfg(not(any(windows, unix)))]
mod imp {
    use super::PriorityResult;

    pub(super) fn set_realtime_priority() -> PriorityResult {
        PriorityResult::Unsupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_attempt_returns() {
        // Elevation commonly fails in CI (no RT privileges); either outcome
        // is acceptable, the call just must not panic or hang
        let result = set_realtime_priority();
        match result {
            PriorityResult::Elevated | PriorityResult::Unsupported => {}
            PriorityResult::Denied(reason) => assert!(!reason.is_empty()),
        }
    }
}
