//! Configuration types for the render engine.

use std::time::Duration;

use crate::DeviceId;

/// PCM stream format for the rendered output.
///
/// The format is fixed for the lifetime of the engine - it is never
/// renegotiated when the engine switches devices. Backends are expected to
/// convert to the device's mix format where the platform supports it.
///
/// # Example
///
/// ```
/// use render_audio::StreamFormat;
///
/// let format = StreamFormat::default();
/// assert_eq!(format.sample_rate, 48000);
/// assert_eq!(format.block_align(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Bits per sample (16 for signed PCM).
    pub bits_per_sample: u16,
}

impl StreamFormat {
    /// Bytes per frame (one sample for every channel).
    pub fn block_align(&self) -> usize {
        self.channels as usize * self.bits_per_sample as usize / 8
    }

    /// Average byte rate of the stream.
    pub fn avg_bytes_per_sec(&self) -> usize {
        self.sample_rate as usize * self.block_align()
    }

    /// Converts a frame count to a byte count.
    pub fn frames_to_bytes(&self, frames: u32) -> usize {
        frames as usize * self.block_align()
    }

    /// Converts a byte count to a whole frame count.
    pub fn bytes_to_frames(&self, bytes: usize) -> u32 {
        (bytes / self.block_align()) as u32
    }

    /// Bytes covered by the given wall-clock duration of audio.
    pub fn duration_to_bytes(&self, duration: Duration) -> usize {
        let frames = (f64::from(self.sample_rate) * duration.as_secs_f64()) as usize;
        frames * self.block_align()
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        // Mono 16-bit signed PCM at 48kHz
        Self {
            sample_rate: 48000,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

/// Configuration for a render engine instance.
///
/// Use [`EngineConfig::default()`] for sensible defaults, or customize as
/// needed.
///
/// # Example
///
/// ```
/// use render_audio::{DeviceId, EngineConfig};
/// use std::time::Duration;
///
/// let config = EngineConfig {
///     device: DeviceId::new("USB Headset"),
///     latency: Duration::from_millis(40),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Output device to bind at startup.
    ///
    /// The default-tracking sentinel follows the OS default communications
    /// device; an explicit id pins the engine to that device.
    /// Default: [`DeviceId::default_output()`]
    pub device: DeviceId,

    /// Stream format, fixed for the engine's lifetime.
    ///
    /// Default: 48kHz mono 16-bit PCM
    pub format: StreamFormat,

    /// Latency hint passed to the device when opening the stream.
    ///
    /// Smaller values reduce output latency but leave less headroom per
    /// render cycle. Default: 60ms
    pub latency: Duration,

    /// Capacity of the staging buffer that feeds the device.
    ///
    /// Must cover at least one full device buffer; spillover from a cycle is
    /// retained here for the next one. Default: 1 second
    pub staging_capacity: Duration,

    /// Granularity of silence fill when the staged content runs short.
    ///
    /// Silence is appended in whole chunks of this duration until the staged
    /// length covers the device's request. Default: 20ms
    pub silence_chunk: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device: DeviceId::default_output(),
            format: StreamFormat::default(),
            latency: Duration::from_millis(60),
            staging_capacity: Duration::from_secs(1),
            silence_chunk: Duration::from_millis(20),
        }
    }
}

impl EngineConfig {
    /// Staging buffer capacity in bytes for the configured format.
    pub(crate) fn staging_capacity_bytes(&self) -> usize {
        self.format.duration_to_bytes(self.staging_capacity)
    }

    /// Silence fill chunk size in bytes for the configured format.
    pub(crate) fn silence_chunk_bytes(&self) -> usize {
        self.format.duration_to_bytes(self.silence_chunk).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_format_default() {
        let format = StreamFormat::default();
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.channels, 1);
        assert_eq!(format.bits_per_sample, 16);
        assert_eq!(format.block_align(), 2);
        assert_eq!(format.avg_bytes_per_sec(), 96000);
    }

    #[test]
    fn test_frames_bytes_roundtrip() {
        let format = StreamFormat::default();
        assert_eq!(format.frames_to_bytes(480), 960);
        assert_eq!(format.bytes_to_frames(960), 480);
    }

    #[test]
    fn test_stereo_block_align() {
        let format = StreamFormat {
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
        };
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.frames_to_bytes(100), 400);
    }

    #[test]
    fn test_duration_to_bytes() {
        let format = StreamFormat::default();
        // 20ms at 48kHz mono 16-bit = 960 frames = 1920 bytes
        assert_eq!(format.duration_to_bytes(Duration::from_millis(20)), 1920);
        assert_eq!(format.duration_to_bytes(Duration::from_secs(1)), 96000);
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert!(config.device.is_default());
        assert_eq!(config.latency, Duration::from_millis(60));
        assert_eq!(config.staging_capacity_bytes(), 96000);
        assert_eq!(config.silence_chunk_bytes(), 1920);
    }
}
