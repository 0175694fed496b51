//! Cross-platform render backend over cpal.
//!
//! cpal drives output with a push callback rather than the padding/capacity
//! pull model the engine expects, so this backend adapts: delivered frames
//! land in an SPSC ring sized to the latency hint, the output callback
//! drains the ring (zero-filling any shortfall) and raises the ready signal
//! as space frees up. `padding` is the ring's occupancy.
//!
//! cpal exposes no default-device-change notifications; registration is
//! accepted and simply never fires. Device loss surfaces through the stream
//! error callback as a session disconnect.

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig as CpalStreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{
    DeviceNotificationSink, DisconnectReason, OutputDevice, OutputStream, ReadySignal,
    RenderBackend, SessionEventSink,
};
use crate::{DeviceId, RenderAudioError, StreamFormat};

/// Inverse of the symmetric i16 range, for i16 -> f32 conversion.
const I16_SCALE: f32 = 1.0 / 32768.0;

type SharedSessionSink = Arc<Mutex<Option<Arc<dyn SessionEventSink>>>>;

/// Render backend built on cpal's default host.
pub(super) struct CpalBackend;

impl CpalBackend {
    pub(super) fn new() -> Self {
        Self
    }
}

impl RenderBackend for CpalBackend {
    fn resolve(&self, id: &DeviceId) -> Result<Box<dyn OutputDevice>, RenderAudioError> {
        let host = cpal::default_host();

        if id.is_default() {
            let device = host
                .default_output_device()
                .ok_or(RenderAudioError::NoDefaultDevice)?;
            return Ok(Box::new(CpalOutputDevice { device }));
        }

        let devices = host
            .output_devices()
            .map_err(|e| RenderAudioError::BackendError(e.to_string()))?;
        for device in devices {
            if let Ok(name) = device.name() {
                if name == id.as_str() {
                    return Ok(Box::new(CpalOutputDevice { device }));
                }
            }
        }

        Err(RenderAudioError::DeviceNotFound {
            id: id.as_str().to_string(),
        })
    }

    fn register_device_events(
        &self,
        _sink: Arc<dyn DeviceNotificationSink>,
    ) -> Result<(), RenderAudioError> {
        Ok(())
    }

    fn unregister_device_events(&self) -> Result<(), RenderAudioError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "CpalRender"
    }
}

#[derive(Debug)]
struct CpalOutputDevice {
    device: cpal::Device,
}

impl OutputDevice for CpalOutputDevice {
    fn id(&self) -> String {
        self.device.name().unwrap_or_else(|_| "unknown".to_string())
    }

    fn open_output(
        &self,
        format: &StreamFormat,
        latency: Duration,
        ready: ReadySignal,
    ) -> Result<Box<dyn OutputStream>, RenderAudioError> {
        let capacity_frames =
            ((f64::from(format.sample_rate) * latency.as_secs_f64()) as usize).max(1);
        let capacity_samples = capacity_frames * format.channels as usize;

        let (producer, consumer) = HeapRb::<i16>::new(capacity_samples).split();
        let session_sink: SharedSessionSink = Arc::new(Mutex::new(None));

        let supported = self
            .device
            .default_output_config()
            .map_err(|e| RenderAudioError::BackendError(e.to_string()))?;
        let sample_format = supported.sample_format();

        let cpal_config = CpalStreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        tracing::debug!(
            device = %self.id(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            ?sample_format,
            "opening cpal output stream"
        );

        let stream = match sample_format {
            SampleFormat::I16 => {
                self.build_i16_stream(&cpal_config, consumer, ready, session_sink.clone())?
            }
            SampleFormat::F32 => {
                self.build_f32_stream(&cpal_config, consumer, ready, session_sink.clone())?
            }
            format => {
                return Err(RenderAudioError::UnsupportedFormat {
                    format: format!("{format:?}"),
                });
            }
        };

        Ok(Box::new(CpalOutputStream {
            stream,
            producer,
            capacity_frames: capacity_frames as u32,
            channels: format.channels,
            block_align: format.block_align(),
            session_sink,
        }))
    }
}

impl CpalOutputDevice {
    fn build_i16_stream(
        &self,
        config: &CpalStreamConfig,
        mut consumer: HeapCons<i16>,
        ready: ReadySignal,
        session_sink: SharedSessionSink,
    ) -> Result<Stream, RenderAudioError> {
        let stream = self
            .device
            .build_output_stream(
                config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let filled = consumer.pop_slice(data);
                    data[filled..].fill(0);
                    ready();
                },
                error_callback(session_sink),
                None,
            )
            .map_err(|e| RenderAudioError::InitializationFailed {
                device: self.id(),
                reason: e.to_string(),
            })?;

        Ok(stream)
    }

    fn build_f32_stream(
        &self,
        config: &CpalStreamConfig,
        mut consumer: HeapCons<i16>,
        ready: ReadySignal,
        session_sink: SharedSessionSink,
    ) -> Result<Stream, RenderAudioError> {
        let stream = self
            .device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Inline conversion to avoid function call overhead in
                    // the audio callback
                    for sample in data.iter_mut() {
                        *sample = match consumer.try_pop() {
                            Some(s) => f32::from(s) * I16_SCALE,
                            None => 0.0,
                        };
                    }
                    ready();
                },
                error_callback(session_sink),
                None,
            )
            .map_err(|e| RenderAudioError::InitializationFailed {
                device: self.id(),
                reason: e.to_string(),
            })?;

        Ok(stream)
    }
}

/// Maps cpal stream errors onto the session event sink. Device loss is the
/// cpal analog of a session disconnect.
fn error_callback(session_sink: SharedSessionSink) -> impl FnMut(cpal::StreamError) {
    move |err| {
        tracing::error!("Audio stream error: {}", err);
        if matches!(err, cpal::StreamError::DeviceNotAvailable) {
            let sink = session_sink.lock().clone();
            if let Some(sink) = sink {
                sink.on_session_disconnected(DisconnectReason::DeviceRemoved);
            }
        }
    }
}

struct CpalOutputStream {
    stream: Stream,
    producer: HeapProd<i16>,
    capacity_frames: u32,
    channels: u16,
    block_align: usize,
    session_sink: SharedSessionSink,
}

impl OutputStream for CpalOutputStream {
    fn buffer_frames(&self) -> u32 {
        self.capacity_frames
    }

    fn padding(&self) -> Result<u32, RenderAudioError> {
        Ok((self.producer.occupied_len() / self.channels as usize) as u32)
    }

    fn write_frames(&mut self, data: &[u8]) -> Result<(), RenderAudioError> {
        debug_assert_eq!(data.len() % self.block_align, 0);

        let mut pushed = 0;
        for bytes in data.chunks_exact(2) {
            let sample = i16::from_ne_bytes([bytes[0], bytes[1]]);
            if self.producer.try_push(sample).is_err() {
                break;
            }
            pushed += 1;
        }

        let samples = data.len() / 2;
        if pushed < samples {
            // Only possible if the caller ignored the padding it was told
            tracing::debug!(pushed, samples, "output ring rejected samples");
        }
        Ok(())
    }

    fn register_session_events(
        &mut self,
        sink: Arc<dyn SessionEventSink>,
    ) -> Result<(), RenderAudioError> {
        *self.session_sink.lock() = Some(sink);
        Ok(())
    }

    fn start(&mut self) -> Result<(), RenderAudioError> {
        self.stream
            .play()
            .map_err(|e| RenderAudioError::BackendError(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), RenderAudioError> {
        self.stream
            .pause()
            .map_err(|e| RenderAudioError::BackendError(e.to_string()))
    }
}

impl Drop for CpalOutputStream {
    fn drop(&mut self) {
        *self.session_sink.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Device tests require actual audio hardware and are skipped in CI
    #[test]
    #[ignore = "requires audio hardware"]
    fn test_resolve_default_output() {
        let backend = CpalBackend::new();
        let device = backend.resolve(&DeviceId::default_output()).unwrap();
        println!("Default output: {}", device.id());
    }

    #[test]
    fn test_resolve_nonexistent_device_fails() {
        let backend = CpalBackend::new();
        let result = backend.resolve(&DeviceId::new("no-such-device-exists"));
        assert!(result.is_err());
    }
}
