//! Staging buffer feeding PCM bytes to the device.
//!
//! The staging buffer sits between the payload producer and the device
//! buffer. In this engine the only payload generator is silence fill, but
//! the buffer accepts arbitrary PCM bytes so real content can be staged the
//! same way. Spillover from one render cycle (bytes staged but not consumed
//! because the device had less space) is retained for the next cycle.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Bounded ring of raw PCM bytes awaiting delivery to the device.
///
/// Both halves of the underlying SPSC ring are held here: the render loop
/// thread is the only producer and consumer, so no cross-thread coordination
/// is needed for the buffer itself.
pub(crate) struct StagingBuffer {
    producer: HeapProd<u8>,
    consumer: HeapCons<u8>,
    capacity: usize,
    /// Zeroed template appended whenever staged content runs short.
    silence_chunk: Vec<u8>,
}

impl StagingBuffer {
    /// Creates a staging buffer with the given byte capacity and silence
    /// fill granularity.
    pub(crate) fn new(capacity: usize, silence_chunk_bytes: usize) -> Self {
        let (producer, consumer) = HeapRb::<u8>::new(capacity).split();
        Self {
            producer,
            consumer,
            capacity,
            silence_chunk: vec![0u8; silence_chunk_bytes.max(1)],
        }
    }

    /// Number of staged bytes awaiting delivery.
    pub(crate) fn len(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Total byte capacity of the ring.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stages raw PCM bytes, returning how many were accepted.
    ///
    /// Bytes beyond the remaining capacity are rejected rather than
    /// overwriting staged content.
    #[allow(dead_code)] // Payload staging; exercised by tests until real content feeds the engine
    pub(crate) fn push_pcm(&mut self, data: &[u8]) -> usize {
        self.producer.push_slice(data)
    }

    /// Appends whole silence chunks until at least `target` bytes are staged.
    ///
    /// Fill is clamped to capacity. Returns the number of silence bytes
    /// appended.
    pub(crate) fn fill_silence_to(&mut self, target: usize) -> usize {
        let mut appended = 0;
        while self.len() < target.min(self.capacity) {
            let pushed = self.producer.push_slice(&self.silence_chunk);
            appended += pushed;
            if pushed == 0 {
                break;
            }
        }
        appended
    }

    /// Pops staged bytes into `out`, returning how many were copied.
    ///
    /// The caller is expected to have staged at least `out.len()` bytes
    /// (via [`fill_silence_to`](Self::fill_silence_to)); any shortfall is
    /// left zeroed in `out` so the device still receives silence.
    pub(crate) fn read_into(&mut self, out: &mut [u8]) -> usize {
        let copied = self.consumer.pop_slice(out);
        if copied < out.len() {
            out[copied..].fill(0);
        }
        copied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_appends_whole_chunks() {
        let mut staging = StagingBuffer::new(96000, 1920);

        // One byte short of a chunk boundary still rounds up to whole chunks
        let appended = staging.fill_silence_to(1921);
        assert_eq!(appended, 3840);
        assert_eq!(staging.len(), 3840);
    }

    #[test]
    fn test_fill_noop_when_enough_staged() {
        let mut staging = StagingBuffer::new(96000, 1920);
        staging.fill_silence_to(960);
        assert_eq!(staging.len(), 1920);

        let appended = staging.fill_silence_to(1000);
        assert_eq!(appended, 0);
        assert_eq!(staging.len(), 1920);
    }

    #[test]
    fn test_read_retains_spillover() {
        let mut staging = StagingBuffer::new(96000, 1920);
        staging.fill_silence_to(1000); // stages one 1920-byte chunk

        let mut out = vec![0xFFu8; 960];
        let copied = staging.read_into(&mut out);

        assert_eq!(copied, 960);
        assert!(out.iter().all(|&b| b == 0));
        // residual = 1920 - 960
        assert_eq!(staging.len(), 960);
    }

    #[test]
    fn test_residual_math_across_cycles() {
        // capacity C=480 frames (960 bytes) delivered per cycle, fill exactly
        // matches consumption so the residual stays at zero between cycles
        let mut staging = StagingBuffer::new(96000, 960);
        let mut out = vec![0u8; 960];

        for _ in 0..5 {
            staging.fill_silence_to(960);
            let copied = staging.read_into(&mut out);
            assert_eq!(copied, 960);
            assert_eq!(staging.len(), 0);
        }
    }

    #[test]
    fn test_push_pcm_then_silence_pad() {
        let mut staging = StagingBuffer::new(96000, 1920);

        let payload = vec![0x7Fu8; 100];
        assert_eq!(staging.push_pcm(&payload), 100);

        // Shortfall below the 960-byte request is padded with silence chunks
        staging.fill_silence_to(960);
        assert_eq!(staging.len(), 100 + 1920);

        let mut out = vec![0u8; 960];
        staging.read_into(&mut out);
        assert!(out[..100].iter().all(|&b| b == 0x7F));
        assert!(out[100..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_clamped_to_capacity() {
        let mut staging = StagingBuffer::new(1000, 300);

        staging.fill_silence_to(5000);
        assert!(staging.len() <= 1000);
        assert_eq!(staging.capacity(), 1000);
    }

    #[test]
    fn test_read_zero_fills_shortfall() {
        let mut staging = StagingBuffer::new(96000, 1920);
        staging.push_pcm(&[0x11u8; 10]);

        let mut out = vec![0xFFu8; 100];
        let copied = staging.read_into(&mut out);

        assert_eq!(copied, 10);
        assert!(out[10..].iter().all(|&b| b == 0));
    }
}
