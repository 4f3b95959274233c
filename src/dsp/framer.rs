//! Streaming PCM framer.
//!
//! Maintains a bounded FIFO of float samples and slices it into fixed-size
//! overlapping analysis frames. Frames are peeked (not popped) and only the
//! hop is discarded afterwards, so the `frame_size - hop_size` overlap stays
//! buffered until it is no longer needed.
//!
//! The framer is deterministic: for a given initial state and appended
//! sample sequence, the emitted frames are byte-identical regardless of how
//! the sequence was split across `append` calls.

use ringbuf::{Consumer, Producer, RingBuffer};

use crate::error::{EngineError, Result};

pub struct PcmFramer {
    producer: Producer<f32>,
    consumer: Consumer<f32>,
    frame_size: usize,
    hop_size: usize,
    capacity: usize,
    frame_scratch: Vec<f32>,
    samples_appended: u64,
    frames_emitted: u64,
}

impl PcmFramer {
    /// `capacity` bounds how many samples may be buffered at once; appends
    /// that would exceed it fail with `Backpressure` before consuming
    /// anything.
    pub fn new(frame_size: usize, hop_size: usize, capacity: usize) -> Self {
        assert!(frame_size > 0 && hop_size > 0 && hop_size <= frame_size);
        let capacity = capacity.max(frame_size);
        let (producer, consumer) = RingBuffer::<f32>::new(capacity).split();
        Self {
            producer,
            consumer,
            frame_size,
            hop_size,
            capacity,
            frame_scratch: vec![0.0; frame_size],
            samples_appended: 0,
            frames_emitted: 0,
        }
    }

    /// Append PCM samples. All-or-nothing: on overflow no sample is taken.
    pub fn append(&mut self, samples: &[f32]) -> Result<()> {
        if samples.len() > self.producer.remaining() {
            return Err(EngineError::Backpressure(format!(
                "append of {} samples exceeds free space {} (capacity {})",
                samples.len(),
                self.producer.remaining(),
                self.capacity
            )));
        }
        let pushed = self.producer.push_slice(samples);
        debug_assert_eq!(pushed, samples.len());
        self.samples_appended += samples.len() as u64;
        Ok(())
    }

    /// Emit the next complete frame, or `None` if fewer than `frame_size`
    /// samples are buffered. The returned slice is valid until the next
    /// framer call.
    pub fn next_frame(&mut self) -> Option<&[f32]> {
        if self.consumer.len() < self.frame_size {
            return None;
        }
        for (dst, src) in self
            .frame_scratch
            .iter_mut()
            .zip(self.consumer.iter().take(self.frame_size))
        {
            *dst = *src;
        }
        self.consumer.discard(self.hop_size);
        self.frames_emitted += 1;
        Some(&self.frame_scratch)
    }

    /// Flush the trailing partial frame, zero-padded to `frame_size`.
    /// Returns `None` when the buffer holds no unconsumed samples beyond
    /// the overlap already analyzed.
    pub fn flush_partial(&mut self) -> Option<&[f32]> {
        let buffered = self.consumer.len();
        // After at least one emitted frame the first `overlap` samples have
        // already been analyzed; a flush is only meaningful when fresh
        // samples sit beyond them.
        let overlap = self.frame_size - self.hop_size;
        let fresh = if self.frames_emitted > 0 {
            buffered.saturating_sub(overlap)
        } else {
            buffered
        };
        if fresh == 0 {
            return None;
        }
        debug_assert!(buffered < self.frame_size);
        self.frame_scratch.fill(0.0);
        for (dst, src) in self
            .frame_scratch
            .iter_mut()
            .zip(self.consumer.iter().take(buffered))
        {
            *dst = *src;
        }
        self.consumer.discard(buffered);
        self.frames_emitted += 1;
        Some(&self.frame_scratch)
    }

    /// Samples currently buffered (consumed overlap included).
    pub fn buffered(&self) -> usize {
        self.consumer.len()
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn samples_appended(&self) -> u64 {
        self.samples_appended
    }

    pub fn reset(&mut self) {
        let len = self.consumer.len();
        self.consumer.discard(len);
        self.frame_scratch.fill(0.0);
        self.samples_appended = 0;
        self.frames_emitted = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(framer: &mut PcmFramer) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();
        while let Some(frame) = framer.next_frame() {
            frames.push(frame.to_vec());
        }
        frames
    }

    #[test]
    fn emits_expected_frame_count() {
        let mut framer = PcmFramer::new(8, 2, 1024);
        let samples: Vec<f32> = (0..20).map(|i| i as f32).collect();
        framer.append(&samples).unwrap();
        let frames = drain(&mut framer);
        // floor((20 - 8) / 2) + 1 = 7
        assert_eq!(frames.len(), 7);
        assert_eq!(frames[0], (0..8).map(|i| i as f32).collect::<Vec<_>>());
        assert_eq!(frames[1][0], 2.0);
        assert_eq!(frames[6][0], 12.0);
    }

    #[test]
    fn frames_are_chunk_invariant() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.37).sin()).collect();

        let mut whole = PcmFramer::new(64, 16, 4096);
        whole.append(&samples).unwrap();
        let frames_whole = drain(&mut whole);

        let mut split = PcmFramer::new(64, 16, 4096);
        let mut frames_split = Vec::new();
        for chunk in samples.chunks(7) {
            split.append(chunk).unwrap();
            frames_split.extend(drain(&mut split));
        }
        assert_eq!(frames_whole, frames_split);
    }

    #[test]
    fn overflow_fails_without_consuming() {
        let mut framer = PcmFramer::new(8, 4, 16);
        framer.append(&[0.0; 10]).unwrap();
        let err = framer.append(&[0.0; 10]).unwrap_err();
        assert_eq!(err.kind(), "BACKPRESSURE");
        // Earlier samples still frame correctly.
        assert_eq!(drain(&mut framer).len(), 1);
    }

    #[test]
    fn flush_pads_trailing_partial_frame() {
        let mut framer = PcmFramer::new(8, 4, 64);
        framer.append(&[1.0; 10]).unwrap();
        assert_eq!(drain(&mut framer).len(), 1);
        let tail = framer.flush_partial().unwrap().to_vec();
        assert_eq!(tail.len(), 8);
        // 6 buffered samples (4 fresh + overlap), zero-padded to the frame.
        assert_eq!(&tail[..6], &[1.0; 6]);
        assert_eq!(&tail[6..], &[0.0, 0.0]);
        assert!(framer.flush_partial().is_none());
    }

    #[test]
    fn flush_on_empty_framer_is_none() {
        let mut framer = PcmFramer::new(8, 4, 64);
        assert!(framer.flush_partial().is_none());
    }

    #[test]
    fn flush_after_exact_frame_boundary_is_none() {
        // 12 samples = one frame + one full hop consumed, overlap only left.
        let mut framer = PcmFramer::new(8, 4, 64);
        framer.append(&[1.0; 12]).unwrap();
        assert_eq!(drain(&mut framer).len(), 2);
        assert!(framer.flush_partial().is_none());
    }
}
