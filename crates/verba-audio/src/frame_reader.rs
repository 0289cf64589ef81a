use crate::ring_buffer::AudioConsumer;

/// Assembles the ring buffer's arbitrary-sized callback writes into
/// fixed-size interleaved chunks at the device rate.
pub struct FrameReader {
    consumer: AudioConsumer,
    /// Samples per chunk, already multiplied by channel count.
    chunk_samples: usize,
    pending: Vec<i16>,
    scratch: Vec<i16>,
}

impl FrameReader {
    pub fn new(consumer: AudioConsumer, chunk_size: usize, channels: u16) -> Self {
        let chunk_samples = chunk_size * channels as usize;
        Self {
            consumer,
            chunk_samples,
            pending: Vec::with_capacity(chunk_samples * 2),
            scratch: vec![0i16; chunk_samples],
        }
    }

    /// Non-blocking: drains whatever the capture callback has written and
    /// returns one full chunk when enough has accumulated.
    pub fn next_chunk(&mut self) -> Option<Vec<i16>> {
        while self.pending.len() < self.chunk_samples {
            let read = self.consumer.read(&mut self.scratch);
            if read == 0 {
                break;
            }
            self.pending.extend_from_slice(&self.scratch[..read]);
        }

        if self.pending.len() >= self.chunk_samples {
            let chunk: Vec<i16> = self.pending.drain(..self.chunk_samples).collect();
            Some(chunk)
        } else {
            None
        }
    }

    /// Samples currently buffered but not yet forming a full chunk.
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::AudioRingBuffer;

    #[test]
    fn assembles_full_chunks_from_partial_writes() {
        let rb = AudioRingBuffer::new(4096);
        let (mut producer, consumer) = rb.split();
        let mut reader = FrameReader::new(consumer, 160, 1);

        producer.write(&[1i16; 100]).unwrap();
        assert!(reader.next_chunk().is_none());
        assert_eq!(reader.pending_samples(), 100);

        producer.write(&[2i16; 100]).unwrap();
        let chunk = reader.next_chunk().unwrap();
        assert_eq!(chunk.len(), 160);
        assert_eq!(chunk[99], 1);
        assert_eq!(chunk[100], 2);
        assert_eq!(reader.pending_samples(), 40);
    }

    #[test]
    fn stereo_chunk_is_double_length() {
        let rb = AudioRingBuffer::new(4096);
        let (mut producer, consumer) = rb.split();
        let mut reader = FrameReader::new(consumer, 160, 2);

        producer.write(&[5i16; 320]).unwrap();
        let chunk = reader.next_chunk().unwrap();
        assert_eq!(chunk.len(), 320);
    }
}
