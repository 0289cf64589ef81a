//! Lock-free sample queue between the capture callback and the frame pump.
//!
//! rtrb gives a wait-free SPSC ring; the callback side must never block or
//! allocate, so a full buffer drops the incoming block and reports how many
//! samples were lost instead of waiting for space.

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::warn;

use verba_foundation::error::AudioError;

pub struct AudioRingBuffer {
    producer: Producer<i16>,
    consumer: Consumer<i16>,
}

impl AudioRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity);
        Self { producer, consumer }
    }

    /// Hand the producer to the capture thread and the consumer to the pump.
    pub fn split(self) -> (AudioProducer, AudioConsumer) {
        (
            AudioProducer {
                producer: self.producer,
            },
            AudioConsumer {
                consumer: self.consumer,
            },
        )
    }
}

/// Callback-side half. `write` is all-or-nothing per block so a partial
/// utterance never enters the queue out of order.
pub struct AudioProducer {
    producer: Producer<i16>,
}

impl AudioProducer {
    pub fn write(&mut self, samples: &[i16]) -> Result<usize, AudioError> {
        let Ok(mut chunk) = self.producer.write_chunk(samples.len()) else {
            warn!("Frame queue full, dropping {} samples", samples.len());
            return Err(AudioError::BufferOverflow {
                count: samples.len(),
            });
        };

        // The reservation may wrap around the ring end
        let (head, tail) = chunk.as_mut_slices();
        let wrap = head.len();
        head.copy_from_slice(&samples[..wrap]);
        if !tail.is_empty() {
            tail.copy_from_slice(&samples[wrap..]);
        }
        chunk.commit_all();
        Ok(samples.len())
    }

    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Pump-side half.
pub struct AudioConsumer {
    consumer: Consumer<i16>,
}

impl AudioConsumer {
    /// Drain up to `buffer.len()` samples, returning how many landed.
    /// Never waits for the producer.
    pub fn read(&mut self, buffer: &mut [i16]) -> usize {
        let want = buffer.len().min(self.consumer.slots());
        let Ok(chunk) = self.consumer.read_chunk(want) else {
            return 0;
        };

        let len = chunk.len();
        let (head, tail) = chunk.as_slices();
        let wrap = head.len();
        buffer[..wrap].copy_from_slice(head);
        if !tail.is_empty() {
            buffer[wrap..wrap + tail.len()].copy_from_slice(tail);
        }
        chunk.commit_all();
        len
    }

    pub fn slots(&self) -> usize {
        self.consumer.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_cross_the_queue_in_order() {
        let (mut producer, mut consumer) = AudioRingBuffer::new(1024).split();

        assert_eq!(producer.write(&[1, 2, 3, 4, 5]).unwrap(), 5);

        let mut buffer = vec![0i16; 10];
        assert_eq!(consumer.read(&mut buffer), 5);
        assert_eq!(&buffer[..5], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn full_queue_rejects_the_whole_block() {
        let (mut producer, mut consumer) = AudioRingBuffer::new(16).split();

        assert!(producer.write(&[0i16; 16]).is_ok());
        assert!(matches!(
            producer.write(&[0i16; 16]),
            Err(AudioError::BufferOverflow { count: 16 })
        ));

        // Nothing from the rejected block leaked in
        let mut buffer = vec![9i16; 32];
        assert_eq!(consumer.read(&mut buffer), 16);
        assert_eq!(consumer.read(&mut buffer), 0);
    }

    #[test]
    fn short_queue_yields_partial_read() {
        let (mut producer, mut consumer) = AudioRingBuffer::new(64).split();
        producer.write(&[7i16; 3]).unwrap();

        let mut buffer = vec![0i16; 8];
        assert_eq!(consumer.read(&mut buffer), 3);
        assert_eq!(consumer.read(&mut buffer), 0);
    }

    #[test]
    fn wrapped_write_reads_back_contiguously() {
        let (mut producer, mut consumer) = AudioRingBuffer::new(8).split();
        let mut buffer = vec![0i16; 8];

        // Advance the ring so the next write wraps the boundary
        producer.write(&[0i16; 6]).unwrap();
        assert_eq!(consumer.read(&mut buffer), 6);

        producer.write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(consumer.read(&mut buffer), 4);
        assert_eq!(&buffer[..4], &[1, 2, 3, 4]);
    }
}
