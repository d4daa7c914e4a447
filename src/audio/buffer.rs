//! Mirrored circular byte buffer
//!
//! Backing storage is twice the logical capacity. Every byte written at
//! logical offset `p` is stored at both `p` and `p + capacity`, so the
//! `count` bytes starting at `tail` are always one contiguous slice, even
//! when the logical range wraps. Readers never need to stitch two halves.
//!
//! The buffer is single-writer single-reader and is owned by exactly one
//! thread; it carries no synchronization of its own.

use crate::error::BufferError;

/// Fixed-capacity mirrored ring buffer
///
/// Invariant: `head == (tail + count) % capacity`.
#[derive(Default)]
pub struct RingBuffer {
    storage: Box<[u8]>,
    capacity: usize,
    head: usize,
    tail: usize,
    count: usize,
}

impl RingBuffer {
    /// Allocate a buffer holding up to `capacity` bytes
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidArgument(
                "capacity must be greater than zero".into(),
            ));
        }

        let storage_len = capacity
            .checked_mul(2)
            .ok_or(BufferError::AllocFailed(usize::MAX))?;
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(storage_len)
            .map_err(|_| BufferError::AllocFailed(storage_len))?;
        storage.resize(storage_len, 0);

        Ok(Self {
            storage: storage.into_boxed_slice(),
            capacity,
            head: 0,
            tail: 0,
            count: 0,
        })
    }

    /// Whether backing storage is allocated
    pub fn is_initialized(&self) -> bool {
        self.capacity != 0
    }

    /// Append `data`. Fails without touching state if it does not fit.
    pub fn write(&mut self, data: &[u8]) -> Result<(), BufferError> {
        if !self.is_initialized() {
            return Err(BufferError::NotInitialized);
        }
        if data.is_empty() {
            return Ok(());
        }

        let free = self.free_space();
        if free < data.len() {
            return Err(BufferError::BufferFull {
                requested: data.len(),
                free,
            });
        }

        let capacity = self.capacity;
        let head = self.head;

        // Up to the logical end, then wrap to the start
        let first = data.len().min(capacity - head);
        let (front, wrapped) = data.split_at(first);

        self.storage[head..head + first].copy_from_slice(front);
        self.storage[head + capacity..head + capacity + first].copy_from_slice(front);

        if !wrapped.is_empty() {
            self.storage[..wrapped.len()].copy_from_slice(wrapped);
            self.storage[capacity..capacity + wrapped.len()].copy_from_slice(wrapped);
        }

        self.head = (head + data.len()) % capacity;
        self.count += data.len();
        Ok(())
    }

    /// All stored bytes as one contiguous slice, oldest first.
    ///
    /// Empty when nothing is stored or the buffer is uninitialized.
    pub fn readable(&self) -> &[u8] {
        if self.count == 0 {
            return &[];
        }
        &self.storage[self.tail..self.tail + self.count]
    }

    /// Discard the oldest `n` bytes.
    pub fn consume(&mut self, n: usize) -> Result<(), BufferError> {
        if !self.is_initialized() {
            return Err(BufferError::NotInitialized);
        }
        if n == 0 {
            return Ok(());
        }
        if n > self.count {
            return Err(BufferError::ConsumeExceedsStored {
                requested: n,
                stored: self.count,
            });
        }

        self.tail = (self.tail + n) % self.capacity;
        self.count -= n;
        Ok(())
    }

    /// Drop all stored bytes, keeping the allocation
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    /// Free the backing storage and return to the uninitialized state
    pub fn release(&mut self) {
        *self = Self::default();
    }

    /// Bytes currently stored
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_space(&self) -> usize {
        self.capacity - self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Never true for an uninitialized buffer
    pub fn is_full(&self) -> bool {
        self.is_initialized() && self.count == self.capacity
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        if self.capacity == 0 {
            0.0
        } else {
            self.count as f32 / self.capacity as f32
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("count", &self.count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            RingBuffer::new(0),
            Err(BufferError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_write_read_consume() {
        let mut buffer = RingBuffer::new(8).unwrap();
        assert!(buffer.is_empty());
        assert!(buffer.readable().is_empty());

        buffer.write(b"abcde").unwrap();
        assert_eq!(buffer.readable(), b"abcde");
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.free_space(), 3);

        buffer.consume(3).unwrap();
        assert_eq!(buffer.readable(), b"de");

        // Wraps past the logical end
        buffer.write(b"fghij").unwrap();
        assert_eq!(buffer.readable(), b"defghij");
        assert_eq!(buffer.len(), 7);
    }

    #[test]
    fn test_full_write_leaves_state_unchanged() {
        let mut buffer = RingBuffer::new(4).unwrap();
        buffer.write(b"abc").unwrap();

        let before = format!("{:?}", buffer);
        assert_eq!(
            buffer.write(b"de"),
            Err(BufferError::BufferFull {
                requested: 2,
                free: 1
            })
        );
        assert_eq!(format!("{:?}", buffer), before);
        assert_eq!(buffer.readable(), b"abc");
    }

    #[test]
    fn test_max_payload_fills_buffer() {
        let mut buffer = RingBuffer::new(1436).unwrap();
        buffer.write(&[0x55; 1436]).unwrap();
        assert!(buffer.is_full());
        assert_eq!(buffer.free_space(), 0);
        assert!(matches!(
            buffer.write(&[1]),
            Err(BufferError::BufferFull { .. })
        ));
    }

    #[test]
    fn test_consume_too_much() {
        let mut buffer = RingBuffer::new(4).unwrap();
        buffer.write(b"ab").unwrap();
        assert_eq!(
            buffer.consume(3),
            Err(BufferError::ConsumeExceedsStored {
                requested: 3,
                stored: 2
            })
        );
        assert_eq!(buffer.readable(), b"ab");
    }

    #[test]
    fn test_empty_write_and_consume_are_noops() {
        let mut buffer = RingBuffer::new(4).unwrap();
        buffer.write(&[]).unwrap();
        buffer.consume(0).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_uninitialized_defaults() {
        let mut buffer = RingBuffer::default();
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), 0);
        assert_eq!(buffer.free_space(), 0);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
        assert!(buffer.readable().is_empty());
        assert_eq!(buffer.write(b"x"), Err(BufferError::NotInitialized));
        assert_eq!(buffer.consume(1), Err(BufferError::NotInitialized));
    }

    #[test]
    fn test_release() {
        let mut buffer = RingBuffer::new(16).unwrap();
        buffer.write(b"data").unwrap();
        buffer.release();
        assert!(!buffer.is_initialized());
        assert_eq!(buffer.len(), 0);
        assert!(buffer.readable().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Write(Vec<u8>),
        Consume(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            proptest::collection::vec(any::<u8>(), 0..48).prop_map(Op::Write),
            (0usize..48).prop_map(Op::Consume),
        ]
    }

    proptest! {
        #[test]
        fn prop_readable_matches_fifo_model(
            capacity in 1usize..64,
            ops in proptest::collection::vec(op(), 1..128),
        ) {
            let mut buffer = RingBuffer::new(capacity).unwrap();
            let mut model: VecDeque<u8> = VecDeque::new();

            for op in ops {
                match op {
                    Op::Write(data) => {
                        let fits = model.len() + data.len() <= capacity;
                        prop_assert_eq!(buffer.write(&data).is_ok(), fits);
                        if fits {
                            model.extend(data);
                        }
                    }
                    Op::Consume(n) => {
                        let fits = n <= model.len();
                        prop_assert_eq!(buffer.consume(n).is_ok(), fits);
                        if fits {
                            model.drain(..n);
                        }
                    }
                }

                let expected: Vec<u8> = model.iter().copied().collect();
                prop_assert_eq!(buffer.readable(), &expected[..]);
                prop_assert_eq!(buffer.len(), model.len());
                prop_assert_eq!(buffer.free_space(), capacity - model.len());
            }
        }
    }
}
