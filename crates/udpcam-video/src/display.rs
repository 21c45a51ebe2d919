use std::collections::VecDeque;

/// Fixed-capacity FIFO of decoded frames waiting to be rendered.
///
/// Favors recency over completeness: pushing into a full buffer evicts the
/// oldest frame instead of growing or blocking, so rendering never falls
/// more than `capacity` frames behind the network.
pub struct DisplayBuffer<T> {
    frames: VecDeque<T>,
    capacity: usize,
}

impl<T> DisplayBuffer<T> {
    /// Create a buffer holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame. Returns the evicted oldest frame if the buffer was full.
    pub fn push(&mut self, frame: T) -> Option<T> {
        let evicted = if self.frames.len() >= self.capacity {
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        evicted
    }

    /// Remove and return the oldest frame.
    pub fn pop(&mut self) -> Option<T> {
        self.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard everything still buffered, returning how many frames were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.frames.len();
        self.frames.clear();
        n
    }
}
