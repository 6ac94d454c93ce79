//! Fixed-capacity ring buffer holding a signal's history.

/// Ring buffer that overwrites its oldest entry once full.
///
/// Reads always come back in insertion order, independent of where the
/// write head currently sits.
///
/// ```
/// use vigil_signals::buffer::CircularBuffer;
///
/// let mut buf = CircularBuffer::new(3);
/// for i in 0..5 {
///     buf.push(i);
/// }
/// assert_eq!(buf.get_all(), vec![&2, &3, &4]);
/// assert_eq!(buf.get_latest(2), vec![&3, &4]);
/// ```
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    items: Vec<T>,
    capacity: usize,
    /// Index of the oldest entry once the buffer has wrapped.
    head: usize,
}

impl<T> CircularBuffer<T> {
    /// A zero capacity is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() < self.capacity {
            self.items.push(item);
        } else {
            self.items[self.head] = item;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.head = 0;
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        let (newer, older) = self.items.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    pub fn get_all(&self) -> Vec<&T> {
        self.iter().collect()
    }

    /// The last `k` entries, oldest first.
    pub fn get_latest(&self, k: usize) -> Vec<&T> {
        let skip = self.len().saturating_sub(k);
        self.iter().skip(skip).collect()
    }

    pub fn latest(&self) -> Option<&T> {
        self.iter().next_back()
    }
}
