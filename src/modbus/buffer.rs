//! Append-only byte accumulator with cheap prefix discard.
//!
//! Byte 0 is always the earliest unconsumed byte; there are never gaps.
//! Internally a read cursor is advanced instead of shifting the retained
//! tail on every discard; the backing vec is only compacted once the
//! discarded prefix grows past half of it, which keeps `consume` and
//! `retain_last` O(1) amortized rather than O(bytes retained) per call.

#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
    start: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            start: 0,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..]
    }

    pub fn peek(&self, n: usize) -> Option<&[u8]> {
        (self.len() >= n).then(|| &self.data[self.start..self.start + n])
    }

    /// Drops the first `n` bytes. `n` may exceed `len()`, in which case the
    /// buffer is emptied.
    pub fn consume(&mut self, n: usize) {
        self.start += n.min(self.len());
        self.compact_if_needed();
    }

    /// Drops everything before index `i`, keeping `data[i..]`.
    pub fn drop_to(&mut self, i: usize) {
        self.consume(i);
    }

    /// Drops everything, keeping only the last `n` bytes (used when no valid
    /// frame start was found, to keep a possible CRC tail for later bytes).
    pub fn retain_last(&mut self, n: usize) {
        if self.len() > n {
            let drop = self.len() - n;
            self.consume(drop);
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.start = 0;
    }

    /// Physically drops the already-consumed prefix once it accounts for at
    /// least half the backing vec, so a long stream of small discards
    /// doesn't leave `data` growing unbounded.
    fn compact_if_needed(&mut self) {
        if self.start > 0 && self.start * 2 >= self.data.len() {
            self.data.drain(..self.start);
            self.start = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_consume() {
        let mut buf = FrameBuffer::new();
        buf.append(&[1, 2, 3, 4]);
        assert_eq!(buf.len(), 4);
        buf.consume(2);
        assert_eq!(buf.as_slice(), &[3, 4]);
    }

    #[test]
    fn retain_last_keeps_tail() {
        let mut buf = FrameBuffer::new();
        buf.append(&[1, 2, 3, 4, 5]);
        buf.retain_last(3);
        assert_eq!(buf.as_slice(), &[3, 4, 5]);
    }

    #[test]
    fn retain_last_noop_when_shorter() {
        let mut buf = FrameBuffer::new();
        buf.append(&[1, 2]);
        buf.retain_last(3);
        assert_eq!(buf.as_slice(), &[1, 2]);
    }

    #[test]
    fn consume_past_end_empties_buffer() {
        let mut buf = FrameBuffer::new();
        buf.append(&[1, 2]);
        buf.consume(10);
        assert!(buf.is_empty());
    }

    #[test]
    fn many_small_consumes_keep_backing_vec_bounded() {
        let mut buf = FrameBuffer::new();
        for i in 0..10_000u32 {
            buf.append(&(i as u8).to_le_bytes());
            buf.consume(1);
        }
        assert!(buf.is_empty());
        // Repeated single-byte discards must trigger compaction rather than
        // letting the backing vec grow linearly with total bytes processed.
        assert!(buf.data.capacity() < 10_000);
    }

    #[test]
    fn retained_bytes_survive_compaction() {
        let mut buf = FrameBuffer::new();
        buf.append(&[0u8; 1000]);
        buf.consume(999);
        buf.append(&[42]);
        assert_eq!(buf.as_slice(), &[0, 42]);
    }
}
