//! Fixed-capacity framing for gateway bytes.
//!
//! `SegmentedRingBuffer` is a ring of `SLICES` slots, each a [`SliceBuffer`]
//! of `S` bytes. Writes append to the slot at the head; reads hand back a whole
//! slot from the tail. Nothing allocates after construction: when the producer
//! laps the consumer, the oldest slot is reclaimed and its bytes are lost.
//!
//! Each slot also remembers where every write ended, so a reader can take the
//! slot apart again write by write with [`SegmentedRingBuffer::read_frames`].

use crate::error::FrameError;

/// Default size of one slot.
pub const DEFAULT_SLICE_SIZE: usize = 16 * 1024;

/// Writes one slot can hold before it is sealed, however small they are.
pub const MAX_FRAMES_PER_SLICE: usize = 64;

/// One fixed-size slot of the ring.
///
/// Bytes are appended at the write offset and consumed from the read offset.
/// A slot is always cleared as a whole, so offsets never wrap.
#[derive(Debug)]
pub struct SliceBuffer<const S: usize> {
    data: Box<[u8]>,
    read: usize,
    write: usize,
    ends: [usize; MAX_FRAMES_PER_SLICE],
    frames: usize,
}

impl<const S: usize> SliceBuffer<S> {
    pub fn new() -> Self {
        Self {
            data: vec![0; S].into_boxed_slice(),
            read: 0,
            write: 0,
            ends: [0; MAX_FRAMES_PER_SLICE],
            frames: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        S
    }

    #[inline]
    pub fn used_space(&self) -> usize {
        self.write - self.read
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        S - self.write
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// No bytes left, or no room to record another write.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.write == S || self.frames == MAX_FRAMES_PER_SLICE
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// Whether a write of `len` bytes would be accepted.
    #[inline]
    pub fn fits(&self, len: usize) -> bool {
        len <= self.remaining() && self.frames < MAX_FRAMES_PER_SLICE
    }

    /// Appends `bytes` as one frame.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        if bytes.len() > self.remaining() {
            return Err(FrameError::Oversized {
                size: bytes.len(),
                capacity: self.remaining(),
            });
        }
        if self.frames == MAX_FRAMES_PER_SLICE {
            return Err(FrameError::TooManyFrames {
                limit: MAX_FRAMES_PER_SLICE,
            });
        }
        let end = self.write + bytes.len();
        self.data[self.write..end].copy_from_slice(bytes);
        self.write = end;
        self.ends[self.frames] = end;
        self.frames += 1;
        Ok(())
    }

    /// The bytes written but not yet consumed.
    #[inline]
    pub fn unread(&self) -> &[u8] {
        &self.data[self.read..self.write]
    }

    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.frames = 0;
    }
}

impl<const S: usize> Default for SliceBuffer<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// A ring of fixed-size slots.
///
/// `head` and `tail` count slots monotonically; a slot lives at index
/// `counter % SLICES`. Slots in `tail..head` are sealed, the slot at `head` is
/// the one being filled.
#[derive(Debug)]
pub struct SegmentedRingBuffer<const SLICES: usize, const S: usize = DEFAULT_SLICE_SIZE> {
    slices: Box<[SliceBuffer<S>]>,
    head: u64,
    tail: u64,
}

impl<const SLICES: usize, const S: usize> SegmentedRingBuffer<SLICES, S> {
    /// # Panics
    ///
    /// Panics if `SLICES` or `S` is zero.
    pub fn new() -> Self {
        assert!(SLICES > 0, "slice count must be at least 1");
        assert!(S > 0, "slice size must be at least 1");
        Self {
            slices: (0..SLICES).map(|_| SliceBuffer::new()).collect(),
            head: 0,
            tail: 0,
        }
    }

    #[inline]
    pub fn slice_count(&self) -> usize {
        SLICES
    }

    #[inline]
    pub fn slice_capacity(&self) -> usize {
        S
    }

    /// Number of sealed slots waiting to be read.
    #[inline]
    pub fn len(&self) -> usize {
        (self.head - self.tail) as usize
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == SLICES
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail && self.slices[self.index(self.head)].is_empty()
    }

    #[inline]
    fn index(&self, counter: u64) -> usize {
        (counter % SLICES as u64) as usize
    }

    /// Drops the oldest slot when the slot at `head` still holds it.
    fn reclaim_if_full(&mut self) {
        if self.is_full() {
            let tail = self.index(self.tail);
            log::trace!(
                "ring full, dropping {} unread bytes from slice {}",
                self.slices[tail].used_space(),
                tail
            );
            self.slices[tail].clear();
            self.tail += 1;
        }
    }

    /// Copies `data` into the head slot.
    ///
    /// A write is never split across slots, so it must be smaller than one
    /// slot. Oversized writes are rejected before anything is copied.
    pub fn write(&mut self, data: &[u8]) -> Result<(), FrameError> {
        if data.len() >= S {
            return Err(FrameError::Oversized {
                size: data.len(),
                capacity: S,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        self.reclaim_if_full();
        if !self.slices[self.index(self.head)].fits(data.len()) {
            self.head += 1;
            self.reclaim_if_full();
        }

        let head = self.index(self.head);
        self.slices[head].write(data)?;
        if self.slices[head].is_full() {
            self.head += 1;
        }
        Ok(())
    }

    /// Takes every unread byte of the tail slot.
    ///
    /// The returned view stays valid until the next mutation. The slot is
    /// cleared and the tail moves on, unless the tail slot is the one still
    /// being filled, which is only cleared.
    pub fn read(&mut self) -> &[u8] {
        self.read_frames().bytes()
    }

    /// Like [`read`](Self::read), but yields the slot one write at a time.
    pub fn read_frames(&mut self) -> Frames<'_> {
        let tail = self.index(self.tail);
        let start = self.slices[tail].read;
        let end = self.slices[tail].write;
        let frames = self.slices[tail].frames;
        self.slices[tail].clear();
        if self.tail < self.head {
            self.tail += 1;
        }
        let slice = &self.slices[tail];
        Frames {
            data: &slice.data[..end],
            start,
            ends: &slice.ends[..frames],
        }
    }

    pub fn clear(&mut self) {
        for slice in self.slices.iter_mut() {
            slice.clear();
        }
        self.head = 0;
        self.tail = 0;
    }
}

impl<const SLICES: usize, const S: usize> Default for SegmentedRingBuffer<SLICES, S> {
    fn default() -> Self {
        Self::new()
    }
}

/// The writes held by one slot, oldest first.
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    data: &'a [u8],
    start: usize,
    ends: &'a [usize],
}

impl<'a> Frames<'a> {
    /// Everything not yet yielded, as one run of bytes.
    pub fn bytes(&self) -> &'a [u8] {
        &self.data[self.start..]
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let (&end, rest) = self.ends.split_first()?;
        let frame = &self.data[self.start..end];
        self.start = end;
        self.ends = rest;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<const N: usize, const S: usize>(ring: &mut SegmentedRingBuffer<N, S>) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while !ring.is_empty() {
            out.push(ring.read().to_vec());
        }
        out
    }

    #[test]
    fn slice_buffer_tracks_offsets() {
        let mut slice = SliceBuffer::<8>::new();
        assert!(slice.is_empty());
        slice.write(b"abc").unwrap();
        assert_eq!(slice.used_space(), 3);
        assert_eq!(slice.remaining(), 5);
        assert_eq!(slice.unread(), b"abc");
        slice.write(b"defgh").unwrap();
        assert!(slice.is_full());
        assert!(slice.write(b"x").is_err());
        slice.clear();
        assert!(slice.is_empty());
        assert_eq!(slice.remaining(), 8);
    }

    #[test]
    fn writes_in_one_slice_are_read_together() {
        let mut ring = SegmentedRingBuffer::<4, 16>::new();
        ring.write(b"abc").unwrap();
        ring.write(b"def").unwrap();
        assert_eq!(ring.read(), b"abcdef");
        assert!(ring.is_empty());
        assert_eq!(ring.read(), b"");
    }

    #[test]
    fn write_that_does_not_fit_starts_a_new_slice() {
        let mut ring = SegmentedRingBuffer::<4, 16>::new();
        ring.write(b"0123456789").unwrap();
        ring.write(b"abcdefghij").unwrap();
        assert_eq!(ring.len(), 1);
        assert_eq!(drain(&mut ring), vec![b"0123456789".to_vec(), b"abcdefghij".to_vec()]);
    }

    #[test]
    fn reads_reconstruct_write_order() {
        let mut ring = SegmentedRingBuffer::<8, 16>::new();
        let writes: Vec<Vec<u8>> = (0u8..6).map(|i| vec![i; 9]).collect();
        for w in &writes {
            ring.write(w).unwrap();
        }
        let read: Vec<u8> = drain(&mut ring).concat();
        assert_eq!(read, writes.concat());
    }

    #[test]
    fn oversized_write_is_rejected_untouched() {
        let mut ring = SegmentedRingBuffer::<2, 16>::new();
        ring.write(b"keep").unwrap();
        let err = ring.write(&[0u8; 16]).unwrap_err();
        assert_eq!(err, FrameError::Oversized { size: 16, capacity: 16 });
        assert_eq!(ring.read(), b"keep");
    }

    #[test]
    fn exhausted_slice_seals_immediately() {
        let mut ring = SegmentedRingBuffer::<4, 8>::new();
        ring.write(b"abcd").unwrap();
        ring.write(b"efgh").unwrap();
        assert_eq!(ring.len(), 1);
        ring.write(b"i").unwrap();
        assert_eq!(drain(&mut ring), vec![b"abcdefgh".to_vec(), b"i".to_vec()]);
    }

    #[test]
    fn only_the_most_recent_slices_survive() {
        let mut ring = SegmentedRingBuffer::<4, 16>::new();
        // Each write fills more than half a slice, so every write gets its own.
        for i in 0u8..6 {
            ring.write(&[i; 10]).unwrap();
        }
        let slices = drain(&mut ring);
        assert_eq!(slices.len(), 4);
        let firsts: Vec<u8> = slices.iter().map(|s| s[0]).collect();
        assert_eq!(firsts, vec![2, 3, 4, 5]);
    }

    #[test]
    fn reading_keeps_up_with_writing() {
        let mut ring = SegmentedRingBuffer::<2, 16>::new();
        for i in 0u8..50 {
            ring.write(&[i; 12]).unwrap();
            assert_eq!(ring.read(), &[i; 12][..]);
            assert!(ring.is_empty());
        }
    }

    #[test]
    fn frames_come_back_one_write_at_a_time() {
        let mut ring = SegmentedRingBuffer::<4, 32>::new();
        ring.write(b"{\"a\":1}").unwrap();
        ring.write(b"xyz").unwrap();
        ring.write(b"{}").unwrap();
        let frames: Vec<&[u8]> = ring.read_frames().collect();
        assert_eq!(frames, vec![&b"{\"a\":1}"[..], &b"xyz"[..], &b"{}"[..]]);
        assert!(ring.is_empty());
    }

    #[test]
    fn full_frame_table_seals_the_slice() {
        let mut ring = SegmentedRingBuffer::<4, 1024>::new();
        for _ in 0..MAX_FRAMES_PER_SLICE {
            ring.write(b"a").unwrap();
        }
        assert_eq!(ring.len(), 1);
        ring.write(b"b").unwrap();
        assert_eq!(ring.read_frames().count(), MAX_FRAMES_PER_SLICE);
        assert_eq!(ring.read(), b"b");

        let mut slice = SliceBuffer::<1024>::new();
        for _ in 0..MAX_FRAMES_PER_SLICE {
            slice.write(b"a").unwrap();
        }
        assert!(slice.is_full());
        assert!(!slice.fits(1));
        assert_eq!(
            slice.write(b"a").unwrap_err(),
            FrameError::TooManyFrames { limit: MAX_FRAMES_PER_SLICE }
        );
    }

    #[test]
    fn clear_resets_everything() {
        let mut ring = SegmentedRingBuffer::<2, 8>::new();
        ring.write(b"abcdefg").unwrap();
        ring.write(b"hij").unwrap();
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.read(), b"");
    }
}
