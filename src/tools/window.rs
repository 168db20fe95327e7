//! Fused dictionary and look-ahead buffer for LZ sliding windows.
//!
//! Both halves live in one cyclic backing store laid out so that the
//! dictionary's reachable symbols and the look-ahead buffer each stay
//! contiguous without per-access copying. Reserved telomere zones at the
//! edges absorb the wrap: when the write position reaches the end of the
//! backing store, the surviving look-ahead symbols are copied once to the
//! head and the store keeps two images of the overlap until the dictionary
//! start catches up with the head image. Per full pass that is one copy of
//! `buffer_size - 1` symbols and no heap allocation.
//!
//! Invariants
//! - only appending a new symbol may overwrite an existing one
//! - nearest symbols are never pruned before distant ones
//! - after `add_end_symbol` has been called, `add_symbol` is forbidden

use crate::Error;
use num_traits::PrimInt;

/// Tail image left behind by a relocation. Absolute position `p` maps to
/// backing offset `p - base_abs` while `p < head_base`; content is valid
/// through `end_abs`.
struct TailImage {
    base_abs: usize,
    end_abs: usize,
}

pub struct FusedWindow<T> {
    backing: Vec<T>,
    dict_capacity: usize,
    buf_capacity: usize,
    /// Absolute input position of the oldest dictionary symbol.
    start_abs: usize,
    dict_len: usize,
    buf_len: usize,
    /// Absolute input position mapped to backing offset 0.
    head_base: usize,
    tail: Option<TailImage>,
    ended: bool,
}

impl<T: PrimInt> FusedWindow<T> {
    /// Window with the look-ahead pre-filled from `fill` (encoder side).
    pub fn with_fill(
        dict_capacity: usize,
        fill: &[T],
        cyclic_size: Option<usize>,
    ) -> Result<Self, Error> {
        let mut window = Self::new(dict_capacity, fill.len(), cyclic_size)?;
        window.backing[..fill.len()].copy_from_slice(fill);
        window.buf_len = fill.len();
        Ok(window)
    }

    /// Window with an empty look-ahead of capacity `buf_capacity`
    /// (decoder side; symbols pass straight through into the dictionary).
    pub fn new(
        dict_capacity: usize,
        buf_capacity: usize,
        cyclic_size: Option<usize>,
    ) -> Result<Self, Error> {
        let floor = dict_capacity + 2 * buf_capacity;
        let size = match cyclic_size {
            Some(requested) if requested < floor => {
                return Err(Error::InvalidCyclicBufferSize {
                    expected: floor,
                    got: requested,
                })
            }
            Some(requested) => requested,
            None => 2 * (dict_capacity + buf_capacity) + buf_capacity,
        };
        Ok(Self {
            backing: vec![T::zero(); size.max(1)],
            dict_capacity,
            buf_capacity,
            start_abs: 0,
            dict_len: 0,
            buf_len: 0,
            head_base: 0,
            tail: None,
            ended: false,
        })
    }

    /// Append one symbol to the look-ahead; the oldest look-ahead symbol
    /// crosses into the dictionary. Returns whether a dictionary symbol was
    /// pruned to make room.
    pub fn add_symbol(&mut self, symbol: T) -> bool {
        debug_assert!(!self.ended, "add_symbol after add_end_symbol");
        let buffer_head = self.start_abs + self.dict_len;
        let write_abs = buffer_head + self.buf_len;
        let mut write_off = write_abs - self.head_base;
        if write_off == self.backing.len() {
            // Wrap: relocate the surviving look-ahead symbols to the head of
            // the backing store and keep the old image as a tail.
            debug_assert!(self.tail.is_none(), "overlapping relocations");
            let keep = self.buf_len.saturating_sub(1);
            for k in 0..keep {
                let src = buffer_head + 1 + k - self.head_base;
                let survivor = self.backing[src];
                self.backing[k] = survivor;
            }
            self.tail = Some(TailImage {
                base_abs: self.head_base,
                end_abs: self.head_base + self.backing.len(),
            });
            self.head_base = write_abs - keep;
            write_off = keep;
            log::trace!("window relocated, head now at position {}", self.head_base);
        }
        self.backing[write_off] = symbol;
        self.age_one_symbol()
    }

    /// Mark the end of input: the look-ahead shrinks by one and the
    /// dictionary takes the crossing symbol as usual.
    pub fn add_end_symbol(&mut self) -> bool {
        debug_assert!(self.buf_len > 0, "no look-ahead symbol left to retire");
        self.ended = true;
        self.buf_len -= 1;
        self.age_one_symbol()
    }

    fn age_one_symbol(&mut self) -> bool {
        let pruned = if self.dict_len == self.dict_capacity {
            self.start_abs += 1;
            true
        } else {
            self.dict_len += 1;
            false
        };
        // The dictionary start catching up with the head image ends the
        // split; everything reachable lives in the head from here on.
        let resolved = match &self.tail {
            Some(tail) => {
                debug_assert!(tail.end_abs >= self.start_abs);
                self.start_abs >= self.head_base
            }
            None => false,
        };
        if resolved {
            self.tail = None;
        }
        pruned
    }

    fn slice_at_abs(&self, abs: usize, len: usize) -> &[T] {
        if let Some(tail) = &self.tail {
            if abs < self.head_base {
                debug_assert!(abs >= tail.base_abs && abs + len <= tail.end_abs);
                let off = abs - tail.base_abs;
                return &self.backing[off..off + len];
            }
        }
        let off = abs - self.head_base;
        &self.backing[off..off + len]
    }

    /// The look-ahead buffer as one contiguous slice.
    pub fn buffer(&self) -> &[T] {
        self.slice_at_abs(self.start_abs + self.dict_len, self.buf_len)
    }

    /// The oldest still-reachable full-length string: `buffer_size` symbols
    /// starting at the dictionary start (spilling into the look-ahead while
    /// the dictionary is shorter than that).
    pub fn oldest_dictionary_full_match(&self) -> &[T] {
        let len = self.buf_capacity.min(self.dict_len + self.buf_len);
        self.slice_at_abs(self.start_abs, len)
    }

    /// Contiguous view of `len` symbols starting `pos` symbols after the
    /// dictionary start. Valid for `pos + len` up to one short of the total
    /// window contents, which lets matches read through into the look-ahead.
    pub fn sequence_at(&self, pos: usize, len: usize) -> &[T] {
        debug_assert!(pos + len <= self.dict_len + self.buf_len);
        self.slice_at_abs(self.start_abs + pos, len)
    }

    /// Absolute input position of the oldest dictionary symbol.
    pub fn start_position(&self) -> usize {
        self.start_abs
    }

    pub fn dictionary_size(&self) -> usize {
        self.dict_len
    }

    pub fn buffer_size(&self) -> usize {
        self.buf_len
    }

    pub fn max_dictionary_size(&self) -> usize {
        self.dict_capacity
    }

    pub fn max_buffer_size(&self) -> usize {
        self.buf_capacity
    }

    pub fn full(&self) -> bool {
        self.dict_len == self.dict_capacity
    }

    pub fn empty(&self) -> bool {
        self.dict_len == 0 && self.buf_len == 0
    }
}

// *************** TESTS *****************

#[cfg(test)]
const TEST_DICT: usize = 32;
#[cfg(test)]
const TEST_FILL: [u8; 4] = [0x12, 0x43, 0x55, 0x54];

#[cfg(test)]
fn pseudo_random_sequence(length: usize) -> Vec<u8> {
    // multiplicative LCG, full period mod the Mersenne prime
    let mut value: u64 = 43948390;
    let mut result = Vec::with_capacity(length);
    for _ in 0..length {
        result.push(value as u8);
        value = (16807 * value) % 2147483647;
    }
    result
}

#[test]
fn creation() {
    let window: FusedWindow<u8> = FusedWindow::with_fill(TEST_DICT, &TEST_FILL, None).unwrap();
    assert_eq!(window.buffer_size(), TEST_FILL.len());
    assert_eq!(window.max_buffer_size(), TEST_FILL.len());
    assert_eq!(window.dictionary_size(), 0);
    assert_eq!(window.max_dictionary_size(), TEST_DICT);
    assert_eq!(window.buffer(), &TEST_FILL);
    assert_eq!(window.oldest_dictionary_full_match(), &TEST_FILL);
}

#[test]
fn undersized_cyclic_buffer_is_rejected() {
    let result: Result<FusedWindow<u8>, Error> = FusedWindow::new(32, 4, Some(39));
    assert_eq!(
        result.err(),
        Some(Error::InvalidCyclicBufferSize {
            expected: 40,
            got: 39
        })
    );
    assert!(FusedWindow::<u8>::new(32, 4, Some(40)).is_ok());
}

#[test]
fn simple_buffer_accommodation() {
    let mut window = FusedWindow::with_fill(TEST_DICT, &TEST_FILL, None).unwrap();
    assert_eq!(window.dictionary_size(), 0);

    window.add_symbol(0x78);
    assert_eq!(window.buffer(), &[0x43, 0x55, 0x54, 0x78]);
    assert_eq!(window.oldest_dictionary_full_match(), &TEST_FILL);
    assert_eq!(window.dictionary_size(), 1);

    window.add_symbol(0x54);
    assert_eq!(window.buffer(), &[0x55, 0x54, 0x78, 0x54]);
    assert_eq!(window.dictionary_size(), 2);

    window.add_symbol(0x67);
    assert_eq!(window.buffer(), &[0x54, 0x78, 0x54, 0x67]);
    assert_eq!(window.dictionary_size(), 3);

    window.add_symbol(0x93);
    assert_eq!(window.buffer(), &[0x78, 0x54, 0x67, 0x93]);
    assert_eq!(window.dictionary_size(), 4);

    window.add_symbol(0x66);
    assert_eq!(window.buffer(), &[0x54, 0x67, 0x93, 0x66]);
    assert_eq!(window.oldest_dictionary_full_match(), &TEST_FILL);
    assert_eq!(window.dictionary_size(), 5);
}

#[test]
fn long_run_keeps_buffer_and_dictionary_consistent() {
    let mut window = FusedWindow::with_fill(TEST_DICT, &TEST_FILL, None).unwrap();
    let sequence = pseudo_random_sequence(10_000);
    let fill = TEST_FILL.len();

    for &symbol in &sequence[..fill] {
        window.add_symbol(symbol);
    }
    let mut buff_iter = 0;
    for &symbol in &sequence[fill..fill + TEST_DICT] {
        assert_eq!(window.buffer(), &sequence[buff_iter..buff_iter + fill]);
        buff_iter += 1;
        window.add_symbol(symbol);
    }
    let mut iter = 0;
    for &symbol in &sequence[TEST_DICT + fill..] {
        assert_eq!(window.buffer(), &sequence[buff_iter..buff_iter + fill]);
        assert_eq!(
            window.oldest_dictionary_full_match(),
            &sequence[iter..iter + fill]
        );
        iter += 1;
        buff_iter += 1;
        window.add_symbol(symbol);
    }
}

#[test]
fn end_symbols_drain_the_buffer() {
    let mut window = FusedWindow::with_fill(TEST_DICT, &TEST_FILL, None).unwrap();
    let fill = TEST_FILL.len();
    let sequence = pseudo_random_sequence(TEST_DICT + fill);
    for &symbol in &sequence {
        window.add_symbol(symbol);
    }

    for step in 1..=fill {
        window.add_end_symbol();
        assert_eq!(
            window.oldest_dictionary_full_match(),
            &sequence[step..step + fill]
        );
        assert_eq!(
            window.buffer(),
            &sequence[TEST_DICT + step..TEST_DICT + fill]
        );
        assert_eq!(window.dictionary_size(), window.max_dictionary_size());
        assert_eq!(window.buffer_size(), fill - step);
    }
    assert_eq!(window.buffer(), &[] as &[u8]);
}

#[test]
fn position_getter_straight() {
    let fill: Vec<u16> = (0..4).collect();
    let mut window = FusedWindow::with_fill(TEST_DICT, &fill, None).unwrap();
    for i in 4..TEST_DICT as u16 {
        window.add_symbol(i);
    }
    for len in 1..=4usize {
        for pos in 0..TEST_DICT - 4 {
            let expected: Vec<u16> = (pos as u16..(pos + len) as u16).collect();
            assert_eq!(window.sequence_at(pos, len), &expected[..]);
        }
    }
}

#[test]
fn position_getter_wrapped() {
    let fill: Vec<u16> = (0..4).collect();
    let mut window = FusedWindow::with_fill(TEST_DICT, &fill, None).unwrap();
    let total: u16 = 10_000;
    for i in 4..=total {
        window.add_symbol(i);
    }
    for pos in 0..TEST_DICT {
        let length = if pos + 4 > TEST_DICT { TEST_DICT - pos } else { 4 };
        let symbol = pos as u16 + total - TEST_DICT as u16 - 4 + 1;
        let expected: Vec<u16> = (symbol..symbol + length as u16).collect();
        assert_eq!(window.sequence_at(pos, length), &expected[..]);
    }
}

#[test]
fn wrapping_with_minimal_cyclic_size() {
    // the tightest legal backing store still never tears a view
    let fill: Vec<u16> = (0..3).collect();
    let mut window = FusedWindow::with_fill(8, &fill, Some(8 + 2 * 3)).unwrap();
    for i in 3..2_000u16 {
        window.add_symbol(i);
        let newest = i;
        let dict_len = window.dictionary_size() as u16;
        let start = newest - 2 - dict_len;
        assert_eq!(window.buffer(), &[newest - 2, newest - 1, newest]);
        assert_eq!(
            window.oldest_dictionary_full_match(),
            &[start, start + 1, start + 2]
        );
    }
}

#[test]
fn pass_through_window_feeds_the_dictionary_directly() {
    let mut window: FusedWindow<u8> = FusedWindow::new(4, 3, None).unwrap();
    assert!(window.empty());
    for symbol in [10, 20, 30, 40, 50, 60] {
        window.add_symbol(symbol);
    }
    assert_eq!(window.buffer_size(), 0);
    assert_eq!(window.dictionary_size(), 4);
    assert_eq!(window.sequence_at(0, 4), &[30, 40, 50, 60]);
}
