//! Single-bit views over byte buffers and bit vectors.
//!
//! `BitReader` and `BitWriter` layer bit granularity over plain byte slices
//! and vectors in either bit order. `BitVec` itself acts as an unbounded
//! sink, and `BitVecReader` replays one forwards or backwards (the backwards
//! replay is what a tANS decoder consumes).

use crate::coder::{BitSink, BitSource};
use crate::BitOrder;
use bit_vec::BitVec;

/// Lazy bit-level reader over a byte slice.
pub struct BitReader<'a> {
    bytes: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
    ord: BitOrder,
    remaining: Option<usize>,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8], ord: BitOrder) -> Self {
        Self {
            bytes,
            byte_pos: 0,
            bit_pos: 0,
            ord,
            remaining: None,
        }
    }
    /// Truncate the view after `n` further bits.
    pub fn take(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }
    /// Bit position 0..=7 inside the current byte.
    pub fn position(&self) -> u8 {
        self.bit_pos
    }
}

impl BitSource for BitReader<'_> {
    fn next_bit(&mut self) -> Option<bool> {
        if self.remaining == Some(0) || self.byte_pos >= self.bytes.len() {
            return None;
        }
        let byte = self.bytes[self.byte_pos];
        let bit = match self.ord {
            BitOrder::Lsb0 => (byte >> self.bit_pos) & 1,
            BitOrder::Msb0 => (byte >> (7 - self.bit_pos)) & 1,
        };
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        if let Some(left) = self.remaining.as_mut() {
            *left -= 1;
        }
        Some(bit != 0)
    }
}

/// Bit-level writer appending to a byte vector. A completed byte is emitted
/// as soon as it fills; `flush` materializes the final partial byte padded
/// with zeros.
pub struct BitWriter<'a> {
    bytes: &'a mut Vec<u8>,
    staging: u8,
    bit_pos: u8,
    ord: BitOrder,
    capacity: Option<usize>,
}

impl<'a> BitWriter<'a> {
    pub fn new(bytes: &'a mut Vec<u8>, ord: BitOrder) -> Self {
        Self {
            bytes,
            staging: 0,
            bit_pos: 0,
            ord,
            capacity: None,
        }
    }
    /// Refuse bits after `n` more have been written.
    pub fn take(mut self, n: usize) -> Self {
        self.capacity = Some(n);
        self
    }
    /// Bit position 0..=7 inside the staging byte.
    pub fn position(&self) -> u8 {
        self.bit_pos
    }
    /// Emit the partial staging byte, zero padded. Idempotent when no bits
    /// are pending.
    pub fn flush(&mut self) {
        if self.bit_pos > 0 {
            self.bytes.push(self.staging);
            self.staging = 0;
            self.bit_pos = 0;
        }
    }
}

impl BitSink for BitWriter<'_> {
    fn push_bit(&mut self, bit: bool) -> bool {
        if self.capacity == Some(0) {
            return false;
        }
        if bit {
            self.staging |= match self.ord {
                BitOrder::Lsb0 => 1 << self.bit_pos,
                BitOrder::Msb0 => 1 << (7 - self.bit_pos),
            };
        }
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bytes.push(self.staging);
            self.staging = 0;
            self.bit_pos = 0;
        }
        if let Some(left) = self.capacity.as_mut() {
            *left -= 1;
        }
        true
    }
}

impl BitSink for BitVec {
    fn push_bit(&mut self, bit: bool) -> bool {
        self.push(bit);
        true
    }
}

/// Bounded sink adapter over any other sink.
pub struct TakeBits<'a, S: BitSink> {
    inner: &'a mut S,
    limit: usize,
}

impl<'a, S: BitSink> TakeBits<'a, S> {
    pub fn new(inner: &'a mut S, limit: usize) -> Self {
        Self { inner, limit }
    }
}

impl<S: BitSink> BitSink for TakeBits<'_, S> {
    fn push_bit(&mut self, bit: bool) -> bool {
        if self.limit == 0 {
            return false;
        }
        if self.inner.push_bit(bit) {
            self.limit -= 1;
            true
        } else {
            false
        }
    }
}

/// Replays a `BitVec` as a bit source, optionally in reverse order.
pub struct BitVecReader<'a> {
    bits: &'a BitVec,
    pos: usize,
    reversed: bool,
}

impl<'a> BitVecReader<'a> {
    pub fn new(bits: &'a BitVec) -> Self {
        Self {
            bits,
            pos: 0,
            reversed: false,
        }
    }
    /// Read from the last bit towards the first. An asymmetric coder writes
    /// its stream forwards and decodes it backwards, so its decoder is fed
    /// through this adapter.
    pub fn reversed(bits: &'a BitVec) -> Self {
        Self {
            bits,
            pos: 0,
            reversed: true,
        }
    }
}

impl BitSource for BitVecReader<'_> {
    fn next_bit(&mut self) -> Option<bool> {
        if self.pos >= self.bits.len() {
            return None;
        }
        let index = match self.reversed {
            true => self.bits.len() - 1 - self.pos,
            false => self.pos,
        };
        self.pos += 1;
        self.bits.get(index)
    }
}

// *************** TESTS *****************

#[test]
fn lsb0_reading() {
    let bytes = [0b0010_1011u8];
    let mut reader = BitReader::new(&bytes, BitOrder::Lsb0);
    let expected = [true, true, false, true, false, true, false, false];
    for bit in expected {
        assert_eq!(reader.next_bit(), Some(bit));
    }
    assert_eq!(reader.next_bit(), None);
}

#[test]
fn msb0_reading() {
    let bytes = [0b0010_1011u8];
    let mut reader = BitReader::new(&bytes, BitOrder::Msb0);
    let expected = [false, false, true, false, true, false, true, true];
    for bit in expected {
        assert_eq!(reader.next_bit(), Some(bit));
    }
    assert_eq!(reader.next_bit(), None);
}

#[test]
fn writing_round_trips_both_orders() {
    for ord in [BitOrder::Lsb0, BitOrder::Msb0] {
        let pattern = [true, false, false, true, true, true, false, true, true, false];
        let mut bytes = Vec::new();
        let mut writer = BitWriter::new(&mut bytes, ord);
        for bit in pattern {
            assert!(writer.push_bit(bit));
        }
        writer.flush();
        writer.flush(); // idempotent
        assert_eq!(bytes.len(), 2);
        let mut reader = BitReader::new(&bytes, ord);
        for bit in pattern {
            assert_eq!(reader.next_bit(), Some(bit));
        }
    }
}

#[test]
fn complete_bytes_are_emitted_eagerly() {
    let mut bytes = Vec::new();
    let mut writer = BitWriter::new(&mut bytes, BitOrder::Lsb0);
    for _ in 0..8 {
        writer.push_bit(true);
    }
    let position = writer.position();
    drop(writer);
    assert_eq!(bytes, vec![0xff]);
    assert_eq!(position, 0);
}

#[test]
fn take_limits_the_writer() {
    let mut bytes = Vec::new();
    let mut writer = BitWriter::new(&mut bytes, BitOrder::Lsb0).take(3);
    assert!(writer.push_bit(true));
    assert!(writer.push_bit(false));
    assert!(writer.push_bit(true));
    assert!(!writer.push_bit(true));
    writer.flush();
    assert_eq!(bytes, vec![0b101]);
}

#[test]
fn take_limits_the_reader() {
    let bytes = [0xffu8];
    let mut reader = BitReader::new(&bytes, BitOrder::Lsb0).take(2);
    assert_eq!(reader.next_bit(), Some(true));
    assert_eq!(reader.next_bit(), Some(true));
    assert_eq!(reader.next_bit(), None);
}

#[test]
fn bitvec_reader_reverses() {
    let mut bits = BitVec::new();
    for bit in [true, false, false] {
        bits.push(bit);
    }
    let mut reader = BitVecReader::reversed(&bits);
    assert_eq!(reader.next_bit(), Some(false));
    assert_eq!(reader.next_bit(), Some(false));
    assert_eq!(reader.next_bit(), Some(true));
    assert_eq!(reader.next_bit(), None);
}
