//! Table-based asymmetric numeral system coder.
//!
//! One shared init table drives both directions: a state table assigning a
//! token to every state, built by walking a strided permutation, and the
//! per-token state shares (optionally rescaled to a requested total). The
//! encoder renormalizes by shifting low state bits into the stream before
//! every transition; the decoder replays transitions from a precomputed
//! table. The two run in opposite stream directions: feed the decoder the
//! encoder's output through a reversing adapter
//! (`bits::BitVecReader::reversed`).
//!
//! The coded stream is not self-delimiting; decode with `decode_n`.

use crate::coder::{BitSink, BitSource, CoderResult, Decoder, Encoder, TokenSink};
use crate::Error;
use std::collections::BTreeMap;

/// Shared state-distribution table.
pub struct TansInitTable<T> {
    state_table: Vec<T>,
    states_per_token: BTreeMap<T, u64>,
    state_sentinel: u64,
}

impl<T: Ord + Copy> TansInitTable<T> {
    /// Table over the raw counts, walked linearly from state zero.
    pub fn new(counts: &BTreeMap<T, u64>) -> Result<Self, Error> {
        Self::with_params(counts, 0, 1, None)
    }

    /// Table walked with a stride from a chosen start state, with the counts
    /// optionally rescaled so they sum to `normalize_to`.
    pub fn with_params(
        counts: &BTreeMap<T, u64>,
        init_state: u64,
        step: u64,
        normalize_to: Option<u64>,
    ) -> Result<Self, Error> {
        let states_per_token = match normalize_to {
            None => counts.clone(),
            Some(target) => Self::normalize(counts, target)?,
        };
        let number_of_states: u64 = states_per_token.values().sum();
        if number_of_states == 0 {
            return Err(Error::InvalidNormalization(normalize_to.unwrap_or(0)));
        }
        let length = number_of_states as usize;
        let mut slots: Vec<Option<T>> = vec![None; length];
        let mut cursor = (init_state % number_of_states) as usize;
        for (&token, &share) in &states_per_token {
            for _ in 0..share {
                while slots[cursor].is_some() {
                    cursor = (cursor + 1) % length;
                }
                slots[cursor] = Some(token);
                cursor = (cursor + (step % number_of_states) as usize) % length;
            }
        }
        let state_table = slots
            .into_iter()
            .map(|slot| slot.expect("every state assigned"))
            .collect();
        Ok(Self {
            state_table,
            states_per_token,
            state_sentinel: number_of_states,
        })
    }

    /// Rescale so the shares sum to `target`, keeping each proportional via
    /// running-sum flooring. A token whose share would drop to zero is a
    /// configuration error.
    fn normalize(counts: &BTreeMap<T, u64>, target: u64) -> Result<BTreeMap<T, u64>, Error> {
        let total: u64 = counts.values().sum();
        if total == 0 || target == 0 {
            return Err(Error::InvalidNormalization(target));
        }
        let mut scaled = BTreeMap::new();
        let mut running = 0u64;
        let mut previous_floor = 0u64;
        for (&token, &count) in counts {
            running += count;
            let floor = (running as u128 * target as u128 / total as u128) as u64;
            let share = floor - previous_floor;
            if share == 0 {
                return Err(Error::InvalidNormalization(target));
            }
            scaled.insert(token, share);
            previous_floor = floor;
        }
        Ok(scaled)
    }

    pub fn state_table(&self) -> &[T] {
        &self.state_table
    }

    pub fn states_per_token(&self) -> &BTreeMap<T, u64> {
        &self.states_per_token
    }

    pub fn number_of_states(&self) -> u64 {
        self.state_sentinel
    }

    /// Bits needed to carry a state index, `ceil(log2(L))`.
    fn state_bits(&self) -> u8 {
        if self.state_sentinel <= 1 {
            0
        } else {
            (64 - (self.state_sentinel - 1).leading_zeros()) as u8
        }
    }
}

pub struct TansEncoder<T> {
    counts: BTreeMap<T, u64>,
    /// State-table indices of each token's occurrences, ascending.
    slots: BTreeMap<T, Vec<u32>>,
    state_sentinel: u64,
    state_bits: u8,
    state: u64,
    /// Renormalization bits still owed to the output, value then count.
    pending: Option<(u64, u8)>,
    flushed: bool,
}

impl<T: Ord + Copy> TansEncoder<T> {
    pub fn new(table: &TansInitTable<T>) -> Self {
        let mut slots: BTreeMap<T, Vec<u32>> = BTreeMap::new();
        for (index, token) in table.state_table().iter().enumerate() {
            slots.entry(*token).or_default().push(index as u32);
        }
        Self {
            counts: table.states_per_token().clone(),
            slots,
            state_sentinel: table.number_of_states(),
            state_bits: table.state_bits(),
            state: table.number_of_states(),
            pending: None,
            flushed: false,
        }
    }

    fn emit_pending<S: BitSink>(&mut self, output: &mut S) -> CoderResult {
        if let Some((mut value, mut left)) = self.pending.take() {
            while left > 0 {
                if !output.push_bit(value & 1 == 1) {
                    self.pending = Some((value, left));
                    return CoderResult::OutputFull;
                }
                value >>= 1;
                left -= 1;
            }
        }
        CoderResult::Done
    }

    fn encode_limit<I, S>(
        &mut self,
        limit: Option<usize>,
        input: &mut I,
        output: &mut S,
    ) -> Result<CoderResult, Error>
    where
        I: Iterator<Item = T>,
        S: BitSink,
    {
        if self.emit_pending(output) == CoderResult::OutputFull {
            return Ok(CoderResult::OutputFull);
        }
        let mut taken = 0;
        while limit.map_or(true, |n| taken < n) {
            let Some(token) = input.next() else {
                return Ok(CoderResult::InputExhausted);
            };
            taken += 1;
            let count = *self.counts.get(&token).ok_or(Error::UnknownToken)?;
            let mut shift = 0u8;
            while (self.state >> shift) >= 2 * count {
                shift += 1;
            }
            let low_bits = self.state & ((1u64 << shift) - 1);
            let occurrence = (self.state >> shift) - count;
            let index = self.slots[&token][occurrence as usize];
            self.state = self.state_sentinel + index as u64;
            self.pending = Some((low_bits, shift));
            if self.emit_pending(output) == CoderResult::OutputFull {
                return Ok(CoderResult::OutputFull);
            }
        }
        Ok(CoderResult::Done)
    }
}

impl<T: Ord + Copy> Encoder for TansEncoder<T> {
    type Token = T;

    const ASYMMETRICAL: bool = true;

    fn encode<I, S>(&mut self, input: &mut I, output: &mut S) -> Result<CoderResult, Error>
    where
        I: Iterator<Item = T>,
        S: BitSink,
    {
        self.encode_limit(None, input, output)
    }

    fn encode_n<I, S>(
        &mut self,
        n: usize,
        input: &mut I,
        output: &mut S,
    ) -> Result<CoderResult, Error>
    where
        I: Iterator<Item = T>,
        S: BitSink,
    {
        self.encode_limit(Some(n), input, output)
    }

    /// Emit the closing state, `ceil(log2(L))` bits of `state - L`. The
    /// decoder reads them first from the reversed stream.
    fn flush<S: BitSink>(&mut self, output: &mut S) -> Result<CoderResult, Error> {
        if self.emit_pending(output) == CoderResult::OutputFull {
            return Ok(CoderResult::OutputFull);
        }
        if !self.flushed {
            self.flushed = true;
            self.pending = Some((self.state - self.state_sentinel, self.state_bits));
            if self.emit_pending(output) == CoderResult::OutputFull {
                return Ok(CoderResult::OutputFull);
            }
        }
        Ok(CoderResult::Done)
    }

    fn token_bit_size(&self, token: &T) -> f32 {
        match self.counts.get(token) {
            Some(&count) => (self.state_sentinel as f32 / count as f32).log2(),
            None => f32::INFINITY,
        }
    }
}

struct DecodeEntry<T> {
    symbol: T,
    next: u64,
    bits: u8,
}

enum DecodeStep {
    Emit,
    Read,
}

pub struct TansDecoder<T> {
    table: Vec<DecodeEntry<T>>,
    state_bits: u8,
    state: u64,
    initialized: bool,
    step: DecodeStep,
    pending_next: u64,
    needed: u8,
    acc: u64,
    got: u8,
}

impl<T: Ord + Copy> TansDecoder<T> {
    pub fn new(init_table: &TansInitTable<T>) -> Self {
        let length = init_table.number_of_states();
        let mut occurrence = init_table.states_per_token().clone();
        let mut table = Vec::with_capacity(length as usize);
        for &token in init_table.state_table() {
            let x = occurrence
                .get_mut(&token)
                .expect("state table tokens are counted");
            let mut bits = 0u8;
            while (*x << bits) < length {
                bits += 1;
            }
            table.push(DecodeEntry {
                symbol: token,
                next: (*x << bits) - length,
                bits,
            });
            *x += 1;
        }
        Self {
            table,
            state_bits: init_table.state_bits(),
            state: 0,
            initialized: false,
            step: DecodeStep::Emit,
            pending_next: 0,
            needed: 0,
            acc: 0,
            got: 0,
        }
    }

    fn read_msb_first<R: BitSource>(&mut self, input: &mut R) -> CoderResult {
        while self.got < self.needed {
            let Some(bit) = input.next_bit() else {
                return CoderResult::InputExhausted;
            };
            self.acc = (self.acc << 1) | bit as u64;
            self.got += 1;
        }
        CoderResult::Done
    }

    fn decode_limit<R, O>(
        &mut self,
        limit: Option<usize>,
        input: &mut R,
        output: &mut O,
    ) -> Result<CoderResult, Error>
    where
        R: BitSource,
        O: TokenSink<T>,
    {
        if self.initialize(input)? != CoderResult::Done {
            return Ok(CoderResult::InputExhausted);
        }
        let mut produced = 0;
        loop {
            match self.step {
                DecodeStep::Emit => {
                    if limit.map_or(false, |n| produced >= n) {
                        return Ok(CoderResult::Done);
                    }
                    if limit.is_none() && self.table.len() == 1 {
                        // a single-state table carries no information per
                        // token, only a bounded request terminates
                        return Ok(CoderResult::Done);
                    }
                    let entry = &self.table[self.state as usize];
                    let (symbol, next, bits) = (entry.symbol, entry.next, entry.bits);
                    if !output.push_token(symbol) {
                        return Ok(CoderResult::OutputFull);
                    }
                    produced += 1;
                    self.pending_next = next;
                    self.needed = bits;
                    self.acc = 0;
                    self.got = 0;
                    self.step = DecodeStep::Read;
                }
                DecodeStep::Read => {
                    if self.read_msb_first(input) != CoderResult::Done {
                        return Ok(CoderResult::InputExhausted);
                    }
                    let next = self.pending_next + self.acc;
                    if next >= self.table.len() as u64 {
                        return Err(Error::MalformedInput);
                    }
                    self.state = next;
                    self.step = DecodeStep::Emit;
                }
            }
        }
    }
}

impl<T: Ord + Copy> Decoder for TansDecoder<T> {
    type Token = T;

    const ASYMMETRICAL: bool = true;

    /// Read the closing state written by the encoder's flush from the head
    /// of the reversed stream.
    fn initialize<R: BitSource>(&mut self, input: &mut R) -> Result<CoderResult, Error> {
        if self.initialized {
            return Ok(CoderResult::Done);
        }
        self.needed = self.state_bits;
        if self.read_msb_first(input) != CoderResult::Done {
            return Ok(CoderResult::InputExhausted);
        }
        if self.acc >= self.table.len() as u64 {
            return Err(Error::MalformedInput);
        }
        self.state = self.acc;
        self.acc = 0;
        self.got = 0;
        self.initialized = true;
        self.step = DecodeStep::Emit;
        Ok(CoderResult::Done)
    }

    fn decode<R, O>(&mut self, input: &mut R, output: &mut O) -> Result<CoderResult, Error>
    where
        R: BitSource,
        O: TokenSink<T>,
    {
        self.decode_limit(None, input, output)
    }

    fn decode_n<R, O>(
        &mut self,
        n: usize,
        input: &mut R,
        output: &mut O,
    ) -> Result<CoderResult, Error>
    where
        R: BitSource,
        O: TokenSink<T>,
    {
        self.decode_limit(Some(n), input, output)
    }
}

// *************** TESTS *****************

#[cfg(test)]
use crate::bits::BitVecReader;
#[cfg(test)]
use crate::count_tokens;
#[cfg(test)]
use bit_vec::BitVec;

#[cfg(test)]
fn uniform_counts() -> BTreeMap<u8, u64> {
    "abcdefgh".bytes().map(|b| (b, 2)).collect()
}

#[cfg(test)]
fn stream_of(pattern: &str) -> BitVec {
    pattern.bytes().map(|b| b == b'1').collect()
}

#[cfg(test)]
fn encode_to_stream(table: &TansInitTable<u8>, sequence: &str) -> BitVec {
    let mut encoder = TansEncoder::new(table);
    let mut stream = BitVec::new();
    encoder
        .encode(&mut sequence.bytes(), &mut stream)
        .unwrap();
    encoder.flush(&mut stream).unwrap();
    encoder.flush(&mut stream).unwrap(); // idempotent
    stream
}

#[cfg(test)]
fn decode_reversed(table: &TansInitTable<u8>, stream: &BitVec, count: usize) -> String {
    let mut decoder = TansDecoder::new(table);
    let mut reader = BitVecReader::reversed(stream);
    let mut result: Vec<u8> = Vec::new();
    decoder.initialize(&mut reader).unwrap();
    decoder.decode_n(count, &mut reader, &mut result).unwrap();
    result.reverse();
    String::from_utf8(result).unwrap()
}

#[test]
fn uniform_state_table() {
    let table = TansInitTable::new(&uniform_counts()).unwrap();
    assert_eq!(table.state_table(), b"aabbccddeeffgghh");
    assert_eq!(table.states_per_token(), &uniform_counts());
    assert_eq!(table.number_of_states(), 16);
}

#[test]
fn geometric_state_table_rescaled() {
    let counts: BTreeMap<u8, u64> = [(b'a', 2u64), (b'b', 4), (b'c', 8)].into_iter().collect();
    let table = TansInitTable::with_params(&counts, 0, 1, Some(16)).unwrap();
    assert_eq!(table.state_table(), b"aabbbbcccccccccc");
    let expected: BTreeMap<u8, u64> = [(b'a', 2u64), (b'b', 4), (b'c', 10)].into_iter().collect();
    assert_eq!(table.states_per_token(), &expected);
    assert_eq!(table.number_of_states(), 16);
}

#[test]
fn geometric_state_table_shifted() {
    let counts: BTreeMap<u8, u64> = [(b'a', 2u64), (b'b', 4), (b'c', 8)].into_iter().collect();
    let table = TansInitTable::with_params(&counts, 5, 1, Some(16)).unwrap();
    assert_eq!(table.state_table(), b"cccccaabbbbccccc");
}

#[test]
fn strided_state_table() {
    let table = TansInitTable::with_params(&uniform_counts(), 2, 7, None).unwrap();
    assert_eq!(table.state_table(), b"beadhcgbfaehdgcf");
    assert_eq!(table.number_of_states(), 16);
}

#[test]
fn strided_and_rescaled_state_table() {
    let table = TansInitTable::with_params(&uniform_counts(), 2, 7, Some(32)).unwrap();
    assert_eq!(
        table.state_table(),
        b"ecafdbhecagdbhfcagebhfdagechfdbg"
    );
    assert!(table.states_per_token().values().all(|&share| share == 4));
    assert_eq!(table.number_of_states(), 32);
}

#[test]
fn normalization_rejects_vanishing_tokens() {
    let counts = count_tokens("abbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".bytes());
    assert_eq!(
        TansInitTable::with_params(&counts, 0, 1, Some(8)).err(),
        Some(Error::InvalidNormalization(8))
    );
}

#[test]
fn uniform_distribution_stream() {
    let table = TansInitTable::new(&uniform_counts()).unwrap();
    let stream = encode_to_stream(&table, "abacdaeffagggaah");
    let expected =
        stream_of("0000000100000010110000001101101000011011011000000111");
    assert_eq!(stream, expected);
    assert_eq!(decode_reversed(&table, &stream, 16), "abacdaeffagggaah");
}

#[test]
fn geometric_distribution_stream() {
    let counts: BTreeMap<u8, u64> = [(b'a', 8u64), (b'b', 4), (b'c', 2)].into_iter().collect();
    let table = TansInitTable::new(&counts).unwrap();
    let stream = encode_to_stream(&table, "aabababacaabaaa");
    assert_eq!(stream, stream_of("0000100100100011101110"));
    assert_eq!(decode_reversed(&table, &stream, 15), "aabababacaabaaa");
}

#[test]
fn strided_distribution_stream() {
    let table = TansInitTable::with_params(&uniform_counts(), 2, 7, None).unwrap();
    let stream = encode_to_stream(&table, "abacdaeffagggaah");
    let expected =
        stream_of("0000100000101011100101000001111001011011011001001101");
    assert_eq!(stream, expected);
    assert_eq!(decode_reversed(&table, &stream, 16), "abacdaeffagggaah");
}

#[test]
fn strided_and_rescaled_stream() {
    let table = TansInitTable::with_params(&uniform_counts(), 2, 7, Some(32)).unwrap();
    let stream = encode_to_stream(&table, "abacdaeffagggaah");
    let expected =
        stream_of("00001010101010000101000011011001001010000011100000101");
    assert_eq!(stream, expected);
    assert_eq!(decode_reversed(&table, &stream, 16), "abacdaeffagggaah");
}

#[test]
fn odd_state_count_encodes() {
    // encoder-side behavior is defined for any state count; round trips are
    // only guaranteed for power-of-two tables
    let table = TansInitTable::with_params(&uniform_counts(), 2, 7, Some(13)).unwrap();
    let expected: BTreeMap<u8, u64> = [
        (b'a', 1u64),
        (b'b', 2),
        (b'c', 1),
        (b'd', 2),
        (b'e', 2),
        (b'f', 1),
        (b'g', 2),
        (b'h', 2),
    ]
    .into_iter()
    .collect();
    assert_eq!(table.states_per_token(), &expected);
    let stream = encode_to_stream(&table, "abacdaeffagggaah");
    assert_eq!(
        stream,
        stream_of("10111011011111110001110011100110011001100010111110001")
    );
}

#[test]
fn dirac_distribution_emits_nothing() {
    let counts = count_tokens("a".bytes());
    let table = TansInitTable::new(&counts).unwrap();
    let stream = encode_to_stream(&table, "aaaaaaaaaaaaaaaa");
    assert!(stream.is_empty());
    assert_eq!(decode_reversed(&table, &stream, 16), "aaaaaaaaaaaaaaaa");
}

#[test]
fn long_text_round_trips() {
    let text = "The number theoretic transform is based on generalizing the \
                Nth primitive root of unity to a quotient ring instead of \
                the usual field of complex numbers; it also has the property \
                that its powers visit all of the frequency points on the \
                unit circle.";
    let counts = count_tokens(text.bytes());
    let table = TansInitTable::with_params(&counts, 0, 1, Some(512)).unwrap();
    let stream = encode_to_stream(&table, text);
    assert_eq!(decode_reversed(&table, &stream, text.len()), text);
}

#[test]
fn suspended_output_resumes_mid_token() {
    use crate::bits::TakeBits;
    let table = TansInitTable::new(&uniform_counts()).unwrap();
    let sequence = "abacdaeffagggaah";

    let mut reference = BitVec::new();
    let mut encoder = TansEncoder::new(&table);
    encoder.encode(&mut sequence.bytes(), &mut reference).unwrap();
    encoder.flush(&mut reference).unwrap();

    let mut stream = BitVec::new();
    let mut encoder = TansEncoder::new(&table);
    let mut tokens = sequence.bytes();
    loop {
        let mut bounded = TakeBits::new(&mut stream, 7);
        match encoder.encode(&mut tokens, &mut bounded).unwrap() {
            CoderResult::OutputFull => continue,
            CoderResult::InputExhausted => break,
            CoderResult::Done => unreachable!("no token limit was set"),
        }
    }
    while encoder.flush(&mut stream).unwrap() != CoderResult::Done {}
    assert_eq!(stream, reference);
}
