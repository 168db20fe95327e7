//! Golomb-Rice coder of order `k`.
//!
//! A value `v` is split into the quotient `v >> k` and the low `k` bits.
//! The stream carries the quotient in unary (that many zero bits followed by
//! a one terminator) and then the remainder, least significant bit first.
//! Short orders favour geometric distributions of small integers.

use crate::coder::{BitSink, BitSource, CoderResult, Decoder, Encoder, TokenSink};
use crate::Error;
use num_traits::PrimInt;

pub struct RiceEncoder<T> {
    order: usize,
    pending: Option<(T, u64)>,
}

impl<T: PrimInt> RiceEncoder<T> {
    /// `order` is the remainder width in bits, at least one.
    pub fn new(order: usize) -> Self {
        debug_assert!(order >= 1 && order < std::mem::size_of::<T>() * 8);
        Self {
            order,
            pending: None,
        }
    }

    fn quotient(&self, token: T) -> u64 {
        (token >> self.order).to_u64().unwrap_or(u64::MAX)
    }

    /// Emit the code for `token` starting at bit index `from` of it.
    fn emit<S: BitSink>(&mut self, token: T, from: u64, output: &mut S) -> CoderResult {
        let quotient = self.quotient(token);
        let total = quotient + 1 + self.order as u64;
        for i in from..total {
            let bit = if i < quotient {
                false
            } else if i == quotient {
                true
            } else {
                let rem_bit = (i - quotient - 1) as usize;
                (token >> rem_bit) & T::one() == T::one()
            };
            if !output.push_bit(bit) {
                self.pending = Some((token, i));
                return CoderResult::OutputFull;
            }
        }
        self.pending = None;
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
        if let Some((token, from)) = self.pending.take() {
            if self.emit(token, from, output) == CoderResult::OutputFull {
                return Ok(CoderResult::OutputFull);
            }
        }
        let mut taken = 0;
        while limit.map_or(true, |n| taken < n) {
            let Some(token) = input.next() else {
                return Ok(CoderResult::InputExhausted);
            };
            taken += 1;
            if self.emit(token, 0, output) == CoderResult::OutputFull {
                return Ok(CoderResult::OutputFull);
            }
        }
        Ok(CoderResult::Done)
    }
}

impl<T: PrimInt> Encoder for RiceEncoder<T> {
    type Token = T;

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

    fn flush<S: BitSink>(&mut self, output: &mut S) -> Result<CoderResult, Error> {
        match self.pending.take() {
            Some((token, from)) => Ok(self.emit(token, from, output)),
            None => Ok(CoderResult::Done),
        }
    }

    fn token_bit_size(&self, token: &T) -> f32 {
        (self.quotient(*token) + 1 + self.order as u64) as f32
    }
}

pub struct RiceDecoder<T> {
    order: usize,
    quotient: u64,
    terminated: bool,
    remainder: T,
    remainder_got: usize,
    ready: Option<T>,
}

impl<T: PrimInt> RiceDecoder<T> {
    pub fn new(order: usize) -> Self {
        debug_assert!(order >= 1 && order < std::mem::size_of::<T>() * 8);
        Self {
            order,
            quotient: 0,
            terminated: false,
            remainder: T::zero(),
            remainder_got: 0,
            ready: None,
        }
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
        let mut produced = 0;
        loop {
            if let Some(token) = self.ready {
                if !output.push_token(token) {
                    return Ok(CoderResult::OutputFull);
                }
                self.ready = None;
                produced += 1;
            }
            if limit.map_or(false, |n| produced >= n) {
                return Ok(CoderResult::Done);
            }
            while !self.terminated {
                match input.next_bit() {
                    None => return Ok(CoderResult::InputExhausted),
                    Some(false) => self.quotient += 1,
                    Some(true) => self.terminated = true,
                }
            }
            while self.remainder_got < self.order {
                let Some(bit) = input.next_bit() else {
                    return Ok(CoderResult::InputExhausted);
                };
                if bit {
                    self.remainder = self.remainder | (T::one() << self.remainder_got);
                }
                self.remainder_got += 1;
            }
            let remainder = self.remainder.to_u64().unwrap_or(0);
            let value = self
                .quotient
                .checked_mul(1u64 << self.order)
                .map(|high| high | remainder)
                .ok_or(Error::MalformedInput)?;
            self.ready = Some(T::from(value).ok_or(Error::MalformedInput)?);
            self.quotient = 0;
            self.terminated = false;
            self.remainder = T::zero();
            self.remainder_got = 0;
        }
    }
}

impl<T: PrimInt> Decoder for RiceDecoder<T> {
    type Token = T;

    fn initialize<R: BitSource>(&mut self, _input: &mut R) -> Result<CoderResult, Error> {
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
use bit_vec::BitVec;

#[cfg(test)]
fn bits(pattern: &[u8]) -> BitVec {
    pattern.iter().map(|&b| b != 0).collect()
}

#[test]
fn encode_first_order() {
    let input = vec![1u8, 4, 8, 13];
    let expected = bits(&[
        1, 1, //
        0, 0, 1, 0, //
        0, 0, 0, 0, 1, 0, //
        0, 0, 0, 0, 0, 0, 1, 1,
    ]);
    let mut stream = BitVec::new();
    let mut encoder = RiceEncoder::<u8>::new(1);
    encoder
        .encode(&mut input.iter().copied(), &mut stream)
        .unwrap();
    assert_eq!(stream, expected);
}

#[test]
fn encode_second_order() {
    let input = vec![1u8, 4, 8, 13];
    let expected = bits(&[
        1, 1, 0, //
        0, 1, 0, 0, //
        0, 0, 1, 0, 0, //
        0, 0, 0, 1, 1, 0,
    ]);
    let mut stream = BitVec::new();
    let mut encoder = RiceEncoder::<u8>::new(2);
    encoder
        .encode(&mut input.iter().copied(), &mut stream)
        .unwrap();
    assert_eq!(stream, expected);
}

#[test]
fn encode_fourth_order() {
    let input = vec![1u8, 4, 8, 13, 16];
    let expected = bits(&[
        1, 1, 0, 0, 0, //
        1, 0, 0, 1, 0, //
        1, 0, 0, 0, 1, //
        1, 1, 0, 1, 1, //
        0, 1, 0, 0, 0, 0,
    ]);
    let mut stream = BitVec::new();
    let mut encoder = RiceEncoder::<u8>::new(4);
    encoder
        .encode(&mut input.iter().copied(), &mut stream)
        .unwrap();
    assert_eq!(stream, expected);
}

#[test]
fn partial_input_encoding() {
    let input = vec![1u8, 4, 8, 13, 16];
    let mut reference = BitVec::new();
    RiceEncoder::<u8>::new(4)
        .encode(&mut input.iter().copied(), &mut reference)
        .unwrap();

    let mut stream = BitVec::new();
    let mut encoder = RiceEncoder::<u8>::new(4);
    let mut iter = input.iter().copied();
    encoder.encode_n(2, &mut iter, &mut stream).unwrap();
    assert_eq!(stream.len(), 10);
    encoder.encode_n(1, &mut iter, &mut stream).unwrap();
    assert_eq!(stream.len(), 15);
    encoder.encode(&mut iter, &mut stream).unwrap();
    assert_eq!(stream, reference);
}

#[test]
fn first_order_round_trip() {
    let input = vec![1u8, 4, 8, 13];
    let mut stream = BitVec::new();
    let mut encoder = RiceEncoder::<u8>::new(1);
    encoder
        .encode(&mut input.iter().copied(), &mut stream)
        .unwrap();

    let mut decoder = RiceDecoder::<u8>::new(1);
    let mut reader = BitVecReader::new(&stream);
    let mut result = Vec::new();
    decoder.decode(&mut reader, &mut result).unwrap();
    assert_eq!(result, input);
}

#[test]
fn token_sizes_match_the_stream() {
    let input = vec![1u8, 4, 8, 13];
    let encoder = RiceEncoder::<u8>::new(1);
    let total: f32 = input.iter().map(|t| encoder.token_bit_size(t)).sum();
    assert_eq!(total, 20.0);
}
