//! Fixed-width integer coder.
//!
//! Every token is written as `width` bits, least significant first. With the
//! default width this is the identity transform between a token stream and a
//! little-endian bit stream, which also makes it the default auxiliary coder
//! for the LZ77 engine.

use crate::coder::{BitSink, BitSource, CoderResult, Decoder, Encoder, TokenSink};
use crate::Error;
use num_traits::PrimInt;

pub struct UniformEncoder<T> {
    width: u8,
    pending: Option<(T, u8)>,
}

impl<T: PrimInt> UniformEncoder<T> {
    /// Encoder at the token's native width.
    pub fn new() -> Self {
        Self::with_width((std::mem::size_of::<T>() * 8) as u8)
    }

    /// Encoder truncated to the low `width` bits of each token.
    pub fn with_width(width: u8) -> Self {
        debug_assert!(width as usize <= std::mem::size_of::<T>() * 8);
        Self {
            width,
            pending: None,
        }
    }

    fn emit<S: BitSink>(&mut self, token: T, from: u8, output: &mut S) -> CoderResult {
        for i in from..self.width {
            let bit = (token >> i as usize) & T::one() == T::one();
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

impl<T: PrimInt> Default for UniformEncoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PrimInt> Encoder for UniformEncoder<T> {
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

    fn token_bit_size(&self, _token: &T) -> f32 {
        self.width as f32
    }
}

pub struct UniformDecoder<T> {
    width: u8,
    acc: T,
    got: u8,
    ready: Option<T>,
}

impl<T: PrimInt> UniformDecoder<T> {
    pub fn new() -> Self {
        Self::with_width((std::mem::size_of::<T>() * 8) as u8)
    }

    pub fn with_width(width: u8) -> Self {
        debug_assert!(width as usize <= std::mem::size_of::<T>() * 8);
        Self {
            width,
            acc: T::zero(),
            got: 0,
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
            while self.got < self.width {
                let Some(bit) = input.next_bit() else {
                    return Ok(CoderResult::InputExhausted);
                };
                if bit {
                    self.acc = self.acc | (T::one() << self.got as usize);
                }
                self.got += 1;
            }
            self.ready = Some(self.acc);
            self.acc = T::zero();
            self.got = 0;
        }
    }
}

impl<T: PrimInt> Default for UniformDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PrimInt> Decoder for UniformDecoder<T> {
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
use crate::bits::{BitReader, BitWriter, TakeBits};
#[cfg(test)]
use crate::BitOrder;
#[cfg(test)]
use bit_vec::BitVec;

#[test]
fn bytes_pass_through() {
    let source = vec![0x43u8, 0x74, 0x35, 0x33];
    let mut target = Vec::new();
    let mut writer = BitWriter::new(&mut target, BitOrder::Lsb0);
    let mut encoder = UniformEncoder::<u8>::new();
    encoder
        .encode(&mut source.iter().copied(), &mut writer)
        .unwrap();
    writer.flush();
    assert_eq!(source, target);
}

#[test]
fn integers_come_out_little_endian() {
    let source = vec![0x43321245u32, 0x98325623];
    let expected = vec![0x45u8, 0x12, 0x32, 0x43, 0x23, 0x56, 0x32, 0x98];
    let mut target = Vec::new();
    let mut writer = BitWriter::new(&mut target, BitOrder::Lsb0);
    let mut encoder = UniformEncoder::<u32>::new();
    encoder
        .encode(&mut source.iter().copied(), &mut writer)
        .unwrap();
    writer.flush();
    assert_eq!(expected, target);
}

#[test]
fn partial_input_encoding() {
    let source = vec![0x43u8, 0x74, 0x35, 0x33];
    let mut target = Vec::new();
    let mut encoder = UniformEncoder::<u8>::new();
    let mut iter = source.iter().copied();

    {
        let mut writer = BitWriter::new(&mut target, BitOrder::Lsb0);
        assert_eq!(
            encoder.encode_n(2, &mut iter, &mut writer).unwrap(),
            CoderResult::Done
        );
    }
    assert_eq!(target, vec![0x43, 0x74]);
    {
        let mut writer = BitWriter::new(&mut target, BitOrder::Lsb0);
        assert_eq!(
            encoder.encode_n(1, &mut iter, &mut writer).unwrap(),
            CoderResult::Done
        );
    }
    assert_eq!(target, vec![0x43, 0x74, 0x35]);
    {
        let mut writer = BitWriter::new(&mut target, BitOrder::Lsb0);
        encoder.encode(&mut iter, &mut writer).unwrap();
        writer.flush();
    }
    assert_eq!(source, target);
}

#[test]
fn partial_output_encoding() {
    let source = vec![0x43u8, 0x74, 0x35, 0x33];
    let mut reference = BitVec::new();
    let mut encoder = UniformEncoder::<u8>::new();
    encoder
        .encode(&mut source.iter().copied(), &mut reference)
        .unwrap();

    let mut stream = BitVec::new();
    let mut encoder = UniformEncoder::<u8>::new();
    let mut iter = source.iter().copied();
    let mut first = TakeBits::new(&mut stream, 5);
    assert_eq!(
        encoder.encode(&mut iter, &mut first).unwrap(),
        CoderResult::OutputFull
    );
    assert_eq!(stream.len(), 5);
    let mut second = TakeBits::new(&mut stream, 13);
    assert_eq!(
        encoder.encode(&mut iter, &mut second).unwrap(),
        CoderResult::OutputFull
    );
    assert_eq!(stream.len(), 18);
    assert_eq!(
        encoder.encode(&mut iter, &mut stream).unwrap(),
        CoderResult::InputExhausted
    );
    assert_eq!(stream, reference);
}

#[test]
fn decoding_round_trips() {
    let expected = vec![0x43321245u32, 0x98325623];
    let mut bytes = Vec::new();
    let mut writer = BitWriter::new(&mut bytes, BitOrder::Lsb0);
    UniformEncoder::<u32>::new()
        .encode(&mut expected.iter().copied(), &mut writer)
        .unwrap();
    writer.flush();

    let mut decoder = UniformDecoder::<u32>::new();
    let mut reader = BitReader::new(&bytes, BitOrder::Lsb0);
    let mut result = Vec::new();
    decoder.decode(&mut reader, &mut result).unwrap();
    assert_eq!(expected, result);
}

#[test]
fn partial_input_decoding() {
    let expected = vec![0x43u8, 0x74, 0x35, 0x33];
    let mut bytes = Vec::new();
    let mut writer = BitWriter::new(&mut bytes, BitOrder::Lsb0);
    UniformEncoder::<u8>::new()
        .encode(&mut expected.iter().copied(), &mut writer)
        .unwrap();
    writer.flush();

    let mut decoder = UniformDecoder::<u8>::new();
    let mut reader = BitReader::new(&bytes, BitOrder::Lsb0);
    let mut result = Vec::new();
    assert_eq!(
        decoder.decode_n(2, &mut reader, &mut result).unwrap(),
        CoderResult::Done
    );
    assert_eq!(result, &expected[..2]);
    assert_eq!(
        decoder.decode_n(1, &mut reader, &mut result).unwrap(),
        CoderResult::Done
    );
    assert_eq!(result, &expected[..3]);
    decoder.decode(&mut reader, &mut result).unwrap();
    assert_eq!(result, expected);
}

#[test]
fn partial_bit_window_decoding() {
    let expected = vec![0x43u8, 0x74, 0x35, 0x33];
    let mut bytes = Vec::new();
    let mut writer = BitWriter::new(&mut bytes, BitOrder::Lsb0);
    UniformEncoder::<u8>::new()
        .encode(&mut expected.iter().copied(), &mut writer)
        .unwrap();
    writer.flush();

    let mut decoder = UniformDecoder::<u8>::new();
    let mut result = Vec::new();
    let mut reader = BitReader::new(&bytes, BitOrder::Lsb0).take(5);
    assert_eq!(
        decoder.decode(&mut reader, &mut result).unwrap(),
        CoderResult::InputExhausted
    );
    assert!(result.is_empty());

    // a fresh reader positioned where the last one stopped
    let mut reader = BitReader::new(&bytes, BitOrder::Lsb0);
    for _ in 0..5 {
        reader.next_bit();
    }
    let mut reader = reader.take(5);
    decoder.decode(&mut reader, &mut result).unwrap();
    assert_eq!(result, &expected[..1]);
}

#[test]
fn narrow_width_round_trips() {
    let source = vec![5u8, 2, 7, 0, 3];
    let mut stream = BitVec::new();
    let mut encoder = UniformEncoder::<u8>::with_width(3);
    encoder
        .encode(&mut source.iter().copied(), &mut stream)
        .unwrap();
    assert_eq!(stream.len(), 15);

    let mut decoder = UniformDecoder::<u8>::with_width(3);
    let mut reader = crate::bits::BitVecReader::new(&stream);
    let mut result = Vec::new();
    decoder.decode(&mut reader, &mut result).unwrap();
    assert_eq!(result, source);
}
