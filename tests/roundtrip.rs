//! Cross-coder round trips and resumability properties.

use bit_vec::BitVec;
use rand::prelude::*;
use std::collections::VecDeque;
use tokencodec::bits::{BitReader, BitVecReader, BitWriter, TakeBits};
use tokencodec::coder::{BitSink, BitSource, CoderResult, Decoder, Encoder, TokenSink};
use tokencodec::huffman::{make_huffman_table, HuffmanDecoder, HuffmanEncoder};
use tokencodec::lz77::{Lz77Decoder, Lz77Encoder, Lz77Token};
use tokencodec::rice::{RiceDecoder, RiceEncoder};
use tokencodec::tans::{TansDecoder, TansEncoder, TansInitTable};
use tokencodec::uniform::{UniformDecoder, UniformEncoder};
use tokencodec::{count_tokens, BitOrder, Error};

const TEST_TEXT: &str =
    "The number theoretic transform is based on generalizing the Nth primitive \
     root of unity to a quotient ring instead of the usual field of complex \
     numbers. We have been using it in the field of complex numbers, and it of \
     course satisfies the defining relation, making it a root of unity; it \
     also has the property that its powers visit all of the frequency points \
     on the unit circle in the plane.";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn lz77_bytes_round_trip() {
    init_logging();
    let mut encoder = Lz77Encoder::<u8, _>::new(1024, 16, None).unwrap();
    let mut bytes = Vec::new();
    let mut writer = BitWriter::new(&mut bytes, BitOrder::Lsb0);
    encoder
        .encode(&mut TEST_TEXT.bytes(), &mut writer)
        .unwrap();
    encoder.flush(&mut writer).unwrap();
    writer.flush();
    assert!(!bytes.is_empty());

    let mut decoder = Lz77Decoder::<u8, _>::new(1024, 16, None).unwrap();
    let mut reader = BitReader::new(&bytes, BitOrder::Lsb0);
    let mut decoded = Vec::new();
    decoder.initialize(&mut reader).unwrap();
    decoder
        .decode_n(TEST_TEXT.len(), &mut reader, &mut decoded)
        .unwrap();
    assert_eq!(decoded, TEST_TEXT.as_bytes());
}

#[test]
fn lz77_single_symbol_look_ahead() {
    init_logging();
    let mut encoder = Lz77Encoder::<u8, _>::new(1024, 1, None).unwrap();
    let mut stream = BitVec::new();
    encoder
        .encode(&mut TEST_TEXT.bytes(), &mut stream)
        .unwrap();
    encoder.flush(&mut stream).unwrap();

    let mut decoder = Lz77Decoder::<u8, _>::new(1024, 1, None).unwrap();
    let mut reader = BitVecReader::new(&stream);
    let mut decoded = Vec::new();
    decoder.initialize(&mut reader).unwrap();
    decoder
        .decode_n(TEST_TEXT.len(), &mut reader, &mut decoded)
        .unwrap();
    assert_eq!(decoded, TEST_TEXT.as_bytes());
}

#[test]
fn lz77_small_dictionary() {
    init_logging();
    let mut encoder = Lz77Encoder::<u8, _>::new(16, 16, None).unwrap();
    let mut stream = BitVec::new();
    encoder
        .encode(&mut TEST_TEXT.bytes(), &mut stream)
        .unwrap();
    encoder.flush(&mut stream).unwrap();

    let mut decoder = Lz77Decoder::<u8, _>::new(16, 16, None).unwrap();
    let mut reader = BitVecReader::new(&stream);
    let mut decoded = Vec::new();
    decoder.initialize(&mut reader).unwrap();
    decoder
        .decode_n(TEST_TEXT.len(), &mut reader, &mut decoded)
        .unwrap();
    assert_eq!(decoded, TEST_TEXT.as_bytes());
}

/// Auxiliary encoder that only records the intermediate tokens, used to
/// gather statistics for an entropy-coded second pass.
struct TokenRecorder {
    tokens: Vec<Lz77Token<u8>>,
}

impl Encoder for TokenRecorder {
    type Token = Lz77Token<u8>;

    fn encode<I, S>(&mut self, input: &mut I, _output: &mut S) -> Result<CoderResult, Error>
    where
        I: Iterator<Item = Self::Token>,
        S: BitSink,
    {
        self.tokens.extend(input);
        Ok(CoderResult::InputExhausted)
    }

    fn encode_n<I, S>(
        &mut self,
        n: usize,
        input: &mut I,
        _output: &mut S,
    ) -> Result<CoderResult, Error>
    where
        I: Iterator<Item = Self::Token>,
        S: BitSink,
    {
        for _ in 0..n {
            let Some(token) = input.next() else {
                return Ok(CoderResult::InputExhausted);
            };
            self.tokens.push(token);
        }
        Ok(CoderResult::Done)
    }

    fn flush<S: BitSink>(&mut self, _output: &mut S) -> Result<CoderResult, Error> {
        Ok(CoderResult::Done)
    }

    fn token_bit_size(&self, _token: &Self::Token) -> f32 {
        0.0
    }
}

#[test]
fn lz77_with_huffman_auxiliary() {
    init_logging();
    // first pass gathers token statistics
    let recorder = TokenRecorder { tokens: Vec::new() };
    let mut survey = Lz77Encoder::with_auxiliary(1024, 16, recorder, None).unwrap();
    let mut sink = BitVec::new();
    survey.encode(&mut TEST_TEXT.bytes(), &mut sink).unwrap();
    survey.flush(&mut sink).unwrap();
    let table =
        make_huffman_table(&count_tokens(survey.auxiliary_encoder().tokens.iter().copied()))
            .unwrap();

    // second pass entropy-codes the intermediate tokens
    let mut encoder =
        Lz77Encoder::with_auxiliary(1024, 16, HuffmanEncoder::new(table.clone()), None).unwrap();
    let mut stream = BitVec::new();
    encoder
        .encode(&mut TEST_TEXT.bytes(), &mut stream)
        .unwrap();
    encoder.flush(&mut stream).unwrap();
    assert!(stream.len() < TEST_TEXT.len() * 8);

    let mut decoder =
        Lz77Decoder::with_auxiliary(1024, 16, HuffmanDecoder::new(&table).unwrap(), None).unwrap();
    let mut reader = BitVecReader::new(&stream);
    let mut decoded = Vec::new();
    decoder.initialize(&mut reader).unwrap();
    decoder
        .decode_n(TEST_TEXT.len(), &mut reader, &mut decoded)
        .unwrap();
    assert_eq!(decoded, TEST_TEXT.as_bytes());
}

#[test]
fn rice_first_order_bytes() {
    let input = [1u8, 4, 8, 13];
    let mut bytes = Vec::new();
    let mut writer = BitWriter::new(&mut bytes, BitOrder::Lsb0);
    let mut encoder = RiceEncoder::<u8>::new(1);
    encoder
        .encode(&mut input.iter().copied(), &mut writer)
        .unwrap();
    encoder.flush(&mut writer).unwrap();
    writer.flush();
    assert_eq!(bytes, hex::decode("13040c").unwrap());

    let mut decoder = RiceDecoder::<u8>::new(1);
    let mut reader = BitReader::new(&bytes, BitOrder::Lsb0);
    let mut decoded = Vec::new();
    decoder.decode_n(4, &mut reader, &mut decoded).unwrap();
    assert_eq!(decoded, input);
}

#[test]
fn rice_random_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x52494345);
    for order in 1..6usize {
        let input: Vec<u16> = (0..500).map(|_| rng.gen_range(0..400)).collect();
        let mut stream = BitVec::new();
        let mut encoder = RiceEncoder::<u16>::new(order);
        encoder
            .encode(&mut input.iter().copied(), &mut stream)
            .unwrap();
        let mut decoder = RiceDecoder::<u16>::new(order);
        let mut reader = BitVecReader::new(&stream);
        let mut decoded = Vec::new();
        decoder
            .decode_n(input.len(), &mut reader, &mut decoded)
            .unwrap();
        assert_eq!(decoded, input);
    }
}

#[test]
fn huffman_dirac_scenario() {
    let counts = count_tokens("aaaaaaaaaaaaaaaaa".bytes());
    let table = make_huffman_table(&counts).unwrap();
    let mut encoder = HuffmanEncoder::new(table.clone());
    let mut bytes = Vec::new();
    let mut writer = BitWriter::new(&mut bytes, BitOrder::Lsb0);
    encoder
        .encode(&mut "aaaaaaaaaaaaaaaaa".bytes(), &mut writer)
        .unwrap();
    encoder.flush(&mut writer).unwrap();
    writer.flush();
    assert!(bytes.is_empty());

    let mut decoder = HuffmanDecoder::new(&table).unwrap();
    let mut reader = BitReader::new(&bytes, BitOrder::Lsb0);
    let mut decoded = Vec::new();
    decoder.decode_n(17, &mut reader, &mut decoded).unwrap();
    assert_eq!(decoded, vec![b'a'; 17]);
}

#[test]
fn tans_round_trip_through_reversal() {
    let counts = count_tokens(TEST_TEXT.bytes());
    let table = TansInitTable::with_params(&counts, 0, 1, Some(512)).unwrap();
    let mut encoder = TansEncoder::new(&table);
    let mut stream = BitVec::new();
    encoder.encode(&mut TEST_TEXT.bytes(), &mut stream).unwrap();
    encoder.flush(&mut stream).unwrap();

    let mut decoder = TansDecoder::new(&table);
    let mut reader = BitVecReader::reversed(&stream);
    let mut decoded: Vec<u8> = Vec::new();
    decoder.initialize(&mut reader).unwrap();
    decoder
        .decode_n(TEST_TEXT.len(), &mut reader, &mut decoded)
        .unwrap();
    decoded.reverse();
    assert_eq!(decoded, TEST_TEXT.as_bytes());
}

/// Encoding with the input split at any point and the output capacity split
/// at any point must concatenate to the one-shot stream.
fn assert_resumable<E, F>(make: F, input: &[u8])
where
    E: Encoder<Token = u8>,
    F: Fn() -> E,
{
    let mut reference = BitVec::new();
    let mut encoder = make();
    encoder
        .encode(&mut input.iter().copied(), &mut reference)
        .unwrap();
    while encoder.flush(&mut reference).unwrap() != CoderResult::Done {}

    let mut rng = StdRng::seed_from_u64(0x535);
    for _ in 0..8 {
        let input_split = rng.gen_range(0..=input.len());
        let mut encoder = make();
        let mut stream = BitVec::new();
        let mut first = input[..input_split].iter().copied();
        let mut budget = rng.gen_range(0..=reference.len());
        loop {
            let mut bounded = TakeBits::new(&mut stream, budget);
            match encoder.encode(&mut first, &mut bounded).unwrap() {
                CoderResult::OutputFull => budget = reference.len(),
                CoderResult::InputExhausted => break,
                CoderResult::Done => unreachable!("no token limit was set"),
            }
        }
        let mut second = input[input_split..].iter().copied();
        loop {
            match encoder.encode(&mut second, &mut stream).unwrap() {
                CoderResult::InputExhausted => break,
                CoderResult::OutputFull => unreachable!("stream is unbounded"),
                CoderResult::Done => unreachable!("no token limit was set"),
            }
        }
        while encoder.flush(&mut stream).unwrap() != CoderResult::Done {}
        assert_eq!(stream, reference);
    }
}

#[test]
fn uniform_encoding_is_resumable() {
    let input: Vec<u8> = (0..200).map(|i| (i * 37) as u8).collect();
    assert_resumable(UniformEncoder::<u8>::new, &input);
}

#[test]
fn rice_encoding_is_resumable() {
    let input: Vec<u8> = (0..200).map(|i| (i % 23) as u8).collect();
    assert_resumable(|| RiceEncoder::<u8>::new(2), &input);
}

#[test]
fn huffman_encoding_is_resumable() {
    let input: Vec<u8> = TEST_TEXT.bytes().collect();
    let table = make_huffman_table(&count_tokens(input.iter().copied())).unwrap();
    assert_resumable(move || HuffmanEncoder::new(table.clone()), &input);
}

#[test]
fn tans_encoding_is_resumable() {
    let input: Vec<u8> = TEST_TEXT.bytes().collect();
    let table = TansInitTable::with_params(&count_tokens(input.iter().copied()), 0, 1, Some(256))
        .unwrap();
    assert_resumable(move || TansEncoder::new(&table), &input);
}

#[test]
fn lz77_encoding_is_resumable() {
    init_logging();
    let input: Vec<u8> = TEST_TEXT.bytes().collect();
    assert_resumable(|| Lz77Encoder::<u8, _>::new(128, 8, None).unwrap(), &input);
}

#[test]
fn uniform_decoding_is_resumable() {
    let input: Vec<u8> = (0..100).map(|i| (i * 91) as u8).collect();
    let mut stream = BitVec::new();
    UniformEncoder::<u8>::new()
        .encode(&mut input.iter().copied(), &mut stream)
        .unwrap();

    let mut rng = StdRng::seed_from_u64(0xDEC0DE);
    for _ in 0..8 {
        let mut decoder = UniformDecoder::<u8>::new();
        let mut decoded: Vec<u8> = Vec::new();
        let mut reader = BitVecReader::new(&stream);
        let first_tokens = rng.gen_range(0..=input.len());
        decoder
            .decode_n(first_tokens, &mut reader, &mut decoded)
            .unwrap();
        decoder.decode(&mut reader, &mut decoded).unwrap();
        assert_eq!(decoded, input);
    }
}

/// Replays a fixed token stream into the LZ77 decoder, standing in for an
/// auxiliary decoder mid-composition.
struct TokenReplay {
    tokens: VecDeque<Lz77Token<u8>>,
}

impl Decoder for TokenReplay {
    type Token = Lz77Token<u8>;

    fn initialize<R: BitSource>(&mut self, _input: &mut R) -> Result<CoderResult, Error> {
        Ok(CoderResult::Done)
    }

    fn decode<R, O>(&mut self, _input: &mut R, output: &mut O) -> Result<CoderResult, Error>
    where
        R: BitSource,
        O: TokenSink<Self::Token>,
    {
        while let Some(token) = self.tokens.pop_front() {
            output.push_token(token);
        }
        Ok(CoderResult::InputExhausted)
    }

    fn decode_n<R, O>(
        &mut self,
        n: usize,
        _input: &mut R,
        output: &mut O,
    ) -> Result<CoderResult, Error>
    where
        R: BitSource,
        O: TokenSink<Self::Token>,
    {
        for _ in 0..n {
            let Some(token) = self.tokens.pop_front() else {
                return Ok(CoderResult::InputExhausted);
            };
            output.push_token(token);
        }
        Ok(CoderResult::Done)
    }
}

#[test]
fn lz77_engine_and_window_agree_on_random_data() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(0x4C5A3737);
    for (dict, la) in [(32usize, 4usize), (64, 8), (256, 16), (8, 3)] {
        // skewed alphabet to provoke plenty of matches
        let input: Vec<u8> = (0..800).map(|_| rng.gen_range(b'a'..b'e')).collect();
        let recorder = TokenRecorder { tokens: Vec::new() };
        let mut encoder = Lz77Encoder::with_auxiliary(dict, la, recorder, None).unwrap();
        let mut sink = BitVec::new();
        encoder
            .encode(&mut input.iter().copied(), &mut sink)
            .unwrap();
        encoder.flush(&mut sink).unwrap();
        let tokens = encoder.auxiliary_encoder().tokens.clone();

        let replay = TokenReplay {
            tokens: tokens.into_iter().collect(),
        };
        let mut decoder = Lz77Decoder::with_auxiliary(dict, la, replay, None).unwrap();
        let mut reader = BitReader::new(&[], BitOrder::Lsb0);
        let mut decoded = Vec::new();
        decoder.initialize(&mut reader).unwrap();
        decoder.decode(&mut reader, &mut decoded).unwrap();
        assert_eq!(decoded, input, "dict {} look-ahead {}", dict, la);
    }
}
