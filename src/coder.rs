//! Uniform contract shared by every coder in this crate.
//!
//! Encoders pull tokens from an iterator and push bits into a `BitSink`;
//! decoders pull bits from a `BitSource` and push tokens into a `TokenSink`.
//! Sinks may refuse data (bounded capacity) and sources may run dry, in which
//! case the coder parks its partial state internally and reports why it
//! stopped through `CoderResult`. Calling the same operation again on the
//! continued ranges behaves as if the two calls had been one.

use crate::Error;

/// Why a coder stopped.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CoderResult {
    /// The requested amount of work is complete.
    Done,
    /// The input range ran dry; resume with more input.
    InputExhausted,
    /// The output range refused more data; resume with more capacity.
    OutputFull,
}

/// Receives single bits. Returns `false` when the sink is out of capacity,
/// in which case the bit was *not* stored.
pub trait BitSink {
    fn push_bit(&mut self, bit: bool) -> bool;
}

/// Yields single bits until the underlying range is exhausted.
pub trait BitSource {
    fn next_bit(&mut self) -> Option<bool>;
}

/// Receives decoded tokens. Returns `false` when out of capacity.
pub trait TokenSink<T> {
    fn push_token(&mut self, token: T) -> bool;
}

impl<T> TokenSink<T> for Vec<T> {
    fn push_token(&mut self, token: T) -> bool {
        self.push(token);
        true
    }
}

/// Token sink that accepts at most `limit` tokens before refusing.
pub struct TakeTokens<'a, T> {
    target: &'a mut Vec<T>,
    limit: usize,
}

impl<'a, T> TakeTokens<'a, T> {
    pub fn new(target: &'a mut Vec<T>, limit: usize) -> Self {
        Self { target, limit }
    }
    pub fn remaining(&self) -> usize {
        self.limit
    }
}

impl<T> TokenSink<T> for TakeTokens<'_, T> {
    fn push_token(&mut self, token: T) -> bool {
        if self.limit == 0 {
            return false;
        }
        self.limit -= 1;
        self.target.push(token);
        true
    }
}

/// An encoder turns a token stream into a bit stream.
///
/// `flush` drains bits the coder still holds internally; byte alignment of
/// the final partial byte is the concern of the bit sink (`BitWriter::flush`).
pub trait Encoder {
    type Token;

    /// Whether emitted bits depend on a running internal state that cannot
    /// be sliced per token (tANS). Asymmetric and symmetric coders cannot be
    /// mixed inside a composite coder.
    const ASYMMETRICAL: bool = false;

    /// Consume as much of `input` as possible, emitting into `output`.
    fn encode<I, S>(&mut self, input: &mut I, output: &mut S) -> Result<CoderResult, Error>
    where
        I: Iterator<Item = Self::Token>,
        S: BitSink;

    /// Bounded variant: stop after `n` tokens have been consumed.
    fn encode_n<I, S>(
        &mut self,
        n: usize,
        input: &mut I,
        output: &mut S,
    ) -> Result<CoderResult, Error>
    where
        I: Iterator<Item = Self::Token>,
        S: BitSink;

    /// Emit any internally buffered bits. A no-op when nothing is pending.
    fn flush<S: BitSink>(&mut self, output: &mut S) -> Result<CoderResult, Error>;

    /// Exact or expected number of bits `token` would occupy in the output.
    fn token_bit_size(&self, token: &Self::Token) -> f32;
}

/// A decoder turns a bit stream back into a token stream.
pub trait Decoder {
    type Token;

    /// See [`Encoder::ASYMMETRICAL`].
    const ASYMMETRICAL: bool = false;

    /// Consume any preamble the coder needs before decoding proper.
    fn initialize<R: BitSource>(&mut self, input: &mut R) -> Result<CoderResult, Error>;

    /// Decode until the input runs dry or the output refuses tokens.
    fn decode<R, O>(&mut self, input: &mut R, output: &mut O) -> Result<CoderResult, Error>
    where
        R: BitSource,
        O: TokenSink<Self::Token>;

    /// Bounded variant: stop after `n` tokens have been produced.
    fn decode_n<R, O>(
        &mut self,
        n: usize,
        input: &mut R,
        output: &mut O,
    ) -> Result<CoderResult, Error>
    where
        R: BitSource,
        O: TokenSink<Self::Token>;
}

// *************** TESTS *****************

#[test]
fn take_tokens_refuses_past_limit() {
    let mut out: Vec<u8> = Vec::new();
    let mut sink = TakeTokens::new(&mut out, 2);
    assert!(sink.push_token(1));
    assert!(sink.push_token(2));
    assert!(!sink.push_token(3));
    assert_eq!(out, vec![1, 2]);
}
