//! LZ77 sliding-window engine.
//!
//! The encoder keeps the dictionary and look-ahead fused in one cyclic
//! window and indexes every look-ahead-sized string of the dictionary in a
//! search tree. Each step queries the tree with the look-ahead and emits one
//! intermediate token: a literal `(symbol, 0, 0)` or a match
//! `(suffix, position, length)` meaning "copy `length` symbols starting
//! `position` after the oldest dictionary symbol, then append `suffix`".
//! Intermediate tokens flow through an auxiliary coder; by default the
//! field-splitting coder backed by fixed-width leaves, but any coder over
//! `Lz77Token` composes (a Huffman or tANS token coder, or a splitter mixing
//! leaf coders per field).

use crate::coder::{BitSink, BitSource, CoderResult, Decoder, Encoder, TokenSink};
use crate::tools::search_tree::SearchTree;
use crate::tools::window::FusedWindow;
use crate::uniform::{UniformDecoder, UniformEncoder};
use crate::Error;
use num_traits::PrimInt;

/// One step of an LZ77 stream. Ordering and equality are lexicographic over
/// `(suffix, position, length)`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Lz77Token<T> {
    pub suffix: T,
    pub position: u32,
    pub length: u16,
}

impl<T> Lz77Token<T> {
    pub fn new(suffix: T, position: u32, length: u16) -> Self {
        Self {
            suffix,
            position,
            length,
        }
    }

    pub fn literal(suffix: T) -> Self {
        Self {
            suffix,
            position: 0,
            length: 0,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.length == 0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Field {
    Suffix,
    Position,
    Length,
}

/// Encodes intermediate tokens by routing each field through its own
/// sub-coder. All three must agree on symmetry; a stateful (asymmetric)
/// field coder cannot be sliced against stateless neighbours.
pub struct TokenSplitEncoder<ES: Encoder, EP, EL> {
    suffix_encoder: ES,
    position_encoder: EP,
    length_encoder: EL,
    pending: Option<(Lz77Token<ES::Token>, Field, bool)>,
}

impl<ES, EP, EL> TokenSplitEncoder<ES, EP, EL>
where
    ES: Encoder,
    ES::Token: Copy,
    EP: Encoder<Token = u32>,
    EL: Encoder<Token = u16>,
{
    pub fn new(
        suffix_encoder: ES,
        position_encoder: EP,
        length_encoder: EL,
    ) -> Result<Self, Error> {
        if ES::ASYMMETRICAL != EP::ASYMMETRICAL || EP::ASYMMETRICAL != EL::ASYMMETRICAL {
            return Err(Error::IncompatibleCoders);
        }
        Ok(Self {
            suffix_encoder,
            position_encoder,
            length_encoder,
            pending: None,
        })
    }

    /// Push the parked token through its remaining fields.
    fn advance<S: BitSink>(&mut self, output: &mut S) -> Result<CoderResult, Error> {
        let Some((token, mut field, mut in_flight)) = self.pending.take() else {
            return Ok(CoderResult::Done);
        };
        loop {
            let result = match (field, in_flight) {
                (Field::Suffix, false) => {
                    self.suffix_encoder
                        .encode_n(1, &mut std::iter::once(token.suffix), output)?
                }
                (Field::Suffix, true) => {
                    self.suffix_encoder
                        .encode_n(0, &mut std::iter::empty(), output)?
                }
                (Field::Position, false) => {
                    self.position_encoder
                        .encode_n(1, &mut std::iter::once(token.position), output)?
                }
                (Field::Position, true) => {
                    self.position_encoder
                        .encode_n(0, &mut std::iter::empty(), output)?
                }
                (Field::Length, false) => {
                    self.length_encoder
                        .encode_n(1, &mut std::iter::once(token.length), output)?
                }
                (Field::Length, true) => {
                    self.length_encoder
                        .encode_n(0, &mut std::iter::empty(), output)?
                }
            };
            if result == CoderResult::OutputFull {
                self.pending = Some((token, field, true));
                return Ok(CoderResult::OutputFull);
            }
            in_flight = false;
            field = match field {
                Field::Suffix => Field::Position,
                Field::Position => Field::Length,
                Field::Length => return Ok(CoderResult::Done),
            };
        }
    }

    fn encode_limit<I, S>(
        &mut self,
        limit: Option<usize>,
        input: &mut I,
        output: &mut S,
    ) -> Result<CoderResult, Error>
    where
        I: Iterator<Item = Lz77Token<ES::Token>>,
        S: BitSink,
    {
        if self.advance(output)? == CoderResult::OutputFull {
            return Ok(CoderResult::OutputFull);
        }
        let mut taken = 0;
        while limit.map_or(true, |n| taken < n) {
            let Some(token) = input.next() else {
                return Ok(CoderResult::InputExhausted);
            };
            taken += 1;
            self.pending = Some((token, Field::Suffix, false));
            if self.advance(output)? == CoderResult::OutputFull {
                return Ok(CoderResult::OutputFull);
            }
        }
        Ok(CoderResult::Done)
    }
}

impl<ES, EP, EL> Encoder for TokenSplitEncoder<ES, EP, EL>
where
    ES: Encoder,
    ES::Token: Copy,
    EP: Encoder<Token = u32>,
    EL: Encoder<Token = u16>,
{
    type Token = Lz77Token<ES::Token>;

    const ASYMMETRICAL: bool = ES::ASYMMETRICAL;

    fn encode<I, S>(&mut self, input: &mut I, output: &mut S) -> Result<CoderResult, Error>
    where
        I: Iterator<Item = Self::Token>,
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
        I: Iterator<Item = Self::Token>,
        S: BitSink,
    {
        self.encode_limit(Some(n), input, output)
    }

    fn flush<S: BitSink>(&mut self, output: &mut S) -> Result<CoderResult, Error> {
        if self.advance(output)? == CoderResult::OutputFull {
            return Ok(CoderResult::OutputFull);
        }
        if self.suffix_encoder.flush(output)? == CoderResult::OutputFull {
            return Ok(CoderResult::OutputFull);
        }
        if self.position_encoder.flush(output)? == CoderResult::OutputFull {
            return Ok(CoderResult::OutputFull);
        }
        self.length_encoder.flush(output)
    }

    fn token_bit_size(&self, token: &Self::Token) -> f32 {
        self.suffix_encoder.token_bit_size(&token.suffix)
            + self.position_encoder.token_bit_size(&token.position)
            + self.length_encoder.token_bit_size(&token.length)
    }
}

/// Decoding counterpart of [`TokenSplitEncoder`]. Symmetric compositions
/// assemble fields in stream order; asymmetric ones see the stream reversed
/// and therefore read the fields back to front.
pub struct TokenSplitDecoder<DS: Decoder, DP, DL> {
    suffix_decoder: DS,
    position_decoder: DP,
    length_decoder: DL,
    field: Field,
    suffix: Option<DS::Token>,
    position: Option<u32>,
    length: Option<u16>,
    ready: Option<Lz77Token<DS::Token>>,
}

impl<DS, DP, DL> TokenSplitDecoder<DS, DP, DL>
where
    DS: Decoder,
    DS::Token: Copy,
    DP: Decoder<Token = u32>,
    DL: Decoder<Token = u16>,
{
    pub fn new(
        suffix_decoder: DS,
        position_decoder: DP,
        length_decoder: DL,
    ) -> Result<Self, Error> {
        if DS::ASYMMETRICAL != DP::ASYMMETRICAL || DP::ASYMMETRICAL != DL::ASYMMETRICAL {
            return Err(Error::IncompatibleCoders);
        }
        Ok(Self {
            suffix_decoder,
            position_decoder,
            length_decoder,
            field: Self::first_field(),
            suffix: None,
            position: None,
            length: None,
            ready: None,
        })
    }

    fn first_field() -> Field {
        match DS::ASYMMETRICAL {
            true => Field::Length,
            false => Field::Suffix,
        }
    }

    fn next_field(field: Field) -> Option<Field> {
        match (DS::ASYMMETRICAL, field) {
            (false, Field::Suffix) => Some(Field::Position),
            (false, Field::Position) => Some(Field::Length),
            (false, Field::Length) => None,
            (true, Field::Length) => Some(Field::Position),
            (true, Field::Position) => Some(Field::Suffix),
            (true, Field::Suffix) => None,
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
        O: TokenSink<Lz77Token<DS::Token>>,
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
            let done = match self.field {
                Field::Suffix => {
                    let mut value = Vec::with_capacity(1);
                    let result = self.suffix_decoder.decode_n(1, input, &mut value)?;
                    if let Some(&suffix) = value.first() {
                        self.suffix = Some(suffix);
                    }
                    result == CoderResult::Done
                }
                Field::Position => {
                    let mut value = Vec::with_capacity(1);
                    let result = self.position_decoder.decode_n(1, input, &mut value)?;
                    if let Some(&position) = value.first() {
                        self.position = Some(position);
                    }
                    result == CoderResult::Done
                }
                Field::Length => {
                    let mut value = Vec::with_capacity(1);
                    let result = self.length_decoder.decode_n(1, input, &mut value)?;
                    if let Some(&length) = value.first() {
                        self.length = Some(length);
                    }
                    result == CoderResult::Done
                }
            };
            if !done {
                return Ok(CoderResult::InputExhausted);
            }
            match Self::next_field(self.field) {
                Some(next) => self.field = next,
                None => {
                    self.ready = Some(Lz77Token {
                        suffix: self.suffix.take().ok_or(Error::MalformedInput)?,
                        position: self.position.take().ok_or(Error::MalformedInput)?,
                        length: self.length.take().ok_or(Error::MalformedInput)?,
                    });
                    self.field = Self::first_field();
                }
            }
        }
    }
}

impl<DS, DP, DL> Decoder for TokenSplitDecoder<DS, DP, DL>
where
    DS: Decoder,
    DS::Token: Copy,
    DP: Decoder<Token = u32>,
    DL: Decoder<Token = u16>,
{
    type Token = Lz77Token<DS::Token>;

    const ASYMMETRICAL: bool = DS::ASYMMETRICAL;

    fn initialize<R: BitSource>(&mut self, input: &mut R) -> Result<CoderResult, Error> {
        if self.suffix_decoder.initialize(input)? != CoderResult::Done {
            return Ok(CoderResult::InputExhausted);
        }
        if self.position_decoder.initialize(input)? != CoderResult::Done {
            return Ok(CoderResult::InputExhausted);
        }
        if self.length_decoder.initialize(input)? != CoderResult::Done {
            return Ok(CoderResult::InputExhausted);
        }
        Ok(CoderResult::Done)
    }

    fn decode<R, O>(&mut self, input: &mut R, output: &mut O) -> Result<CoderResult, Error>
    where
        R: BitSource,
        O: TokenSink<Self::Token>,
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
        O: TokenSink<Self::Token>,
    {
        self.decode_limit(Some(n), input, output)
    }
}

/// Default auxiliary coders: every field at its fixed native width.
pub type UniformSplitEncoder<T> =
    TokenSplitEncoder<UniformEncoder<T>, UniformEncoder<u32>, UniformEncoder<u16>>;
pub type UniformSplitDecoder<T> =
    TokenSplitDecoder<UniformDecoder<T>, UniformDecoder<u32>, UniformDecoder<u16>>;

pub struct Lz77Encoder<T: PrimInt, E: Encoder<Token = Lz77Token<T>>> {
    dictionary_size: usize,
    look_ahead_size: usize,
    cyclic_size: Option<usize>,
    window: Option<FusedWindow<T>>,
    /// Input symbols collected while the look-ahead is still priming.
    staging: Vec<T>,
    tree: SearchTree,
    /// Shifts still owed from the last emitted token.
    pending_shifts: usize,
    /// Token the auxiliary coder refused to accept, re-offered first.
    queued: Option<Lz77Token<T>>,
    auxiliary_encoder: E,
}

impl<T: PrimInt> Lz77Encoder<T, UniformSplitEncoder<T>> {
    pub fn new(
        dictionary_size: usize,
        look_ahead_size: usize,
        cyclic_size: Option<usize>,
    ) -> Result<Self, Error> {
        let auxiliary = TokenSplitEncoder::new(
            UniformEncoder::new(),
            UniformEncoder::new(),
            UniformEncoder::new(),
        )
        .expect("fixed-width coders are symmetric");
        Self::with_auxiliary(dictionary_size, look_ahead_size, auxiliary, cyclic_size)
    }
}

impl<T: PrimInt, E: Encoder<Token = Lz77Token<T>>> Lz77Encoder<T, E> {
    pub fn with_auxiliary(
        dictionary_size: usize,
        look_ahead_size: usize,
        auxiliary_encoder: E,
        cyclic_size: Option<usize>,
    ) -> Result<Self, Error> {
        debug_assert!(look_ahead_size >= 1);
        debug_assert!(
            dictionary_size >= look_ahead_size,
            "a dictionary shorter than the look-ahead cannot index every string"
        );
        if let Some(requested) = cyclic_size {
            let floor = dictionary_size + 2 * look_ahead_size;
            if requested < floor {
                return Err(Error::InvalidCyclicBufferSize {
                    expected: floor,
                    got: requested,
                });
            }
        }
        Ok(Self {
            dictionary_size,
            look_ahead_size,
            cyclic_size,
            window: None,
            staging: Vec::with_capacity(look_ahead_size),
            tree: SearchTree::new(look_ahead_size),
            pending_shifts: 0,
            queued: None,
            auxiliary_encoder,
        })
    }

    pub fn auxiliary_encoder(&self) -> &E {
        &self.auxiliary_encoder
    }

    fn offer<S: BitSink>(
        &mut self,
        token: Lz77Token<T>,
        output: &mut S,
    ) -> Result<CoderResult, Error> {
        let mut once = std::iter::once(token);
        let result = self.auxiliary_encoder.encode_n(1, &mut once, output)?;
        if once.next().is_some() {
            // refused before consuming, try again next call
            self.queued = Some(token);
        }
        Ok(result)
    }

    fn reoffer_queued<S: BitSink>(&mut self, output: &mut S) -> Result<CoderResult, Error> {
        if let Some(token) = self.queued.take() {
            if self.offer(token, output)? == CoderResult::OutputFull {
                return Ok(CoderResult::OutputFull);
            }
        }
        Ok(CoderResult::Done)
    }

    /// Pick the token for the current look-ahead. `pulled` carries the
    /// just-read input symbol, which becomes the suffix when the whole
    /// look-ahead matched.
    fn choose_token(&self, pulled: Option<T>) -> Lz77Token<T> {
        let window = self.window.as_ref().expect("window initialized");
        let buffer = window.buffer();
        let matched = self.tree.find_match(window, buffer);
        let capped = match pulled {
            Some(_) => matched.length,
            None => matched.length.min(buffer.len() - 1),
        };
        if capped == 0 {
            return Lz77Token::literal(buffer[0]);
        }
        let suffix = if capped == buffer.len() {
            pulled.expect("full-buffer matches only occur mid-stream")
        } else {
            buffer[capped]
        };
        Lz77Token::new(suffix, matched.position as u32, capped as u16)
    }

    /// Slide the window by one symbol, keeping the tree in step.
    fn shift(&mut self, pulled: Option<T>) {
        let window = self.window.as_mut().expect("window initialized");
        if window.full() {
            let content = window.oldest_dictionary_full_match();
            if content.len() == self.tree.string_size()
                && self.tree.remove_string(window, content).is_err()
            {
                // the youngest strings never made it into the tree
                log::trace!("aged-out string was never indexed");
            }
        }
        match pulled {
            Some(symbol) => {
                window.add_symbol(symbol);
            }
            None => {
                window.add_end_symbol();
            }
        }
        self.pending_shifts = self.pending_shifts.saturating_sub(1);
    }

    fn consumed(&self) -> usize {
        match &self.window {
            Some(window) => window.start_position() + window.dictionary_size(),
            None => 0,
        }
    }

    fn prime_window(&mut self) -> Result<(), Error> {
        log::debug!("look-ahead primed with {} symbols", self.staging.len());
        self.window = Some(FusedWindow::with_fill(
            self.dictionary_size,
            &self.staging,
            self.cyclic_size,
        )?);
        self.staging.clear();
        Ok(())
    }
}

impl<T: PrimInt, E: Encoder<Token = Lz77Token<T>>> Encoder for Lz77Encoder<T, E> {
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

    /// Drain the remaining look-ahead. Matches shorten near the end so the
    /// suffix always exists, and no new strings are indexed.
    fn flush<S: BitSink>(&mut self, output: &mut S) -> Result<CoderResult, Error> {
        if self.reoffer_queued(output)? == CoderResult::OutputFull {
            return Ok(CoderResult::OutputFull);
        }
        if self.window.is_none() && !self.staging.is_empty() {
            // input shorter than one look-ahead
            self.prime_window()?;
        }
        if self.window.is_some() {
            loop {
                while self.pending_shifts > 0
                    && self.window.as_ref().expect("window initialized").buffer_size() > 0
                {
                    self.shift(None);
                }
                let window = self.window.as_ref().expect("window initialized");
                if window.buffer_size() == 0 {
                    break;
                }
                let token = self.choose_token(None);
                log::trace!(
                    "draining match at {} length {}",
                    token.position,
                    token.length
                );
                self.pending_shifts = token.length as usize + 1;
                if self.offer(token, output)? == CoderResult::OutputFull {
                    return Ok(CoderResult::OutputFull);
                }
            }
        }
        self.auxiliary_encoder.flush(output)
    }

    fn token_bit_size(&self, token: &T) -> f32 {
        self.auxiliary_encoder
            .token_bit_size(&Lz77Token::literal(*token))
    }
}

impl<T: PrimInt, E: Encoder<Token = Lz77Token<T>>> Lz77Encoder<T, E> {
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
        if self.reoffer_queued(output)? == CoderResult::OutputFull {
            return Ok(CoderResult::OutputFull);
        }
        let mut taken = 0;
        if self.window.is_none() {
            while self.staging.len() < self.look_ahead_size {
                if limit.map_or(false, |n| taken >= n) {
                    return Ok(CoderResult::Done);
                }
                let Some(symbol) = input.next() else {
                    return Ok(CoderResult::InputExhausted);
                };
                self.staging.push(symbol);
                taken += 1;
            }
            self.prime_window()?;
        }
        while limit.map_or(true, |n| taken < n) {
            let Some(symbol) = input.next() else {
                return Ok(CoderResult::InputExhausted);
            };
            taken += 1;
            // index the string that finished loading one pull ago
            let consumed = self.consumed();
            let window = self.window.as_ref().expect("window initialized");
            if consumed >= 1 && window.buffer_size() == self.look_ahead_size {
                self.tree.add_string(window, consumed - 1);
            }
            let mut result = CoderResult::Done;
            if self.pending_shifts == 0 {
                let token = self.choose_token(Some(symbol));
                log::trace!(
                    "emitting match at {} length {}",
                    token.position,
                    token.length
                );
                self.pending_shifts = token.length as usize + 1;
                result = self.offer(token, output)?;
            }
            self.shift(Some(symbol));
            if result == CoderResult::OutputFull {
                return Ok(CoderResult::OutputFull);
            }
        }
        Ok(CoderResult::Done)
    }
}

/// Mid-token state of the decoder: the part of a match (and its suffix)
/// that did not fit the output on the previous call.
struct CachedSequence<T> {
    position: usize,
    length: usize,
    suffix: T,
}

pub struct Lz77Decoder<T: PrimInt, D: Decoder<Token = Lz77Token<T>>> {
    window: FusedWindow<T>,
    cached: Option<CachedSequence<T>>,
    auxiliary_decoder: D,
}

impl<T: PrimInt> Lz77Decoder<T, UniformSplitDecoder<T>> {
    pub fn new(
        dictionary_size: usize,
        look_ahead_size: usize,
        cyclic_size: Option<usize>,
    ) -> Result<Self, Error> {
        let auxiliary = TokenSplitDecoder::new(
            UniformDecoder::new(),
            UniformDecoder::new(),
            UniformDecoder::new(),
        )
        .expect("fixed-width coders are symmetric");
        Self::with_auxiliary(dictionary_size, look_ahead_size, auxiliary, cyclic_size)
    }
}

impl<T: PrimInt, D: Decoder<Token = Lz77Token<T>>> Lz77Decoder<T, D> {
    pub fn with_auxiliary(
        dictionary_size: usize,
        look_ahead_size: usize,
        auxiliary_decoder: D,
        cyclic_size: Option<usize>,
    ) -> Result<Self, Error> {
        Ok(Self {
            window: FusedWindow::new(dictionary_size, look_ahead_size, cyclic_size)?,
            cached: None,
            auxiliary_decoder,
        })
    }

    pub fn auxiliary_decoder(&self) -> &D {
        &self.auxiliary_decoder
    }

    /// Emit from the cached sequence until it is spent or the output fills.
    /// Matches unfold one symbol at a time so a run may read symbols it has
    /// just produced.
    fn drain_cached<O>(
        &mut self,
        limit: Option<usize>,
        produced: &mut usize,
        output: &mut O,
    ) -> Result<CoderResult, Error>
    where
        O: TokenSink<T>,
    {
        let Some(mut cached) = self.cached.take() else {
            return Ok(CoderResult::Done);
        };
        while cached.length > 0 {
            if limit.map_or(false, |n| *produced >= n) {
                self.cached = Some(cached);
                return Ok(CoderResult::Done);
            }
            let start = self.window.start_position();
            if cached.position < start || cached.position >= start + self.window.dictionary_size()
            {
                return Err(Error::MalformedInput);
            }
            let symbol = self.window.sequence_at(cached.position - start, 1)[0];
            if !output.push_token(symbol) {
                self.cached = Some(cached);
                return Ok(CoderResult::OutputFull);
            }
            *produced += 1;
            self.window.add_symbol(symbol);
            cached.position += 1;
            cached.length -= 1;
        }
        if limit.map_or(false, |n| *produced >= n) {
            self.cached = Some(cached);
            return Ok(CoderResult::Done);
        }
        if !output.push_token(cached.suffix) {
            self.cached = Some(cached);
            return Ok(CoderResult::OutputFull);
        }
        *produced += 1;
        self.window.add_symbol(cached.suffix);
        Ok(CoderResult::Done)
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
            match self.drain_cached(limit, &mut produced, output)? {
                CoderResult::Done => {}
                suspended => return Ok(suspended),
            }
            if limit.map_or(false, |n| produced >= n) {
                return Ok(CoderResult::Done);
            }
            let mut tokens = Vec::with_capacity(1);
            if self.auxiliary_decoder.decode_n(1, input, &mut tokens)? != CoderResult::Done {
                return Ok(CoderResult::InputExhausted);
            }
            let token = tokens[0];
            log::trace!(
                "reconstructing match at {} length {}",
                token.position,
                token.length
            );
            self.cached = Some(CachedSequence {
                position: self.window.start_position() + token.position as usize,
                length: token.length as usize,
                suffix: token.suffix,
            });
        }
    }
}

impl<T: PrimInt, D: Decoder<Token = Lz77Token<T>>> Decoder for Lz77Decoder<T, D> {
    type Token = T;

    fn initialize<R: BitSource>(&mut self, input: &mut R) -> Result<CoderResult, Error> {
        self.auxiliary_decoder.initialize(input)
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
use bit_vec::BitVec;

#[cfg(test)]
struct CollectingAux<T> {
    tokens: Vec<Lz77Token<T>>,
}

#[cfg(test)]
impl<T: Copy> Encoder for CollectingAux<T> {
    type Token = Lz77Token<T>;

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
        unreachable!("the engine does not size tokens");
    }
}

#[cfg(test)]
struct ReplayAux<T> {
    tokens: std::collections::VecDeque<Lz77Token<T>>,
}

#[cfg(test)]
impl<T: Copy> Decoder for ReplayAux<T> {
    type Token = Lz77Token<T>;

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

#[cfg(test)]
fn collect_tokens(
    input: &[u8],
    dictionary_size: usize,
    look_ahead_size: usize,
) -> Vec<Lz77Token<u8>> {
    let mut encoder = Lz77Encoder::with_auxiliary(
        dictionary_size,
        look_ahead_size,
        CollectingAux { tokens: Vec::new() },
        None,
    )
    .unwrap();
    let mut stream = BitVec::new();
    encoder
        .encode(&mut input.iter().copied(), &mut stream)
        .unwrap();
    encoder.flush(&mut stream).unwrap();
    assert!(stream.is_empty());
    encoder.auxiliary_encoder().tokens.clone()
}

#[cfg(test)]
fn replay_tokens(
    tokens: &[(u8, u32, u16)],
    dictionary_size: usize,
    look_ahead_size: usize,
) -> Vec<u8> {
    let replay = ReplayAux {
        tokens: tokens
            .iter()
            .map(|&(suffix, position, length)| Lz77Token::new(suffix, position, length))
            .collect(),
    };
    let mut decoder =
        Lz77Decoder::with_auxiliary(dictionary_size, look_ahead_size, replay, None).unwrap();
    let mut reader = crate::bits::BitReader::new(&[1], crate::BitOrder::Lsb0);
    let mut output = Vec::new();
    decoder.decode(&mut reader, &mut output).unwrap();
    output
}

#[cfg(test)]
fn tokens_of(list: &[(u8, u32, u16)]) -> Vec<Lz77Token<u8>> {
    list.iter()
        .map(|&(suffix, position, length)| Lz77Token::new(suffix, position, length))
        .collect()
}

#[test]
fn encode_tokens() {
    let tokens = collect_tokens(b"ala ma kota a kot ma ale", 1024, 4);
    let expected = tokens_of(&[
        (b'a', 0, 0), // 'a'
        (b'l', 0, 0), // 'l'
        (b' ', 0, 1), // 'a '
        (b'm', 0, 0), // 'm'
        (b'k', 2, 2), // 'a k'
        (b'o', 0, 0), // 'o'
        (b't', 0, 0), // 't'
        (b'a', 5, 2), // 'a a'
        (b' ', 6, 4), // ' kot '
        (b'a', 4, 3), // 'ma a'
        (b'e', 1, 1), // 'le'
    ]);
    assert_eq!(tokens, expected);
}

#[test]
fn encode_more_tokens() {
    let tokens = collect_tokens(b"std::nullptr_t & nullptr", 1024, 7);
    let expected = tokens_of(&[
        (b's', 0, 0),  // 's'
        (b't', 0, 0),  // 't'
        (b'd', 0, 0),  // 'd'
        (b':', 0, 0),  // ':'
        (b'n', 3, 1),  // ':n'
        (b'u', 0, 0),  // 'u'
        (b'l', 0, 0),  // 'l'
        (b'p', 7, 1),  // 'lp'
        (b'r', 1, 1),  // 'tr'
        (b'_', 0, 0),  // '_'
        (b' ', 10, 1), // 't '
        (b'&', 0, 0),  // '&'
        (b'n', 14, 1), // ' n'
        (b'r', 6, 5),  // 'ullptr'
    ]);
    assert_eq!(tokens, expected);
}

#[test]
fn encode_token_repetitions() {
    let tokens = collect_tokens(b"kot kot kot kot kot kot kot", 1024, 3);
    let expected = tokens_of(&[
        (b'k', 0, 0),
        (b'o', 0, 0),
        (b't', 0, 0),
        (b' ', 0, 0),
        (b' ', 0, 3),
        (b' ', 4, 3),
        (b' ', 8, 3),
        (b' ', 12, 3),
        (b' ', 16, 3),
        (b't', 20, 2),
    ]);
    assert_eq!(tokens, expected);
}

#[test]
fn encode_with_short_dictionary() {
    let tokens = collect_tokens(b"kot abcdefghijkelmouprst kot", 8, 3);
    let expected = tokens_of(&[
        (b'k', 0, 0),
        (b'o', 0, 0),
        (b't', 0, 0),
        (b' ', 0, 0),
        (b'a', 0, 0),
        (b'b', 0, 0),
        (b'c', 0, 0),
        (b'd', 0, 0),
        (b'e', 0, 0),
        (b'f', 0, 0),
        (b'g', 0, 0),
        (b'h', 0, 0),
        (b'i', 0, 0),
        (b'j', 0, 0),
        (b'k', 0, 0),
        (b'l', 1, 1), // 'el'
        (b'm', 0, 0),
        (b'o', 0, 0),
        (b'u', 0, 0),
        (b'p', 0, 0),
        (b'r', 0, 0),
        (b's', 0, 0),
        (b't', 0, 0),
        (b' ', 0, 0),
        (b'k', 0, 0),
        (b't', 0, 1), // 'ot'
    ]);
    assert_eq!(tokens, expected);
}

#[test]
fn encode_repeating_sequence() {
    let tokens = collect_tokens(b"aaaaaaa", 8, 3);
    let expected = tokens_of(&[(b'a', 0, 0), (b'a', 0, 3), (b'a', 2, 1)]);
    assert_eq!(tokens, expected);
}

#[test]
fn decode_tokens() {
    let output = replay_tokens(
        &[
            (b'a', 0, 0),
            (b'l', 0, 0),
            (b' ', 0, 1),
            (b'm', 0, 0),
            (b'k', 2, 2),
            (b'o', 0, 0),
            (b't', 0, 0),
            (b'a', 5, 2),
            (b' ', 6, 4),
            (b'a', 4, 3),
            (b'e', 1, 1),
        ],
        1024,
        4,
    );
    assert_eq!(output, b"ala ma kota a kot ma ale");
}

#[test]
fn decode_more_tokens() {
    let output = replay_tokens(
        &[
            (b's', 0, 0),
            (b't', 0, 0),
            (b'd', 0, 0),
            (b':', 0, 0),
            (b'n', 3, 1),
            (b'u', 0, 0),
            (b'l', 0, 0),
            (b'p', 7, 1),
            (b'r', 1, 1),
            (b'_', 0, 0),
            (b' ', 10, 1),
            (b'&', 0, 0),
            (b'n', 14, 1),
            (b'r', 6, 5),
        ],
        1024,
        7,
    );
    assert_eq!(output, b"std::nullptr_t & nullptr");
}

#[test]
fn decode_self_referential_runs() {
    let output = replay_tokens(
        &[
            (b'k', 0, 0),
            (b'o', 0, 0),
            (b't', 0, 0),
            (b' ', 0, 0),
            (b' ', 0, 3),
            (b' ', 4, 3),
            (b' ', 8, 3),
            (b' ', 12, 3),
            (b' ', 16, 3),
            (b't', 20, 2),
        ],
        1024,
        3,
    );
    assert_eq!(output, b"kot kot kot kot kot kot kot");
}

#[test]
fn splitter_rejects_mixed_symmetry() {
    let counts = crate::count_tokens([1u8, 1, 2, 2].into_iter());
    let table = crate::tans::TansInitTable::new(&counts).unwrap();
    let result = TokenSplitEncoder::new(
        crate::tans::TansEncoder::new(&table),
        UniformEncoder::<u32>::new(),
        UniformEncoder::<u16>::new(),
    );
    assert!(matches!(result, Err(Error::IncompatibleCoders)));
}

#[test]
fn splitter_round_trips_field_streams() {
    let tokens = tokens_of(&[(b'x', 0, 0), (b'y', 3, 2), (b'z', 70000, 9)]);
    let mut encoder: UniformSplitEncoder<u8> = TokenSplitEncoder::new(
        UniformEncoder::new(),
        UniformEncoder::new(),
        UniformEncoder::new(),
    )
    .unwrap();
    let mut stream = BitVec::new();
    encoder
        .encode(&mut tokens.iter().copied(), &mut stream)
        .unwrap();
    encoder.flush(&mut stream).unwrap();
    // one full-width field set per token
    assert_eq!(stream.len(), tokens.len() * (8 + 32 + 16));

    let mut decoder: UniformSplitDecoder<u8> = TokenSplitDecoder::new(
        UniformDecoder::new(),
        UniformDecoder::new(),
        UniformDecoder::new(),
    )
    .unwrap();
    let mut reader = crate::bits::BitVecReader::new(&stream);
    let mut result = Vec::new();
    decoder.initialize(&mut reader).unwrap();
    decoder.decode(&mut reader, &mut result).unwrap();
    assert_eq!(result, tokens);
}

#[test]
fn default_pipeline_round_trips() {
    let text = b"a man a plan a canal panama, a man a plan a canal panama";
    let mut encoder = Lz77Encoder::<u8, _>::new(64, 8, None).unwrap();
    let mut stream = BitVec::new();
    encoder
        .encode(&mut text.iter().copied(), &mut stream)
        .unwrap();
    encoder.flush(&mut stream).unwrap();

    let mut decoder = Lz77Decoder::<u8, _>::new(64, 8, None).unwrap();
    let mut reader = crate::bits::BitVecReader::new(&stream);
    let mut output = Vec::new();
    decoder.initialize(&mut reader).unwrap();
    decoder.decode_n(text.len(), &mut reader, &mut output).unwrap();
    assert_eq!(output, text);
}

#[test]
fn bounded_output_decoding_resumes_mid_match() {
    use crate::coder::TakeTokens;
    let tokens = [
        (b'k', 0, 0),
        (b'o', 0, 0),
        (b't', 0, 0),
        (b' ', 0, 0),
        (b' ', 0, 3),
        (b' ', 4, 3),
    ];
    let replay = ReplayAux {
        tokens: tokens
            .iter()
            .map(|&(s, p, l)| Lz77Token::new(s, p, l))
            .collect(),
    };
    let mut decoder = Lz77Decoder::with_auxiliary(1024, 3, replay, None).unwrap();
    let mut reader = crate::bits::BitReader::new(&[1], crate::BitOrder::Lsb0);
    let mut output = Vec::new();
    loop {
        let mut bounded = TakeTokens::new(&mut output, 2);
        match decoder.decode(&mut reader, &mut bounded).unwrap() {
            CoderResult::OutputFull => continue,
            _ => break,
        }
    }
    assert_eq!(output, b"kot kot kot ");
}

#[test]
fn undersized_cyclic_buffer_is_rejected_up_front() {
    let result = Lz77Encoder::<u8, _>::new(32, 4, Some(10));
    assert!(matches!(
        result,
        Err(Error::InvalidCyclicBufferSize { .. })
    ));
}
