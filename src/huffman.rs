//! Canonical Huffman coding.
//!
//! `make_huffman_table` runs the greedy two-smallest merge over a count map
//! and emits a prefix code as an ordered token-to-codeword map. The encoder
//! streams codeword bits; the decoder walks a binary tree rebuilt from the
//! table, one bit per edge. A single-symbol distribution gets an empty
//! codeword: encoding it produces no bits and decoding replays the symbol
//! for each requested token.

use crate::coder::{BitSink, BitSource, CoderResult, Decoder, Encoder, TokenSink};
use crate::Error;
use bit_vec::BitVec;
use std::collections::{BTreeMap, BinaryHeap};

pub type HuffmanTable<T> = BTreeMap<T, BitVec>;

enum BuildNode<T> {
    Leaf(T),
    Internal(usize, usize),
}

/// Queue entry ordered so that the lightest weight pops first and equal
/// weights pop the most recently queued entry first.
struct QueueItem {
    weight: u64,
    seq: u64,
    node: usize,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight && self.seq == other.seq
    }
}
impl Eq for QueueItem {}
impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .weight
            .cmp(&self.weight)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Build a prefix code from token counts. Fails on an empty map.
pub fn make_huffman_table<T: Ord + Copy>(
    counts: &BTreeMap<T, u64>,
) -> Result<HuffmanTable<T>, Error> {
    if counts.is_empty() {
        return Err(Error::EmptyHuffmanTable);
    }
    let mut nodes = Vec::with_capacity(2 * counts.len());
    let mut queue = BinaryHeap::with_capacity(counts.len());
    let mut seq = 0u64;
    for (&token, &count) in counts {
        nodes.push(BuildNode::Leaf(token));
        queue.push(QueueItem {
            weight: count,
            seq,
            node: nodes.len() - 1,
        });
        seq += 1;
    }
    while queue.len() > 1 {
        let left = queue.pop().expect("queue length checked");
        let right = queue.pop().expect("queue length checked");
        nodes.push(BuildNode::Internal(left.node, right.node));
        queue.push(QueueItem {
            weight: left.weight + right.weight,
            seq,
            node: nodes.len() - 1,
        });
        seq += 1;
    }
    let root = queue.pop().expect("at least one entry").node;

    let mut table = HuffmanTable::new();
    let mut stack = vec![(root, BitVec::new())];
    while let Some((node, path)) = stack.pop() {
        match &nodes[node] {
            BuildNode::Leaf(token) => {
                table.insert(*token, path);
            }
            BuildNode::Internal(left, right) => {
                let mut left_path = path.clone();
                left_path.push(false);
                stack.push((*left, left_path));
                let mut right_path = path;
                right_path.push(true);
                stack.push((*right, right_path));
            }
        }
    }
    Ok(table)
}

pub struct HuffmanEncoder<T> {
    table: HuffmanTable<T>,
    pending: Option<(BitVec, usize)>,
}

impl<T: Ord + Copy> HuffmanEncoder<T> {
    pub fn new(table: HuffmanTable<T>) -> Self {
        Self {
            table,
            pending: None,
        }
    }

    fn emit<S: BitSink>(&mut self, code: BitVec, from: usize, output: &mut S) -> CoderResult {
        for i in from..code.len() {
            if !output.push_bit(code.get(i).expect("index in range")) {
                self.pending = Some((code, i));
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
        if let Some((code, from)) = self.pending.take() {
            if self.emit(code, from, output) == CoderResult::OutputFull {
                return Ok(CoderResult::OutputFull);
            }
        }
        let mut taken = 0;
        while limit.map_or(true, |n| taken < n) {
            let Some(token) = input.next() else {
                return Ok(CoderResult::InputExhausted);
            };
            taken += 1;
            let code = self.table.get(&token).ok_or(Error::UnknownToken)?.clone();
            if self.emit(code, 0, output) == CoderResult::OutputFull {
                return Ok(CoderResult::OutputFull);
            }
        }
        Ok(CoderResult::Done)
    }
}

impl<T: Ord + Copy> Encoder for HuffmanEncoder<T> {
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
            Some((code, from)) => Ok(self.emit(code, from, output)),
            None => Ok(CoderResult::Done),
        }
    }

    fn token_bit_size(&self, token: &T) -> f32 {
        match self.table.get(token) {
            Some(code) => code.len() as f32,
            None => f32::INFINITY,
        }
    }
}

#[derive(Clone, Copy)]
enum Link<T> {
    Empty,
    Branch(u32),
    Leaf(T),
}

struct DecodeNode<T> {
    zero: Link<T>,
    one: Link<T>,
}

pub struct HuffmanDecoder<T> {
    nodes: Vec<DecodeNode<T>>,
    dirac: Option<T>,
    cursor: u32,
    ready: Option<T>,
}

impl<T: Ord + Copy> HuffmanDecoder<T> {
    /// Rebuild the code tree from a table. Fails on an empty table or one
    /// that is not a prefix code.
    pub fn new(table: &HuffmanTable<T>) -> Result<Self, Error> {
        if table.is_empty() {
            return Err(Error::EmptyHuffmanTable);
        }
        if table.len() == 1 {
            let (&token, code) = table.iter().next().expect("length checked");
            if code.is_empty() {
                return Ok(Self {
                    nodes: Vec::new(),
                    dirac: Some(token),
                    cursor: 0,
                    ready: None,
                });
            }
        }
        let mut nodes = vec![DecodeNode {
            zero: Link::Empty,
            one: Link::Empty,
        }];
        for (&token, code) in table {
            if code.is_empty() {
                return Err(Error::MalformedInput);
            }
            let mut cursor = 0usize;
            for (i, bit) in code.iter().enumerate() {
                let last = i + 1 == code.len();
                let current = match bit {
                    false => nodes[cursor].zero,
                    true => nodes[cursor].one,
                };
                let set = |nodes: &mut Vec<DecodeNode<T>>, cursor: usize, link: Link<T>| match bit {
                    false => nodes[cursor].zero = link,
                    true => nodes[cursor].one = link,
                };
                match (current, last) {
                    (Link::Empty, true) => set(&mut nodes, cursor, Link::Leaf(token)),
                    (Link::Empty, false) => {
                        let next = nodes.len() as u32;
                        nodes.push(DecodeNode {
                            zero: Link::Empty,
                            one: Link::Empty,
                        });
                        set(&mut nodes, cursor, Link::Branch(next));
                        cursor = next as usize;
                    }
                    (Link::Branch(next), false) => cursor = next as usize,
                    // a codeword ends inside another or runs through a leaf
                    _ => return Err(Error::MalformedInput),
                }
            }
        }
        Ok(Self {
            nodes,
            dirac: None,
            cursor: 0,
            ready: None,
        })
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
        if let Some(token) = self.dirac {
            // no bits carry any information; only a bounded request makes
            // progress
            let Some(n) = limit else {
                return Ok(CoderResult::Done);
            };
            while produced < n {
                if !output.push_token(token) {
                    return Ok(CoderResult::OutputFull);
                }
                produced += 1;
            }
            return Ok(CoderResult::Done);
        }
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
            let Some(bit) = input.next_bit() else {
                return Ok(CoderResult::InputExhausted);
            };
            let link = match bit {
                false => self.nodes[self.cursor as usize].zero,
                true => self.nodes[self.cursor as usize].one,
            };
            match link {
                Link::Branch(next) => self.cursor = next,
                Link::Leaf(token) => {
                    self.ready = Some(token);
                    self.cursor = 0;
                }
                Link::Empty => return Err(Error::MalformedInput),
            }
        }
    }
}

impl<T: Ord + Copy> Decoder for HuffmanDecoder<T> {
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
use crate::count_tokens;

#[cfg(test)]
fn code(bits: &[u8]) -> BitVec {
    bits.iter().map(|&b| b != 0).collect()
}

#[cfg(test)]
fn concatenate<T: Ord + Copy>(table: &HuffmanTable<T>, tokens: &[T]) -> BitVec {
    let mut result = BitVec::new();
    for token in tokens {
        result.extend(table.get(token).expect("token present").iter());
    }
    result
}

#[test]
fn table_construction_scenario() {
    let mut counts = BTreeMap::new();
    counts.insert(5u32, 32);
    counts.insert(1, 4);
    counts.insert(0, 54);
    counts.insert(32, 16);
    counts.insert(43, 16);
    counts.insert(16, 22);

    let table = make_huffman_table(&counts).unwrap();

    assert_eq!(table[&0], code(&[0]));
    assert_eq!(table[&1], code(&[1, 0, 1, 0]));
    assert_eq!(table[&5], code(&[1, 1, 1]));
    assert_eq!(table[&16], code(&[1, 1, 0]));
    assert_eq!(table[&32], code(&[1, 0, 0]));
    assert_eq!(table[&43], code(&[1, 0, 1, 1]));
}

#[test]
fn tables_are_prefix_codes() {
    let counts = count_tokens("peter piper picked a peck of pickled peppers".bytes());
    let table = make_huffman_table(&counts).unwrap();
    for (token, code) in &table {
        for (other, other_code) in &table {
            if token == other {
                continue;
            }
            let shorter = code.len().min(other_code.len());
            let same_prefix = (0..shorter).all(|i| code.get(i) == other_code.get(i));
            assert!(!same_prefix, "one codeword is a prefix of another");
        }
    }
}

#[test]
fn empty_counts_are_rejected() {
    let counts: BTreeMap<u8, u64> = BTreeMap::new();
    assert_eq!(make_huffman_table(&counts), Err(Error::EmptyHuffmanTable));
}

#[test]
fn encoding_concatenates_codewords() {
    let mut table = HuffmanTable::new();
    table.insert(b't', code(&[1]));
    table.insert(b'r', code(&[0, 1]));
    table.insert(b'x', code(&[0, 0, 1]));
    table.insert(b'o', code(&[0, 0, 0, 1]));
    table.insert(b'e', code(&[0, 0, 0, 0, 1]));
    table.insert(b'a', code(&[0, 0, 0, 0, 0]));

    let tokens = b"trxxaxetrorx";
    let expected = concatenate(&table, tokens);

    let mut encoder = HuffmanEncoder::new(table);
    let mut stream = BitVec::new();
    encoder
        .encode(&mut tokens.iter().copied(), &mut stream)
        .unwrap();
    assert_eq!(stream, expected);
}

#[test]
fn dirac_distribution_needs_no_bits() {
    let counts = count_tokens("aaaaaaaaaaaaaaaaa".bytes());
    let table = make_huffman_table(&counts).unwrap();
    assert_eq!(table[&b'a'], BitVec::new());

    let mut stream = BitVec::new();
    let mut encoder = HuffmanEncoder::new(table.clone());
    encoder
        .encode(&mut "aaaaaaaaaaaaaaaaa".bytes(), &mut stream)
        .unwrap();
    assert!(stream.is_empty());

    let mut decoder = HuffmanDecoder::new(&table).unwrap();
    let mut reader = BitVecReader::new(&stream);
    let mut result = Vec::new();
    decoder.decode_n(17, &mut reader, &mut result).unwrap();
    assert_eq!(result, vec![b'a'; 17]);
}

#[test]
fn partial_input_encoding() {
    let counts = count_tokens("trxxaxetrorx".bytes());
    let table = make_huffman_table(&counts).unwrap();
    let tokens = b"trxxaxetrorx";
    let expected = concatenate(&table, tokens);

    let mut encoder = HuffmanEncoder::new(table.clone());
    let mut stream = BitVec::new();
    let mut iter = tokens.iter().copied();
    encoder.encode_n(5, &mut iter, &mut stream).unwrap();
    assert_eq!(stream, concatenate(&table, &tokens[..5]));
    encoder.encode_n(2, &mut iter, &mut stream).unwrap();
    assert_eq!(stream, concatenate(&table, &tokens[..7]));
    encoder.encode(&mut iter, &mut stream).unwrap();
    assert_eq!(stream, expected);
}

#[test]
fn unknown_tokens_are_reported() {
    let counts = count_tokens("aab".bytes());
    let table = make_huffman_table(&counts).unwrap();
    let mut encoder = HuffmanEncoder::new(table);
    let mut stream = BitVec::new();
    let result = encoder.encode(&mut b"abc".iter().copied(), &mut stream);
    assert_eq!(result, Err(Error::UnknownToken));
}

#[test]
fn round_trip_over_text() {
    let text = "The number theoretic transform is based on generalizing \
                the Nth primitive root of unity to a quotient ring instead \
                of the usual field of complex numbers.";
    let counts = count_tokens(text.bytes());
    let table = make_huffman_table(&counts).unwrap();

    let mut encoder = HuffmanEncoder::new(table.clone());
    let mut stream = BitVec::new();
    encoder.encode(&mut text.bytes(), &mut stream).unwrap();

    let mut decoder = HuffmanDecoder::new(&table).unwrap();
    let mut reader = BitVecReader::new(&stream);
    let mut result = Vec::new();
    decoder.decode(&mut reader, &mut result).unwrap();
    assert_eq!(result, text.bytes().collect::<Vec<u8>>());
}

#[test]
fn dead_end_bit_paths_are_malformed() {
    let mut table = HuffmanTable::new();
    table.insert(b'a', code(&[0]));
    table.insert(b'b', code(&[1, 0]));
    // the path "11" leads nowhere
    let mut decoder = HuffmanDecoder::new(&table).unwrap();
    let stream = code(&[1, 1]);
    let mut reader = BitVecReader::new(&stream);
    let mut result: Vec<u8> = Vec::new();
    assert_eq!(
        decoder.decode(&mut reader, &mut result),
        Err(Error::MalformedInput)
    );
}
