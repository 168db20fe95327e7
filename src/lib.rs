//! # Tokencodec Library
//!
//! Composable lossless compression codecs over integer token streams
//! * `uniform` and `rice` are the primitive fixed-width and Golomb-Rice coders
//! * `huffman` builds a canonical prefix code from a count map and streams it
//! * `tans` is a table-based asymmetric numeral system coder
//! * `lz77` is a sliding-window engine whose intermediate tokens are fed
//!   through an auxiliary coder built from the other modules
//! * `bits` adapts byte buffers to single-bit streams in either bit order
//!
//! Every coder follows the contract in `coder`: it consumes as much input and
//! emits as much output as the borrowed ranges allow, reports why it stopped,
//! and can be resumed on the same ranges as if the calls had been one.
//!
//! ## Round Trip Example
//!
//! ```rs
//! use tokencodec::coder::{Encoder,Decoder};
//! let data = "a man a plan a canal".as_bytes().to_vec();
//! let mut encoder = tokencodec::lz77::Lz77Encoder::<u8,_>::new(1024,8,None).expect("bad sizes");
//! let mut stream = bit_vec::BitVec::new();
//! encoder.encode(&mut data.iter().copied(),&mut stream).expect("encode failed");
//! encoder.flush(&mut stream).expect("flush failed");
//! ```

pub mod bits;
pub mod coder;
pub mod huffman;
pub mod lz77;
pub mod rice;
pub mod tans;
pub mod uniform;
mod tools;

use std::collections::BTreeMap;

/// Coder errors
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("cyclic buffer size too small, expected at least {expected}, got {got}")]
    InvalidCyclicBufferSize { expected: usize, got: usize },
    #[error("normalizing counts to {0} leaves some token with no state")]
    InvalidNormalization(u64),
    #[error("asymmetric and symmetric sub-coders cannot be mixed")]
    IncompatibleCoders,
    #[error("string is not tracked by the search tree")]
    UnknownString,
    #[error("huffman table cannot be built from an empty count map")]
    EmptyHuffmanTable,
    #[error("token is not present in the coding table")]
    UnknownToken,
    #[error("malformed input")]
    MalformedInput,
}

/// Bit packing order within a byte.
/// `Lsb0` means bit 0 of the stream is the least significant bit of a byte,
/// `Msb0` means it is the most significant one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BitOrder {
    Lsb0,
    Msb0,
}

/// Count occurrences of every token in a stream, e.g. to seed a Huffman
/// table or a tANS state table.
pub fn count_tokens<T: Ord, I: IntoIterator<Item = T>>(tokens: I) -> BTreeMap<T, u64> {
    let mut counts = BTreeMap::new();
    for token in tokens {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

#[test]
fn counting() {
    let counts = count_tokens("abracadabra".bytes());
    assert_eq!(counts.get(&b'a'), Some(&5));
    assert_eq!(counts.get(&b'b'), Some(&2));
    assert_eq!(counts.get(&b'r'), Some(&2));
    assert_eq!(counts.get(&b'c'), Some(&1));
    assert_eq!(counts.get(&b'z'), None);
}
