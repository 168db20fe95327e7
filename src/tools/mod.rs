//! Internal collections backing the LZ77 engine.
pub mod search_tree;
pub mod window;
