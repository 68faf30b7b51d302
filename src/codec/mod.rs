//! Codec - managed byte buffers <-> engine integer lists
//!
//! Pure transformation over the buffers and working memory it is given.
//! The two directions are exact inverses: a byte `b` becomes the element
//! `b < 0 ? b + 256 : b` and an element `n` becomes `n > 127 ? n - 256 : n`.
//!
//! Architecture:
//! - `buffer.rs` - signed byte buffer owned by one side of the boundary
//! - `list.rs` - decode/encode against engine working memory

mod buffer;
mod list;

pub use buffer::ByteBuffer;
pub use list::{decode, denormalize, encode, normalize, Reservation, ZeroLengthPolicy};
