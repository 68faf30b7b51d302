//! Byte buffer <-> engine list conversion

use super::ByteBuffer;
use crate::engine::{Heap, TermRef};
use crate::errors::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// What to do with a zero-length buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroLengthPolicy {
    /// Bind the empty list
    #[default]
    Empty,
    /// Refuse with [`BridgeError::EmptyBuffer`]
    Reject,
}

/// Working-memory reservation made before a list is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// First argument of a query goal
    QueryArgument,
    /// Reply bound into the third callback argument
    CallbackReply,
}

impl Reservation {
    pub fn cells(self, len: usize) -> usize {
        match self {
            Self::QueryArgument => (len + 4) * 2,
            Self::CallbackReply => len * 8,
        }
    }
}

/// Managed byte to list element: `-1` becomes `255`
#[inline]
pub const fn normalize(byte: i8) -> i64 {
    let value = byte as i64;
    if value < 0 {
        value + 256
    } else {
        value
    }
}

/// List element back to the managed byte it came from
#[inline]
pub fn denormalize(value: i64) -> Result<i8> {
    if !(0..=255).contains(&value) {
        return Err(BridgeError::ValueOutOfRange(value));
    }
    let byte = if value > 127 { value - 256 } else { value };
    Ok(byte as i8)
}

/// Bind `target` to the list of normalized `bytes`
///
/// The capacity check runs before any cell is written; running out of
/// working memory there is [`BridgeError::FatalAllocation`].
pub fn decode(
    heap: &mut Heap,
    bytes: &[i8],
    target: TermRef,
    reservation: Reservation,
    zero_length: ZeroLengthPolicy,
) -> Result<()> {
    if bytes.is_empty() && zero_length == ZeroLengthPolicy::Reject {
        return Err(BridgeError::EmptyBuffer);
    }

    heap.reserve(reservation.cells(bytes.len()))
        .map_err(BridgeError::FatalAllocation)?;

    let mut tail = target;
    for &byte in bytes {
        let (head, next) = heap.bind_list(tail)?;
        heap.bind_int(head, normalize(byte))?;
        tail = next;
    }
    heap.bind_nil(tail)?;
    Ok(())
}

/// Read the list at `list` back into a byte buffer
///
/// With `expected` the walked length must match the declared one; without
/// it the terminator alone decides. Lists that never reach a terminator are
/// malformed.
pub fn encode(heap: &Heap, list: TermRef, expected: Option<usize>) -> Result<ByteBuffer> {
    // The declared length is untrusted; a list cannot outgrow the heap
    let mut out = ByteBuffer::with_capacity(expected.unwrap_or(0).min(heap.len()));
    let mut items = heap.list_iter(list);

    while let Some(item) = items.next() {
        let head = item?;
        if expected == Some(out.len()) {
            let surplus = items.try_fold(1usize, |n, item| item.map(|_| n + 1))?;
            return Err(BridgeError::LengthMismatch {
                declared: out.len(),
                actual: out.len() + surplus,
            });
        }
        let value = heap.int_value(head)?.ok_or_else(|| {
            BridgeError::MalformedList(format!("element {} is not an integer", out.len()))
        })?;
        out.push(denormalize(value)?);
    }

    if let Some(declared) = expected {
        if out.len() != declared {
            return Err(BridgeError::LengthMismatch {
                declared,
                actual: out.len(),
            });
        }
    }
    Ok(out)
}
