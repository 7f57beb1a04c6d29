//! Errors shared by the Eris encoding, object model and allocator.

use thiserror::Error;

use crate::shape::Shape;

/// Errors that occur while decoding instruction words.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Opcode byte outside the defined and reserved ranges.
    #[error("invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    /// Opcode byte reserved for the exception instructions (RAISE/HANDLE).
    #[error("reserved opcode: {0:#04x}")]
    ReservedOpcode(u8),

    /// Byte stream length is not a multiple of 4.
    #[error("invalid byte stream length: {0} (must be multiple of 4)")]
    InvalidLength(usize),

    /// A multi-word instruction's operand stream runs past the end of the code.
    #[error("operand stream at word {at} needs {needed} words, {available} available")]
    TruncatedOperands {
        at: usize,
        needed: usize,
        available: usize,
    },
}

/// A value did not have the shape an operation required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("type error: expected {expected}, got {found}")]
pub struct TypeError {
    pub expected: Shape,
    pub found: Shape,
}

/// The allocator facade could not provide memory for a new object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("out of memory: {requested} bytes requested, limit {limit}")]
pub struct OutOfMemory {
    /// Size of the object that could not be allocated, header included.
    pub requested: usize,
    /// The byte budget in force (`usize::MAX` when unbounded).
    pub limit: usize,
}

/// A closure could not be built from a proto and its captured values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClosureError {
    /// The proto handle does not refer to a proto.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// The number of captured values differs from the proto's upval count.
    #[error("proto needs {expected} upvals, {found} given")]
    UpvalCount { expected: u8, found: usize },

    #[error(transparent)]
    OutOfMemory(#[from] OutOfMemory),
}
