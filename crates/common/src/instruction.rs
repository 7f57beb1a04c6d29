//! Instruction encoding and decoding for the Eris instruction set.
//!
//! Every instruction word is exactly 32 bits, laid out little-endian:
//! ```text
//! Bits  0-7:  opcode
//! Bits  8-15: ARG1
//! Bits 16-23: ARG2
//! Bits 24-31: ARG3
//! ```
//! ARG2 and ARG3 together form the 16-bit "long argument" (`word >> 16`),
//! read as an `i16` when it is a jump offset or an integer immediate.
//!
//! CLOSE spans several words: the words after it are a flat stream of 8-bit
//! operands, byte `k` of the stream being byte `k % 4` of word `k / 4`.

use crate::error::DecodeError;
use crate::opcode::Opcode;

/// Number of bytes in one instruction word.
pub const WORD_BYTES: usize = 4;

/// A single decoded instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The operation to perform.
    pub opcode: Opcode,
    /// First operand. Meaning depends on opcode.
    pub arg1: u8,
    /// Second operand. Low byte of the long argument.
    pub arg2: u8,
    /// Third operand. High byte of the long argument.
    pub arg3: u8,
}

impl Instruction {
    /// Create a new instruction.
    pub fn new(opcode: Opcode, arg1: u8, arg2: u8, arg3: u8) -> Self {
        Self {
            opcode,
            arg1,
            arg2,
            arg3,
        }
    }

    /// Create an instruction whose ARG2/ARG3 hold one 16-bit argument.
    pub fn with_long(opcode: Opcode, arg1: u8, long: u16) -> Self {
        let [lo, hi] = long.to_le_bytes();
        Self::new(opcode, arg1, lo, hi)
    }

    /// Encode this instruction to one word.
    pub fn encode(&self) -> u32 {
        u32::from_le_bytes([self.opcode as u8, self.arg1, self.arg2, self.arg3])
    }

    /// Decode one word into an instruction.
    pub fn decode(word: u32) -> Result<Self, DecodeError> {
        let [op, arg1, arg2, arg3] = word.to_le_bytes();
        Ok(Self {
            opcode: Opcode::try_from(op)?,
            arg1,
            arg2,
            arg3,
        })
    }

    /// ARG2‖ARG3 as an unsigned 16-bit value.
    pub fn long_arg(&self) -> u16 {
        u16::from_le_bytes([self.arg2, self.arg3])
    }

    /// ARG2‖ARG3 reinterpreted as a two's-complement offset or immediate.
    pub fn signed_long_arg(&self) -> i16 {
        self.long_arg() as i16
    }
}

/// Raw opcode byte of a word, without validating it.
pub fn op_byte(word: u32) -> u8 {
    word as u8
}

/// The ARG2 byte of a raw word. RETURN uses it to recover the argument
/// offset of the call instruction a control frame points at.
pub fn arg2_of(word: u32) -> u8 {
    (word >> 16) as u8
}

/// Byte `index` of the operand stream that starts at `words[0]`.
///
/// Returns `None` if the stream runs off the end of `words`.
pub fn operand_byte(words: &[u32], index: usize) -> Option<u8> {
    let word = words.get(index / WORD_BYTES)?;
    Some(word.to_le_bytes()[index % WORD_BYTES])
}

/// Whole words needed to hold a CLOSE operand stream capturing `nupvals`
/// values (one local-func index byte plus one byte per upval).
pub fn close_operand_words(nupvals: usize) -> usize {
    (1 + nupvals).div_ceil(WORD_BYTES)
}

/// Pack an operand byte stream into words, zero-padding the last one.
pub fn pack_operands(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(WORD_BYTES)
        .map(|chunk| {
            let mut word = [0u8; WORD_BYTES];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect()
}
