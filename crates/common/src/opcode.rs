//! Opcode definitions for the Eris instruction set.

use crate::error::DecodeError;

/// Identifies the operation an instruction word performs.
///
/// The opcode occupies the low byte of every instruction word. The
/// `#[repr(u8)]` attribute keeps each variant's byte value stable.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Register and upval access
    /// `MOVE d, s`: copy register `s` into register `d`.
    Move = 0x00,
    /// `LOAD_INT d, imm16`: box the sign-extended immediate into register `d`.
    LoadInt = 0x01,
    /// `LOAD_UPVAL d, i`: copy upval `i` of the current closure into `d`.
    LoadUpval = 0x02,
    /// `LOAD_CELL d, i`: dereference the cell in upval `i` into `d`.
    LoadCell = 0x03,

    // Unconditional control flow
    /// `CALL_CELL f, off, n`: call the function held by the cell in upval `f`.
    CallCell = 0x04,
    /// `CALL_REG f, off, n`: call the function in register `f`.
    CallReg = 0x05,
    /// Tail-call form of `CALL_CELL`.
    TailcallCell = 0x06,
    /// Tail-call form of `CALL_REG`.
    TailcallReg = 0x07,
    /// `JUMP off16`: relative jump, measured in words from this instruction.
    Jump = 0x08,
    /// `RETURN r`: return register `r` to the caller.
    Return = 0x09,

    // Conditional control flow; the next word must be a JUMP.
    /// Skip the following JUMP if the register is non-nil.
    If = 0x0a,
    /// Skip the following JUMP if the register is nil.
    IfNot = 0x0b,

    // Miscellany
    /// `CLOSE d, p, q`: build a closure; an operand stream follows.
    Close = 0x0c,
}

/// Opcode byte reserved for RAISE.
pub const RESERVED_RAISE: u8 = 0x0d;
/// Opcode byte reserved for HANDLE.
pub const RESERVED_HANDLE: u8 = 0x0e;

/// All valid opcodes, in definition order. Useful for exhaustive testing.
pub const ALL_OPCODES: [Opcode; 13] = [
    Opcode::Move,
    Opcode::LoadInt,
    Opcode::LoadUpval,
    Opcode::LoadCell,
    Opcode::CallCell,
    Opcode::CallReg,
    Opcode::TailcallCell,
    Opcode::TailcallReg,
    Opcode::Jump,
    Opcode::Return,
    Opcode::If,
    Opcode::IfNot,
    Opcode::Close,
];

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Opcode::Move),
            0x01 => Ok(Opcode::LoadInt),
            0x02 => Ok(Opcode::LoadUpval),
            0x03 => Ok(Opcode::LoadCell),
            0x04 => Ok(Opcode::CallCell),
            0x05 => Ok(Opcode::CallReg),
            0x06 => Ok(Opcode::TailcallCell),
            0x07 => Ok(Opcode::TailcallReg),
            0x08 => Ok(Opcode::Jump),
            0x09 => Ok(Opcode::Return),
            0x0a => Ok(Opcode::If),
            0x0b => Ok(Opcode::IfNot),
            0x0c => Ok(Opcode::Close),
            RESERVED_RAISE | RESERVED_HANDLE => Err(DecodeError::ReservedOpcode(value)),
            _ => Err(DecodeError::InvalidOpcode(value)),
        }
    }
}

impl Opcode {
    /// Returns the assembly mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Move => "MOVE",
            Opcode::LoadInt => "LOAD_INT",
            Opcode::LoadUpval => "LOAD_UPVAL",
            Opcode::LoadCell => "LOAD_CELL",
            Opcode::CallCell => "CALL_CELL",
            Opcode::CallReg => "CALL_REG",
            Opcode::TailcallCell => "TAILCALL_CELL",
            Opcode::TailcallReg => "TAILCALL_REG",
            Opcode::Jump => "JUMP",
            Opcode::Return => "RETURN",
            Opcode::If => "IF",
            Opcode::IfNot => "IFNOT",
            Opcode::Close => "CLOSE",
        }
    }

    /// True for the four CALL/TAILCALL opcodes.
    pub fn is_call(&self) -> bool {
        matches!(
            self,
            Opcode::CallCell | Opcode::CallReg | Opcode::TailcallCell | Opcode::TailcallReg
        )
    }

    pub fn is_tail_call(&self) -> bool {
        matches!(self, Opcode::TailcallCell | Opcode::TailcallReg)
    }

    /// True if control never falls through to the next word.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Return | Opcode::Jump | Opcode::TailcallCell | Opcode::TailcallReg
        )
    }
}
