//! Code streams: sequences of 32-bit instruction words.
//!
//! A byte image of a code stream is the raw concatenation of its words,
//! each stored little-endian, with no header. [`CodeBuilder`] assembles
//! word streams programmatically, resolving jump labels.

use crate::error::DecodeError;
use crate::instruction::{pack_operands, Instruction, WORD_BYTES};
use crate::opcode::Opcode;

/// A code stream: the instruction words of one proto.
///
/// Words following a CLOSE are operand bytes, not instructions, so a
/// `Code` is kept as raw words and decoded one step at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Code {
    pub words: Vec<u32>,
}

impl Code {
    pub fn new(words: Vec<u32>) -> Self {
        Self { words }
    }

    /// Encode the stream to bytes. The result length is `len() * 4`.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.words.len() * WORD_BYTES);
        for word in &self.words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// Decode a byte slice into a code stream.
    ///
    /// The length must be a multiple of 4. Opcodes are not validated here;
    /// that is the verifier's job, since operand words are not instructions.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() % WORD_BYTES != 0 {
            return Err(DecodeError::InvalidLength(bytes.len()));
        }
        let words = bytes
            .chunks_exact(WORD_BYTES)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self { words })
    }

    /// Number of words in the stream.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl From<Vec<u32>> for Code {
    fn from(words: Vec<u32>) -> Self {
        Self { words }
    }
}

/// A forward jump whose offset has not yet been resolved.
///
/// Created by [`CodeBuilder::jump`], [`CodeBuilder::if_`] and
/// [`CodeBuilder::if_not`]; resolve it with [`CodeBuilder::bind`].
#[derive(Debug)]
#[must_use = "an unbound label leaves a zero-offset jump"]
pub struct Label {
    /// Word index of the JUMP instruction to patch.
    jump_at: usize,
}

/// Builds a code stream one instruction at a time.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    words: Vec<u32>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Word index the next instruction will occupy.
    pub fn current_offset(&self) -> usize {
        self.words.len()
    }

    pub fn finish(self) -> Vec<u32> {
        self.words
    }

    pub fn into_code(self) -> Code {
        Code::new(self.words)
    }

    /// Emit an already-encoded instruction.
    pub fn emit(&mut self, instr: Instruction) -> &mut Self {
        self.words.push(instr.encode());
        self
    }

    /// Emit a raw word, valid or not. Used to build malformed streams.
    pub fn raw(&mut self, word: u32) -> &mut Self {
        self.words.push(word);
        self
    }

    pub fn mov(&mut self, dst: u8, src: u8) -> &mut Self {
        self.emit(Instruction::new(Opcode::Move, dst, src, 0))
    }

    pub fn load_int(&mut self, dst: u8, value: i16) -> &mut Self {
        self.emit(Instruction::with_long(Opcode::LoadInt, dst, value as u16))
    }

    pub fn load_upval(&mut self, dst: u8, upval: u8) -> &mut Self {
        self.emit(Instruction::new(Opcode::LoadUpval, dst, upval, 0))
    }

    pub fn load_cell(&mut self, dst: u8, upval: u8) -> &mut Self {
        self.emit(Instruction::new(Opcode::LoadCell, dst, upval, 0))
    }

    /// `CALL_CELL`: callee in the cell at upval `cell`, args in `off..off+nargs`.
    pub fn call_cell(&mut self, cell: u8, off: u8, nargs: u8) -> &mut Self {
        self.emit(Instruction::new(Opcode::CallCell, cell, off, nargs))
    }

    pub fn call_reg(&mut self, reg: u8, off: u8, nargs: u8) -> &mut Self {
        self.emit(Instruction::new(Opcode::CallReg, reg, off, nargs))
    }

    pub fn tailcall_cell(&mut self, cell: u8, off: u8, nargs: u8) -> &mut Self {
        self.emit(Instruction::new(Opcode::TailcallCell, cell, off, nargs))
    }

    pub fn tailcall_reg(&mut self, reg: u8, off: u8, nargs: u8) -> &mut Self {
        self.emit(Instruction::new(Opcode::TailcallReg, reg, off, nargs))
    }

    pub fn ret(&mut self, reg: u8) -> &mut Self {
        self.emit(Instruction::new(Opcode::Return, reg, 0, 0))
    }

    /// `JUMP` with an explicit offset relative to the jump itself.
    pub fn jump_by(&mut self, offset: i16) -> &mut Self {
        self.emit(Instruction::with_long(Opcode::Jump, 0, offset as u16))
    }

    /// Emit an unconditional forward jump, resolved later by [`bind`](Self::bind).
    pub fn jump(&mut self) -> Label {
        let jump_at = self.current_offset();
        self.jump_by(0);
        Label { jump_at }
    }

    /// Emit an unconditional jump back to `target`, a word index obtained
    /// from [`current_offset`](Self::current_offset).
    ///
    /// # Panics
    ///
    /// If `target` is more than 32768 words back.
    pub fn jump_back(&mut self, target: usize) -> &mut Self {
        let offset = jump_offset(self.current_offset(), target);
        self.jump_by(offset)
    }

    /// Emit `IF reg` and its mandatory JUMP. The jump is taken when `reg` is
    /// nil; bind the label at the else-branch.
    pub fn if_(&mut self, reg: u8) -> Label {
        self.emit(Instruction::new(Opcode::If, reg, 0, 0));
        self.jump()
    }

    /// Emit `IFNOT reg` and its mandatory JUMP. The jump is taken when `reg`
    /// is non-nil.
    pub fn if_not(&mut self, reg: u8) -> Label {
        self.emit(Instruction::new(Opcode::IfNot, reg, 0, 0));
        self.jump()
    }

    /// Bind a forward jump label to the current position.
    ///
    /// # Panics
    ///
    /// If the current position is more than 32767 words past the jump.
    pub fn bind(&mut self, label: Label) {
        let offset = jump_offset(label.jump_at, self.current_offset());
        self.words[label.jump_at] =
            Instruction::with_long(Opcode::Jump, 0, offset as u16).encode();
    }

    /// Emit `CLOSE dst` with its operand stream: the local-func index, then
    /// the parent upvals to capture, then the registers to capture.
    pub fn close(&mut self, dst: u8, local_func: u8, upvals: &[u8], regs: &[u8]) -> &mut Self {
        self.emit(Instruction::new(
            Opcode::Close,
            dst,
            upvals.len() as u8,
            regs.len() as u8,
        ));
        let mut operands = Vec::with_capacity(1 + upvals.len() + regs.len());
        operands.push(local_func);
        operands.extend_from_slice(upvals);
        operands.extend_from_slice(regs);
        self.words.extend(pack_operands(&operands));
        self
    }
}

/// Offset of a JUMP at `from` that lands on `to`. A JUMP holds a signed
/// 16-bit offset, so longer jumps cannot be encoded.
fn jump_offset(from: usize, to: usize) -> i16 {
    let offset = to as i128 - from as i128;
    match i16::try_from(offset) {
        Ok(offset) => offset,
        Err(_) => panic!("jump from word {from} to word {to} exceeds the 16-bit offset range"),
    }
}
