//! Structural pass: decode every instruction and map instruction boundaries.
//!
//! Words after a CLOSE are operand bytes, so the stream is walked one
//! instruction at a time rather than one word at a time. The resulting
//! [`CodeMap`] is what the later passes consult.

use crate::error::VerifyError;
use eris_common::instruction::close_operand_words;
use eris_common::{DecodeError, Instruction, Opcode};

/// Registers addressable by one instruction operand.
const WINDOW: usize = u8::MAX as usize + 1;

/// Instruction boundaries of one code stream.
#[derive(Debug, Clone, Default)]
pub struct CodeMap {
    /// Every instruction that decoded, with its word index, in order.
    pub instructions: Vec<(usize, Instruction)>,
    /// `true` at each word index where an instruction starts, decoded or not.
    pub starts: Vec<bool>,
    /// A CLOSE operand stream ran off the end, so the map is incomplete.
    pub fatal: bool,
}

impl CodeMap {
    /// True if `at` is the first word of an instruction.
    pub fn is_start(&self, at: usize) -> bool {
        self.starts.get(at).copied().unwrap_or(false)
    }
}

/// Run the structural pass over `code`.
///
/// Returns the map of instruction boundaries and any errors found.
pub fn check_structural(code: &[u32]) -> (CodeMap, Vec<VerifyError>) {
    let mut errors = Vec::new();
    let mut map = CodeMap {
        instructions: Vec::new(),
        starts: vec![false; code.len()],
        fatal: false,
    };

    let mut at = 0;
    let mut last: Option<(usize, Option<Opcode>)> = None;
    while at < code.len() {
        map.starts[at] = true;
        let instr = match Instruction::decode(code[at]) {
            Ok(instr) => instr,
            Err(source) => {
                errors.push(VerifyError::InvalidInstruction { at, source });
                last = Some((at, None));
                at += 1;
                continue;
            }
        };

        let mut width = 1;
        match instr.opcode {
            Opcode::Close => {
                let needed = close_operand_words(instr.arg2 as usize + instr.arg3 as usize);
                let available = code.len() - at - 1;
                if needed > available {
                    errors.push(VerifyError::InvalidInstruction {
                        at,
                        source: DecodeError::TruncatedOperands {
                            at,
                            needed,
                            available,
                        },
                    });
                    map.fatal = true;
                }
                width += needed;
            }
            op if op.is_call() => {
                if instr.arg2 as usize + instr.arg3 as usize > WINDOW {
                    errors.push(VerifyError::ArgumentsOutOfWindow {
                        at,
                        off: instr.arg2,
                        nargs: instr.arg3,
                    });
                }
            }
            _ => {}
        }

        map.instructions.push((at, instr));
        last = Some((at, Some(instr.opcode)));
        at += width;
    }

    match last {
        None => errors.push(VerifyError::MissingTerminator { at: 0 }),
        Some((at, Some(op))) if !op.is_terminator() => {
            errors.push(VerifyError::MissingTerminator { at })
        }
        // A final word that does not decode is already reported.
        _ => {}
    }

    (map, errors)
}
