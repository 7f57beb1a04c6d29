//! Disassembler: instruction words → text listing.
//!
//! One line per instruction, each prefixed with its word index. A CLOSE
//! and its operand stream share one line. Words that do not decode are
//! listed as `.word` so a listing never fails.

use std::fmt;

use crate::instruction::{close_operand_words, operand_byte, Instruction};
use crate::opcode::Opcode;

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.opcode.mnemonic();
        match self.opcode {
            Opcode::Move | Opcode::LoadUpval | Opcode::LoadCell => {
                write!(f, "{m} {}, {}", self.arg1, self.arg2)
            }
            Opcode::LoadInt => write!(f, "{m} {}, {}", self.arg1, self.signed_long_arg()),
            Opcode::CallCell | Opcode::CallReg | Opcode::TailcallCell | Opcode::TailcallReg => {
                write!(f, "{m} {}, {}, {}", self.arg1, self.arg2, self.arg3)
            }
            Opcode::Jump => write!(f, "{m} {:+}", self.signed_long_arg()),
            Opcode::Return | Opcode::If | Opcode::IfNot => write!(f, "{m} {}", self.arg1),
            Opcode::Close => write!(f, "{m} {}, {}, {}", self.arg1, self.arg2, self.arg3),
        }
    }
}

fn list(bytes: &[u8]) -> String {
    let items: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
    format!("[{}]", items.join(", "))
}

/// Render a CLOSE with its operands, or `None` if the stream is truncated.
fn close_line(instr: &Instruction, stream: &[u32]) -> Option<String> {
    let p = instr.arg2 as usize;
    let q = instr.arg3 as usize;
    let bytes: Option<Vec<u8>> = (0..1 + p + q).map(|i| operand_byte(stream, i)).collect();
    let bytes = bytes?;
    Some(format!(
        "CLOSE {}, func {}, upvals {}, regs {}",
        instr.arg1,
        bytes[0],
        list(&bytes[1..=p]),
        list(&bytes[1 + p..])
    ))
}

/// Disassemble a code stream into a listing.
pub fn disassemble(words: &[u32]) -> String {
    let mut lines = Vec::new();
    let mut i = 0;

    while i < words.len() {
        let word = words[i];
        let (line, width) = match Instruction::decode(word) {
            Ok(instr) if instr.opcode == Opcode::Close => {
                let p = instr.arg2 as usize;
                let q = instr.arg3 as usize;
                match close_line(&instr, &words[i + 1..]) {
                    Some(line) => (line, 1 + close_operand_words(p + q)),
                    // Truncated: show the head and stop at the end.
                    None => (instr.to_string(), words.len() - i),
                }
            }
            Ok(instr) => (instr.to_string(), 1),
            Err(_) => (format!(".word {word:#010x}"), 1),
        };
        lines.push(format!("{i:4}: {line}"));
        i += width;
    }

    let mut result = lines.join("\n");
    if !result.is_empty() {
        result.push('\n');
    }
    result
}
