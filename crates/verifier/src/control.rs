//! Control-flow pass: jump targets and conditional/JUMP pairing.

use crate::error::VerifyError;
use crate::structural::CodeMap;
use eris_common::Opcode;

/// Check every JUMP lands on an instruction and every IF/IFNOT is
/// immediately followed by its JUMP.
pub fn check_control(map: &CodeMap) -> Vec<VerifyError> {
    let mut errors = Vec::new();
    let len = map.starts.len();

    for (i, &(at, instr)) in map.instructions.iter().enumerate() {
        match instr.opcode {
            Opcode::Jump => {
                let target = at as isize + instr.signed_long_arg() as isize;
                if target < 0 || target as usize >= len {
                    errors.push(VerifyError::JumpOutOfRange { at, target, len });
                } else if !map.is_start(target as usize) {
                    errors.push(VerifyError::JumpIntoOperands {
                        at,
                        target: target as usize,
                    });
                }
            }
            Opcode::If | Opcode::IfNot => {
                let paired = matches!(
                    map.instructions.get(i + 1),
                    Some(&(next, jump)) if next == at + 1 && jump.opcode == Opcode::Jump
                );
                if !paired {
                    errors.push(VerifyError::MissingJump { at });
                }
            }
            _ => {}
        }
    }

    errors
}
