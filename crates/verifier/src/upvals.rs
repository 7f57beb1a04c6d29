//! Capture pass: upval indices, CLOSE targets and capture counts.
//!
//! When the proto is verified as part of a closure, the closure's captured
//! values are available too, and cell reads are checked against them.

use crate::error::VerifyError;
use crate::structural::CodeMap;
use eris_common::instruction::operand_byte;
use eris_common::{Heap, Opcode, Proto, Shape, Value};

/// Check the upval and local-function references in `proto`'s code.
pub fn check_upvals(
    heap: &Heap,
    proto: &Proto,
    captured: Option<&[Value]>,
    map: &CodeMap,
) -> Vec<VerifyError> {
    let mut errors = Vec::new();
    let num_upvals = proto.num_upvals;
    let in_range = |at: usize, index: u8, errors: &mut Vec<VerifyError>| {
        let ok = index < num_upvals;
        if !ok {
            errors.push(VerifyError::UpvalOutOfRange {
                at,
                index,
                num_upvals,
            });
        }
        ok
    };

    for &(at, instr) in &map.instructions {
        match instr.opcode {
            Opcode::LoadUpval => {
                in_range(at, instr.arg2, &mut errors);
            }
            Opcode::LoadCell | Opcode::CallCell | Opcode::TailcallCell => {
                let index = if instr.opcode == Opcode::LoadCell {
                    instr.arg2
                } else {
                    instr.arg1
                };
                if in_range(at, index, &mut errors) {
                    if let Some(&value) = captured.and_then(|c| c.get(index as usize)) {
                        let found = heap.shape_of(value);
                        if found != Shape::Cell {
                            errors.push(VerifyError::NotACell { at, index, found });
                        }
                    }
                }
            }
            Opcode::Close => {
                let stream = &proto.code[at + 1..];
                let (p, q) = (instr.arg2 as usize, instr.arg3 as usize);
                // A truncated stream is reported by the structural pass.
                let Some(index) = operand_byte(stream, 0) else {
                    continue;
                };
                for k in 1..=p {
                    if let Some(upval) = operand_byte(stream, k) {
                        in_range(at, upval, &mut errors);
                    }
                }
                check_close_target(heap, proto, at, index, p + q, &mut errors);
            }
            _ => {}
        }
    }

    errors
}

fn check_close_target(
    heap: &Heap,
    proto: &Proto,
    at: usize,
    index: u8,
    captures: usize,
    errors: &mut Vec<VerifyError>,
) {
    let Some(&target) = proto.local_funcs.get(index as usize) else {
        errors.push(VerifyError::LocalFuncOutOfRange {
            at,
            index,
            len: proto.local_funcs.len(),
        });
        return;
    };
    match heap.as_proto(target) {
        Ok(target) if target.num_upvals as usize != captures => {
            errors.push(VerifyError::CaptureCountMismatch {
                at,
                expected: target.num_upvals,
                found: captures,
            });
        }
        Ok(_) => {}
        Err(err) => errors.push(VerifyError::LocalFuncNotProto {
            at,
            index,
            found: err.found,
        }),
    }
}
