//! Main execution loop and opcode dispatch for the Eris VM.
//!
//! The loop copies the thread's [`VmState`] into a local, runs until a
//! RETURN pops a native-call frame, and publishes the local state back to
//! the thread before every allocation and on exit.

use std::rc::Rc;

use eris_common::instruction::{arg2_of, close_operand_words, operand_byte};
use eris_common::{DecodeError, Heap, Instruction, Opcode, Proto, Shape, Value};
use log::{debug, trace};

use crate::builtins::{self, Resolved};
use crate::config::{VmConfig, WINDOW_SIZE};
use crate::error::{Feature, Trap, TrapAt};
use crate::frame::Frame;
use crate::machine::{Thread, VmState};

/// How control continues after a call instruction.
enum Flow {
    /// Fetch the next instruction from the (possibly new) state.
    Continue,
    /// A builtin was tail-called: return its result, stored in this register.
    Return(usize),
}

/// Call `callee` from native code with `args`, running the dispatch loop
/// until the callee returns.
pub(crate) fn call_value(
    heap: &mut Heap,
    thread: &mut Thread,
    callee: Value,
    args: &[Value],
    config: &VmConfig,
) -> Result<Value, Trap> {
    let at = 0;
    let base = 0;
    thread.registers.check_window(base, at)?;
    if args.len() > WINDOW_SIZE {
        return Err(Trap::RegisterOverflow {
            at,
            needed: args.len(),
            capacity: WINDOW_SIZE,
        });
    }
    thread.registers.window_mut(base)[..args.len()].copy_from_slice(args);

    let mut callee = callee;
    let mut nargs = args.len();
    loop {
        match heap.shape_of(callee) {
            Shape::Closure => {
                check_arity(heap.closure_proto(callee).at(at)?, nargs, at)?;
                thread.control.push(
                    Frame::NativeCall {
                        closure: None,
                        base,
                    },
                    at,
                )?;
                thread.state = VmState {
                    ip: 0,
                    base,
                    closure: callee,
                };
                return run(heap, thread, config);
            }
            Shape::Builtin => {
                let builtin = *heap.as_builtin(callee).at(at)?;
                let window = thread.registers.window_mut(base);
                match builtins::call(heap, builtin, window, 0, nargs, at)? {
                    Resolved::Value(value) => return Ok(value),
                    Resolved::Call {
                        callee: next,
                        nargs: n,
                    } => {
                        callee = next;
                        nargs = n;
                    }
                }
            }
            Shape::NativeClosure => {
                return Err(Trap::Unimplemented {
                    at,
                    feature: Feature::NativeCall,
                })
            }
            found => {
                return Err(Trap::Type {
                    at,
                    expected: Shape::Closure,
                    found,
                })
            }
        }
    }
}

/// Run the dispatch loop from the thread's published state until a RETURN
/// pops a native-call frame, and return the value it returned.
pub(crate) fn run(heap: &mut Heap, thread: &mut Thread, config: &VmConfig) -> Result<Value, Trap> {
    let mut state = thread.state;
    let result = dispatch(heap, thread, &mut state, config);
    thread.state = state;
    result
}

fn dispatch(
    heap: &mut Heap,
    thread: &mut Thread,
    st: &mut VmState,
    config: &VmConfig,
) -> Result<Value, Trap> {
    thread.registers.check_window(st.base, st.ip)?;
    let mut code = proto_code(heap, st.closure, st.ip)?;
    let mut executed: u64 = 0;

    loop {
        let at = st.ip;
        if let Some(budget) = config.instruction_budget {
            if executed >= budget {
                return Err(Trap::BudgetExhausted { at, budget });
            }
        }
        executed += 1;

        let word = *code.get(at).ok_or(Trap::MalformedCode {
            at,
            reason: "instruction pointer past end of code",
        })?;
        let instr = Instruction::decode(word).at(at)?;
        trace!("{:>5}: {}", at, instr);

        let a1 = instr.arg1 as usize;
        let a2 = instr.arg2 as usize;

        match instr.opcode {
            Opcode::Move => {
                let regs = thread.registers.window_mut(st.base);
                regs[a1] = regs[a2];
                st.ip += 1;
            }
            Opcode::LoadInt => {
                thread.state = *st;
                let value = heap.new_int(instr.signed_long_arg() as i64).at(at)?;
                thread.registers.window_mut(st.base)[a1] = value;
                st.ip += 1;
            }
            Opcode::LoadUpval => {
                let value = upval(heap, st.closure, a2, at)?;
                thread.registers.window_mut(st.base)[a1] = value;
                st.ip += 1;
            }
            Opcode::LoadCell => {
                let value = deref_cell(heap, upval(heap, st.closure, a2, at)?, at)?;
                thread.registers.window_mut(st.base)[a1] = value;
                st.ip += 1;
            }
            Opcode::CallCell | Opcode::CallReg | Opcode::TailcallCell | Opcode::TailcallReg => {
                let callee = match instr.opcode {
                    Opcode::CallCell | Opcode::TailcallCell => {
                        deref_cell(heap, upval(heap, st.closure, a1, at)?, at)?
                    }
                    _ => thread.registers.window(st.base)[a1],
                };
                let tail = instr.opcode.is_tail_call();
                let flow = do_call(heap, thread, st, callee, a2, instr.arg3 as usize, tail, at)?;
                if let Flow::Return(reg) = flow {
                    if let Some(value) = do_return(heap, thread, st, reg, at)? {
                        return Ok(value);
                    }
                }
                code = proto_code(heap, st.closure, at)?;
            }
            Opcode::Jump => {
                st.ip = jump_target(at, instr.signed_long_arg(), at)?;
            }
            Opcode::Return => {
                if let Some(value) = do_return(heap, thread, st, a1, at)? {
                    return Ok(value);
                }
                code = proto_code(heap, st.closure, at)?;
            }
            Opcode::If | Opcode::IfNot => {
                let offset = following_jump(&code, at)?;
                let truthy = thread.registers.window(st.base)[a1].is_truthy();
                if truthy == (instr.opcode == Opcode::If) {
                    st.ip = at + 2;
                } else {
                    st.ip = jump_target(at + 1, offset, at)?;
                }
            }
            Opcode::Close => close(heap, thread, st, &code, instr, at)?,
        }
    }
}

/// Call `callee` with the `nargs` arguments at register `off`.
#[allow(clippy::too_many_arguments)]
fn do_call(
    heap: &mut Heap,
    thread: &mut Thread,
    st: &mut VmState,
    mut callee: Value,
    off: usize,
    mut nargs: usize,
    tail: bool,
    at: usize,
) -> Result<Flow, Trap> {
    if off + nargs > WINDOW_SIZE {
        return Err(Trap::MalformedCode {
            at,
            reason: "argument registers run past the window",
        });
    }
    loop {
        match heap.shape_of(callee) {
            Shape::Closure => {
                check_arity(heap.closure_proto(callee).at(at)?, nargs, at)?;
                if tail {
                    debug!("tail call {:?} with {} args from r{}", callee, nargs, off);
                    thread
                        .registers
                        .window_mut(st.base)
                        .copy_within(off..off + nargs, 0);
                } else {
                    debug!("call {:?} with {} args at r{}", callee, nargs, off);
                    let base = st.base + off;
                    thread.registers.check_window(base, at)?;
                    thread.control.push(
                        Frame::Call {
                            return_ip: at,
                            closure: st.closure,
                        },
                        at,
                    )?;
                    st.base = base;
                }
                st.ip = 0;
                st.closure = callee;
                return Ok(Flow::Continue);
            }
            Shape::Builtin => {
                let builtin = *heap.as_builtin(callee).at(at)?;
                thread.state = *st;
                let window = thread.registers.window_mut(st.base);
                match builtins::call(heap, builtin, window, off, nargs, at)? {
                    // A builtin owns no return address: a tail call to one
                    // returns its result straight away.
                    Resolved::Value(_) if tail => return Ok(Flow::Return(off)),
                    Resolved::Value(_) => {
                        st.ip = at + 1;
                        return Ok(Flow::Continue);
                    }
                    Resolved::Call {
                        callee: next,
                        nargs: n,
                    } => {
                        callee = next;
                        nargs = n;
                    }
                }
            }
            Shape::NativeClosure => {
                return Err(Trap::Unimplemented {
                    at,
                    feature: Feature::NativeCall,
                })
            }
            found => {
                return Err(Trap::Type {
                    at,
                    expected: Shape::Closure,
                    found,
                })
            }
        }
    }
}

/// Return register `reg` to the caller. Yields the value if the popped
/// frame hands control back to native code.
fn do_return(
    heap: &Heap,
    thread: &mut Thread,
    st: &mut VmState,
    reg: usize,
    at: usize,
) -> Result<Option<Value>, Trap> {
    let regs = thread.registers.window_mut(st.base);
    regs[0] = regs[reg];
    let value = regs[0];

    match thread.control.pop(at)? {
        Frame::NativeCall { base, .. } => {
            debug!("return {:?} to native caller", value);
            st.base = base;
            Ok(Some(value))
        }
        Frame::Call { return_ip, closure } => {
            let code = proto_code(heap, closure, at)?;
            let call = *code.get(return_ip).ok_or(Trap::MalformedCode {
                at,
                reason: "return address past end of code",
            })?;
            // The caller's window started ARG2 registers below ours.
            let off = arg2_of(call) as usize;
            st.base = st.base.checked_sub(off).ok_or(Trap::MalformedCode {
                at,
                reason: "return address is not the call that made this frame",
            })?;
            st.ip = return_ip + 1;
            st.closure = closure;
            debug!("return {:?} to {}", value, return_ip);
            Ok(None)
        }
    }
}

/// Build a closure from the CLOSE at `at` and its operand stream.
fn close(
    heap: &mut Heap,
    thread: &mut Thread,
    st: &mut VmState,
    code: &[u32],
    instr: Instruction,
    at: usize,
) -> Result<(), Trap> {
    let p = instr.arg2 as usize;
    let q = instr.arg3 as usize;
    let stream = &code[at + 1..];
    let byte = |i: usize| {
        operand_byte(stream, i)
            .map(usize::from)
            .ok_or_else(|| Trap::InvalidInstruction {
                at,
                source: DecodeError::TruncatedOperands {
                    at,
                    needed: close_operand_words(p + q),
                    available: stream.len(),
                },
            })
    };

    let func = byte(0)?;
    let target = *heap
        .closure_proto(st.closure)
        .at(at)?
        .local_funcs
        .get(func)
        .ok_or(Trap::MalformedCode {
            at,
            reason: "local function index out of range",
        })?;

    // Snapshot every source before the destination register is written.
    let mut upvals = Vec::with_capacity(p + q);
    for i in 1..=p {
        upvals.push(upval(heap, st.closure, byte(i)?, at)?);
    }
    let regs = thread.registers.window(st.base);
    for i in p + 1..=p + q {
        upvals.push(regs[byte(i)?]);
    }

    thread.state = *st;
    // The heap rejects a capture count that differs from the target's upvals.
    let closure = heap.new_closure(target, upvals).at(at)?;
    thread.registers.window_mut(st.base)[instr.arg1 as usize] = closure;
    debug!("close {:?} over {} values into r{}", target, p + q, instr.arg1);
    st.ip = at + 1 + close_operand_words(p + q);
    Ok(())
}

/// Variadic closures cannot be called yet; others need the exact count.
fn check_arity(proto: &Proto, nargs: usize, at: usize) -> Result<(), Trap> {
    if proto.variadic {
        return Err(Trap::Unimplemented {
            at,
            feature: Feature::VariadicCall,
        });
    }
    if nargs != proto.num_args as usize {
        return Err(Trap::Arity {
            at,
            expected: proto.signature(),
            found: nargs,
        });
    }
    Ok(())
}

fn proto_code(heap: &Heap, closure: Value, at: usize) -> Result<Rc<[u32]>, Trap> {
    Ok(Rc::clone(&heap.closure_proto(closure).at(at)?.code))
}

fn upval(heap: &Heap, closure: Value, index: usize, at: usize) -> Result<Value, Trap> {
    heap.as_closure(closure)
        .at(at)?
        .upvals
        .get(index)
        .copied()
        .ok_or(Trap::MalformedCode {
            at,
            reason: "upval index out of range",
        })
}

fn deref_cell(heap: &Heap, cell: Value, at: usize) -> Result<Value, Trap> {
    match heap.as_cell(cell).at(at)?.value {
        Some(value) => Ok(value),
        None => Err(Trap::UndefinedCell {
            at,
            name: heap.cell_name(cell),
        }),
    }
}

/// Offset of the JUMP that must follow the conditional at `at`.
fn following_jump(code: &[u32], at: usize) -> Result<i16, Trap> {
    let malformed = Trap::MalformedCode {
        at,
        reason: "conditional not followed by JUMP",
    };
    let word = *code.get(at + 1).ok_or_else(|| malformed.clone())?;
    match Instruction::decode(word) {
        Ok(jump) if jump.opcode == Opcode::Jump => Ok(jump.signed_long_arg()),
        _ => Err(malformed),
    }
}

fn jump_target(from: usize, offset: i16, at: usize) -> Result<usize, Trap> {
    from.checked_add_signed(offset as isize)
        .ok_or(Trap::MalformedCode {
            at,
            reason: "jump before start of code",
        })
}
