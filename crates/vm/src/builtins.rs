//! Builtin dispatch: arity-checked primitive operations applied in place to
//! a caller's register window.
//!
//! Arguments are read straight out of the window and the result replaces
//! the first argument's slot. Predicates answer `t` or nil. APPLY does not
//! compute a value itself; it lays out its spread arguments in the window
//! and hands the call back to the dispatch loop.

use std::cmp::Ordering;

use eris_common::{Builtin, BuiltinOp, Heap, Num, Value};
use log::debug;

use crate::error::{Trap, TrapAt};

/// What a builtin call left behind in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolved {
    /// The result, already stored at the argument offset.
    Value(Value),
    /// APPLY: call `callee` with `nargs` arguments now at the offset.
    Call { callee: Value, nargs: usize },
}

enum Completion {
    Value(Value),
    Apply { callee: Value, args: Vec<Value> },
}

/// Run `builtin` on `window[off..off + nargs]`.
///
/// `off + nargs` must not exceed the window.
pub(crate) fn call(
    heap: &mut Heap,
    builtin: Builtin,
    window: &mut [Value],
    off: usize,
    nargs: usize,
    at: usize,
) -> Result<Resolved, Trap> {
    let signature = builtin.signature();
    if !u8::try_from(nargs).is_ok_and(|n| signature.accepts(n)) {
        return Err(Trap::Arity {
            at,
            expected: signature,
            found: nargs,
        });
    }
    debug!("builtin {} with {} args", builtin.op.name(), nargs);

    match apply_op(heap, builtin.op, &window[off..off + nargs], at)? {
        Completion::Value(value) => {
            window[off] = value;
            Ok(Resolved::Value(value))
        }
        Completion::Apply { callee, args } => {
            let needed = off + args.len();
            if needed > window.len() {
                return Err(Trap::RegisterOverflow {
                    at,
                    needed,
                    capacity: window.len(),
                });
            }
            window[off..needed].copy_from_slice(&args);
            Ok(Resolved::Call {
                callee,
                nargs: args.len(),
            })
        }
    }
}

fn value(value: Value) -> Result<Completion, Trap> {
    Ok(Completion::Value(value))
}

fn number(heap: &mut Heap, n: Num, at: usize) -> Result<Completion, Trap> {
    value(heap.new_num(n).at(at)?)
}

fn nums<'h>(heap: &'h Heap, args: &[Value], at: usize) -> Result<Vec<&'h Num>, Trap> {
    args.iter().map(|&a| heap.as_num(a).at(at)).collect()
}

fn int_arg(heap: &Heap, arg: Value, at: usize) -> Result<i64, Trap> {
    heap.as_num(arg).at(at)?.as_i64().ok_or(Trap::Domain {
        at,
        reason: "machine integer required",
    })
}

fn apply_op(heap: &mut Heap, op: BuiltinOp, args: &[Value], at: usize) -> Result<Completion, Trap> {
    use BuiltinOp::*;
    match op {
        Cons => value(heap.new_cons(args[0], args[1]).at(at)?),
        Car | Cdr => {
            // The empty list's car and cdr are both the empty list.
            if args[0].is_nil() {
                return value(Value::NIL);
            }
            let cons = heap.as_cons(args[0]).at(at)?;
            value(if op == Car { cons.car } else { cons.cdr })
        }

        StrCat => {
            let mut bytes = Vec::new();
            for &arg in args {
                bytes.extend_from_slice(heap.as_string(arg).at(at)?);
            }
            value(heap.new_string(&bytes).at(at)?)
        }
        StrEq => {
            let equal = heap.as_string(args[0]).at(at)? == heap.as_string(args[1]).at(at)?;
            value(heap.boolean(equal))
        }
        StrCmp => {
            let ordering = heap
                .as_string(args[0])
                .at(at)?
                .cmp(heap.as_string(args[1]).at(at)?);
            number(heap, Num::Int(ordering as i64), at)
        }
        StrSubstr => {
            let len = heap.as_string(args[0]).at(at)?.len();
            let start = int_arg(heap, args[1], at)?;
            let end = int_arg(heap, args[2], at)?;
            let in_range = |i: i64| usize::try_from(i).is_ok_and(|i| i <= len);
            if !in_range(start) {
                return Err(Trap::IndexOutOfRange { at, index: start, len });
            }
            if !in_range(end) || end < start {
                return Err(Trap::IndexOutOfRange { at, index: end, len });
            }
            let bytes = heap.as_string(args[0]).at(at)?[start as usize..end as usize].to_vec();
            value(heap.new_string(&bytes).at(at)?)
        }
        Intern => {
            let name = heap.as_string(args[0]).at(at)?.to_vec();
            value(heap.intern(&name).at(at)?)
        }

        RawEq => value(heap.boolean(args[0] == args[1])),
        NumEq => {
            let xs = nums(heap, args, at)?;
            let equal = xs[0].num_eq(xs[1]);
            value(heap.boolean(equal))
        }
        SymEq => {
            heap.as_symbol(args[0]).at(at)?;
            heap.as_symbol(args[1]).at(at)?;
            value(heap.boolean(args[0] == args[1]))
        }
        IsNil => value(heap.boolean(args[0].is_nil())),

        Apply => {
            let (&callee, rest) = args.split_first().ok_or(Trap::MalformedCode {
                at,
                reason: "apply without a callee",
            })?;
            let (&list, fixed) = rest.split_last().ok_or(Trap::MalformedCode {
                at,
                reason: "apply without an argument list",
            })?;
            let mut spread = fixed.to_vec();
            spread.extend(heap.list_items(list).at(at)?);
            Ok(Completion::Apply {
                callee,
                args: spread,
            })
        }

        Min | Max => {
            let xs = nums(heap, args, at)?;
            let mut best = 0;
            for i in 1..xs.len() {
                let ordering = xs[i].partial_cmp_num(xs[best]).ok_or(Trap::Domain {
                    at,
                    reason: "comparison with NaN",
                })?;
                let wanted = if op == Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                if ordering == wanted {
                    best = i;
                }
            }
            value(args[best])
        }

        _ => {
            let result = arithmetic(op, &nums(heap, args, at)?, at)?;
            number(heap, result, at)
        }
    }
}

/// Builtins that map numbers to a fresh number.
fn arithmetic(op: BuiltinOp, xs: &[&Num], at: usize) -> Result<Num, Trap> {
    use BuiltinOp::*;
    Ok(match op {
        Add => xs.iter().fold(Num::Int(0), |acc, x| acc.add(x)),
        Mul => xs.iter().fold(Num::Int(1), |acc, x| acc.mul(x)),
        Sub if xs.len() == 1 => xs[0].neg(),
        Sub => xs[1..].iter().fold(xs[0].clone(), |acc, x| acc.sub(x)),
        Div if xs.len() == 1 => Num::Int(1).div(xs[0]).at(at)?,
        Div => {
            let mut acc = xs[0].clone();
            for x in &xs[1..] {
                acc = acc.div(x).at(at)?;
            }
            acc
        }
        Mod => xs[0].modulo(xs[1]).at(at)?,
        Abs => xs[0].abs(),
        Sqrt => xs[0].sqrt(),
        // (exp x) is e^x; (exp b x) is b^x.
        Exp if xs.len() == 1 => xs[0].exp(),
        Exp => xs[0].pow(xs[1]).at(at)?,
        // (log x) is ln x; (log x b) is the base-b logarithm.
        Log if xs.len() == 1 => xs[0].ln(),
        Log => xs[0].log(xs[1]),
        ExactToInexact => xs[0].to_inexact(),
        InexactToExact => xs[0].to_exact().at(at)?,
        Floor => xs[0].floor(),
        Ceiling => xs[0].ceiling(),
        Truncate => xs[0].truncate(),
        Round => xs[0].round(),
        BitAnd => xs[0].bit_and(xs[1]).at(at)?,
        BitOr => xs[0].bit_or(xs[1]).at(at)?,
        BitXor => xs[0].bit_xor(xs[1]).at(at)?,
        BitNot => xs[0].bit_not().at(at)?,
        BitShl => xs[0].shl(xs[1]).at(at)?,
        BitShr => xs[0].shr(xs[1]).at(at)?,
        Cons | Car | Cdr | StrCat | StrEq | StrCmp | StrSubstr | Intern | RawEq | NumEq
        | SymEq | IsNil | Apply | Min | Max => {
            unreachable!("{} is not arithmetic", op.name())
        }
    })
}
