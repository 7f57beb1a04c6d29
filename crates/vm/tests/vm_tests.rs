//! Integration tests for the Eris VM.
//!
//! Organized by concern: the call protocol, closures and cells, control
//! flow, builtins, and the trap paths.

use eris_common::{
    BuiltinOp, CodeBuilder, Heap, Instruction, NativeClosure, Num, Opcode, Proto, Shape,
    Signature, Value,
};
use eris_vm::{Feature, Trap, Vm, VmConfig};
use proptest::prelude::*;

// ============================================================
// Helper functions
// ============================================================

/// Route `log` output through the test harness; `RUST_LOG=trace` shows
/// every dispatched instruction.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Build a closure over a fresh proto whose upval count matches `upvals`.
fn closure(heap: &mut Heap, code: Vec<u32>, num_args: u8, upvals: Vec<Value>) -> Value {
    let proto = heap
        .new_proto(Proto::new(code, num_args, upvals.len() as u8))
        .unwrap();
    heap.new_closure(proto, upvals).unwrap()
}

/// A cell holding a fresh builtin of the given kind.
fn builtin_cell(heap: &mut Heap, op: BuiltinOp) -> Value {
    let builtin = heap.new_builtin(op).unwrap();
    let name = heap.intern(op.name().as_bytes()).unwrap();
    heap.new_cell(Some(builtin), Some(name)).unwrap()
}

fn int(heap: &Heap, value: Value) -> i64 {
    heap.as_num(value).unwrap().as_i64().unwrap()
}

fn run(vm: &mut Vm, callee: Value, args: &[Value]) -> Result<Value, Trap> {
    init_logging();
    let mut thread = vm.new_thread();
    vm.call(&mut thread, callee, args)
}

/// `(lambda (n) (if (= n 0) n (countdown (- n 1))))`, tail-recursive
/// through the cell in upval 2.
fn countdown(heap: &mut Heap, tail: bool) -> Value {
    let num_eq = builtin_cell(heap, BuiltinOp::NumEq);
    let sub = builtin_cell(heap, BuiltinOp::Sub);
    let name = heap.intern(b"countdown").unwrap();
    let this = heap.new_cell(None, Some(name)).unwrap();

    let mut b = CodeBuilder::new();
    b.mov(1, 0).load_int(2, 0).call_cell(0, 1, 2);
    let recur = b.if_(1);
    b.ret(0);
    b.bind(recur);
    b.mov(1, 0).load_int(2, 1).call_cell(1, 1, 2);
    if tail {
        b.tailcall_cell(2, 1, 1);
    } else {
        b.call_cell(2, 1, 1).ret(1);
    }

    let f = closure(heap, b.finish(), 1, vec![num_eq, sub, this]);
    heap.set_cell(this, f).unwrap();
    f
}

/// `(lambda (n) (if (= n 0) 1 (* n (fact (- n 1)))))`.
fn factorial(heap: &mut Heap) -> Value {
    let num_eq = builtin_cell(heap, BuiltinOp::NumEq);
    let sub = builtin_cell(heap, BuiltinOp::Sub);
    let mul = builtin_cell(heap, BuiltinOp::Mul);
    let this = heap.new_cell(None, None).unwrap();

    let mut b = CodeBuilder::new();
    b.mov(1, 0).load_int(2, 0).call_cell(0, 1, 2);
    let recur = b.if_(1);
    b.load_int(0, 1).ret(0);
    b.bind(recur);
    b.mov(2, 0).load_int(3, 1).call_cell(1, 2, 2); // r2 = n - 1
    b.call_cell(3, 2, 1); // r2 = fact(n - 1)
    b.mov(1, 0).call_cell(2, 1, 2); // r1 = n * r2
    b.ret(1);

    let f = closure(heap, b.finish(), 1, vec![num_eq, sub, mul, this]);
    heap.set_cell(this, f).unwrap();
    f
}

fn native_noop(_heap: &mut Heap, _regs: &mut [Value]) -> usize {
    0
}

// ============================================================
// End-to-end scenario
// ============================================================

#[test]
fn bar_calls_foo_through_cell() {
    init_logging();
    let mut vm = Vm::default();
    let heap = &mut vm.heap;

    let mut foo_code = CodeBuilder::new();
    foo_code.ret(0);
    let foo = closure(heap, foo_code.finish(), 1, vec![]);
    let foo_name = heap.intern(b"foo").unwrap();
    let foo_cell = heap.new_cell(Some(foo), Some(foo_name)).unwrap();

    let mut bar_code = CodeBuilder::new();
    bar_code
        .load_int(1, 0xfeed_u16 as i16)
        .call_cell(0, 1, 1)
        .ret(1);
    let bar = closure(heap, bar_code.finish(), 0, vec![foo_cell]);

    let mut thread = vm.new_thread();
    let result = vm.call(&mut thread, bar, &[]).unwrap();

    assert!(vm.heap.is(Shape::Num, result));
    let value = int(&vm.heap, result);
    assert_eq!(value, -275);
    assert_eq!(value as u16, 0xfeed);
    assert_eq!(thread.registers.slots()[0], result);
    assert_eq!(thread.control.depth(), 0);
    assert!(!thread.is_in_use());
}

#[test]
fn thread_is_reusable_after_return() {
    let mut vm = Vm::default();
    let mut b = CodeBuilder::new();
    b.ret(0);
    let id = closure(&mut vm.heap, b.finish(), 1, vec![]);
    let x = vm.heap.new_int(3).unwrap();
    let y = vm.heap.new_int(4).unwrap();

    let mut thread = vm.new_thread();
    assert_eq!(vm.call(&mut thread, id, &[x]), Ok(x));
    assert_eq!(vm.call(&mut thread, id, &[y]), Ok(y));
}

// ============================================================
// Call protocol
// ============================================================

/// Caller that loads `100 + i` into `r(k + i)` for `i < n`, a sentinel 7 into
/// r199, and calls the closure in its upval 0 from r200.
fn caller_of(heap: &mut Heap, callee: Value, k: u8, n: u8, tail: bool) -> Value {
    let mut b = CodeBuilder::new();
    b.load_int(199, 7);
    for i in 0..n {
        b.load_int(k + i, 100 + i as i16);
    }
    b.load_upval(200, 0);
    if tail {
        b.tailcall_reg(200, k, n);
    } else {
        b.call_reg(200, k, n).ret(k);
    }
    closure(heap, b.finish(), 0, vec![callee])
}

proptest! {
    /// The callee's registers 0..n are the caller's k..k+n, and its result
    /// lands in the caller's register k.
    #[test]
    fn register_isolation_and_return_placement(
        k in 0u8..8,
        n in 1u8..6,
        pick in 0u8..6,
    ) {
        let j = pick % n;
        let mut vm = Vm::default();
        let mut b = CodeBuilder::new();
        b.ret(j);
        let callee = closure(&mut vm.heap, b.finish(), n, vec![]);
        let caller = caller_of(&mut vm.heap, callee, k, n, false);

        let mut thread = vm.new_thread();
        let result = vm.call(&mut thread, caller, &[]).unwrap();
        prop_assert_eq!(int(&vm.heap, result), 100 + j as i64);
        prop_assert_eq!(thread.registers.slots()[k as usize], result);
        prop_assert_eq!(int(&vm.heap, thread.registers.slots()[199]), 7);
    }

    /// A tail call moves the arguments down to register 0.
    #[test]
    fn tail_call_moves_arguments(
        k in 0u8..8,
        n in 1u8..6,
        pick in 0u8..6,
    ) {
        let j = pick % n;
        let mut vm = Vm::default();
        let mut b = CodeBuilder::new();
        b.ret(j);
        let callee = closure(&mut vm.heap, b.finish(), n, vec![]);
        let caller = caller_of(&mut vm.heap, callee, k, n, true);

        let mut thread = vm.new_thread();
        let result = vm.call(&mut thread, caller, &[]).unwrap();
        prop_assert_eq!(int(&vm.heap, result), 100 + j as i64);
        // RETURN overwrote register 0; the rest still hold the moved arguments.
        prop_assert_eq!(thread.registers.slots()[0], result);
        for i in 1..n as usize {
            prop_assert_eq!(int(&vm.heap, thread.registers.slots()[i]), 100 + i as i64);
        }
    }

    /// IF skips its JUMP on a non-nil register; IFNOT on nil.
    #[test]
    fn conditional_contract(d in 3i16..12, truthy in any::<bool>(), negated in any::<bool>()) {
        let op = if negated { Opcode::IfNot } else { Opcode::If };
        let mut b = CodeBuilder::new();
        b.emit(Instruction::new(op, 0, 0, 0));
        b.jump_by(d);
        b.load_int(1, 1).ret(1);
        while b.current_offset() < 1 + d as usize {
            b.mov(0, 0);
        }
        b.load_int(1, 2).ret(1);

        let mut vm = Vm::default();
        let f = closure(&mut vm.heap, b.finish(), 1, vec![]);
        let cond = vm.heap.boolean(truthy);
        let result = run(&mut vm, f, &[cond]).unwrap();
        let skipped = truthy != negated;
        prop_assert_eq!(int(&vm.heap, result), if skipped { 1 } else { 2 });
    }
}

#[test]
fn tail_calls_do_not_grow_control_stack() {
    let mut vm = Vm::new(VmConfig::default().with_control_stack_depth(2));
    let f = countdown(&mut vm.heap, true);
    let n = vm.heap.new_int(100_000).unwrap();
    let mut thread = vm.new_thread();
    let result = vm.call(&mut thread, f, &[n]).unwrap();
    assert_eq!(int(&vm.heap, result), 0);
    assert_eq!(thread.control.depth(), 0);
}

#[test]
fn non_tail_recursion_overflows_control_stack() {
    let mut vm = Vm::new(VmConfig::default().with_control_stack_depth(8));
    let f = countdown(&mut vm.heap, false);
    let n = vm.heap.new_int(100).unwrap();
    let mut thread = vm.new_thread();
    let trap = vm.call(&mut thread, f, &[n]).unwrap_err();
    assert!(matches!(trap, Trap::ControlOverflow { limit: 8, .. }));
    assert_eq!(thread.control.depth(), 0);
    assert!(!thread.is_in_use());
}

#[test]
fn recursion_returns_through_every_frame() {
    let mut vm = Vm::default();
    let fact = factorial(&mut vm.heap);
    let ten = vm.heap.new_int(10).unwrap();
    let result = run(&mut vm, fact, &[ten]).unwrap();
    assert_eq!(int(&vm.heap, result), 3_628_800);

    let big = vm.heap.new_int(25).unwrap();
    let result = run(&mut vm, fact, &[big]).unwrap();
    assert_eq!(
        vm.heap.as_num(result).unwrap().to_string(),
        "15511210043330985984000000"
    );
}

#[test]
fn arity_mismatch_traps_without_mutation() {
    let mut vm = Vm::default();
    let mut b = CodeBuilder::new();
    b.ret(0);
    let f = closure(&mut vm.heap, b.finish(), 2, vec![]);
    let x = vm.heap.new_int(1).unwrap();
    let objects = vm.heap.len();

    let mut thread = vm.new_thread();
    let trap = vm.call(&mut thread, f, &[x]).unwrap_err();
    assert_eq!(
        trap,
        Trap::Arity {
            at: 0,
            expected: Signature::fixed(2),
            found: 1
        }
    );
    assert_eq!(vm.heap.len(), objects);
    assert_eq!(thread.control.depth(), 0);
}

#[test]
fn arity_mismatch_from_bytecode() {
    let mut vm = Vm::default();
    let mut callee_code = CodeBuilder::new();
    callee_code.ret(0);
    let callee = closure(&mut vm.heap, callee_code.finish(), 1, vec![]);

    let mut b = CodeBuilder::new();
    b.load_upval(5, 0).call_reg(5, 1, 3).ret(1);
    let caller = closure(&mut vm.heap, b.finish(), 0, vec![callee]);
    let trap = run(&mut vm, caller, &[]).unwrap_err();
    assert_eq!(trap.kind(), "arity error");
    assert_eq!(trap.at(), 1);
}

// ============================================================
// Closures and cells
// ============================================================

#[test]
fn close_snapshots_upvals_and_registers() {
    let mut vm = Vm::default();
    let heap = &mut vm.heap;

    let mut inner_code = CodeBuilder::new();
    inner_code.load_upval(0, 1).ret(0);
    let inner = heap.new_proto(Proto::new(inner_code.finish(), 0, 2)).unwrap();

    let captured = heap.new_int(5).unwrap();
    let mut b = CodeBuilder::new();
    b.load_int(3, 11)
        .close(4, 0, &[0], &[3])
        .load_int(3, 99)
        .mov(0, 4)
        .call_reg(0, 5, 0)
        .ret(0);
    let outer_proto = Proto::new(b.finish(), 0, 1).with_local_funcs(vec![inner]);
    let outer_proto = heap.new_proto(outer_proto).unwrap();
    let outer = heap.new_closure(outer_proto, vec![captured]).unwrap();

    let mut thread = vm.new_thread();
    let made = vm.call(&mut thread, outer, &[]).unwrap();

    let made = vm.heap.as_closure(made).unwrap();
    assert_eq!(made.proto, inner);
    assert_eq!(made.upvals.len(), 2);
    assert_eq!(made.upvals[0], captured);
    assert_eq!(int(&vm.heap, made.upvals[1]), 11);
    // The call in between returned the register capture, not the later store.
    assert_eq!(int(&vm.heap, thread.registers.slots()[5]), 11);
}

proptest! {
    #[test]
    fn close_captures_across_operand_words(
        from_upvals in prop::collection::vec(0u8..8, 0..8),
        from_regs in prop::collection::vec(10u8..18, 0..8),
    ) {
        let mut vm = Vm::default();
        let heap = &mut vm.heap;
        let (p, q) = (from_upvals.len(), from_regs.len());

        let mut inner_code = CodeBuilder::new();
        inner_code.ret(0);
        let inner = heap
            .new_proto(Proto::new(inner_code.finish(), 0, (p + q) as u8))
            .unwrap();

        let parent_upvals: Vec<Value> = (0..8).map(|i| heap.new_int(i).unwrap()).collect();
        let mut b = CodeBuilder::new();
        for r in 10..18u8 {
            b.load_int(r, 100 + r as i16);
        }
        b.close(1, 0, &from_upvals, &from_regs);
        // Runs only if the ip skipped the whole padded operand stream.
        b.load_int(2, 7);
        for r in 10..18u8 {
            b.load_int(r, -1);
        }
        b.ret(1);
        let proto = Proto::new(b.finish(), 0, 8).with_local_funcs(vec![inner]);
        let proto = heap.new_proto(proto).unwrap();
        let outer = heap.new_closure(proto, parent_upvals.clone()).unwrap();

        let mut thread = vm.new_thread();
        let made = vm.call(&mut thread, outer, &[]).unwrap();

        let regs = thread.registers.slots();
        prop_assert_eq!(int(&vm.heap, regs[2]), 7);
        prop_assert_eq!(int(&vm.heap, regs[10]), -1);

        let made = vm.heap.as_closure(made).unwrap();
        prop_assert_eq!(made.proto, inner);
        prop_assert_eq!(made.upvals.len(), p + q);
        for (k, &i) in from_upvals.iter().enumerate() {
            prop_assert_eq!(made.upvals[k], parent_upvals[i as usize]);
        }
        for (k, &r) in from_regs.iter().enumerate() {
            prop_assert_eq!(int(&vm.heap, made.upvals[p + k]), 100 + r as i64);
        }
    }
}

#[test]
fn close_with_wrong_capture_count_is_malformed() {
    let mut vm = Vm::default();
    let inner = vm
        .heap
        .new_proto(Proto::new(vec![Instruction::new(Opcode::Return, 0, 0, 0).encode()], 0, 2))
        .unwrap();
    let mut b = CodeBuilder::new();
    b.close(0, 0, &[], &[1]).ret(0);
    let proto = Proto::new(b.finish(), 0, 0).with_local_funcs(vec![inner]);
    let proto = vm.heap.new_proto(proto).unwrap();
    let outer = vm.heap.new_closure(proto, vec![]).unwrap();
    let trap = run(&mut vm, outer, &[]).unwrap_err();
    assert_eq!(trap.kind(), "malformed code");
}

#[test]
fn undefined_cell_then_defined() {
    let mut vm = Vm::default();
    let name = vm.heap.intern(b"x").unwrap();
    let cell = vm.heap.new_cell(None, Some(name)).unwrap();
    let mut b = CodeBuilder::new();
    b.load_cell(0, 0).ret(0);
    let f = closure(&mut vm.heap, b.finish(), 0, vec![cell]);

    assert_eq!(
        run(&mut vm, f, &[]),
        Err(Trap::UndefinedCell {
            at: 0,
            name: Some("x".to_string())
        })
    );

    let value = vm.heap.new_int(42).unwrap();
    vm.heap.set_cell(cell, value).unwrap();
    assert_eq!(run(&mut vm, f, &[]), Ok(value));
}

#[test]
fn call_through_undefined_cell() {
    let mut vm = Vm::default();
    let cell = vm.heap.new_cell(None, None).unwrap();
    let mut b = CodeBuilder::new();
    b.call_cell(0, 0, 0).ret(0);
    let f = closure(&mut vm.heap, b.finish(), 0, vec![cell]);
    assert_eq!(
        run(&mut vm, f, &[]),
        Err(Trap::UndefinedCell { at: 0, name: None })
    );
}

#[test]
fn load_cell_on_non_cell_is_type_error() {
    let mut vm = Vm::default();
    let x = vm.heap.new_int(1).unwrap();
    let mut b = CodeBuilder::new();
    b.load_cell(0, 0).ret(0);
    let f = closure(&mut vm.heap, b.finish(), 0, vec![x]);
    assert_eq!(
        run(&mut vm, f, &[]),
        Err(Trap::Type {
            at: 0,
            expected: Shape::Cell,
            found: Shape::Num
        })
    );
}

// ============================================================
// Builtins
// ============================================================

#[test]
fn builtin_call_writes_result_in_place() {
    let mut vm = Vm::default();
    let add = builtin_cell(&mut vm.heap, BuiltinOp::Add);
    let mut b = CodeBuilder::new();
    b.load_int(4, 1)
        .load_int(5, 2)
        .load_int(6, 3)
        .call_cell(0, 4, 3)
        .ret(4);
    let f = closure(&mut vm.heap, b.finish(), 0, vec![add]);
    let result = run(&mut vm, f, &[]).unwrap();
    assert_eq!(int(&vm.heap, result), 6);
}

#[test]
fn tail_call_to_builtin_returns_its_result() {
    let mut vm = Vm::default();
    let cons = builtin_cell(&mut vm.heap, BuiltinOp::Cons);
    let mut b = CodeBuilder::new();
    b.load_int(2, 1).load_int(3, 2).tailcall_cell(0, 2, 2);
    let f = closure(&mut vm.heap, b.finish(), 0, vec![cons]);
    let result = run(&mut vm, f, &[]).unwrap();
    let pair = vm.heap.as_cons(result).unwrap();
    assert_eq!(int(&vm.heap, pair.car), 1);
    assert_eq!(int(&vm.heap, pair.cdr), 2);
}

#[test]
fn builtin_called_directly() {
    let mut vm = Vm::default();
    let mul = vm.heap.new_builtin(BuiltinOp::Mul).unwrap();
    let x = vm.heap.new_int(6).unwrap();
    let y = vm.heap.new_int(7).unwrap();
    let result = run(&mut vm, mul, &[x, y]).unwrap();
    assert_eq!(int(&vm.heap, result), 42);
}

#[test]
fn builtin_arity_is_enforced() {
    let mut vm = Vm::default();
    let car = vm.heap.new_builtin(BuiltinOp::Car).unwrap();
    assert_eq!(
        run(&mut vm, car, &[]),
        Err(Trap::Arity {
            at: 0,
            expected: Signature::fixed(1),
            found: 0
        })
    );
}

#[test]
fn apply_dispatches_to_closure() {
    let mut vm = Vm::default();
    let mut b = CodeBuilder::new();
    b.ret(1);
    let second = closure(&mut vm.heap, b.finish(), 3, vec![]);
    let apply = vm.heap.new_builtin(BuiltinOp::Apply).unwrap();
    let x = vm.heap.new_int(1).unwrap();
    let y = vm.heap.new_int(2).unwrap();
    let z = vm.heap.new_int(3).unwrap();
    let rest = vm.heap.new_list(&[y, z]).unwrap();

    let result = run(&mut vm, apply, &[second, x, rest]).unwrap();
    assert_eq!(result, y);
}

#[test]
fn apply_from_bytecode_makes_a_real_call() {
    let mut vm = Vm::default();
    let apply = builtin_cell(&mut vm.heap, BuiltinOp::Apply);
    let fact = factorial(&mut vm.heap);
    let five = vm.heap.new_int(5).unwrap();
    let args = vm.heap.new_list(&[five]).unwrap();

    let mut b = CodeBuilder::new();
    b.load_upval(1, 1).load_upval(2, 2).call_cell(0, 1, 2).ret(1);
    let f = closure(&mut vm.heap, b.finish(), 0, vec![apply, fact, args]);
    let result = run(&mut vm, f, &[]).unwrap();
    assert_eq!(int(&vm.heap, result), 120);
}

#[test]
fn builtin_errors_carry_location() {
    let mut vm = Vm::default();
    let div = builtin_cell(&mut vm.heap, BuiltinOp::Div);
    let mut b = CodeBuilder::new();
    b.load_int(0, 1).load_int(1, 0).call_cell(0, 0, 2).ret(0);
    let f = closure(&mut vm.heap, b.finish(), 0, vec![div]);
    assert_eq!(run(&mut vm, f, &[]), Err(Trap::DivisionByZero { at: 2 }));
}

#[test]
fn predicates_answer_the_symbol_t() {
    let mut vm = Vm::default();
    let is_nil = vm.heap.new_builtin(BuiltinOp::IsNil).unwrap();
    let result = run(&mut vm, is_nil, &[Value::NIL]).unwrap();
    assert_eq!(result, vm.heap.intern(b"t").unwrap());
}

#[test]
fn float_rounding_is_half_even() {
    let mut vm = Vm::default();
    let round = vm.heap.new_builtin(BuiltinOp::Round).unwrap();
    let x = vm.heap.new_num(Num::Float(3.5)).unwrap();
    let result = run(&mut vm, round, &[x]).unwrap();
    assert_eq!(vm.heap.as_num(result).unwrap(), &Num::Float(4.0));
}

// ============================================================
// Traps
// ============================================================

#[test]
fn variadic_closure_call_is_unimplemented() {
    let mut vm = Vm::default();
    let mut b = CodeBuilder::new();
    b.ret(0);
    let proto = vm
        .heap
        .new_proto(Proto::new(b.finish(), 1, 0).variadic())
        .unwrap();
    let f = vm.heap.new_closure(proto, vec![]).unwrap();
    let x = vm.heap.new_int(1).unwrap();
    assert_eq!(
        run(&mut vm, f, &[x]),
        Err(Trap::Unimplemented {
            at: 0,
            feature: Feature::VariadicCall
        })
    );
}

#[test]
fn native_closure_call_is_unimplemented() {
    let mut vm = Vm::default();
    let name = vm.heap.new_string(b"noop").unwrap();
    let native = vm
        .heap
        .new_native_closure(NativeClosure {
            func: native_noop,
            data: 0,
            name,
            upvals: vec![],
        })
        .unwrap();
    let mut b = CodeBuilder::new();
    b.load_upval(0, 0).call_reg(0, 1, 0).ret(1);
    let f = closure(&mut vm.heap, b.finish(), 0, vec![native]);
    assert_eq!(
        run(&mut vm, f, &[]),
        Err(Trap::Unimplemented {
            at: 1,
            feature: Feature::NativeCall
        })
    );
}

#[test]
fn reserved_opcodes_are_unimplemented_exceptions() {
    let mut vm = Vm::default();
    let f = closure(&mut vm.heap, vec![0x0000_000d], 0, vec![]);
    assert_eq!(
        run(&mut vm, f, &[]),
        Err(Trap::Unimplemented {
            at: 0,
            feature: Feature::Exceptions
        })
    );
}

#[test]
fn undefined_opcode_is_invalid() {
    let mut vm = Vm::default();
    let f = closure(&mut vm.heap, vec![0x0000_0040], 0, vec![]);
    let trap = run(&mut vm, f, &[]).unwrap_err();
    assert_eq!(trap.kind(), "invalid instruction");
}

#[test]
fn calling_a_non_callable_is_type_error() {
    let mut vm = Vm::default();
    let s = vm.heap.new_string(b"not a function").unwrap();
    assert_eq!(
        run(&mut vm, s, &[]),
        Err(Trap::Type {
            at: 0,
            expected: Shape::Closure,
            found: Shape::String
        })
    );
}

#[test]
fn allocation_failure_is_out_of_memory() {
    let mut vm = Vm::default();
    let mut b = CodeBuilder::new();
    b.load_int(0, 1).ret(0);
    let f = closure(&mut vm.heap, b.finish(), 0, vec![]);
    let in_use = vm.heap.bytes_allocated();
    vm.heap.set_limit(Some(in_use));

    let trap = run(&mut vm, f, &[]).unwrap_err();
    assert!(trap.is_out_of_memory());
    assert_eq!(trap.at(), 0);
}

#[test]
fn register_window_must_fit() {
    let mut vm = Vm::new(VmConfig::default().with_register_stack_size(256 + 4));
    let mut callee_code = CodeBuilder::new();
    callee_code.ret(0);
    let callee = closure(&mut vm.heap, callee_code.finish(), 0, vec![]);
    let mut b = CodeBuilder::new();
    b.load_upval(0, 0).call_reg(0, 10, 0).ret(0);
    let f = closure(&mut vm.heap, b.finish(), 0, vec![callee]);
    assert_eq!(
        run(&mut vm, f, &[]),
        Err(Trap::RegisterOverflow {
            at: 1,
            needed: 266,
            capacity: 260
        })
    );
}

#[test]
fn instruction_budget_bounds_a_loop() {
    let mut vm = Vm::new(VmConfig::default().with_instruction_budget(1_000));
    let mut b = CodeBuilder::new();
    b.jump_by(0);
    let f = closure(&mut vm.heap, b.finish(), 0, vec![]);
    assert_eq!(
        run(&mut vm, f, &[]),
        Err(Trap::BudgetExhausted {
            at: 0,
            budget: 1_000
        })
    );
}

#[test]
fn trap_releases_thread() {
    let mut vm = Vm::default();
    let mut bad = CodeBuilder::new();
    bad.load_cell(0, 0).ret(0);
    let cell = vm.heap.new_cell(None, None).unwrap();
    let bad = closure(&mut vm.heap, bad.finish(), 0, vec![cell]);
    let mut good = CodeBuilder::new();
    good.load_int(0, 5).ret(0);
    let good = closure(&mut vm.heap, good.finish(), 0, vec![]);

    let mut thread = vm.new_thread();
    assert!(vm.call(&mut thread, bad, &[]).is_err());
    assert!(!thread.is_in_use());
    assert_eq!(thread.control.depth(), 0);
    let result = vm.call(&mut thread, good, &[]).unwrap();
    assert_eq!(int(&vm.heap, result), 5);
}
