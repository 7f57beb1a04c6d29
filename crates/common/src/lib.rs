//! Eris common types: instruction encoding, object model and heap.
//!
//! This crate provides the data structures shared by the VM and the
//! verifier:
//!
//! - [`Opcode`] and [`Instruction`]: the 32-bit instruction word format
//! - [`Code`] and [`CodeBuilder`]: code streams and their byte image
//! - [`Value`], [`Shape`] and [`Object`]: handles and heap object layouts
//! - [`Num`]: the numeric tower behind `num` objects
//! - [`Heap`]: the object table, allocator facade and symbol table
//! - [`BuiltinOp`]: builtin identifiers and their declared signatures
//! - [`disassemble`]: text listings of code streams

pub mod builtin;
pub mod code;
pub mod disasm;
pub mod error;
pub mod heap;
pub mod instruction;
pub mod num;
pub mod object;
pub mod opcode;
pub mod shape;
pub mod value;

// Re-export commonly used types at the crate root.
pub use builtin::{BuiltinOp, Signature};
pub use code::{Code, CodeBuilder, Label};
pub use disasm::disassemble;
pub use error::{ClosureError, DecodeError, OutOfMemory, TypeError};
pub use heap::Heap;
pub use instruction::Instruction;
pub use num::{Num, NumError, NumTag};
pub use object::{Builtin, Cell, Closure, Cons, NativeClosure, NativeFn, Object, Proto};
pub use opcode::Opcode;
pub use shape::Shape;
pub use value::Value;
