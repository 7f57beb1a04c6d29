//! Heap object layouts, one payload type per shape.

use std::fmt;
use std::mem::size_of;
use std::rc::Rc;

use crate::builtin::{BuiltinOp, Signature};
use crate::heap::Heap;
use crate::num::Num;
use crate::shape::Shape;
use crate::value::Value;

/// Bytes charged for every object on top of its payload: the shape tag and
/// the slot in the object table.
pub const HEADER_SIZE: usize = size_of::<Object>();

/// A primitive operation, immutable once built. Its arity is the op's
/// [`Signature`], so the two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtin {
    pub op: BuiltinOp,
}

impl Builtin {
    pub fn new(op: BuiltinOp) -> Self {
        Self { op }
    }

    pub fn signature(&self) -> Signature {
        self.op.signature()
    }
}

/// A function template: code plus the metadata needed to call it and to
/// build closures over its nested functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proto {
    /// Instruction words. Shared so the dispatch loop can hold the current
    /// code without borrowing the heap.
    pub code: Rc<[u32]>,
    pub num_args: u8,
    pub num_upvals: u8,
    pub variadic: bool,
    /// Nested protos that CLOSE instructions in `code` may bind, by index.
    pub local_funcs: Vec<Value>,
}

impl Proto {
    pub fn new(code: impl Into<Rc<[u32]>>, num_args: u8, num_upvals: u8) -> Self {
        Self {
            code: code.into(),
            num_args,
            num_upvals,
            variadic: false,
            local_funcs: Vec::new(),
        }
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn with_local_funcs(mut self, local_funcs: Vec<Value>) -> Self {
        self.local_funcs = local_funcs;
        self
    }

    /// Declared arity, in the same terms as a builtin's.
    pub fn signature(&self) -> Signature {
        if self.variadic {
            Signature::at_least(self.num_args)
        } else {
            Signature::fixed(self.num_args)
        }
    }
}

/// A proto paired with its captured values.
///
/// `upvals.len()` equals the proto's `num_upvals`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    pub proto: Value,
    pub upvals: Vec<Value>,
}

/// Signature of a native callback: it receives the heap and its register
/// window, and returns the index of its result within the window.
pub type NativeFn = fn(&mut Heap, &mut [Value]) -> usize;

/// A closure over a native function. Calling one is not supported yet.
#[derive(Clone)]
pub struct NativeClosure {
    pub func: NativeFn,
    /// Opaque word handed back to the callback.
    pub data: usize,
    /// A string naming the function, for diagnostics.
    pub name: Value,
    pub upvals: Vec<Value>,
}

impl fmt::Debug for NativeClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClosure")
            .field("data", &self.data)
            .field("name", &self.name)
            .field("upvals", &self.upvals)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cons {
    pub car: Value,
    pub cdr: Value,
}

/// An indirection cell. `value` is `None` while the cell is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub value: Option<Value>,
    /// The symbol the cell was created for, if any.
    pub symbol: Option<Value>,
}

/// A heap object: its shape is the enum discriminant, its payload the
/// variant's contents.
#[derive(Debug, Clone)]
pub enum Object {
    Nil,
    Num(Num),
    Builtin(Builtin),
    Proto(Proto),
    Closure(Closure),
    NativeClosure(NativeClosure),
    String(Box<[u8]>),
    Cons(Cons),
    /// Mutable, unlike strings and cons lists.
    Vec(Vec<Value>),
    Symbol(Box<[u8]>),
    Cell(Cell),
}

impl Object {
    pub fn shape(&self) -> Shape {
        match self {
            Object::Nil => Shape::Nil,
            Object::Num(_) => Shape::Num,
            Object::Builtin(_) => Shape::Builtin,
            Object::Proto(_) => Shape::Proto,
            Object::Closure(_) => Shape::Closure,
            Object::NativeClosure(_) => Shape::NativeClosure,
            Object::String(_) => Shape::String,
            Object::Cons(_) => Shape::Cons,
            Object::Vec(_) => Shape::Vec,
            Object::Symbol(_) => Shape::Symbol,
            Object::Cell(_) => Shape::Cell,
        }
    }

    /// Out-of-line payload bytes: element arrays of the variable-length
    /// shapes and the digits of big numbers.
    pub fn size_without_header(&self) -> usize {
        let value = size_of::<Value>();
        match self {
            Object::Nil | Object::Builtin(_) | Object::Cons(_) | Object::Cell(_) => 0,
            Object::Num(Num::Big(n)) => n.bits().div_ceil(8) as usize,
            Object::Num(Num::Ratio(r)) => {
                (r.numer().bits().div_ceil(8) + r.denom().bits().div_ceil(8)) as usize
            }
            Object::Num(_) => 0,
            Object::Proto(p) => p.code.len() * size_of::<u32>() + p.local_funcs.len() * value,
            Object::Closure(c) => c.upvals.len() * value,
            Object::NativeClosure(c) => c.upvals.len() * value,
            Object::String(bytes) | Object::Symbol(bytes) => bytes.len(),
            Object::Vec(items) => items.len() * value,
        }
    }

    /// Total bytes charged against the heap budget.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.size_without_header()
    }
}
