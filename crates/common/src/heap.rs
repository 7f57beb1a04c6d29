//! The heap: object table, allocator facade and symbol table.
//!
//! Objects live in a growable arena and are addressed by [`Value`]
//! handles. Nothing is freed during execution; the heap only tracks how
//! many bytes it has handed out and refuses allocations past its budget.
//! Every constructor builds the complete object before it is stored, so
//! no partially-initialised object is ever reachable.

use std::collections::HashMap;

use crate::builtin::BuiltinOp;
use crate::error::{ClosureError, OutOfMemory, TypeError};
use crate::num::Num;
use crate::object::{Builtin, Cell, Closure, Cons, NativeClosure, Object, Proto};
use crate::shape::Shape;
use crate::value::Value;

/// The object store of one VM instance.
#[derive(Debug)]
pub struct Heap {
    objects: Vec<Object>,
    /// Interned symbols by name. Symbols are immortal.
    symbols: HashMap<Box<[u8]>, Value>,
    bytes_allocated: usize,
    limit: Option<usize>,
    /// The canonical true value, the symbol `t`.
    t: Value,
}

macro_rules! accessors {
    ($($(#[$meta:meta])* $name:ident => $variant:ident : $ty:ty;)*) => {
        $(
            $(#[$meta])*
            pub fn $name(&self, value: Value) -> Result<&$ty, TypeError> {
                match self.get(value) {
                    Object::$variant(payload) => {
                        let payload: &$ty = payload;
                        Ok(payload)
                    }
                    other => Err(TypeError {
                        expected: Shape::$variant,
                        found: other.shape(),
                    }),
                }
            }
        )*
    };
}

impl Heap {
    /// An unbounded heap holding only nil and the symbol `t`.
    pub fn new() -> Self {
        let mut heap = Self {
            objects: vec![Object::Nil],
            symbols: HashMap::new(),
            bytes_allocated: Object::Nil.size(),
            limit: None,
            t: Value::NIL,
        };
        let t = heap.push(Object::Symbol(Box::from(&b"t"[..])));
        heap.symbols.insert(Box::from(&b"t"[..]), t);
        heap.t = t;
        heap
    }

    /// A heap that refuses allocations once `limit` bytes are in use.
    pub fn with_limit(limit: usize) -> Self {
        let mut heap = Self::new();
        heap.limit = Some(limit);
        heap
    }

    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Number of objects, nil included.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn push(&mut self, object: Object) -> Value {
        self.bytes_allocated += object.size();
        self.objects.push(object);
        Value::from_index((self.objects.len() - 1) as u32)
    }

    /// The allocator facade: store a fully built object and return its handle.
    ///
    /// Fails with [`OutOfMemory`] if the object would exceed the byte budget
    /// or the object table cannot grow. `Object::Nil` always yields the nil
    /// singleton.
    pub fn allocate(&mut self, object: Object) -> Result<Value, OutOfMemory> {
        if let Object::Nil = object {
            return Ok(Value::NIL);
        }
        let requested = object.size();
        let limit = self.limit.unwrap_or(usize::MAX);
        let oom = OutOfMemory { requested, limit };
        if self.bytes_allocated.saturating_add(requested) > limit
            || self.objects.len() >= u32::MAX as usize
        {
            return Err(oom);
        }
        self.objects.try_reserve(1).map_err(|_| oom)?;
        Ok(self.push(object))
    }

    /// The object behind a handle.
    ///
    /// Panics if `value` was not produced by this heap.
    pub fn get(&self, value: Value) -> &Object {
        &self.objects[value.index()]
    }

    fn get_mut(&mut self, value: Value) -> &mut Object {
        &mut self.objects[value.index()]
    }

    pub fn shape_of(&self, value: Value) -> Shape {
        self.get(value).shape()
    }

    /// True iff the value's object has exactly this shape.
    pub fn is(&self, shape: Shape, value: Value) -> bool {
        self.shape_of(value) == shape
    }

    pub fn nil(&self) -> Value {
        Value::NIL
    }

    /// The canonical true value.
    pub fn t(&self) -> Value {
        self.t
    }

    pub fn boolean(&self, b: bool) -> Value {
        if b {
            self.t
        } else {
            Value::NIL
        }
    }

    accessors! {
        as_num => Num: Num;
        as_builtin => Builtin: Builtin;
        as_proto => Proto: Proto;
        as_closure => Closure: Closure;
        as_native_closure => NativeClosure: NativeClosure;
        /// Bytes of a string.
        as_string => String: [u8];
        as_cons => Cons: Cons;
        as_vec => Vec: Vec<Value>;
        /// Name of a symbol.
        as_symbol => Symbol: [u8];
        as_cell => Cell: Cell;
    }

    /// Mutable access to a vec's elements; vecs are the only mutable
    /// collection.
    pub fn as_vec_mut(&mut self, value: Value) -> Result<&mut Vec<Value>, TypeError> {
        match self.get_mut(value) {
            Object::Vec(items) => Ok(items),
            other => Err(TypeError {
                expected: Shape::Vec,
                found: other.shape(),
            }),
        }
    }

    /// The proto of a closure.
    pub fn closure_proto(&self, closure: Value) -> Result<&Proto, TypeError> {
        let proto = self.as_closure(closure)?.proto;
        self.as_proto(proto)
    }

    /// Store into a cell, defining it if it was undefined.
    pub fn set_cell(&mut self, cell: Value, value: Value) -> Result<(), TypeError> {
        match self.get_mut(cell) {
            Object::Cell(c) => {
                c.value = Some(value);
                Ok(())
            }
            other => Err(TypeError {
                expected: Shape::Cell,
                found: other.shape(),
            }),
        }
    }

    pub fn new_num(&mut self, num: Num) -> Result<Value, OutOfMemory> {
        self.allocate(Object::Num(num))
    }

    pub fn new_int(&mut self, i: i64) -> Result<Value, OutOfMemory> {
        self.new_num(Num::Int(i))
    }

    pub fn new_builtin(&mut self, op: BuiltinOp) -> Result<Value, OutOfMemory> {
        self.allocate(Object::Builtin(Builtin::new(op)))
    }

    pub fn new_proto(&mut self, proto: Proto) -> Result<Value, OutOfMemory> {
        self.allocate(Object::Proto(proto))
    }

    /// A closure over `proto`. Exactly one value must be captured per upval
    /// the proto declares.
    pub fn new_closure(&mut self, proto: Value, upvals: Vec<Value>) -> Result<Value, ClosureError> {
        let expected = self.as_proto(proto)?.num_upvals;
        if upvals.len() != expected as usize {
            return Err(ClosureError::UpvalCount {
                expected,
                found: upvals.len(),
            });
        }
        Ok(self.allocate(Object::Closure(Closure { proto, upvals }))?)
    }

    pub fn new_native_closure(&mut self, closure: NativeClosure) -> Result<Value, OutOfMemory> {
        self.allocate(Object::NativeClosure(closure))
    }

    /// A cell, undefined when `value` is `None`.
    pub fn new_cell(
        &mut self,
        value: Option<Value>,
        symbol: Option<Value>,
    ) -> Result<Value, OutOfMemory> {
        self.allocate(Object::Cell(Cell { value, symbol }))
    }

    pub fn new_string(&mut self, bytes: &[u8]) -> Result<Value, OutOfMemory> {
        self.allocate(Object::String(Box::from(bytes)))
    }

    pub fn new_cons(&mut self, car: Value, cdr: Value) -> Result<Value, OutOfMemory> {
        self.allocate(Object::Cons(Cons { car, cdr }))
    }

    pub fn new_vec(&mut self, items: Vec<Value>) -> Result<Value, OutOfMemory> {
        self.allocate(Object::Vec(items))
    }

    /// Build a proper list from `items`.
    pub fn new_list(&mut self, items: &[Value]) -> Result<Value, OutOfMemory> {
        let mut list = Value::NIL;
        for &item in items.iter().rev() {
            list = self.new_cons(item, list)?;
        }
        Ok(list)
    }

    /// Look up the symbol named `name`, creating it on first use.
    pub fn intern(&mut self, name: &[u8]) -> Result<Value, OutOfMemory> {
        if let Some(&symbol) = self.symbols.get(name) {
            return Ok(symbol);
        }
        let symbol = self.allocate(Object::Symbol(Box::from(name)))?;
        self.symbols.insert(Box::from(name), symbol);
        Ok(symbol)
    }

    /// The elements of a proper list. Anything but a cons chain ending in
    /// nil is a type error naming the offending tail.
    pub fn list_items(&self, list: Value) -> Result<Vec<Value>, TypeError> {
        let mut items = Vec::new();
        let mut cursor = list;
        while !cursor.is_nil() {
            let cons = self.as_cons(cursor)?;
            items.push(cons.car);
            cursor = cons.cdr;
        }
        Ok(items)
    }

    /// Name of the symbol a cell was created for, for diagnostics.
    pub fn cell_name(&self, cell: Value) -> Option<String> {
        let symbol = self.as_cell(cell).ok()?.symbol?;
        let name = self.as_symbol(symbol).ok()?;
        Some(String::from_utf8_lossy(name).into_owned())
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
