//! Object shapes: the runtime type tag of every heap object.

use std::fmt;

/// The shape of a heap object. Determines the layout of its payload.
///
/// The set is closed; consumers match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Nil,
    Num,
    Builtin,
    Proto,
    Closure,
    /// A closure over a native function.
    NativeClosure,
    String,
    Cons,
    Vec,
    Symbol,
    /// An indirection cell (a "global"), possibly undefined.
    Cell,
}

/// All shapes, in definition order.
pub const ALL_SHAPES: [Shape; 11] = [
    Shape::Nil,
    Shape::Num,
    Shape::Builtin,
    Shape::Proto,
    Shape::Closure,
    Shape::NativeClosure,
    Shape::String,
    Shape::Cons,
    Shape::Vec,
    Shape::Symbol,
    Shape::Cell,
];

impl Shape {
    /// Diagnostic name of the shape.
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Nil => "nil",
            Shape::Num => "num",
            Shape::Builtin => "builtin",
            Shape::Proto => "proto",
            Shape::Closure => "closure",
            Shape::NativeClosure => "c_closure",
            Shape::String => "string",
            Shape::Cons => "cons",
            Shape::Vec => "vec",
            Shape::Symbol => "symbol",
            Shape::Cell => "cell",
        }
    }

    /// True for shapes a CALL instruction can dispatch on.
    pub fn is_callable(&self) -> bool {
        matches!(self, Shape::Closure | Shape::Builtin | Shape::NativeClosure)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
