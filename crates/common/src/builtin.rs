//! Builtin operation identifiers and their declared signatures.
//!
//! The VM crate owns the implementations; this table is shared so that the
//! heap can construct `builtin` objects with the right arity and the
//! verifier and disassembler can name them.

use std::fmt;

use crate::error::DecodeError;

/// Identifies a primitive operation.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinOp {
    // Conses
    Cons,
    Car,
    Cdr,

    // Strings
    StrCat,
    StrEq,
    StrCmp,
    StrSubstr,
    Intern,

    // Equality and tests
    RawEq,
    NumEq,
    SymEq,
    IsNil,

    Apply,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    Abs,
    Sqrt,
    Exp,
    Log,
    ExactToInexact,
    InexactToExact,
    Floor,
    Ceiling,
    Truncate,
    Round,

    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    BitShr,
    BitShl,
}

/// All builtins, in definition order (which is also their byte order).
pub const ALL_BUILTINS: [BuiltinOp; 36] = [
    BuiltinOp::Cons,
    BuiltinOp::Car,
    BuiltinOp::Cdr,
    BuiltinOp::StrCat,
    BuiltinOp::StrEq,
    BuiltinOp::StrCmp,
    BuiltinOp::StrSubstr,
    BuiltinOp::Intern,
    BuiltinOp::RawEq,
    BuiltinOp::NumEq,
    BuiltinOp::SymEq,
    BuiltinOp::IsNil,
    BuiltinOp::Apply,
    BuiltinOp::Add,
    BuiltinOp::Sub,
    BuiltinOp::Mul,
    BuiltinOp::Div,
    BuiltinOp::Mod,
    BuiltinOp::Min,
    BuiltinOp::Max,
    BuiltinOp::Abs,
    BuiltinOp::Sqrt,
    BuiltinOp::Exp,
    BuiltinOp::Log,
    BuiltinOp::ExactToInexact,
    BuiltinOp::InexactToExact,
    BuiltinOp::Floor,
    BuiltinOp::Ceiling,
    BuiltinOp::Truncate,
    BuiltinOp::Round,
    BuiltinOp::BitAnd,
    BuiltinOp::BitOr,
    BuiltinOp::BitXor,
    BuiltinOp::BitNot,
    BuiltinOp::BitShr,
    BuiltinOp::BitShl,
];

/// Declared arity of a builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// Required argument count (the minimum, if variadic).
    pub num_args: u8,
    pub variadic: bool,
    /// Upper bound on arguments for variadic builtins that have one.
    pub max_args: Option<u8>,
}

impl Signature {
    pub const fn fixed(num_args: u8) -> Self {
        Self {
            num_args,
            variadic: false,
            max_args: Some(num_args),
        }
    }

    pub const fn at_least(num_args: u8) -> Self {
        Self {
            num_args,
            variadic: true,
            max_args: None,
        }
    }

    pub const fn between(num_args: u8, max: u8) -> Self {
        Self {
            num_args,
            variadic: true,
            max_args: Some(max),
        }
    }

    /// Whether a call with `nargs` arguments satisfies this signature.
    pub fn accepts(&self, nargs: u8) -> bool {
        if self.variadic {
            nargs >= self.num_args && self.max_args.is_none_or(|max| nargs <= max)
        } else {
            nargs == self.num_args
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.variadic, self.max_args) {
            (false, _) => write!(f, "{}", self.num_args),
            (true, None) => write!(f, "at least {}", self.num_args),
            (true, Some(max)) => write!(f, "{} to {}", self.num_args, max),
        }
    }
}

impl TryFrom<u8> for BuiltinOp {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ALL_BUILTINS
            .get(value as usize)
            .copied()
            .ok_or(DecodeError::InvalidOpcode(value))
    }
}

impl BuiltinOp {
    pub fn signature(&self) -> Signature {
        use BuiltinOp::*;
        match self {
            Cons => Signature::fixed(2),
            Car | Cdr => Signature::fixed(1),
            StrCat => Signature::at_least(0),
            StrEq | StrCmp => Signature::fixed(2),
            StrSubstr => Signature::fixed(3),
            Intern => Signature::fixed(1),
            RawEq | NumEq | SymEq => Signature::fixed(2),
            IsNil => Signature::fixed(1),
            // (apply f arg... list)
            Apply => Signature::at_least(2),
            Add | Mul => Signature::at_least(0),
            Sub | Div => Signature::at_least(1),
            Mod => Signature::fixed(2),
            Min | Max => Signature::at_least(1),
            Abs | Sqrt => Signature::fixed(1),
            // (exp n) is e^n, (exp b n) is b^n; likewise for log.
            Exp | Log => Signature::between(1, 2),
            ExactToInexact | InexactToExact => Signature::fixed(1),
            Floor | Ceiling | Truncate | Round => Signature::fixed(1),
            BitAnd | BitOr | BitXor => Signature::fixed(2),
            BitNot => Signature::fixed(1),
            BitShr | BitShl => Signature::fixed(2),
        }
    }

    /// Lower-case name, as the language would spell it.
    pub fn name(&self) -> &'static str {
        use BuiltinOp::*;
        match self {
            Cons => "cons",
            Car => "car",
            Cdr => "cdr",
            StrCat => "str-cat",
            StrEq => "str=",
            StrCmp => "str-cmp",
            StrSubstr => "substr",
            Intern => "intern",
            RawEq => "eq?",
            NumEq => "=",
            SymEq => "sym=",
            IsNil => "nil?",
            Apply => "apply",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "mod",
            Min => "min",
            Max => "max",
            Abs => "abs",
            Sqrt => "sqrt",
            Exp => "exp",
            Log => "log",
            ExactToInexact => "exact->inexact",
            InexactToExact => "inexact->exact",
            Floor => "floor",
            Ceiling => "ceiling",
            Truncate => "truncate",
            Round => "round",
            BitAnd => "bit-and",
            BitOr => "bit-or",
            BitXor => "bit-xor",
            BitNot => "bit-not",
            BitShr => "bit-shr",
            BitShl => "bit-shl",
        }
    }
}
