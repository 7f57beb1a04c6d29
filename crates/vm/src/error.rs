//! Traps raised by the Eris VM.
//!
//! A trap ends the running invocation: there is no handler mechanism, so
//! the thread's control stack is discarded and the trap is handed back to
//! the embedder. Every variant carries the instruction index (`at`, a word
//! offset into the code of the closure that was running) for debugging.

use std::fmt;

use eris_common::{
    ClosureError, DecodeError, NumError, OutOfMemory, Shape, Signature, TypeError,
};
use thiserror::Error;

/// Features that exist in the instruction set or object model but have no
/// execution semantics yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Calling a closure whose proto is variadic.
    VariadicCall,
    /// Calling a native closure.
    NativeCall,
    /// The RAISE and HANDLE instructions.
    Exceptions,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Feature::VariadicCall => "variadic call",
            Feature::NativeCall => "native closure call",
            Feature::Exceptions => "exceptions",
        })
    }
}

/// Errors that terminate a VM run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    /// A value's shape did not match what an operation required.
    #[error("type error at instruction {at}: expected {expected}, got {found}")]
    Type {
        at: usize,
        expected: Shape,
        found: Shape,
    },

    /// Argument count did not match the callee's declared arity.
    #[error("arity error at instruction {at}: expected {expected} arguments, got {found}")]
    Arity {
        at: usize,
        expected: Signature,
        found: usize,
    },

    /// Dereferenced a cell holding no value.
    #[error("undefined reference to {} at instruction {at}", .name.as_deref().unwrap_or("anonymous cell"))]
    UndefinedCell { at: usize, name: Option<String> },

    /// The allocator facade refused an allocation.
    #[error("out of memory at instruction {at}: {requested} bytes requested, limit {limit}")]
    OutOfMemory {
        at: usize,
        requested: usize,
        limit: usize,
    },

    #[error("unimplemented at instruction {at}: {feature}")]
    Unimplemented { at: usize, feature: Feature },

    /// A register window would extend past the end of the register stack.
    #[error("register stack overflow at instruction {at}: window ends at {needed}, capacity {capacity}")]
    RegisterOverflow {
        at: usize,
        needed: usize,
        capacity: usize,
    },

    #[error("control stack overflow at instruction {at}: depth limit {limit}")]
    ControlOverflow { at: usize, limit: usize },

    /// RETURN with no frame to return to.
    #[error("control stack underflow at instruction {at}")]
    ControlUnderflow { at: usize },

    #[error("invalid instruction at {at}: {source}")]
    InvalidInstruction { at: usize, source: DecodeError },

    /// Code that decodes but breaks an encoding contract.
    #[error("malformed code at instruction {at}: {reason}")]
    MalformedCode { at: usize, reason: &'static str },

    #[error("division by zero at instruction {at}")]
    DivisionByZero { at: usize },

    /// A numeric argument outside an operation's domain.
    #[error("domain error at instruction {at}: {reason}")]
    Domain { at: usize, reason: &'static str },

    #[error("index {index} out of range (length {len}) at instruction {at}")]
    IndexOutOfRange { at: usize, index: i64, len: usize },

    #[error("instruction budget of {budget} exhausted at instruction {at}")]
    BudgetExhausted { at: usize, budget: u64 },

    /// The thread is already running a call.
    #[error("thread already in use")]
    ThreadInUse { at: usize },
}

impl Trap {
    /// Instruction index where the trap occurred.
    pub fn at(&self) -> usize {
        match self {
            Trap::Type { at, .. }
            | Trap::Arity { at, .. }
            | Trap::UndefinedCell { at, .. }
            | Trap::OutOfMemory { at, .. }
            | Trap::Unimplemented { at, .. }
            | Trap::RegisterOverflow { at, .. }
            | Trap::ControlOverflow { at, .. }
            | Trap::ControlUnderflow { at }
            | Trap::InvalidInstruction { at, .. }
            | Trap::MalformedCode { at, .. }
            | Trap::DivisionByZero { at }
            | Trap::Domain { at, .. }
            | Trap::IndexOutOfRange { at, .. }
            | Trap::BudgetExhausted { at, .. }
            | Trap::ThreadInUse { at } => *at,
        }
    }

    /// Out-of-memory is recoverable in principle; every other trap is a
    /// logic error in the running program or the embedder.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Trap::OutOfMemory { .. })
    }

    /// Short name of the error kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Trap::Type { .. } => "type error",
            Trap::Arity { .. } => "arity error",
            Trap::UndefinedCell { .. } => "undefined reference",
            Trap::OutOfMemory { .. } => "out of memory",
            Trap::Unimplemented { .. } => "unimplemented",
            Trap::RegisterOverflow { .. } => "register stack overflow",
            Trap::ControlOverflow { .. } => "control stack overflow",
            Trap::ControlUnderflow { .. } => "control stack underflow",
            Trap::InvalidInstruction { .. } => "invalid instruction",
            Trap::MalformedCode { .. } => "malformed code",
            Trap::DivisionByZero { .. } => "division by zero",
            Trap::Domain { .. } => "domain error",
            Trap::IndexOutOfRange { .. } => "index out of range",
            Trap::BudgetExhausted { .. } => "budget exhausted",
            Trap::ThreadInUse { .. } => "thread in use",
        }
    }
}

/// Attach an instruction index to a lower-level error.
pub(crate) trait TrapAt<T> {
    fn at(self, at: usize) -> Result<T, Trap>;
}

impl<T> TrapAt<T> for Result<T, TypeError> {
    fn at(self, at: usize) -> Result<T, Trap> {
        self.map_err(|TypeError { expected, found }| Trap::Type {
            at,
            expected,
            found,
        })
    }
}

impl<T> TrapAt<T> for Result<T, OutOfMemory> {
    fn at(self, at: usize) -> Result<T, Trap> {
        self.map_err(|OutOfMemory { requested, limit }| Trap::OutOfMemory {
            at,
            requested,
            limit,
        })
    }
}

impl<T> TrapAt<T> for Result<T, ClosureError> {
    fn at(self, at: usize) -> Result<T, Trap> {
        self.map_err(|e| match e {
            ClosureError::Type(TypeError { expected, found }) => Trap::Type {
                at,
                expected,
                found,
            },
            ClosureError::UpvalCount { .. } => Trap::MalformedCode {
                at,
                reason: "capture count differs from the proto's upvals",
            },
            ClosureError::OutOfMemory(OutOfMemory { requested, limit }) => Trap::OutOfMemory {
                at,
                requested,
                limit,
            },
        })
    }
}

impl<T> TrapAt<T> for Result<T, NumError> {
    fn at(self, at: usize) -> Result<T, Trap> {
        self.map_err(|e| match e {
            NumError::DivisionByZero => Trap::DivisionByZero { at },
            NumError::NotAnInteger => Trap::Domain {
                at,
                reason: "integer required",
            },
            NumError::Domain(reason) => Trap::Domain { at, reason },
        })
    }
}

impl<T> TrapAt<T> for Result<T, DecodeError> {
    fn at(self, at: usize) -> Result<T, Trap> {
        self.map_err(|source| match source {
            DecodeError::ReservedOpcode(_) => Trap::Unimplemented {
                at,
                feature: Feature::Exceptions,
            },
            source => Trap::InvalidInstruction { at, source },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        assert_eq!(
            Trap::DivisionByZero { at: 5 }.to_string(),
            "division by zero at instruction 5"
        );
        assert_eq!(
            Trap::Arity {
                at: 2,
                expected: Signature::fixed(1),
                found: 3
            }
            .to_string(),
            "arity error at instruction 2: expected 1 arguments, got 3"
        );
        assert_eq!(
            Trap::Unimplemented {
                at: 0,
                feature: Feature::VariadicCall
            }
            .to_string(),
            "unimplemented at instruction 0: variadic call"
        );
    }

    #[test]
    fn undefined_cell_names_symbol() {
        let named = Trap::UndefinedCell {
            at: 1,
            name: Some("foo".into()),
        };
        assert_eq!(named.to_string(), "undefined reference to foo at instruction 1");
        let anon = Trap::UndefinedCell { at: 1, name: None };
        assert_eq!(
            anon.to_string(),
            "undefined reference to anonymous cell at instruction 1"
        );
    }

    #[test]
    fn out_of_memory_is_distinguished() {
        let oom: Result<(), OutOfMemory> = Err(OutOfMemory {
            requested: 32,
            limit: 16,
        });
        let trap = oom.at(7).unwrap_err();
        assert!(trap.is_out_of_memory());
        assert_eq!(trap.at(), 7);
        assert_eq!(trap.kind(), "out of memory");
        assert!(!Trap::ControlUnderflow { at: 0 }.is_out_of_memory());
    }

    #[test]
    fn reserved_opcode_is_unimplemented_exceptions() {
        let decoded: Result<(), DecodeError> = Err(DecodeError::ReservedOpcode(0x0d));
        assert_eq!(
            decoded.at(3),
            Err(Trap::Unimplemented {
                at: 3,
                feature: Feature::Exceptions
            })
        );
        let decoded: Result<(), DecodeError> = Err(DecodeError::InvalidOpcode(0xff));
        assert_eq!(decoded.at(3).unwrap_err().kind(), "invalid instruction");
    }

    #[test]
    fn num_errors_map_to_traps() {
        let r: Result<(), NumError> = Err(NumError::Domain("negative shift amount"));
        assert_eq!(
            r.at(4),
            Err(Trap::Domain {
                at: 4,
                reason: "negative shift amount"
            })
        );
    }

    #[test]
    fn closure_errors_map_to_traps() {
        let r: Result<(), ClosureError> = Err(ClosureError::UpvalCount {
            expected: 2,
            found: 1,
        });
        assert_eq!(r.at(5).unwrap_err().kind(), "malformed code");
        let r: Result<(), ClosureError> = Err(ClosureError::Type(TypeError {
            expected: Shape::Proto,
            found: Shape::Cons,
        }));
        assert_eq!(
            r.at(5),
            Err(Trap::Type {
                at: 5,
                expected: Shape::Proto,
                found: Shape::Cons
            })
        );
        let r: Result<(), ClosureError> = Err(ClosureError::OutOfMemory(OutOfMemory {
            requested: 64,
            limit: 32,
        }));
        assert!(r.at(5).unwrap_err().is_out_of_memory());
    }
}
