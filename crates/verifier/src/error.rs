//! Verification errors for the Eris verifier.
//!
//! Code-level errors carry the word index (`at`) of the offending
//! instruction. The verifier collects all errors, not just the first.

use eris_common::{DecodeError, Shape, Value};
use thiserror::Error;

/// Errors found in one proto's code or in a closure's captures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    // --- Structural ---
    /// A word that should start an instruction does not decode, or a CLOSE
    /// operand stream runs off the end of the code.
    #[error("invalid instruction at word {at}: {source}")]
    InvalidInstruction { at: usize, source: DecodeError },

    /// The last instruction can fall through past the end of the code.
    #[error("code does not end in RETURN, JUMP or TAILCALL (last instruction at word {at})")]
    MissingTerminator { at: usize },

    /// The call's argument registers do not fit in one register window.
    #[error("{nargs} arguments from r{off} at word {at} run past the register window")]
    ArgumentsOutOfWindow { at: usize, off: u8, nargs: u8 },

    // --- Control flow ---
    /// IF or IFNOT without the JUMP that must follow it.
    #[error("conditional at word {at} is not followed by JUMP")]
    MissingJump { at: usize },

    /// A JUMP leaves the code.
    #[error("jump at word {at} targets {target}, outside 0..{len}")]
    JumpOutOfRange { at: usize, target: isize, len: usize },

    /// A JUMP lands inside a CLOSE operand stream.
    #[error("jump at word {at} targets word {target}, which is not an instruction")]
    JumpIntoOperands { at: usize, target: usize },

    // --- Captures ---
    /// An upval index at or past the proto's upval count.
    #[error("upval {index} at word {at} out of range (proto has {num_upvals})")]
    UpvalOutOfRange { at: usize, index: u8, num_upvals: u8 },

    /// A CLOSE names a local function the proto does not have.
    #[error("local function {index} at word {at} out of range (proto has {len})")]
    LocalFuncOutOfRange { at: usize, index: u8, len: usize },

    /// A CLOSE names a local function that is not a proto.
    #[error("local function {index} at word {at} is a {found}, not a proto")]
    LocalFuncNotProto { at: usize, index: u8, found: Shape },

    /// A CLOSE captures a different number of values than its target needs.
    #[error("CLOSE at word {at} captures {found} values, target proto needs {expected}")]
    CaptureCountMismatch { at: usize, expected: u8, found: usize },

    /// LOAD_CELL or a cell call reads an upval that is not a cell.
    #[error("upval {index} used as a cell at word {at} holds a {found}")]
    NotACell { at: usize, index: u8, found: Shape },

    // --- Graph ---
    /// A closure's captured upvals disagree with its proto.
    #[error("closure has {found} upvals, its proto needs {expected}")]
    ClosureUpvalCount { expected: u8, found: usize },

    /// The object handed to the verifier is neither a closure nor a proto.
    #[error("expected a closure or proto, found {found}")]
    InvalidRoot { found: Shape },
}

/// A [`VerifyError`] together with the object it was found in: the proto
/// whose code is wrong, or the closure whose captures are.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("object #{}: {error}", .object.index())]
pub struct Diagnostic {
    pub object: Value,
    pub error: VerifyError,
}
