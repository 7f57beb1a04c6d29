//! Eris verifier: static checks over bytecode and proto graphs.
//!
//! The verifier checks code for well-formedness BEFORE it runs, so the
//! dispatch loop can trust what it fetches. It collects ALL errors (not
//! just the first) and returns them.
//!
//! # Usage
//!
//! ```
//! use eris_common::{CodeBuilder, Heap, Proto};
//! use eris_verifier::verify;
//!
//! let mut heap = Heap::new();
//! let mut code = CodeBuilder::new();
//! code.load_int(1, 42).ret(1);
//! let proto = heap.new_proto(Proto::new(code.finish(), 0, 0)).unwrap();
//! let closure = heap.new_closure(proto, vec![]).unwrap();
//!
//! assert!(verify(&heap, closure).is_ok());
//! ```
//!
//! # Passes
//!
//! 1. **Structural**: every instruction decodes, CLOSE operand streams fit,
//!    call arguments fit a register window, code ends in a terminator
//! 2. **Control**: jumps land on instructions, IF/IFNOT pair with a JUMP
//! 3. **Upvals**: upval indices, CLOSE targets and capture counts

pub mod control;
pub mod error;
pub mod structural;
pub mod upvals;

pub use error::{Diagnostic, VerifyError};

use std::collections::HashSet;

use eris_common::{Heap, Proto, Value};

/// Verify a closure or proto and every proto reachable through local
/// functions.
///
/// Returns `Ok(())` if everything passes, or every error found, each
/// tagged with the object it was found in.
pub fn verify(heap: &Heap, root: Value) -> Result<(), Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();
    let mut seen = HashSet::new();
    let mut pending = Vec::new();

    if let Ok(closure) = heap.as_closure(root) {
        match heap.as_proto(closure.proto) {
            Ok(proto) => {
                if closure.upvals.len() != proto.num_upvals as usize {
                    diagnostics.push(Diagnostic {
                        object: root,
                        error: VerifyError::ClosureUpvalCount {
                            expected: proto.num_upvals,
                            found: closure.upvals.len(),
                        },
                    });
                }
                let errors = verify_proto(heap, proto, Some(closure.upvals.as_slice()));
                diagnostics.extend(tagged(closure.proto, errors));
                seen.insert(closure.proto);
                pending.extend(proto.local_funcs.iter().copied());
            }
            Err(err) => diagnostics.push(Diagnostic {
                object: closure.proto,
                error: VerifyError::InvalidRoot { found: err.found },
            }),
        }
    } else if heap.as_proto(root).is_ok() {
        pending.push(root);
    } else {
        diagnostics.push(Diagnostic {
            object: root,
            error: VerifyError::InvalidRoot {
                found: heap.shape_of(root),
            },
        });
    }

    // Local functions that are not protos are reported at their CLOSE.
    while let Some(value) = pending.pop() {
        let Ok(proto) = heap.as_proto(value) else {
            continue;
        };
        if !seen.insert(value) {
            continue;
        }
        let errors = verify_proto(heap, proto, None);
        diagnostics.extend(tagged(value, errors));
        pending.extend(proto.local_funcs.iter().copied());
    }

    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

fn tagged(object: Value, errors: Vec<VerifyError>) -> impl Iterator<Item = Diagnostic> {
    errors
        .into_iter()
        .map(move |error| Diagnostic { object, error })
}

/// Verify one proto's code against its own upval count and local
/// functions. `captured` holds the upvals of a closure over `proto`, when
/// there is one.
///
/// If the structural pass finds a truncated operand stream, the
/// control-flow pass is skipped.
pub fn verify_proto(heap: &Heap, proto: &Proto, captured: Option<&[Value]>) -> Vec<VerifyError> {
    let (map, mut errors) = structural::check_structural(&proto.code);
    if !map.fatal {
        errors.extend(control::check_control(&map));
    }
    errors.extend(upvals::check_upvals(heap, proto, captured, &map));
    errors
}

/// Verify a bare code stream: the structural and control-flow passes only.
pub fn verify_code(code: &[u32]) -> Result<(), Vec<VerifyError>> {
    let (map, mut errors) = structural::check_structural(code);
    if !map.fatal {
        errors.extend(control::check_control(&map));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
