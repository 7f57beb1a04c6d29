//! Runtime value representation for the Eris VM.
//!
//! Every value is a handle to a heap object; there are no unboxed
//! immediates. Integers are boxed `num` objects.

use std::fmt;

/// A handle to an object in a [`Heap`](crate::heap::Heap).
///
/// Handles are plain indices into the heap's object table, so they stay
/// valid if a collector later moves objects. Two values are identical iff
/// their handles are equal; this is the `RAW_EQ` relation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u32);

impl Value {
    /// The nil singleton. Every heap reserves slot 0 for it.
    pub const NIL: Value = Value(0);

    pub(crate) fn from_index(index: u32) -> Self {
        Value(index)
    }

    /// Slot index of the object in its heap.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Identity comparison against the nil singleton.
    pub fn is_nil(self) -> bool {
        self == Value::NIL
    }

    /// The truth rule: nil is false, everything else is true.
    pub fn is_truthy(self) -> bool {
        !self.is_nil()
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::NIL
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            f.write_str("Value(nil)")
        } else {
            write!(f, "Value(#{})", self.0)
        }
    }
}
