//! Control stack: one frame per pending non-tail call.

use eris_common::Value;

use crate::error::Trap;

/// A pending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Bytecode called bytecode. The caller resumes one past `return_ip`,
    /// and its register window is recovered from the ARG2 (argument offset)
    /// of the call instruction at `return_ip`.
    Call { return_ip: usize, closure: Value },
    /// Native code called into the VM. Returning through this frame leaves
    /// the dispatch loop.
    NativeCall {
        /// The native closure making the call, if there is one.
        closure: Option<Value>,
        /// Register window base of the native caller.
        base: usize,
    },
}

/// A bounded stack of frames.
#[derive(Debug, Clone)]
pub struct ControlStack {
    frames: Vec<Frame>,
    limit: usize,
}

impl ControlStack {
    pub fn new(limit: usize) -> Self {
        Self {
            frames: Vec::new(),
            limit,
        }
    }

    /// Push a frame, or trap if the stack is full.
    pub fn push(&mut self, frame: Frame, at: usize) -> Result<(), Trap> {
        if self.frames.len() >= self.limit {
            return Err(Trap::ControlOverflow {
                at,
                limit: self.limit,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop(&mut self, at: usize) -> Result<Frame, Trap> {
        self.frames.pop().ok_or(Trap::ControlUnderflow { at })
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Number of pending frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Discard every frame.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Frames from oldest to newest. A collector would scan these as roots.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}
