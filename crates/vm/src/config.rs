//! Resource limits for one VM instance.

/// Registers addressable by one instruction: ARG fields are 8 bits wide.
pub const WINDOW_SIZE: usize = 256;

/// Default capacity of a thread's register stack, in slots.
pub const DEFAULT_REGISTER_STACK_SIZE: usize = 65_536;

/// Default capacity of a thread's control stack, in frames.
pub const DEFAULT_CONTROL_STACK_DEPTH: usize = 16_384;

/// Limits applied to every thread and every run of a [`Vm`](crate::Vm).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Slots in each thread's register stack. A call traps with
    /// `RegisterOverflow` if the callee's full window would not fit.
    pub register_stack_size: usize,
    /// Frames in each thread's control stack.
    pub control_stack_depth: usize,
    /// Byte budget for the heap; `None` is unbounded.
    pub heap_limit: Option<usize>,
    /// Instructions one run may execute; `None` is unbounded.
    pub instruction_budget: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            register_stack_size: DEFAULT_REGISTER_STACK_SIZE,
            control_stack_depth: DEFAULT_CONTROL_STACK_DEPTH,
            heap_limit: None,
            instruction_budget: None,
        }
    }
}

impl VmConfig {
    pub fn with_register_stack_size(mut self, slots: usize) -> Self {
        self.register_stack_size = slots;
        self
    }

    pub fn with_control_stack_depth(mut self, frames: usize) -> Self {
        self.control_stack_depth = frames;
        self
    }

    pub fn with_heap_limit(mut self, bytes: usize) -> Self {
        self.heap_limit = Some(bytes);
        self
    }

    pub fn with_instruction_budget(mut self, instructions: u64) -> Self {
        self.instruction_budget = Some(instructions);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = VmConfig::default();
        assert_eq!(config.register_stack_size, 65_536);
        assert_eq!(config.control_stack_depth, 16_384);
        assert_eq!(config.heap_limit, None);
        assert_eq!(config.instruction_budget, None);
    }

    #[test]
    fn builders_compose() {
        let config = VmConfig::default()
            .with_register_stack_size(1024)
            .with_control_stack_depth(8)
            .with_heap_limit(4096)
            .with_instruction_budget(100);
        assert_eq!(config.register_stack_size, 1024);
        assert_eq!(config.control_stack_depth, 8);
        assert_eq!(config.heap_limit, Some(4096));
        assert_eq!(config.instruction_budget, Some(100));
    }
}
