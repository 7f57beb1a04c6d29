//! VM state management: register stacks, threads and the VM instance.

use eris_common::{Heap, Value};
use log::warn;

use crate::config::{VmConfig, WINDOW_SIZE};
use crate::error::Trap;
use crate::execute;
use crate::frame::ControlStack;

/// A thread's register stack. Each activation sees a window of
/// [`WINDOW_SIZE`] slots starting at its base; a callee's window starts at
/// the caller's argument offset, so arguments are passed without copying.
#[derive(Debug, Clone)]
pub struct RegisterStack {
    slots: Vec<Value>,
}

impl RegisterStack {
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![Value::NIL; size],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Trap unless a full window starting at `base` fits.
    pub fn check_window(&self, base: usize, at: usize) -> Result<(), Trap> {
        let needed = base.saturating_add(WINDOW_SIZE);
        if needed > self.slots.len() {
            return Err(Trap::RegisterOverflow {
                at,
                needed,
                capacity: self.slots.len(),
            });
        }
        Ok(())
    }

    /// The window at `base`. Panics unless [`check_window`](Self::check_window)
    /// accepted `base`.
    pub fn window(&self, base: usize) -> &[Value] {
        &self.slots[base..base + WINDOW_SIZE]
    }

    pub fn window_mut(&mut self, base: usize) -> &mut [Value] {
        &mut self.slots[base..base + WINDOW_SIZE]
    }

    /// Every slot, for inspection and root scanning.
    pub fn slots(&self) -> &[Value] {
        &self.slots
    }
}

/// The registers the dispatch loop keeps in locals while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VmState {
    /// Word index into the current closure's code.
    pub ip: usize,
    /// Register window base.
    pub base: usize,
    /// The closure whose code is running.
    pub closure: Value,
}

/// An execution context: one register stack, one control stack.
#[derive(Debug, Clone)]
pub struct Thread {
    pub registers: RegisterStack,
    pub control: ControlStack,
    /// Last published state. The dispatch loop writes it back before
    /// allocating and when it exits.
    pub state: VmState,
    in_use: bool,
}

impl Thread {
    pub fn new(config: &VmConfig) -> Self {
        Self {
            registers: RegisterStack::new(config.register_stack_size),
            control: ControlStack::new(config.control_stack_depth),
            state: VmState::default(),
            in_use: false,
        }
    }

    /// True while a call is running on this thread.
    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    /// Discard all pending frames after a trap.
    fn unwind(&mut self) {
        self.control.clear();
        self.state = VmState::default();
    }
}

/// One VM instance: a heap shared by any number of threads.
#[derive(Debug)]
pub struct Vm {
    pub heap: Heap,
    config: VmConfig,
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        let mut heap = Heap::new();
        heap.set_limit(config.heap_limit);
        Self { heap, config }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn new_thread(&self) -> Thread {
        Thread::new(&self.config)
    }

    /// Call `callee` with `args` on `thread` and return its result.
    ///
    /// The arguments are copied into the bottom of the thread's register
    /// stack and a native-call frame is pushed, so the callee's final
    /// RETURN hands control back here. On a trap the thread's frames are
    /// discarded and the thread is released.
    pub fn call(&mut self, thread: &mut Thread, callee: Value, args: &[Value]) -> Result<Value, Trap> {
        let (heap, config) = (&mut self.heap, &self.config);
        occupy(thread, |thread| {
            execute::call_value(heap, thread, callee, args, config)
        })
    }

    /// Resume the dispatch loop from the thread's published state.
    ///
    /// The embedder is responsible for the contract [`call`](Self::call)
    /// establishes: arguments in the window, a native-call frame on top of
    /// the control stack, and a closure matching the instruction pointer.
    ///
    /// This is the only way in: the dispatch loop itself is not exported,
    /// so every resumed run gets the in-use guard and the unwind on a trap.
    ///
    /// ```compile_fail
    /// use eris_vm::execute::run;
    /// ```
    pub fn run(&mut self, thread: &mut Thread) -> Result<Value, Trap> {
        let (heap, config) = (&mut self.heap, &self.config);
        occupy(thread, |thread| execute::run(heap, thread, config))
    }
}

/// Mark `thread` busy for the duration of `f`, unwinding it on a trap.
fn occupy(
    thread: &mut Thread,
    f: impl FnOnce(&mut Thread) -> Result<Value, Trap>,
) -> Result<Value, Trap> {
    if thread.in_use {
        return Err(Trap::ThreadInUse { at: thread.state.ip });
    }
    thread.in_use = true;
    let result = f(thread);
    thread.in_use = false;
    if let Err(trap) = &result {
        warn!("{} terminated the run: {}", trap.kind(), trap);
        thread.unwind();
    }
    result
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}
