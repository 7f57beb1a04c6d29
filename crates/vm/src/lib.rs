//! Eris virtual machine: executes closures over register-based bytecode.
//!
//! The VM is a register machine with:
//! - A register stack per thread, seen by each activation as a 256-slot
//!   window whose base moves up by the argument offset on every call
//! - A control stack of pending calls, bytecode-to-bytecode or
//!   native-to-bytecode
//! - Proper tail calls that reuse the caller's frame
//! - A builtin table dispatched in place against the caller's registers
//!
//! # Usage
//!
//! ```
//! use eris_common::{CodeBuilder, Proto};
//! use eris_vm::Vm;
//!
//! let mut vm = Vm::default();
//! let mut code = CodeBuilder::new();
//! code.load_int(1, 42).ret(1);
//! let proto = vm.heap.new_proto(Proto::new(code.finish(), 0, 0)).unwrap();
//! let closure = vm.heap.new_closure(proto, vec![]).unwrap();
//!
//! let mut thread = vm.new_thread();
//! let result = vm.call(&mut thread, closure, &[]).unwrap();
//! assert_eq!(vm.heap.as_num(result).unwrap().as_i64(), Some(42));
//! ```

pub mod builtins;
pub mod config;
pub mod error;
pub(crate) mod execute;
pub mod frame;
pub mod machine;

pub use config::VmConfig;
pub use error::{Feature, Trap};
pub use frame::{ControlStack, Frame};
pub use machine::{RegisterStack, Thread, Vm, VmState};
