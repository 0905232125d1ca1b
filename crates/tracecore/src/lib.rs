//! Single-stepping x86/x86-64 trace engine: loads a raw or ELF image into a
//! fresh Unicorn-backed address space, builds a System-V-compatible initial
//! stack, intercepts a narrow `sys_read` syscall surface, and records a
//! per-instruction JSON-ready snapshot until a fault or an instruction
//! budget ends the run.

pub mod address_space;
pub mod context;
pub mod driver;
pub mod elf;
pub mod engine;
pub mod error;
pub mod helpers;
pub mod regs;
pub mod source_map;
pub mod stack;
pub mod stepper;
pub mod symbol;
pub mod syscall;
pub mod types;

pub use driver::{trace, TraceDriver};
pub use error::{Result, TraceError};
pub use helpers::{Addr2LineTool, Disassembler, IcedDisassembler, LineTool, NmSymbolTool, SymbolTool};
pub use types::{
    hex, ElfHeader, ProgramHeader, RegisterSnapshot, Snapshot, StackWord, TraceConfig, TraceMeta,
    TraceResult,
};
