//! Shared data types: [`TraceConfig`], the miniature ELF descriptors, and the
//! [`Snapshot`] / [`TraceResult`] shapes returned to callers.

use serde::{Deserialize, Serialize};

/// Formats an address as a lowercase `0x`-prefixed hex string, matching the
/// JSON shape mandated for every address-valued field.
pub fn hex(value: u64) -> String {
    format!("{:#x}", value)
}

/// Immutable input to [`crate::driver::TraceDriver::trace`]. Never mutated by
/// the core; the raw-path and ELF-path clamps described in the design notes
/// produce a fresh, adjusted `TraceConfig` rather than mutating this one.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub base: u64,
    pub stack_base: u64,
    pub stack_size: u64,
    pub max_steps: u64,
    pub stack_entries: u32,
    pub arch_bits: u8,
    pub interp_base: u64,
    pub start_interp: bool,
    pub stdin_data: Vec<u8>,
    pub buffer_offset: Option<i64>,
    pub buffer_size: u64,
    pub start_symbol: Option<String>,
}

impl TraceConfig {
    /// Documented defaults: `base=0x400000`, `stack_base=0x7ffffffde000`,
    /// 128 KiB stack, 200 steps, 24 captured stack words, 64-bit.
    pub fn defaults_64() -> Self {
        Self {
            base: 0x400000,
            stack_base: 0x7ffffffde000,
            stack_size: 0x20000,
            max_steps: 200,
            stack_entries: 24,
            arch_bits: 64,
            interp_base: 0x7f0000000000,
            start_interp: false,
            stdin_data: Vec::new(),
            buffer_offset: None,
            buffer_size: 0,
            start_symbol: None,
        }
    }

    /// Same defaults, but for a 32-bit raw image (different interpreter base).
    pub fn defaults_32() -> Self {
        Self {
            arch_bits: 32,
            interp_base: 0x70000000,
            ..Self::defaults_64()
        }
    }

    pub fn word_size(&self) -> u64 {
        if self.arch_bits == 64 {
            8
        } else {
            4
        }
    }
}

/// Essential fields of an ELF header, independent of 32/64-bit class.
#[derive(Debug, Clone, Copy)]
pub struct ElfHeader {
    pub class: u8,
    pub elf_type: u16,
    pub machine: u16,
    pub entry: u64,
    pub phoff: u64,
    pub phentsize: u16,
    pub phnum: u16,
}

pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;
pub const EM_386: u16 = 3;
pub const EM_X86_64: u16 = 62;

/// A single ELF program header, class-normalized to 64-bit-wide fields.
#[derive(Debug, Clone, Copy)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub flags: u32,
    pub align: u64,
}

pub const PT_LOAD: u32 = 1;
pub const PT_INTERP: u32 = 3;

/// A single general-purpose register captured at a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterSnapshot {
    pub name: &'static str,
    pub value: String,
    pub pos: usize,
}

/// A single word-sized stack slot captured at a step, addressed from SP
/// upward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackWord {
    pub id: usize,
    pub addr: String,
    pub pos: usize,
    pub size: u64,
    pub value: String,
}

/// Immutable per-step record. Registers and stack reflect machine state
/// *before* the instruction at `rip` retires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub step: u64,
    pub rip: String,
    pub rsp: String,
    pub instr: String,
    pub registers: Vec<RegisterSnapshot>,
    pub stack: Vec<StackWord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
}

/// Run-level metadata returned alongside the snapshot sequence.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TraceMeta {
    pub steps: u64,
    pub error: Option<String>,
    pub base: String,
    pub stack_base: String,
    pub stack_size: u64,
    pub arch_bits: u8,
    pub word_size: u64,
    pub buffer_offset: Option<i64>,
    pub buffer_size: u64,
    pub stdin_len: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elf_entry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elf_pie: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elf_interp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elf_interp_started: Option<bool>,
}

/// The full result of a single `trace()` invocation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TraceResult {
    pub snapshots: Vec<Snapshot>,
    pub meta: TraceMeta,
}
