//! Thin adapter around `unicorn_engine::Unicorn`, the Rust binding for the
//! Unicorn CPU emulator. Keeps FFI-error conversion and the handful of
//! operations the rest of the core needs in one place, rather than touching
//! the raw emulator handle from every call site.

use std::sync::Arc;

use unicorn_engine::unicorn_const::{Arch, InsnSysX86, Mode, Permission};
use unicorn_engine::{RegisterX86, Unicorn};

use crate::context::RunContext;
use crate::error::{Result, TraceError};

fn uc_err(action: &str, err: unicorn_engine::uc_error) -> TraceError {
    TraceError::EmulationError(format!("{action}: {err:?}"))
}

/// Owns one emulator instance for the duration of a single `trace()` call.
pub struct Engine<'a> {
    pub uc: Unicorn<'a, RunContext>,
}

impl<'a> Engine<'a> {
    pub fn new(arch_bits: u8, data: RunContext) -> Result<Self> {
        let mode = if arch_bits == 64 {
            Mode::MODE_64
        } else {
            Mode::MODE_32
        };
        let uc = Unicorn::new_with_data(Arch::X86, mode, data)
            .map_err(|e| uc_err("create engine", e))?;
        Ok(Self { uc })
    }

    pub fn map(&mut self, addr: u64, size: usize) -> Result<()> {
        self.uc
            .mem_map(addr, size, Permission::ALL)
            .map_err(|e| uc_err("map memory", e))
    }

    pub fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<()> {
        self.uc
            .mem_write(addr, bytes)
            .map_err(|e| uc_err("write memory", e))
    }

    pub fn read(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.uc
            .mem_read(addr, &mut buf)
            .map_err(|e| uc_err("read memory", e))?;
        Ok(buf)
    }

    pub fn reg_write(&mut self, reg: RegisterX86, value: u64) -> Result<()> {
        self.uc
            .reg_write(reg, value)
            .map_err(|e| uc_err("write register", e))
    }

    pub fn reg_read(&self, reg: RegisterX86) -> Result<u64> {
        self.uc
            .reg_read(reg)
            .map_err(|e| uc_err("read register", e))
    }

    /// Installs the Stepper's code hook, the SyscallBridge's interrupt hook,
    /// and (64-bit only) its `syscall` instruction hook, over the full
    /// address range so they fire regardless of where execution lands.
    pub fn install_hooks(
        &mut self,
        code_hook: impl FnMut(&mut Unicorn<RunContext>, u64, u32) + 'a,
        intr_hook: impl FnMut(&mut Unicorn<RunContext>, u32) + 'a,
        syscall_hook: Option<impl FnMut(&mut Unicorn<RunContext>) + 'a>,
    ) -> Result<()> {
        self.uc
            .add_code_hook(1, 0, code_hook)
            .map_err(|e| uc_err("install code hook", e))?;
        self.uc
            .add_intr_hook(intr_hook)
            .map_err(|e| uc_err("install interrupt hook", e))?;
        if let Some(hook) = syscall_hook {
            self.uc
                .add_insn_sys_hook(InsnSysX86::SYSCALL, 1, 0, hook)
                .map_err(|e| uc_err("install syscall hook", e))?;
        }
        Ok(())
    }

    /// Starts emulation at `begin`, stopping at `until` (exclusive) or when
    /// a hook calls `emu_stop`. Returns `Ok(())` on a clean stop; on fault
    /// returns the raw emulator error text, which the driver surfaces as
    /// `meta.error` without treating the run as a hard failure — snapshots
    /// captured so far are retained either way.
    pub fn start(&mut self, begin: u64, until: u64) -> std::result::Result<(), String> {
        self.uc
            .emu_start(begin, until, 0, 0)
            .map_err(|e| format!("{e:?}"))
    }

    pub fn data(&self) -> &RunContext {
        self.uc.get_data()
    }
}

impl RunContext {
    /// Produces the pieces the driver needs once the run has ended, without
    /// requiring ownership of the (non-`Clone`) emulator handle.
    pub fn clone_for_result(&self) -> RunContext {
        RunContext {
            step_counter: self.step_counter,
            max_steps: self.max_steps,
            arch_bits: self.arch_bits,
            word_size: self.word_size,
            stack_entries: self.stack_entries,
            stdin_data: Vec::new(),
            stdin_pos: self.stdin_pos,
            snapshots: self.snapshots.clone(),
            disassembler: self.disassembler.as_ref().map(Arc::clone),
        }
    }
}
