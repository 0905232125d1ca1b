//! Per-run mutable state, owned by the emulator's user-data slot and
//! borrowed mutably by the Stepper and SyscallBridge hooks. Modeling it this
//! way (rather than closures capturing `RefCell`s, as the source's
//! duplicated nested closures effectively did three times over) keeps
//! exactly one copy of the cursor and the snapshot list alive for the
//! run's lifetime.

use std::sync::Arc;

use crate::helpers::Disassembler;
use crate::types::Snapshot;

pub struct RunContext {
    pub step_counter: u64,
    pub max_steps: u64,
    pub arch_bits: u8,
    pub word_size: u64,
    pub stack_entries: u32,
    pub stdin_data: Vec<u8>,
    pub stdin_pos: usize,
    pub snapshots: Vec<Snapshot>,
    pub disassembler: Option<Arc<dyn Disassembler>>,
}

impl RunContext {
    pub fn new(
        arch_bits: u8,
        max_steps: u64,
        stack_entries: u32,
        stdin_data: Vec<u8>,
        disassembler: Option<Arc<dyn Disassembler>>,
    ) -> Self {
        let word_size = if arch_bits == 64 { 8 } else { 4 };
        Self {
            step_counter: 0,
            max_steps,
            arch_bits,
            word_size,
            stack_entries,
            stdin_data,
            stdin_pos: 0,
            snapshots: Vec::new(),
            disassembler,
        }
    }

    /// Copies up to `count` bytes from the injected stdin buffer, advancing
    /// the monotonic read cursor. Returns the number of bytes copied (`0`
    /// signals EOF); bytes already served are never re-served.
    pub fn take_stdin(&mut self, count: usize) -> Vec<u8> {
        let remaining = self.stdin_data.len().saturating_sub(self.stdin_pos);
        let to_copy = count.min(remaining);
        let chunk = self.stdin_data[self.stdin_pos..self.stdin_pos + to_copy].to_vec();
        self.stdin_pos += to_copy;
        chunk
    }
}
