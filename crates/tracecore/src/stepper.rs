//! The code hook that turns single-stepped execution into the JSON
//! snapshot sequence: budget enforcement, instruction text, the canonical
//! register file, and a fault-tolerant stack window, one entry per
//! instruction retired.

use unicorn_engine::Unicorn;

use crate::context::RunContext;
use crate::regs::{self, pc_sp};
use crate::types::{hex, RegisterSnapshot, Snapshot, StackWord};

fn read_bytes(uc: &Unicorn<RunContext>, addr: u64, len: usize) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; len];
    uc.mem_read(addr, &mut buf).ok()?;
    Some(buf)
}

/// Code hook registered over the full address range. Stops the emulator
/// without recording anything once the step budget is spent, so the final
/// snapshot count never exceeds `max_steps`.
pub fn code_hook(uc: &mut Unicorn<RunContext>, address: u64, size: u32) {
    let data = uc.get_data();
    if data.step_counter >= data.max_steps {
        let _ = uc.emu_stop();
        return;
    }

    let arch_bits = data.arch_bits;
    let word_size = data.word_size;
    let stack_entries = data.stack_entries;
    // `step` is the 1-based monotonic step number: `snapshot[k].step == k`
    // for 1 <= k <= len.
    let step = data.step_counter + 1;
    let disassembler = data.disassembler.clone();
    uc.get_data_mut().step_counter += 1;

    // A real x86/x86-64 instruction never exceeds 15 bytes; the cap is
    // defensive only; `size == 0` reads nothing at all, matching the
    // "(no bytes)" case below exactly rather than forcing a 1-byte read.
    let bytes = if size == 0 {
        Vec::new()
    } else {
        read_bytes(uc, address, (size as usize).min(16)).unwrap_or_default()
    };

    let instr = match disassembler
        .as_ref()
        .and_then(|d| d.disassemble(&bytes, address, arch_bits))
    {
        Some(text) => text,
        None if !bytes.is_empty() => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
        None => "(no bytes)".to_string(),
    };

    let (_, sp_reg) = pc_sp(arch_bits);
    let sp = uc.reg_read(sp_reg).unwrap_or(0);

    let registers = regs::order_for(arch_bits)
        .iter()
        .enumerate()
        .map(|(pos, (name, reg))| RegisterSnapshot {
            name,
            value: hex(uc.reg_read(*reg).unwrap_or(0)),
            pos,
        })
        .collect();

    // Atomic, all-or-nothing: a single read over the whole window. A fault
    // anywhere in it drops the entire stack list rather than keeping
    // whatever words happened to come before it.
    let mut stack = Vec::new();
    if let Some(window) = read_bytes(uc, sp, stack_entries as usize * word_size as usize) {
        for id in 0..stack_entries {
            let offset = id as usize * word_size as usize;
            let mut word = [0u8; 8];
            word[..word_size as usize].copy_from_slice(&window[offset..offset + word_size as usize]);
            stack.push(StackWord {
                id: id as usize,
                addr: hex(sp + (id as u64) * word_size),
                pos: (id as u64 * word_size) as usize,
                size: word_size,
                value: hex(u64::from_le_bytes(word)),
            });
        }
    }

    let snapshot = Snapshot {
        step,
        rip: hex(address),
        rsp: hex(sp),
        instr,
        registers,
        stack,
        file: None,
        line: None,
        func: None,
    };
    uc.get_data_mut().snapshots.push(snapshot);
}
