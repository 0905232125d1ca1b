//! Integration tests exercising `tracecore::trace` end to end: raw images,
//! the instruction budget, both syscall entry points, a PIE ELF image, and
//! an ELF whose interpreter can't be loaded.

use tracecore::TraceConfig;

const NOP: u8 = 0x90;

#[test]
fn raw_nop_sled_runs_one_snapshot_per_instruction() {
    let code = vec![NOP; 32];
    let mut config = TraceConfig::defaults_64();
    config.max_steps = 5;

    let result = tracecore::trace(&code, &config, None).unwrap();
    assert_eq!(result.snapshots.len(), 5);
    assert_eq!(result.meta.steps, 5);
    for (idx, snap) in result.snapshots.iter().enumerate() {
        assert_eq!(snap.step, idx as u64 + 1);
        assert_eq!(snap.instr, "nop");
    }
}

#[test]
fn step_budget_caps_snapshot_count_even_with_more_code_available() {
    let code = vec![NOP; 1000];
    let mut config = TraceConfig::defaults_64();
    config.max_steps = 3;

    let result = tracecore::trace(&code, &config, None).unwrap();
    assert_eq!(result.snapshots.len(), 3);
}

#[test]
fn syscall_64_sys_read_populates_buffer_and_returns_byte_count() {
    let mut config = TraceConfig::defaults_64();
    config.max_steps = 6;
    config.stdin_data = b"hello world12345".to_vec(); // 16 bytes

    let buf_addr = config.stack_base + 0x1000;

    let mut code = Vec::new();
    code.extend_from_slice(&[0xB8, 0x00, 0x00, 0x00, 0x00]); // mov eax, 0 (sys_read)
    code.extend_from_slice(&[0xBF, 0x00, 0x00, 0x00, 0x00]); // mov edi, 0 (fd 0)
    code.push(0x48);
    code.push(0xBE);
    code.extend_from_slice(&buf_addr.to_le_bytes()); // movabs rsi, buf_addr
    code.push(0xBA);
    code.extend_from_slice(&16u32.to_le_bytes()); // mov edx, 16
    code.extend_from_slice(&[0x0F, 0x05]); // syscall
    code.push(NOP); // one more step to observe rax after the syscall retires

    let result = tracecore::trace(&code, &config, None).unwrap();
    assert_eq!(result.snapshots.len(), 6);

    let after_syscall = &result.snapshots[5];
    let rax = after_syscall
        .registers
        .iter()
        .find(|r| r.name == "rax")
        .unwrap();
    assert_eq!(rax.value, "0x10");
}

#[test]
fn syscall_32_int_0x80_sys_read_returns_byte_count() {
    let mut config = TraceConfig::defaults_32();
    config.stack_base = 0x6000_0000;
    config.stack_size = 0x2000;
    config.max_steps = 6;
    config.stdin_data = b"0123456789".to_vec(); // 10 bytes

    let buf_addr = (config.stack_base + 0x1000) as u32;

    let mut code = Vec::new();
    code.extend_from_slice(&[0xB8, 0x03, 0x00, 0x00, 0x00]); // mov eax, 3 (sys_read)
    code.extend_from_slice(&[0xBB, 0x00, 0x00, 0x00, 0x00]); // mov ebx, 0 (fd 0)
    code.push(0xB9);
    code.extend_from_slice(&buf_addr.to_le_bytes()); // mov ecx, buf_addr
    code.push(0xBA);
    code.extend_from_slice(&10u32.to_le_bytes()); // mov edx, 10
    code.extend_from_slice(&[0xCD, 0x80]); // int 0x80
    code.push(NOP);

    let result = tracecore::trace(&code, &config, None).unwrap();
    assert_eq!(result.snapshots.len(), 6);

    let after_syscall = &result.snapshots[5];
    let eax = after_syscall
        .registers
        .iter()
        .find(|r| r.name == "eax")
        .unwrap();
    assert_eq!(eax.value, "0xa");
}

#[test]
fn thirty_two_bit_stack_base_is_clamped_into_range_before_mapping() {
    let mut config = TraceConfig::defaults_32();
    config.stack_base = 0x7ffffffde000; // the 64-bit default; out of range for MODE_32
    config.max_steps = 1;
    let code = vec![NOP];

    let result = tracecore::trace(&code, &config, None).unwrap();
    let stack_base = u64::from_str_radix(result.meta.stack_base.trim_start_matches("0x"), 16)
        .unwrap();
    assert!(stack_base <= u32::MAX as u64);
}

/// Builds a minimal 64-bit `ET_DYN` ELF: header + one program header +
/// `nop` bytes, all described by a single `PT_LOAD` segment covering the
/// whole file at `vaddr == 0`.
fn minimal_pie_elf(nop_count: usize) -> (Vec<u8>, u64) {
    const EHDR_SIZE: u64 = 64;
    const PHDR_SIZE: u64 = 56;
    let entry_offset = EHDR_SIZE + PHDR_SIZE;
    let total_len = entry_offset as usize + nop_count;

    let mut blob = vec![0u8; total_len];
    blob[..4].copy_from_slice(b"\x7fELF");
    blob[4] = 2; // ELFCLASS64
    blob[5] = 1; // little-endian
    blob[6] = 1; // EI_VERSION
    blob[16..18].copy_from_slice(&3u16.to_le_bytes()); // ET_DYN
    blob[18..20].copy_from_slice(&62u16.to_le_bytes()); // EM_X86_64
    blob[20..24].copy_from_slice(&1u32.to_le_bytes()); // e_version
    blob[24..32].copy_from_slice(&entry_offset.to_le_bytes()); // e_entry
    blob[32..40].copy_from_slice(&EHDR_SIZE.to_le_bytes()); // e_phoff
    blob[52..54].copy_from_slice(&(EHDR_SIZE as u16).to_le_bytes()); // e_ehsize
    blob[54..56].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes()); // e_phentsize
    blob[56..58].copy_from_slice(&1u16.to_le_bytes()); // e_phnum

    let ph = EHDR_SIZE as usize;
    blob[ph..ph + 4].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
    blob[ph + 4..ph + 8].copy_from_slice(&7u32.to_le_bytes()); // rwx
    blob[ph + 8..ph + 16].copy_from_slice(&0u64.to_le_bytes()); // p_offset
    blob[ph + 16..ph + 24].copy_from_slice(&0u64.to_le_bytes()); // p_vaddr
    blob[ph + 24..ph + 32].copy_from_slice(&0u64.to_le_bytes()); // p_paddr
    blob[ph + 32..ph + 40].copy_from_slice(&(total_len as u64).to_le_bytes()); // p_filesz
    blob[ph + 40..ph + 48].copy_from_slice(&(total_len as u64).to_le_bytes()); // p_memsz
    blob[ph + 48..ph + 56].copy_from_slice(&0x1000u64.to_le_bytes()); // p_align

    for byte in &mut blob[entry_offset as usize..] {
        *byte = NOP;
    }

    (blob, entry_offset)
}

#[test]
fn pie_elf_without_interpreter_runs_from_relocated_entry() {
    let (blob, _entry_offset) = minimal_pie_elf(16);
    let mut config = TraceConfig::defaults_64();
    config.max_steps = 4;

    let result = tracecore::trace(&blob, &config, None).unwrap();
    assert_eq!(result.snapshots.len(), 4);
    assert_eq!(result.meta.elf_pie, Some(true));
    assert_eq!(result.meta.elf_interp, None);
    assert_eq!(result.meta.elf_interp_started, Some(false));
    for snap in &result.snapshots {
        assert_eq!(snap.instr, "nop");
    }
}

#[test]
fn unresolvable_interpreter_is_reported_but_not_fatal() {
    const EHDR_SIZE: u64 = 64;
    const PHDR_SIZE: u64 = 56;
    let interp_path = b"/nonexistent/ld-linux-x86-64.so.2\0";
    let entry_offset = EHDR_SIZE + PHDR_SIZE * 2 + interp_path.len() as u64;
    let total_len = entry_offset as usize + 8;

    let mut blob = vec![0u8; total_len];
    blob[..4].copy_from_slice(b"\x7fELF");
    blob[4] = 2;
    blob[5] = 1;
    blob[6] = 1;
    blob[16..18].copy_from_slice(&3u16.to_le_bytes()); // ET_DYN
    blob[18..20].copy_from_slice(&62u16.to_le_bytes());
    blob[20..24].copy_from_slice(&1u32.to_le_bytes());
    blob[24..32].copy_from_slice(&entry_offset.to_le_bytes());
    blob[32..40].copy_from_slice(&EHDR_SIZE.to_le_bytes());
    blob[52..54].copy_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    blob[54..56].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
    blob[56..58].copy_from_slice(&2u16.to_le_bytes()); // e_phnum = 2

    let interp_off = (EHDR_SIZE + PHDR_SIZE * 2) as usize;
    blob[interp_off..interp_off + interp_path.len()].copy_from_slice(interp_path);

    // PT_INTERP
    let ph0 = EHDR_SIZE as usize;
    blob[ph0..ph0 + 4].copy_from_slice(&3u32.to_le_bytes()); // PT_INTERP
    blob[ph0 + 4..ph0 + 8].copy_from_slice(&4u32.to_le_bytes());
    blob[ph0 + 8..ph0 + 16].copy_from_slice(&(interp_off as u64).to_le_bytes());
    blob[ph0 + 16..ph0 + 24].copy_from_slice(&0u64.to_le_bytes());
    blob[ph0 + 24..ph0 + 32].copy_from_slice(&0u64.to_le_bytes());
    blob[ph0 + 32..ph0 + 40].copy_from_slice(&(interp_path.len() as u64).to_le_bytes());
    blob[ph0 + 40..ph0 + 48].copy_from_slice(&(interp_path.len() as u64).to_le_bytes());
    blob[ph0 + 48..ph0 + 56].copy_from_slice(&1u64.to_le_bytes());

    // PT_LOAD covering the whole file
    let ph1 = ph0 + PHDR_SIZE as usize;
    blob[ph1..ph1 + 4].copy_from_slice(&1u32.to_le_bytes());
    blob[ph1 + 4..ph1 + 8].copy_from_slice(&7u32.to_le_bytes());
    blob[ph1 + 8..ph1 + 16].copy_from_slice(&0u64.to_le_bytes());
    blob[ph1 + 16..ph1 + 24].copy_from_slice(&0u64.to_le_bytes());
    blob[ph1 + 24..ph1 + 32].copy_from_slice(&0u64.to_le_bytes());
    blob[ph1 + 32..ph1 + 40].copy_from_slice(&(total_len as u64).to_le_bytes());
    blob[ph1 + 40..ph1 + 48].copy_from_slice(&(total_len as u64).to_le_bytes());
    blob[ph1 + 48..ph1 + 56].copy_from_slice(&0x1000u64.to_le_bytes());

    for byte in &mut blob[entry_offset as usize..] {
        *byte = NOP;
    }

    let mut config = TraceConfig::defaults_64();
    config.max_steps = 2;
    config.start_interp = true;

    let result = tracecore::trace(&blob, &config, None).unwrap();
    assert_eq!(result.meta.elf_interp_started, Some(false));
    assert!(result.meta.elf_interp.unwrap().starts_with("/nonexistent/"));
    assert_eq!(result.snapshots.len(), 2);
}

/// Builds a minimal non-PIE (`ET_EXEC`) ELF whose single `PT_LOAD` segment
/// maps one `hlt` byte at `vaddr`, used as the on-disk interpreter for the
/// recovery test below.
fn minimal_exec_elf_with_hlt(vaddr: u64) -> Vec<u8> {
    const EHDR_SIZE: u64 = 64;
    const PHDR_SIZE: u64 = 56;
    let code_offset = EHDR_SIZE + PHDR_SIZE;
    let total_len = code_offset as usize + 1;

    let mut blob = vec![0u8; total_len];
    blob[..4].copy_from_slice(b"\x7fELF");
    blob[4] = 2; // ELFCLASS64
    blob[5] = 1;
    blob[6] = 1;
    blob[16..18].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    blob[18..20].copy_from_slice(&62u16.to_le_bytes()); // EM_X86_64
    blob[20..24].copy_from_slice(&1u32.to_le_bytes());
    blob[24..32].copy_from_slice(&vaddr.to_le_bytes()); // e_entry
    blob[32..40].copy_from_slice(&EHDR_SIZE.to_le_bytes());
    blob[52..54].copy_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    blob[54..56].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
    blob[56..58].copy_from_slice(&1u16.to_le_bytes());

    let ph = EHDR_SIZE as usize;
    blob[ph..ph + 4].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
    blob[ph + 4..ph + 8].copy_from_slice(&7u32.to_le_bytes());
    blob[ph + 8..ph + 16].copy_from_slice(&code_offset.to_le_bytes()); // p_offset
    blob[ph + 16..ph + 24].copy_from_slice(&vaddr.to_le_bytes()); // p_vaddr
    blob[ph + 24..ph + 32].copy_from_slice(&vaddr.to_le_bytes()); // p_paddr
    blob[ph + 32..ph + 40].copy_from_slice(&1u64.to_le_bytes()); // p_filesz
    blob[ph + 40..ph + 48].copy_from_slice(&1u64.to_le_bytes()); // p_memsz
    blob[ph + 48..ph + 56].copy_from_slice(&0x1000u64.to_le_bytes());

    blob[code_offset as usize] = 0xF4; // hlt
    blob
}

/// Builds a PIE image with a `PT_INTERP` pointing at `interp_path` (an
/// absolute, on-disk path) whose entry lands well outside its own `PT_LOAD`
/// segment, so the very first fetch faults before any snapshot is captured.
fn pie_elf_with_unmapped_entry(interp_path: &str) -> Vec<u8> {
    const EHDR_SIZE: u64 = 64;
    const PHDR_SIZE: u64 = 56;
    let interp_bytes_len = interp_path.len() + 1; // NUL-terminated
    let interp_off = EHDR_SIZE + PHDR_SIZE * 2;
    let total_len = interp_off as usize + interp_bytes_len;
    const UNMAPPED_ENTRY: u64 = 0x10000; // outside the small PT_LOAD below

    let mut blob = vec![0u8; total_len];
    blob[..4].copy_from_slice(b"\x7fELF");
    blob[4] = 2;
    blob[5] = 1;
    blob[6] = 1;
    blob[16..18].copy_from_slice(&3u16.to_le_bytes()); // ET_DYN
    blob[18..20].copy_from_slice(&62u16.to_le_bytes());
    blob[20..24].copy_from_slice(&1u32.to_le_bytes());
    blob[24..32].copy_from_slice(&UNMAPPED_ENTRY.to_le_bytes());
    blob[32..40].copy_from_slice(&EHDR_SIZE.to_le_bytes());
    blob[52..54].copy_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    blob[54..56].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
    blob[56..58].copy_from_slice(&2u16.to_le_bytes());

    blob[interp_off as usize..interp_off as usize + interp_path.len()]
        .copy_from_slice(interp_path.as_bytes());

    let ph0 = EHDR_SIZE as usize;
    blob[ph0..ph0 + 4].copy_from_slice(&3u32.to_le_bytes()); // PT_INTERP
    blob[ph0 + 4..ph0 + 8].copy_from_slice(&4u32.to_le_bytes());
    blob[ph0 + 8..ph0 + 16].copy_from_slice(&(interp_off as u64).to_le_bytes());
    blob[ph0 + 16..ph0 + 24].copy_from_slice(&0u64.to_le_bytes());
    blob[ph0 + 24..ph0 + 32].copy_from_slice(&0u64.to_le_bytes());
    blob[ph0 + 32..ph0 + 40].copy_from_slice(&(interp_bytes_len as u64).to_le_bytes());
    blob[ph0 + 40..ph0 + 48].copy_from_slice(&(interp_bytes_len as u64).to_le_bytes());
    blob[ph0 + 48..ph0 + 56].copy_from_slice(&1u64.to_le_bytes());

    // PT_LOAD covering only the headers and interp string — deliberately far
    // short of `UNMAPPED_ENTRY` so the first fetch at the real entry faults.
    let ph1 = ph0 + PHDR_SIZE as usize;
    blob[ph1..ph1 + 4].copy_from_slice(&1u32.to_le_bytes());
    blob[ph1 + 4..ph1 + 8].copy_from_slice(&7u32.to_le_bytes());
    blob[ph1 + 8..ph1 + 16].copy_from_slice(&0u64.to_le_bytes());
    blob[ph1 + 16..ph1 + 24].copy_from_slice(&0u64.to_le_bytes());
    blob[ph1 + 24..ph1 + 32].copy_from_slice(&0u64.to_le_bytes());
    blob[ph1 + 32..ph1 + 40].copy_from_slice(&(total_len as u64).to_le_bytes());
    blob[ph1 + 40..ph1 + 48].copy_from_slice(&(total_len as u64).to_le_bytes());
    blob[ph1 + 48..ph1 + 56].copy_from_slice(&0x1000u64.to_le_bytes());

    blob
}

#[test]
fn fetch_fault_at_entry_recovers_by_starting_the_resolved_interpreter() {
    let interp_dir = tempfile::tempdir().unwrap();
    let interp_file = interp_dir.path().join("ld-linux-x86-64.so.2");
    std::fs::write(&interp_file, minimal_exec_elf_with_hlt(0x10000)).unwrap();

    let blob = pie_elf_with_unmapped_entry(interp_file.to_str().unwrap());
    let mut config = TraceConfig::defaults_64();
    config.max_steps = 2;
    // Left false deliberately: recovery must be distinguishable from an
    // explicit request to land in the interpreter.
    config.start_interp = false;

    let result = tracecore::trace(&blob, &config, None).unwrap();

    assert_eq!(result.meta.error, None);
    assert_eq!(result.snapshots.len(), 1);
    assert_eq!(result.snapshots[0].instr, "hlt");
    assert_eq!(result.snapshots[0].rip, "0x10000");
    // Recovering into the interpreter is not the same as opting in via
    // `start_interp`.
    assert_eq!(result.meta.elf_interp_started, Some(false));
}
