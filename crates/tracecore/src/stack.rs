//! Builds the initial System-V process stack: argv/envp/auxv laid out
//! top-down exactly the way a real kernel hands control to `_start`, the
//! same recipe `scannells-rust_userspace_loader`'s `setup_stack` follows.
//! Only a single argv entry (`argv0`) and an empty envp are supported; the
//! spec does not model a multi-argument or multi-env process.
//!
//! The raw (non-ELF) path doesn't use any of this: it just maps the stack
//! region and drops SP/BP at the top, via [`init_simple`].

use crate::address_space::AddressSpace;
use crate::engine::Engine;
use crate::error::Result;

pub const AT_NULL: u64 = 0;
pub const AT_PHDR: u64 = 3;
pub const AT_PHENT: u64 = 4;
pub const AT_PHNUM: u64 = 5;
pub const AT_PAGESZ: u64 = 6;
pub const AT_BASE: u64 = 7;
pub const AT_ENTRY: u64 = 9;

/// Maps the stack region and returns `stack_top - word_size`, with no
/// argv/envp/auxv layout at all. Used by the raw (non-ELF) path, where
/// startup is just `SP = BP = stack_top - word_size`; the caller writes both
/// registers to the returned value.
pub fn init_simple(
    engine: &mut Engine,
    address_space: &mut AddressSpace,
    stack_base: u64,
    stack_size: u64,
    word_size: u64,
) -> Result<u64> {
    address_space.map_region(engine, stack_base, stack_size)?;
    Ok(stack_base + stack_size - word_size)
}

fn write_word(engine: &mut Engine, addr: u64, value: u64, word_size: u64) -> Result<()> {
    if word_size == 8 {
        engine.write(addr, &value.to_le_bytes())
    } else {
        engine.write(addr, &(value as u32).to_le_bytes())
    }
}

/// Maps the stack region and writes argv0, an empty envp, and the given
/// auxv entries onto it, returning the initial stack pointer.
///
/// Pushes in exactly this order (each push moves `sp` further down, so the
/// *last* thing pushed ends up closest to the returned `sp`):
/// argv0 string, envp terminator, argv terminator, argv[0] pointer, argc,
/// each auxv pair (key then value, in the order given), a final `(0, 0)`
/// auxv terminator. `sp` is word-aligned down only once, at the very end —
/// not after the argv0 string — which is also why a few bytes of slack can
/// sit below the auxv terminator when argv0's length isn't itself
/// word-sized; this is the same order and single late alignment
/// `_build_initial_stack` uses.
pub fn build_stack(
    engine: &mut Engine,
    address_space: &mut AddressSpace,
    stack_base: u64,
    stack_size: u64,
    word_size: u64,
    argv0: &str,
    auxv: &[(u64, u64)],
) -> Result<u64> {
    address_space.map_region(engine, stack_base, stack_size)?;
    let mut sp = stack_base + stack_size;

    let mut argv0_bytes = argv0.as_bytes().to_vec();
    argv0_bytes.push(0);
    sp -= argv0_bytes.len() as u64;
    let argv0_addr = sp;
    engine.write(argv0_addr, &argv0_bytes)?;

    sp -= word_size; // envp terminator
    write_word(engine, sp, 0, word_size)?;

    sp -= word_size; // argv terminator
    write_word(engine, sp, 0, word_size)?;

    sp -= word_size; // argv[0]
    write_word(engine, sp, argv0_addr, word_size)?;

    sp -= word_size; // argc
    write_word(engine, sp, 1, word_size)?;

    for (key, value) in auxv {
        sp -= word_size;
        write_word(engine, sp, *key, word_size)?;
        sp -= word_size;
        write_word(engine, sp, *value, word_size)?;
    }

    sp -= word_size; // auxv terminator key (AT_NULL)
    write_word(engine, sp, AT_NULL, word_size)?;
    sp -= word_size; // auxv terminator value
    write_word(engine, sp, 0, word_size)?;

    sp &= !(word_size - 1);
    Ok(sp)
}
