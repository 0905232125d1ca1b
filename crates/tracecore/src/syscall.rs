//! The syscall surface: exactly `sys_read` on fd 0, reached via `int 0x80`
//! on 32-bit or the `syscall` instruction on 64-bit. Every other syscall
//! number or file descriptor is rejected with `-1` rather than emulated —
//! narrow interposition, not a real kernel underneath the guest.

use unicorn_engine::{RegisterX86, Unicorn};

use crate::context::RunContext;

const SYS_READ_32: u64 = 3;
const SYS_READ_64: u64 = 0;

/// Spec §4.4: any `fd != 0` (or a guest-memory write that faults) returns
/// `-1`, written back into the return register as its two's-complement
/// encoding — not a specific `-errno`, since this bridge models exactly one
/// syscall rather than a real kernel's error table.
const READ_ERROR: i64 = -1;

/// Serves `count` bytes from the run's stdin cursor into guest memory at
/// `buf`, returning the byte count read or `-1`. `take_stdin` borrows `uc`'s
/// user data only long enough to copy the chunk out, so the write back into
/// guest memory below never needs a second live borrow of the context.
fn serve_read(uc: &mut Unicorn<RunContext>, fd: u64, buf: u64, count: u64) -> i64 {
    if fd != 0 {
        return READ_ERROR;
    }
    let chunk = uc.get_data_mut().take_stdin(count as usize);
    if chunk.is_empty() {
        return 0;
    }
    if uc.mem_write(buf, &chunk).is_err() {
        return READ_ERROR;
    }
    chunk.len() as i64
}

/// Interrupt hook for 32-bit mode. Only vector `0x80` with `eax == 3`
/// (`sys_read`) is handled; everything else passes through untouched rather
/// than emulating a broader syscall table.
pub fn intr_hook(uc: &mut Unicorn<RunContext>, intno: u32) {
    if intno != 0x80 || uc.get_data().arch_bits != 32 {
        return;
    }
    let eax = uc.reg_read(RegisterX86::EAX).unwrap_or(0);
    if eax != SYS_READ_32 {
        return;
    }
    let ebx = uc.reg_read(RegisterX86::EBX).unwrap_or(0);
    let ecx = uc.reg_read(RegisterX86::ECX).unwrap_or(0);
    let edx = uc.reg_read(RegisterX86::EDX).unwrap_or(0);

    let ret = serve_read(uc, ebx, ecx, edx);
    let _ = uc.reg_write(RegisterX86::EAX, (ret as i32 as u32) as u64);
}

/// Instruction hook for the 64-bit `syscall` opcode. Only `rax == 0`
/// (`sys_read`) is handled.
pub fn syscall_hook(uc: &mut Unicorn<RunContext>) {
    let rax = uc.reg_read(RegisterX86::RAX).unwrap_or(0);
    if rax != SYS_READ_64 {
        return;
    }
    let rdi = uc.reg_read(RegisterX86::RDI).unwrap_or(0);
    let rsi = uc.reg_read(RegisterX86::RSI).unwrap_or(0);
    let rdx = uc.reg_read(RegisterX86::RDX).unwrap_or(0);

    let ret = serve_read(uc, rdi, rsi, rdx);
    let _ = uc.reg_write(RegisterX86::RAX, ret as u64);
}
