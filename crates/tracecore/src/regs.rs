//! Canonical register capture order.
//!
//! 64-bit and 32-bit orders are fixed lists rather than anything derived from
//! iteration order over an enum, so a reader (or a UI replaying the JSON)
//! can rely on position == `pos` matching name forever.

use unicorn_engine::RegisterX86;

/// `(name, unicorn register id)` pairs in capture order for 64-bit mode.
pub const REG_ORDER_64: &[(&str, RegisterX86)] = &[
    ("rax", RegisterX86::RAX),
    ("rbx", RegisterX86::RBX),
    ("rcx", RegisterX86::RCX),
    ("rdx", RegisterX86::RDX),
    ("rsi", RegisterX86::RSI),
    ("rdi", RegisterX86::RDI),
    ("rbp", RegisterX86::RBP),
    ("rsp", RegisterX86::RSP),
    ("rip", RegisterX86::RIP),
    ("r8", RegisterX86::R8),
    ("r9", RegisterX86::R9),
    ("r10", RegisterX86::R10),
    ("r11", RegisterX86::R11),
    ("r12", RegisterX86::R12),
    ("r13", RegisterX86::R13),
    ("r14", RegisterX86::R14),
    ("r15", RegisterX86::R15),
];

/// `(name, unicorn register id)` pairs in capture order for 32-bit mode.
pub const REG_ORDER_32: &[(&str, RegisterX86)] = &[
    ("eax", RegisterX86::EAX),
    ("ebx", RegisterX86::EBX),
    ("ecx", RegisterX86::ECX),
    ("edx", RegisterX86::EDX),
    ("esi", RegisterX86::ESI),
    ("edi", RegisterX86::EDI),
    ("ebp", RegisterX86::EBP),
    ("esp", RegisterX86::ESP),
    ("eip", RegisterX86::EIP),
];

pub fn order_for(arch_bits: u8) -> &'static [(&'static str, RegisterX86)] {
    if arch_bits == 64 {
        REG_ORDER_64
    } else {
        REG_ORDER_32
    }
}

/// Program-counter and stack-pointer register ids for the given arch.
pub fn pc_sp(arch_bits: u8) -> (RegisterX86, RegisterX86) {
    if arch_bits == 64 {
        (RegisterX86::RIP, RegisterX86::RSP)
    } else {
        (RegisterX86::EIP, RegisterX86::ESP)
    }
}

/// Base-pointer register id for the given arch, used only by the initial
/// stack setup (neither loader stage touches BP again after startup).
pub fn bp(arch_bits: u8) -> RegisterX86 {
    if arch_bits == 64 {
        RegisterX86::RBP
    } else {
        RegisterX86::EBP
    }
}
