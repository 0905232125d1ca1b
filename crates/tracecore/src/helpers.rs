//! Capability traits for the external collaborators a caller may wire in: a
//! disassembler, a symbol-table lister, and an address-to-line tool. Each is
//! a narrow trait so the driver never hard-codes a process-spawn; a caller
//! that has no such tool available simply passes `None`, treated as
//! "helper unavailable" — never fatal.

use std::io;
use std::path::Path;
use std::process::Command;

/// Turns instruction bytes into `"mnemonic operands"`. The default
/// implementation decodes in-process via `iced-x86`; a caller may substitute
/// something else (or nothing at all).
pub trait Disassembler {
    fn disassemble(&self, bytes: &[u8], addr: u64, arch_bits: u8) -> Option<String>;
}

/// Lists defined symbols in an image as `address type name` lines, the
/// format `nm -n --defined-only` produces.
pub trait SymbolTool {
    fn list_symbols(&self, image: &Path) -> io::Result<String>;
}

/// Resolves a set of addresses to `address` / `function` / `file:line`
/// triplets, the format `addr2line -f -C -a` produces.
pub trait LineTool {
    fn resolve_lines(&self, image: &Path, addrs: &[u64]) -> io::Result<String>;
}

/// In-process x86/x86-64 decoder backed by `iced-x86`: a decoder invoked
/// directly rather than through an external process.
pub struct IcedDisassembler;

impl Disassembler for IcedDisassembler {
    fn disassemble(&self, bytes: &[u8], addr: u64, arch_bits: u8) -> Option<String> {
        use iced_x86::{Decoder, DecoderOptions, Formatter, NasmFormatter};

        if bytes.is_empty() {
            return None;
        }
        let bitness = if arch_bits == 64 { 64 } else { 32 };
        let mut decoder = Decoder::with_ip(bitness, bytes, addr, DecoderOptions::NONE);
        if !decoder.can_decode() {
            return None;
        }
        let instr = decoder.decode();
        let mut formatter = NasmFormatter::new();
        let mut text = String::new();
        formatter.format(&instr, &mut text);
        // iced emits "mnemonic operands" already lowercase; normalize
        // internal whitespace to a single space to match "mnemonic op_str".
        Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

/// Shells out to `nm -n --defined-only`.
pub struct NmSymbolTool;

impl SymbolTool for NmSymbolTool {
    fn list_symbols(&self, image: &Path) -> io::Result<String> {
        let output = Command::new("nm")
            .arg("-n")
            .arg("--defined-only")
            .arg(image)
            .output()?;
        if !output.status.success() {
            return Err(io::Error::new(io::ErrorKind::Other, "nm exited non-zero"));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Shells out to `addr2line -e <image> -f -C -a <addr>*`.
pub struct Addr2LineTool;

impl LineTool for Addr2LineTool {
    fn resolve_lines(&self, image: &Path, addrs: &[u64]) -> io::Result<String> {
        let mut cmd = Command::new("addr2line");
        cmd.arg("-e").arg(image).arg("-f").arg("-C").arg("-a");
        for addr in addrs {
            cmd.arg(format!("{:#x}", addr));
        }
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "addr2line exited non-zero",
            ));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
