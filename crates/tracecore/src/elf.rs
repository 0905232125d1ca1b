//! Miniature ELF parser: identification, header, program headers, and
//! NUL-terminated string reads. Deliberately hand-rolled rather than built on
//! `goblin`/`object` — the surface needed is a handful of documented offsets
//! read directly out of the blob, not a general-purpose parser.

use crate::error::{Result, TraceError};
use crate::types::{ElfHeader, ProgramHeader};

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

fn read_u16(blob: &[u8], offset: usize) -> Result<u16> {
    let bytes = blob
        .get(offset..offset + 2)
        .ok_or_else(|| TraceError::InvalidInput(format!("truncated read at offset {offset}")))?;
    Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u32(blob: &[u8], offset: usize) -> Result<u32> {
    let bytes = blob
        .get(offset..offset + 4)
        .ok_or_else(|| TraceError::InvalidInput(format!("truncated read at offset {offset}")))?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u64(blob: &[u8], offset: usize) -> Result<u64> {
    let bytes = blob
        .get(offset..offset + 8)
        .ok_or_else(|| TraceError::InvalidInput(format!("truncated read at offset {offset}")))?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

/// `true` if `blob` begins with the ELF magic (`\x7fELF`). Used by the
/// driver to classify raw-vs-ELF input before any parsing is attempted.
pub fn is_elf(blob: &[u8]) -> bool {
    blob.len() >= 4 && &blob[..4] == ELF_MAGIC
}

/// Parses the ELF identification and header.
///
/// Fails with [`TraceError::InvalidInput`] if the magic is absent, the class
/// is not 32 or 64 bit, or the encoding is not little-endian.
pub fn parse_header(blob: &[u8]) -> Result<ElfHeader> {
    if blob.len() < 16 || &blob[..4] != ELF_MAGIC {
        return Err(TraceError::InvalidInput("not an ELF file".into()));
    }
    let class = blob[4];
    let endian = blob[5];
    if endian != 1 {
        return Err(TraceError::InvalidInput(
            "only little-endian ELF is supported".into(),
        ));
    }

    match class {
        1 => Ok(ElfHeader {
            class: 32,
            elf_type: read_u16(blob, 16)?,
            machine: read_u16(blob, 18)?,
            entry: read_u32(blob, 24)? as u64,
            phoff: read_u32(blob, 28)? as u64,
            phentsize: read_u16(blob, 42)?,
            phnum: read_u16(blob, 44)?,
        }),
        2 => Ok(ElfHeader {
            class: 64,
            elf_type: read_u16(blob, 16)?,
            machine: read_u16(blob, 18)?,
            entry: read_u64(blob, 24)?,
            phoff: read_u64(blob, 32)?,
            phentsize: read_u16(blob, 54)?,
            phnum: read_u16(blob, 56)?,
        }),
        _ => Err(TraceError::InvalidInput(format!(
            "unsupported ELF class {class}"
        ))),
    }
}

/// Parses the program header table. Layout (field order and widths) differs
/// between 32-bit and 64-bit ELF per the ELF spec.
pub fn parse_program_headers(blob: &[u8], header: &ElfHeader) -> Result<Vec<ProgramHeader>> {
    let mut entries = Vec::with_capacity(header.phnum as usize);
    for idx in 0..header.phnum as u64 {
        let offset = (header.phoff + idx * header.phentsize as u64) as usize;
        let ph = if header.class == 32 {
            ProgramHeader {
                p_type: read_u32(blob, offset)?,
                offset: read_u32(blob, offset + 4)? as u64,
                vaddr: read_u32(blob, offset + 8)? as u64,
                paddr: read_u32(blob, offset + 12)? as u64,
                filesz: read_u32(blob, offset + 16)? as u64,
                memsz: read_u32(blob, offset + 20)? as u64,
                flags: read_u32(blob, offset + 24)?,
                align: read_u32(blob, offset + 28)? as u64,
            }
        } else {
            ProgramHeader {
                p_type: read_u32(blob, offset)?,
                flags: read_u32(blob, offset + 4)?,
                offset: read_u64(blob, offset + 8)?,
                vaddr: read_u64(blob, offset + 16)?,
                paddr: read_u64(blob, offset + 24)?,
                filesz: read_u64(blob, offset + 32)?,
                memsz: read_u64(blob, offset + 40)?,
                align: read_u64(blob, offset + 48)?,
            }
        };
        entries.push(ph);
    }
    Ok(entries)
}

/// Reads a NUL-terminated string starting at `offset`. Runs to end-of-blob
/// if no NUL is found; invalid UTF-8 is lossily replaced, never rejected.
pub fn read_c_string(blob: &[u8], offset: usize) -> String {
    let tail = blob.get(offset..).unwrap_or(&[]);
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    String::from_utf8_lossy(&tail[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EM_X86_64, ET_DYN};

    fn minimal_elf64(e_type: u16, phoff: u64, phnum: u16) -> Vec<u8> {
        let mut blob = vec![0u8; 64];
        blob[..4].copy_from_slice(ELF_MAGIC);
        blob[4] = 2; // class 64
        blob[5] = 1; // little-endian
        blob[16..18].copy_from_slice(&e_type.to_le_bytes());
        blob[18..20].copy_from_slice(&EM_X86_64.to_le_bytes());
        blob[24..32].copy_from_slice(&0x401000u64.to_le_bytes());
        blob[32..40].copy_from_slice(&phoff.to_le_bytes());
        blob[54..56].copy_from_slice(&56u16.to_le_bytes());
        blob[56..58].copy_from_slice(&phnum.to_le_bytes());
        blob
    }

    #[test]
    fn rejects_missing_magic() {
        let blob = vec![0u8; 64];
        assert!(parse_header(&blob).is_err());
    }

    #[test]
    fn rejects_big_endian() {
        let mut blob = minimal_elf64(ET_DYN, 64, 0);
        blob[5] = 2;
        assert!(parse_header(&blob).is_err());
    }

    #[test]
    fn round_trips_header_fields() {
        let blob = minimal_elf64(ET_DYN, 64, 1);
        let header = parse_header(&blob).unwrap();
        assert_eq!(header.class, 64);
        assert_eq!(header.elf_type, ET_DYN);
        assert_eq!(header.machine, EM_X86_64);
        assert_eq!(header.entry, 0x401000);
        assert_eq!(header.phoff, 64);
        assert_eq!(header.phentsize, 56);
        assert_eq!(header.phnum, 1);
    }

    #[test]
    fn reads_c_string_without_terminator() {
        let blob = b"hello".to_vec();
        assert_eq!(read_c_string(&blob, 0), "hello");
    }

    #[test]
    fn reads_c_string_with_terminator() {
        let blob = b"hello\0world".to_vec();
        assert_eq!(read_c_string(&blob, 0), "hello");
    }
}
