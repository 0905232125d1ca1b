//! Maps ELF `PT_LOAD` segments into the emulator's address space. Used for
//! both the main image and, when present, the dynamic interpreter — the same
//! two-step "page-align the range, then overlay the file bytes" loop the
//! Python original runs twice with near-identical bodies.

use std::collections::HashSet;

use crate::engine::Engine;
use crate::error::{Result, TraceError};
use crate::types::{ProgramHeader, PT_LOAD};

const PAGE_SIZE: u64 = 0x1000;

fn align_down(value: u64) -> u64 {
    value & !(PAGE_SIZE - 1)
}

fn align_up(value: u64) -> u64 {
    align_down(value + PAGE_SIZE - 1)
}

/// Tracks which pages have already been mapped across one or more calls to
/// [`AddressSpace::map_image`], so overlapping `PT_LOAD` segments (the
/// loader tolerates them; some hand-built raw images rely on it) never
/// attempt to double-map the same page. The earlier segment's mapping wins;
/// a later segment's file bytes simply overlay whatever is already there.
#[derive(Default)]
pub struct AddressSpace {
    mapped_pages: HashSet<u64>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps every `PT_LOAD` segment in `headers`, relocated by `load_base`,
    /// and writes each segment's `filesz` bytes from `blob`. Bytes beyond
    /// `filesz` up to `memsz` are left as the zero-initialized page default
    /// (Unicorn zero-fills new mappings), matching BSS semantics.
    pub fn map_image(
        &mut self,
        engine: &mut Engine,
        blob: &[u8],
        load_base: u64,
        headers: &[ProgramHeader],
    ) -> Result<()> {
        for ph in headers.iter().filter(|h| h.p_type == PT_LOAD) {
            let seg_start = load_base + ph.vaddr;
            let seg_end = seg_start + ph.memsz.max(1);
            let page_start = align_down(seg_start);
            let page_end = align_up(seg_end);

            let mut page = page_start;
            while page < page_end {
                if self.mapped_pages.insert(page) {
                    engine.map(page, PAGE_SIZE as usize)?;
                }
                page += PAGE_SIZE;
            }

            if ph.filesz == 0 {
                continue;
            }
            let file_start = ph.offset as usize;
            let file_end = file_start
                .checked_add(ph.filesz as usize)
                .ok_or_else(|| TraceError::InvalidInput("segment file size overflow".into()))?;
            let data = blob.get(file_start..file_end).ok_or_else(|| {
                TraceError::InvalidInput("segment file range extends past image".into())
            })?;
            engine.write(seg_start, data)?;
        }
        Ok(())
    }

    /// Maps a bare range not described by a program header, such as the
    /// stack or a scratch stdin buffer. Skips pages already mapped by an
    /// earlier image so the stack can be requested even if it happens to
    /// overlap a previously mapped page.
    pub fn map_region(&mut self, engine: &mut Engine, base: u64, size: u64) -> Result<()> {
        let page_start = align_down(base);
        let page_end = align_up(base + size.max(1));
        let mut page = page_start;
        while page < page_end {
            if self.mapped_pages.insert(page) {
                engine.map(page, PAGE_SIZE as usize)?;
            }
            page += PAGE_SIZE;
        }
        Ok(())
    }
}
