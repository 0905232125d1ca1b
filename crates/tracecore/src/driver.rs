//! Ties every component together behind the one entrypoint callers need:
//! classify the input, map it in, build the stack, run to budget or fault,
//! and enrich with source lines if a tool was supplied. A sequence of
//! "set up, run once, maybe retry, report" rather than a state machine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::instrument;

use crate::address_space::AddressSpace;
use crate::context::RunContext;
use crate::elf;
use crate::engine::Engine;
use crate::error::{Result, TraceError};
use crate::helpers::{Disassembler, IcedDisassembler, LineTool, SymbolTool};
use crate::regs;
use crate::source_map;
use crate::stack;
use crate::stepper;
use crate::symbol;
use crate::syscall;
use crate::types::{
    hex, ElfHeader, TraceConfig, TraceMeta, TraceResult, EM_386, EM_X86_64, ET_DYN, PT_INTERP,
};

/// Metadata about the ELF image carried through a run, used only to fill in
/// `TraceMeta`'s `elf_*` fields and to compute the interpreter-recovery
/// fallback entry point.
#[derive(Clone)]
struct ElfMeta {
    header: ElfHeader,
    pie: bool,
    interp: Option<String>,
    interp_started: bool,
    interp_entry: Option<u64>,
    load_base: u64,
}

/// Holds the optional external collaborators a caller may wire in. A bare
/// `TraceDriver::new()` still decodes instruction text in-process via
/// `iced-x86`; symbol and line resolution are opt-in since they require an
/// on-disk image and a real `nm`/`addr2line` binary.
pub struct TraceDriver {
    disassembler: Option<Arc<dyn Disassembler>>,
    symbol_tool: Option<Arc<dyn SymbolTool>>,
    line_tool: Option<Arc<dyn LineTool>>,
}

impl Default for TraceDriver {
    fn default() -> Self {
        Self {
            disassembler: Some(Arc::new(IcedDisassembler)),
            symbol_tool: None,
            line_tool: None,
        }
    }
}

impl TraceDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_disassembler(mut self, disassembler: Option<Arc<dyn Disassembler>>) -> Self {
        self.disassembler = disassembler;
        self
    }

    pub fn with_symbol_tool(mut self, tool: Arc<dyn SymbolTool>) -> Self {
        self.symbol_tool = Some(tool);
        self
    }

    pub fn with_line_tool(mut self, tool: Arc<dyn LineTool>) -> Self {
        self.line_tool = Some(tool);
        self
    }

    #[instrument(skip(self, bytes, config), fields(arch_bits = config.arch_bits, max_steps = config.max_steps))]
    pub fn trace(
        &self,
        bytes: &[u8],
        config: &TraceConfig,
        image_path: Option<&Path>,
    ) -> Result<TraceResult> {
        if elf::is_elf(bytes) {
            self.trace_elf(bytes, config, image_path)
        } else {
            self.trace_raw(bytes, config)
        }
    }

    /// Clamps `stack_base` into the 32-bit address space if it isn't
    /// already, warning once at the point of adjustment. Shared by the raw
    /// and ELF paths, each of which applies it against its *own* resolved
    /// `arch_bits` (the caller's guess for raw images, the ELF class for ELF
    /// images) rather than a value guessed before classification.
    fn clamp_stack_base(config: &mut TraceConfig) {
        if config.arch_bits == 32 && config.stack_base > u32::MAX as u64 {
            const CLAMPED_32BIT_STACK_BASE: u64 = 0xBFF0_0000;
            tracing::warn!(
                requested = %hex(config.stack_base),
                adjusted = %hex(CLAMPED_32BIT_STACK_BASE),
                "stack_base exceeds 32-bit address space; clamped before mapping"
            );
            config.stack_base = CLAMPED_32BIT_STACK_BASE;
        }
    }

    /// Same treatment for `interp_base`: a caller that hands a 64-bit
    /// interpreter base to a 32-bit run is as common a mistake as the
    /// stack-base one above, and gets the same silent, logged adjustment.
    fn clamp_interp_base(config: &mut TraceConfig) {
        if config.arch_bits == 32 && config.interp_base > u32::MAX as u64 {
            const CLAMPED_32BIT_INTERP_BASE: u64 = 0xF700_0000;
            tracing::warn!(
                requested = %hex(config.interp_base),
                adjusted = %hex(CLAMPED_32BIT_INTERP_BASE),
                "interp_base exceeds 32-bit address space; clamped before mapping"
            );
            config.interp_base = CLAMPED_32BIT_INTERP_BASE;
        }
    }

    fn trace_raw(&self, bytes: &[u8], config: &TraceConfig) -> Result<TraceResult> {
        let mut config = config.clone();
        Self::clamp_stack_base(&mut config);
        let config = &config;

        let mut engine = Engine::new(
            config.arch_bits,
            RunContext::new(
                config.arch_bits,
                config.max_steps,
                config.stack_entries,
                config.stdin_data.clone(),
                self.disassembler.clone(),
            ),
        )?;
        let mut address_space = AddressSpace::new();
        let image_size = (bytes.len() as u64).max(0x1000);
        address_space.map_region(&mut engine, config.base, image_size)?;
        engine.write(config.base, bytes)?;

        // Raw path startup has no argv/envp/auxv: just map the stack region
        // and drop SP = BP at the top, per §4.8.
        let sp = stack::init_simple(
            &mut engine,
            &mut address_space,
            config.stack_base,
            config.stack_size,
            config.word_size(),
        )?;
        let (_, sp_reg) = regs::pc_sp(config.arch_bits);
        engine.reg_write(sp_reg, sp)?;
        engine.reg_write(regs::bp(config.arch_bits), sp)?;

        // Spec §4.8 raw path: stop at `base + len(code)` (exclusive) rather
        // than letting execution run on into the zero-filled remainder of
        // the mapped page, same as the step budget, this is a termination
        // bound rather than a hard logical limit (a fault or budget hit may
        // still end the run first).
        let until = config.base + bytes.len() as u64;
        self.run(&mut engine, config, config.base, until, None)
    }

    fn trace_elf(
        &self,
        bytes: &[u8],
        config: &TraceConfig,
        image_path: Option<&Path>,
    ) -> Result<TraceResult> {
        let header = elf::parse_header(bytes)?;
        if header.machine != EM_X86_64 && header.machine != EM_386 {
            return Err(TraceError::InvalidInput(format!(
                "unsupported machine type {}",
                header.machine
            )));
        }
        let headers = elf::parse_program_headers(bytes, &header)?;
        let pie = header.elf_type == ET_DYN;
        let load_base = if pie { config.base } else { 0 };

        // Invariant (§3.5): `arch_bits` in the result reflects the ELF
        // class, never the caller's guess — override it before it drives
        // engine mode selection, word size, or register order.
        let mut config = config.clone();
        config.arch_bits = header.class;
        Self::clamp_stack_base(&mut config);
        Self::clamp_interp_base(&mut config);
        let config = &config;

        let mut engine = Engine::new(
            config.arch_bits,
            RunContext::new(
                config.arch_bits,
                config.max_steps,
                config.stack_entries,
                config.stdin_data.clone(),
                self.disassembler.clone(),
            ),
        )?;
        let mut address_space = AddressSpace::new();
        address_space.map_image(&mut engine, bytes, load_base, &headers)?;

        let interp_ph = headers.iter().find(|h| h.p_type == PT_INTERP);
        let mut interp_entry = None;
        // Whether the interpreter image itself got mapped — distinct from
        // `meta.elf_interp_started`, which additionally requires the caller
        // to have opted in via `start_interp` (see below).
        let mut interp_loaded = false;
        let mut interp_load_base = 0u64;
        let interp_raw = interp_ph.map(|ph| elf::read_c_string(bytes, ph.offset as usize));

        if let Some(raw_path) = &interp_raw {
            if let Some(resolved) = self.resolve_interp_path(raw_path, image_path) {
                if let Ok(interp_bytes) = std::fs::read(&resolved) {
                    if let Ok(interp_header) = elf::parse_header(&interp_bytes) {
                        if let Ok(interp_headers) =
                            elf::parse_program_headers(&interp_bytes, &interp_header)
                        {
                            // The interpreter's own ELF type governs its load
                            // base, same as the main image: PIE gets
                            // `config.interp_base`, a fixed-address
                            // interpreter loads at 0.
                            interp_load_base = if interp_header.elf_type == ET_DYN {
                                config.interp_base
                            } else {
                                0
                            };
                            address_space.map_image(
                                &mut engine,
                                &interp_bytes,
                                interp_load_base,
                                &interp_headers,
                            )?;
                            interp_entry = Some(interp_load_base + interp_header.entry);
                            interp_loaded = true;
                        }
                    }
                }
            }
            if !interp_loaded {
                tracing::warn!(interp = %raw_path, "interpreter named in PT_INTERP could not be loaded; continuing without it");
            }
        }

        let auxv = [
            (stack::AT_PHDR, load_base + header.phoff),
            (stack::AT_PHENT, header.phentsize as u64),
            (stack::AT_PHNUM, header.phnum as u64),
            (stack::AT_PAGESZ, 0x1000),
            (
                stack::AT_BASE,
                if interp_loaded { interp_load_base } else { 0 },
            ),
            (stack::AT_ENTRY, load_base + header.entry),
        ];
        let argv0 = image_path
            .and_then(|p| p.to_str())
            .unwrap_or("a.out")
            .to_string();

        // Mirrors the two-step startup in `original_source`: the plain
        // SP=BP init runs first (and maps the stack region), then the full
        // argv/envp/auxv layout overwrites SP with the real initial stack
        // pointer. BP is never touched again, so it's left at
        // `stack_top - word_size`.
        let bp_value = stack::init_simple(
            &mut engine,
            &mut address_space,
            config.stack_base,
            config.stack_size,
            config.word_size(),
        )?;
        engine.reg_write(regs::bp(config.arch_bits), bp_value)?;

        let sp = stack::build_stack(
            &mut engine,
            &mut address_space,
            config.stack_base,
            config.stack_size,
            config.word_size(),
            &argv0,
            &auxv,
        )?;
        let (_, sp_reg) = regs::pc_sp(config.arch_bits);
        engine.reg_write(sp_reg, sp)?;

        let symbol_entry = config.start_symbol.as_ref().and_then(|name| {
            let tool = self.symbol_tool.as_deref()?;
            let path = image_path?;
            symbol::resolve(tool, path, name, load_base)
        });

        // Priority: an explicit request to land in the interpreter wins,
        // then a resolved start symbol, then the image's own entry point.
        let entry = if config.start_interp {
            interp_entry.unwrap_or(load_base + header.entry)
        } else if let Some(addr) = symbol_entry {
            addr
        } else {
            load_base + header.entry
        };

        // `elf_interp_started` reports whether the run *opted into* landing
        // in the interpreter, not merely whether the interpreter image was
        // mapped — a one-shot recovery retry that happens to land there
        // (see `run` below) does not count.
        let interp_started = config.start_interp && interp_entry.is_some();

        let meta = ElfMeta {
            header,
            pie,
            interp: interp_raw,
            interp_started,
            interp_entry,
            load_base,
        };

        // Spec §4.8/§9 OQ3: `start + 0x1000` is a budget heuristic, not a
        // logical limit — `max_steps` is what actually bounds the run in
        // practice; this just keeps a wild jump from spinning forever with
        // the step budget unreached.
        let until = entry.saturating_add(0x1000);
        let mut result = self.run(&mut engine, config, entry, until, Some(meta))?;

        if let (Some(path), Some(line_tool)) = (image_path, self.line_tool.as_deref()) {
            source_map::enrich(line_tool, path, load_base, &mut result.snapshots);
        }

        Ok(result)
    }

    fn resolve_interp_path(&self, raw: &str, image_path: Option<&Path>) -> Option<PathBuf> {
        let candidate = Path::new(raw);
        if candidate.is_absolute() {
            return Some(candidate.to_path_buf());
        }
        let dir = image_path?.parent()?;
        Some(dir.join(candidate))
    }

    fn run(
        &self,
        engine: &mut Engine,
        config: &TraceConfig,
        entry: u64,
        until: u64,
        elf_meta: Option<ElfMeta>,
    ) -> Result<TraceResult> {
        engine.install_hooks(
            stepper::code_hook,
            syscall::intr_hook,
            if config.arch_bits == 64 {
                Some(syscall::syscall_hook)
            } else {
                None
            },
        )?;

        let run_err = engine.start(entry, until);
        let mut ctx = engine.data().clone_for_result();

        // A fetch-unmapped fault with zero snapshots captured, on a run that
        // did *not* already opt into starting at the interpreter, almost
        // always means the image's own entry (or a bad start_symbol guess)
        // was unmapped/unreachable; retry once at the interpreter's entry
        // before giving up. Anything past zero snapshots is left alone — the
        // run made genuine progress.
        //
        // Matched narrowly on "FETCH_UNMAPPED" rather than "UNMAPPED": a
        // READ_UNMAPPED/WRITE_UNMAPPED fault can only happen once an
        // instruction has already been fetched, which means `code_hook` has
        // already run for it and pushed a snapshot, so `snapshots.is_empty()`
        // alone would never let a data-access fault reach this branch either
        // — but the match itself should still name the one fault kind this
        // recovery is actually for.
        if let Err(fault) = &run_err {
            let interp_entry = elf_meta.as_ref().and_then(|meta| meta.interp_entry);
            if fault.contains("FETCH_UNMAPPED")
                && ctx.snapshots.is_empty()
                && !config.start_interp
                && interp_entry.is_some()
            {
                let fallback = interp_entry.unwrap();
                tracing::warn!(%fault, fallback = %hex(fallback), "retrying at interpreter entry after fetch fault");
                let retry_err = engine.start(fallback, fallback.saturating_add(0x1000));
                ctx = engine.data().clone_for_result();
                return Ok(self.finish(ctx, config, retry_err, elf_meta));
            }
        }

        Ok(self.finish(ctx, config, run_err, elf_meta))
    }

    fn finish(
        &self,
        ctx: RunContext,
        config: &TraceConfig,
        run_err: std::result::Result<(), String>,
        elf_meta: Option<ElfMeta>,
    ) -> TraceResult {
        let mut meta = TraceMeta {
            steps: ctx.step_counter,
            error: run_err.err(),
            base: hex(config.base),
            stack_base: hex(config.stack_base),
            stack_size: config.stack_size,
            arch_bits: config.arch_bits,
            word_size: config.word_size(),
            buffer_offset: config.buffer_offset,
            buffer_size: config.buffer_size,
            stdin_len: config.stdin_data.len() as u64,
            ..Default::default()
        };
        if let Some(elf_meta) = elf_meta {
            meta.elf_entry = Some(hex(elf_meta.header.entry));
            meta.elf_pie = Some(elf_meta.pie);
            meta.elf_interp = elf_meta.interp;
            meta.elf_interp_started = Some(elf_meta.interp_started);
        }
        TraceResult {
            snapshots: ctx.snapshots,
            meta,
        }
    }
}

/// Convenience entrypoint for callers that don't need symbol/line
/// resolution wired in — exactly what `trace-cli` uses by default.
pub fn trace(bytes: &[u8], config: &TraceConfig, image_path: Option<&Path>) -> Result<TraceResult> {
    TraceDriver::new().trace(bytes, config, image_path)
}
