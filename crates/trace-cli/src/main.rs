//! Thin command-line front end over `tracecore`. Reads an image from disk,
//! builds a [`TraceConfig`] from flags (falling back to `TRACECORE_*`
//! environment overrides where a flag is left unset), runs the trace, and
//! writes the resulting JSON to stdout or a file.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracecore::{Addr2LineTool, NmSymbolTool, TraceConfig, TraceDriver};

/// Single-step an x86/x86-64 binary under CPU emulation and emit a
/// per-instruction JSON trace.
#[derive(Parser, Debug)]
#[command(name = "trace-cli", version, about)]
struct Args {
    /// Path to the raw or ELF binary to trace.
    input: PathBuf,

    /// Where to write the JSON trace; stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Load address for a raw image, or the PIE base for a position-
    /// independent ELF image.
    #[arg(long)]
    base: Option<u64>,

    /// Base address of the initial stack mapping.
    #[arg(long = "stack-base")]
    stack_base: Option<u64>,

    /// Size in bytes of the initial stack mapping.
    #[arg(long = "stack-size")]
    stack_size: Option<u64>,

    /// Maximum number of instructions to single-step before stopping.
    #[arg(long = "max-steps")]
    max_steps: Option<u64>,

    /// Number of stack words captured per snapshot.
    #[arg(long = "stack-entries")]
    stack_entries: Option<u32>,

    /// 32 or 64; defaults to 64 unless the input is a 32-bit ELF.
    #[arg(long = "arch-bits")]
    arch_bits: Option<u8>,

    /// Start execution at the dynamic interpreter's entry point instead of
    /// the image's own entry point.
    #[arg(long = "start-interp", default_value_t = false)]
    start_interp: bool,

    /// Bytes to serve to the guest's `sys_read` on fd 0, read from this
    /// path (use `-` for stdin).
    #[arg(long)]
    stdin: Option<PathBuf>,

    /// Optional metadata describing a guest-side scratch buffer; recorded
    /// in the trace's meta block, not interpreted by the engine itself.
    #[arg(long = "buffer-offset")]
    buffer_offset: Option<i64>,

    #[arg(long = "buffer-size", default_value_t = 0)]
    buffer_size: u64,

    /// Resolve this symbol name (via `nm`) and start execution there
    /// instead of at the image's entry point.
    #[arg(long = "start-symbol")]
    start_symbol: Option<String>,
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok()?.parse().ok()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let bytes = fs::read(&args.input)
        .with_context(|| format!("reading input image {}", args.input.display()))?;

    let arch_bits = args
        .arch_bits
        .or_else(|| env::var("TRACECORE_ARCH_BITS").ok()?.parse().ok())
        .unwrap_or(64);
    let mut config = if arch_bits == 32 {
        TraceConfig::defaults_32()
    } else {
        TraceConfig::defaults_64()
    };

    config.arch_bits = arch_bits;
    if let Some(base) = args.base.or_else(|| env_u64("TRACECORE_BASE")) {
        config.base = base;
    }
    if let Some(stack_base) = args.stack_base.or_else(|| env_u64("TRACECORE_STACK_BASE")) {
        config.stack_base = stack_base;
    }
    if let Some(stack_size) = args.stack_size.or_else(|| env_u64("TRACECORE_STACK_SIZE")) {
        config.stack_size = stack_size;
    }
    if let Some(max_steps) = args.max_steps.or_else(|| env_u64("TRACECORE_MAX_STEPS")) {
        config.max_steps = max_steps;
    }
    if let Some(stack_entries) = args.stack_entries {
        config.stack_entries = stack_entries;
    }
    config.start_interp = args.start_interp;
    config.buffer_offset = args.buffer_offset;
    config.buffer_size = args.buffer_size;
    config.start_symbol = args.start_symbol;

    if let Some(stdin_path) = &args.stdin {
        config.stdin_data = if stdin_path.as_os_str() == "-" {
            use std::io::Read;
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        } else {
            fs::read(stdin_path)
                .with_context(|| format!("reading stdin source {}", stdin_path.display()))?
        };
    }

    let driver = TraceDriver::new()
        .with_symbol_tool(Arc::new(NmSymbolTool))
        .with_line_tool(Arc::new(Addr2LineTool));

    let result = driver
        .trace(&bytes, &config, Some(args.input.as_path()))
        .context("trace run failed")?;

    let json = serde_json::to_string_pretty(&result)?;
    match args.output {
        Some(path) => fs::write(&path, json)
            .with_context(|| format!("writing trace output to {}", path.display()))?,
        None => println!("{json}"),
    }

    Ok(())
}
