//! Resolves a named symbol to an address using an `nm`-shaped listing. Used
//! by the driver to honor `start_symbol`, picking an entry point inside the
//! interpreter or image by name instead of by raw offset.

use std::path::Path;

use crate::helpers::SymbolTool;

/// Looks up `symbol` in the defined-symbol listing `tool` produces for
/// `image`, adding `base_adjust` to the address found. Returns `None` if
/// the tool is unavailable, exits non-zero, or the symbol is simply absent
/// — all three are the same "couldn't resolve it" outcome to a caller.
pub fn resolve(tool: &dyn SymbolTool, image: &Path, symbol: &str, base_adjust: u64) -> Option<u64> {
    let output = tool.list_symbols(image).ok()?;
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let addr_str = fields.next()?;
        let _sym_type = fields.next()?;
        let name = fields.next()?;
        if name == symbol {
            let addr = u64::from_str_radix(addr_str.trim_start_matches("0x"), 16).ok()?;
            return Some(addr + base_adjust);
        }
    }
    None
}
