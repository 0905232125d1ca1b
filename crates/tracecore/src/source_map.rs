//! Best-effort source-line enrichment over a finished snapshot sequence.
//! Collects the distinct `rip`s in encounter order, resolves each once via
//! an `addr2line`-shaped tool, and writes the result back onto every
//! snapshot sharing that `rip`. Running it twice over the same snapshots is
//! a no-op: already-enriched entries are skipped on the second pass.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::helpers::LineTool;
use crate::types::Snapshot;

fn parse_rip(rip: &str) -> Option<u64> {
    u64::from_str_radix(rip.trim_start_matches("0x"), 16).ok()
}

/// Enriches `snapshots` in place with `file`/`line`/`func`, using `tool` to
/// resolve each distinct runtime address after subtracting `base_adjust`
/// (PIE/interpreter images are loaded at a runtime base the on-disk symbol
/// table knows nothing about). Leaves a snapshot untouched if its address
/// can't be resolved — partial enrichment is expected, not an error.
pub fn enrich(tool: &dyn LineTool, image: &Path, base_adjust: u64, snapshots: &mut [Snapshot]) {
    let mut seen = HashSet::new();
    let mut unique_rips = Vec::new();
    for snap in snapshots.iter() {
        if snap.file.is_some() || snap.func.is_some() {
            continue;
        }
        if let Some(rip) = parse_rip(&snap.rip) {
            if seen.insert(rip) {
                unique_rips.push(rip);
            }
        }
    }
    if unique_rips.is_empty() {
        return;
    }

    let adjusted: Vec<u64> = unique_rips
        .iter()
        .map(|&rip| rip.saturating_sub(base_adjust))
        .collect();
    let Ok(output) = tool.resolve_lines(image, &adjusted) else {
        return;
    };

    // `addr2line -f -C -a` emits exactly three lines per queried address:
    // the echoed address, the function name (or "??"), and "file:line" (or
    // "??:0"). The first line is consumed only to keep the cursor aligned.
    let mut lines = output.lines();
    let mut resolved: HashMap<u64, (Option<String>, Option<String>, Option<u32>)> = HashMap::new();
    for &rip in &unique_rips {
        let Some(_echoed_addr) = lines.next() else {
            break;
        };
        let Some(func_line) = lines.next() else {
            break;
        };
        let Some(file_line) = lines.next() else {
            break;
        };
        let func = (func_line != "??").then(|| func_line.to_string());
        let (file, line_no) = match file_line.rsplit_once(':') {
            Some((path, line)) if path != "??" => (Some(path.to_string()), line.parse().ok()),
            _ => (None, None),
        };
        resolved.insert(rip, (func, file, line_no));
    }

    for snap in snapshots.iter_mut() {
        if snap.file.is_some() || snap.func.is_some() {
            continue;
        }
        let Some(rip) = parse_rip(&snap.rip) else {
            continue;
        };
        if let Some((func, file, line_no)) = resolved.get(&rip) {
            snap.func = func.clone();
            snap.file = file.clone();
            snap.line = *line_no;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RegisterSnapshot, StackWord};
    use std::io;

    struct FixedLines(&'static str);

    impl LineTool for FixedLines {
        fn resolve_lines(&self, _image: &Path, _addrs: &[u64]) -> io::Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn snap(rip: &str) -> Snapshot {
        Snapshot {
            step: 0,
            rip: rip.to_string(),
            rsp: "0x0".to_string(),
            instr: "nop".to_string(),
            registers: Vec::<RegisterSnapshot>::new(),
            stack: Vec::<StackWord>::new(),
            file: None,
            line: None,
            func: None,
        }
    }

    #[test]
    fn enriches_matching_rip() {
        let tool = FixedLines("0x401000\nmain\nmain.c:12\n");
        let mut snapshots = vec![snap("0x401000")];
        enrich(&tool, Path::new("bin"), 0, &mut snapshots);
        assert_eq!(snapshots[0].func.as_deref(), Some("main"));
        assert_eq!(snapshots[0].file.as_deref(), Some("main.c"));
        assert_eq!(snapshots[0].line, Some(12));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let tool = FixedLines("0x401000\nmain\nmain.c:12\n");
        let mut snapshots = vec![snap("0x401000")];
        enrich(&tool, Path::new("bin"), 0, &mut snapshots);
        let after_first = snapshots.clone();
        enrich(&tool, Path::new("bin"), 0, &mut snapshots);
        assert_eq!(snapshots, after_first);
    }

    #[test]
    fn unresolved_symbol_leaves_fields_empty() {
        let tool = FixedLines("0x401000\n??\n??:0\n");
        let mut snapshots = vec![snap("0x401000")];
        enrich(&tool, Path::new("bin"), 0, &mut snapshots);
        assert!(snapshots[0].func.is_none());
        assert!(snapshots[0].file.is_none());
    }
}
