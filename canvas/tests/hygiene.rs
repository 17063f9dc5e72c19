//! Hygiene — enforces coding standards at test time
//!
//! Scans the engine crate's production sources for antipatterns. Every
//! budget is zero; if a pattern genuinely has to appear, fix an existing
//! occurrence first so the budget never grows.

use std::fs;
use std::path::Path;

/// (pattern, budget, what it costs us)
const BUDGETS: &[(&str, usize, &str)] = &[
    (".unwrap()", 0, "crashes the process on None/Err"),
    (".expect(", 0, "crashes the process on None/Err"),
    ("panic!(", 0, "crashes the process"),
    ("unreachable!(", 0, "crashes the process when it turns out reachable"),
    ("todo!(", 0, "unfinished code path"),
    ("unimplemented!(", 0, "unfinished code path"),
    ("let _ =", 0, "discards a result without inspecting it"),
    (".ok()", 0, "discards an error without inspecting it"),
    ("#[allow(dead_code)]", 0, "hides unused code instead of removing it"),
    ("dbg!(", 0, "debug output left in"),
    ("println!(", 0, "stdout bypasses tracing"),
];

struct SourceFile {
    path: String,
    content: String,
}

/// Production `.rs` files under `src/`, skipping sidecar test modules.
fn source_files() -> Vec<SourceFile> {
    let mut files = Vec::new();
    collect(Path::new("src"), &mut files);
    files
}

fn collect(dir: &Path, out: &mut Vec<SourceFile>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(&path, out);
            continue;
        }
        if path.extension().is_none_or(|e| e != "rs") {
            continue;
        }
        let path_str = path.to_string_lossy().to_string();
        if path_str.ends_with("_test.rs") {
            continue;
        }
        if let Ok(content) = fs::read_to_string(&path) {
            out.push(SourceFile { path: path_str, content });
        }
    }
}

#[test]
fn antipattern_budgets_hold() {
    let files = source_files();
    assert!(!files.is_empty(), "no sources found; run from the crate root");

    let mut report = String::new();
    for (pattern, budget, why) in BUDGETS {
        let mut count = 0;
        for file in &files {
            for (number, line) in file.content.lines().enumerate() {
                if line.contains(pattern) {
                    count += 1;
                    report.push_str(&format!(
                        "  {}:{} contains `{pattern}` ({why})\n",
                        file.path,
                        number + 1
                    ));
                }
            }
        }
        assert!(
            count <= *budget,
            "`{pattern}` budget exceeded: found {count}, max {budget}\n{report}"
        );
    }
}
