use anyhow::{Context as _, Result};
use regex::Regex;
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::{config::ResourceGraph, errors::Errors};

/// First segment of every shared-module reference (`import common.utils`).
pub const SHARED_NAMESPACE: &str = "common";

/// Extension of scanned source files.
pub const SOURCE_EXT: &str = "py";

/// Lists the shared modules under `shared_root`: immediate subdirectories
/// and top-level source files (without extension), minus `_`-prefixed
/// names. A missing root has no modules.
pub fn shared_modules(shared_root: &Path) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    if !shared_root.is_dir() {
        return Ok(out);
    }

    let entries = fs::read_dir(shared_root)
        .with_context(|| format!("failed to list shared modules in {}", shared_root.display()))?;

    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to list shared modules in {}", shared_root.display()))?;
        let path = entry.path();

        let name = if path.is_dir() {
            path.file_name().map(|n| n.to_string_lossy().to_string())
        } else if path.extension().is_some_and(|e| e == SOURCE_EXT) {
            path.file_stem().map(|n| n.to_string_lossy().to_string())
        } else {
            None
        };

        if let Some(name) = name.filter(|n| !n.starts_with('_')) {
            out.insert(name);
        }
    }

    Ok(out)
}

/// Extracts module paths from top-level `import` / `from ... import`
/// statements. Indented statements, comments and string literals are
/// ignored; relative imports never name the shared namespace.
#[derive(Debug, Clone)]
pub struct ImportScanner {
    import_re: Regex,
    from_re: Regex,
}

impl ImportScanner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            import_re: Regex::new(r"^import\s+(.+)$")?,
            from_re: Regex::new(r"^from\s+([A-Za-z_][A-Za-z0-9_.]*)\s+import\b")?,
        })
    }

    pub fn module_refs(&self, source: &str) -> Vec<String> {
        let mut out = Vec::new();
        for stmt in top_level_statements(source) {
            self.collect_stmt(&stmt, &mut out);
        }
        out
    }

    fn collect_stmt(&self, stmt: &str, out: &mut Vec<String>) {
        if let Some(caps) = self.from_re.captures(stmt) {
            out.push(caps[1].to_string());
            return;
        }

        if let Some(caps) = self.import_re.captures(stmt) {
            for item in caps[1].split(',') {
                let name = item
                    .trim()
                    .trim_start_matches('(')
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .trim_end_matches(['\\', ')']);
                if !name.is_empty() {
                    out.push(name.to_string());
                }
            }
        }
    }
}

// ---------- statement splitting ----------

/// Statements of every logical line that starts at column 0.
///
/// Comments are dropped and string literals collapse to `''`, so quotes
/// and `#` inside either never leak into the surrounding code. Backslash
/// continuations and open brackets join physical lines; `;` splits a
/// logical line into statements that share its indentation.
fn top_level_statements(source: &str) -> Vec<String> {
    let chars: Vec<char> = source.replace("\r\n", "\n").chars().collect();
    let mut out = Vec::new();
    let mut stmt = String::new();
    let mut depth = 0usize;
    let mut line_start = true;
    let mut indented = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if line_start {
            indented = c == ' ' || c == '\t';
            line_start = false;
        }

        match c {
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '\'' | '"' => {
                let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                i = string_end(&chars, i, c, triple);
                stmt.push_str("''");
                continue;
            }
            '\\' if chars.get(i + 1) == Some(&'\n') => {
                stmt.push(' ');
                i += 2;
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => {
                end_statement(&mut stmt, indented, &mut out);
                i += 1;
                continue;
            }
            '\n' if depth == 0 => {
                end_statement(&mut stmt, indented, &mut out);
                line_start = true;
                i += 1;
                continue;
            }
            '\n' => {
                stmt.push(' ');
                i += 1;
                continue;
            }
            _ => {}
        }

        stmt.push(c);
        i += 1;
    }

    end_statement(&mut stmt, indented, &mut out);
    out
}

/// Index just past the string literal opening at `start`. An unterminated
/// single-quoted literal stops at the end of its line.
fn string_end(chars: &[char], start: usize, quote: char, triple: bool) -> usize {
    let closing = |i: usize| {
        chars.get(i) == Some(&quote)
            && (!triple || (chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote)))
    };

    let mut i = start + if triple { 3 } else { 1 };
    while i < chars.len() {
        if chars[i] == '\\' {
            i += 2;
        } else if closing(i) {
            return i + if triple { 3 } else { 1 };
        } else if chars[i] == '\n' && !triple {
            return i;
        } else {
            i += 1;
        }
    }
    chars.len()
}

fn end_statement(stmt: &mut String, indented: bool, out: &mut Vec<String>) {
    let text = stmt.trim();
    if !indented && !text.is_empty() {
        out.push(text.to_string());
    }
    stmt.clear();
}

/// Shared-module name a dotted module path refers to, if any.
pub fn shared_ref<'a>(module: &'a str, shared: &BTreeSet<String>) -> Option<&'a str> {
    let mut parts = module.split('.');
    if parts.next()? != SHARED_NAMESPACE {
        return None;
    }
    let name = parts.next()?;
    shared.contains(name).then_some(name)
}

pub struct DepResolver<'a> {
    shared_root: &'a Path,
    shared: BTreeSet<String>,
    scanner: ImportScanner,
}

impl<'a> DepResolver<'a> {
    pub fn new(shared_root: &'a Path) -> Result<Self> {
        let shared = shared_modules(shared_root)?;
        debug!("Shared modules: {:?}", shared);

        Ok(Self {
            shared_root,
            shared,
            scanner: ImportScanner::new()?,
        })
    }

    pub fn shared(&self) -> &BTreeSet<String> {
        &self.shared
    }

    /// Sorted transitive closure of the shared modules `target_dir` uses.
    ///
    /// Breadth-first: each round scans only modules first seen in the
    /// previous round, so every module is visited once.
    pub fn resolve(&self, target_dir: &Path, errors: &mut Errors) -> Vec<String> {
        let mut found: BTreeSet<String> = BTreeSet::new();
        let mut frontier = self.scan_dir(target_dir, errors);

        while !frontier.is_empty() {
            found.extend(frontier.iter().cloned());
            debug!("New shared imports: {:?}", frontier);

            let mut next = BTreeSet::new();
            for module in &frontier {
                for r in self.scan_module(module, errors) {
                    if !found.contains(&r) {
                        next.insert(r);
                    }
                }
            }
            frontier = next;
        }

        found.into_iter().collect()
    }

    fn scan_module(&self, module: &str, errors: &mut Errors) -> BTreeSet<String> {
        let dir = self.shared_root.join(module);
        if dir.is_dir() {
            debug!("Processing nested directory {}", dir.display());
            return self.scan_dir(&dir, errors);
        }

        let file = dir.with_extension(SOURCE_EXT);
        if file.is_file() {
            debug!("Processing nested file {}", file.display());
            return self.scan_file(&file, errors);
        }

        debug!("shared module {module} has no source under {}", self.shared_root.display());
        BTreeSet::new()
    }

    fn scan_dir(&self, dir: &Path, errors: &mut Errors) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for file in source_files(dir, errors) {
            out.extend(self.scan_file(&file, errors));
        }
        out
    }

    fn scan_file(&self, file: &Path, errors: &mut Errors) -> BTreeSet<String> {
        debug!("Processing {}", file.display());

        let text = match fs::read_to_string(file) {
            Ok(t) => t,
            Err(e) => {
                errors.push(format!("Error reading source file {}: {e}", file.display()));
                return BTreeSet::new();
            }
        };

        self.scanner
            .module_refs(&text)
            .iter()
            .filter_map(|m| shared_ref(m, &self.shared))
            .map(str::to_string)
            .collect()
    }
}

/// Convenience wrapper: closure of `target_dir` against `shared_root`.
pub fn resolve(shared_root: &Path, target_dir: &Path, errors: &mut Errors) -> Vec<String> {
    match DepResolver::new(shared_root) {
        Ok(r) => r.resolve(target_dir, errors),
        Err(e) => {
            errors.push(format!("{e:#}"));
            Vec::new()
        }
    }
}

/// Every source file below `dir`, sorted.
fn source_files(dir: &Path, errors: &mut Errors) -> Vec<PathBuf> {
    let Some(base) = dir.to_str() else {
        errors.push(format!("Source directory {} is not valid UTF-8", dir.display()));
        return Vec::new();
    };

    let pattern = format!("{}/**/*.{}", glob::Pattern::escape(base), SOURCE_EXT);
    let mut out = Vec::new();
    match glob::glob(&pattern) {
        Ok(entries) => {
            for entry in entries {
                match entry {
                    Ok(p) if p.is_file() => out.push(p),
                    Ok(_) => {}
                    Err(e) => errors.push(format!("Error scanning {}: {e}", dir.display())),
                }
            }
        }
        Err(e) => errors.push(format!("Invalid source pattern {pattern}: {e}")),
    }

    out.sort();
    out
}

// -------------------- packaging plan --------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPlan {
    pub name: String,
    pub source_dir: PathBuf,
    pub shared_modules: Vec<String>,
}

/// Source dir and shared-module closure for every deployable unit.
/// Units whose source dir is missing are reported and left out.
pub fn plan_units(
    resources_dir: &Path,
    shared_root: &Path,
    graph: &ResourceGraph,
    errors: &mut Errors,
) -> Vec<UnitPlan> {
    let resolver = match DepResolver::new(shared_root) {
        Ok(r) => r,
        Err(e) => {
            errors.push(format!("{e:#}"));
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for unit in graph.units(resources_dir) {
        if !unit.source_dir.is_dir() {
            errors.push(format!(
                "Lambda {}: source directory {} not found",
                unit.name,
                unit.source_dir.display()
            ));
            continue;
        }

        let shared_modules = resolver.resolve(&unit.source_dir, errors);
        debug!("Lambda {} has {} common dependencies", unit.name, shared_modules.len());

        out.push(UnitPlan {
            name: unit.name,
            source_dir: unit.source_dir,
            shared_modules,
        });
    }

    out
}
