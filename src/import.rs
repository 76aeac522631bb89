use anyhow::{bail, Context as _, Result};
use serde_yaml::{Mapping, Value};
use std::{
    collections::BTreeSet,
    fs,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::{
    errors::Errors,
    graph::{ensure_mapping, get_mapping, get_str, key, key_text, Graph, FRAGMENT_FILE},
};

/// Top-level keys a fragment file may declare.
pub const FRAGMENT_SECTIONS: &[&str] = &["lambda", "tables", "import"];

/// Expands every import directory into the graph.
///
/// Fragments are found depth-first below each directory and processed in
/// sorted path order, so the winner of a name collision is reproducible.
/// Missing directories are skipped here and reported by validation.
pub fn import_fragments(graph: &mut Graph, root: &Path, import_dirs: &[String], errors: &mut Errors) {
    let mut importer = Importer::new(root);

    for dir_str in import_dirs {
        let dir = root.join(dir_str);
        info!("Processing import directory {}", dir.display());

        if !dir.is_dir() {
            warn!("import directory {} not found, skipping", dir.display());
            continue;
        }

        for entry in find_fragments(&dir, errors) {
            importer.process_file(graph, &entry, errors);
        }
    }
}

/// Every fragment file below `dir`, sorted component-wise.
pub fn find_fragments(dir: &Path, errors: &mut Errors) -> Vec<PathBuf> {
    let Some(base) = dir.to_str() else {
        errors.push(format!("Import directory {} is not valid UTF-8", dir.display()));
        return Vec::new();
    };

    let pattern = format!("{}/**/{}", glob::Pattern::escape(base), FRAGMENT_FILE);
    let entries = match glob::glob(&pattern) {
        Ok(entries) => entries,
        Err(e) => {
            errors.push(format!("Invalid import pattern {pattern}: {e}"));
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for entry in entries {
        match entry {
            Ok(p) => out.push(p),
            Err(e) => errors.push(format!("Error scanning import directory {}: {e}", dir.display())),
        }
    }

    out.sort();
    out
}

struct Importer {
    root: PathBuf,
    /// Fragments currently being expanded, for cycle detection.
    active: BTreeSet<PathBuf>,
}

impl Importer {
    fn new(root: &Path) -> Self {
        Self {
            root: normalize_path(root),
            active: BTreeSet::new(),
        }
    }

    fn process_file(&mut self, graph: &mut Graph, entry_path: &Path, errors: &mut Errors) {
        let entry_path = normalize_path(entry_path);
        if self.active.contains(&entry_path) {
            errors.push(format!("Import file {} imports itself", entry_path.display()));
            return;
        }

        info!("Processing import file {}", entry_path.display());

        let fragment = match load_fragment(&entry_path) {
            Ok(f) => f,
            Err(e) => {
                errors.push(format!("Error loading import file {}: {e:#}", entry_path.display()));
                return;
            }
        };

        let unexpected: Vec<String> = fragment
            .keys()
            .map(key_text)
            .filter(|k| !FRAGMENT_SECTIONS.contains(&k.as_str()))
            .collect();
        if !unexpected.is_empty() {
            errors.push(format!(
                "Import file {} contains unexpected sections: {}",
                entry_path.display(),
                unexpected.join(", ")
            ));
            return;
        }

        let entry_dir = entry_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        match fragment.get("lambda") {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(lambda)) => {
                self.add_lambda(graph, lambda, &entry_path, &entry_dir, errors)
            }
            Some(_) => errors.push(format!(
                "Import file {} has a lambda block that is not a mapping",
                entry_path.display()
            )),
        }

        match fragment.get("tables") {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(tables)) => add_tables(graph, tables, &entry_path, errors),
            Some(_) => errors.push(format!(
                "Import file {} has a tables block that is not a mapping",
                entry_path.display()
            )),
        }

        match fragment.get("import") {
            None | Some(Value::Null) => {}
            Some(Value::Sequence(items)) => {
                self.active.insert(entry_path.clone());
                for item in items {
                    let Some(rel) = item.as_str() else {
                        errors.push(format!(
                            "Import file {} has a non-string import entry",
                            entry_path.display()
                        ));
                        continue;
                    };

                    let mut target = entry_dir.join(rel);
                    if target.is_dir() {
                        target = target.join(FRAGMENT_FILE);
                    }
                    self.process_file(graph, &target, errors);
                }
                self.active.remove(&entry_path);
            }
            Some(_) => errors.push(format!(
                "Import file {} has an import block that is not a list",
                entry_path.display()
            )),
        }
    }

    fn add_lambda(
        &self,
        graph: &mut Graph,
        lambda: &Mapping,
        entry_path: &Path,
        entry_dir: &Path,
        errors: &mut Errors,
    ) {
        let Some(name) = get_str(lambda, "name").filter(|n| !n.is_empty()) else {
            errors.push(format!("Import file {} contains no lambda name", entry_path.display()));
            return;
        };

        let Some(functions) = ensure_mapping(graph, "functions") else {
            errors.push("Section 'functions' must be a mapping".to_string());
            return;
        };

        if functions.contains_key(name) {
            errors.push(format!(
                "Import file {} contains duplicate lambda name {name}",
                entry_path.display()
            ));
            return;
        }

        let mut resources = get_mapping(lambda, "resources").cloned().unwrap_or_default();
        if !resources.contains_key("uri") {
            let uri = self.relative_uri(entry_dir);
            debug!("Adding uri {uri} to lambda {name}");
            resources.insert(key("uri"), Value::String(uri));
        }

        debug!("Adding lambda {name} to resources");
        functions.insert(key(name), Value::Mapping(resources));

        match lambda.get("integration") {
            Some(Value::Mapping(integration)) if !integration.is_empty() => {
                add_integration(graph, name, integration, entry_path, errors)
            }
            None | Some(Value::Null) | Some(Value::Mapping(_)) => {}
            Some(_) => errors.push(format!(
                "Import file {} has an integration that is not a mapping",
                entry_path.display()
            )),
        }
    }

    /// Fragment directory relative to the resources dir, `/`-separated.
    fn relative_uri(&self, entry_dir: &Path) -> String {
        let dir = normalize_path(entry_dir);
        let rel = dir.strip_prefix(&self.root).unwrap_or(&dir);

        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();

        if parts.is_empty() {
            ".".to_string()
        } else {
            parts.join("/")
        }
    }
}

fn add_integration(
    graph: &mut Graph,
    unit: &str,
    integration: &Mapping,
    entry_path: &Path,
    errors: &mut Errors,
) {
    let Some(path) = get_str(integration, "path").filter(|p| !p.is_empty()) else {
        errors.push(format!("Import file {} contains no path name", entry_path.display()));
        return;
    };

    let Some(paths) = ensure_mapping(graph, "paths") else {
        errors.push("Section 'paths' must be a mapping".to_string());
        return;
    };

    if paths.contains_key(path) {
        errors.push(format!("Import file {} contains duplicate path {path}", entry_path.display()));
        return;
    }

    let mut body = integration.clone();
    body.remove("path");
    body.insert(key("function"), Value::String(unit.to_string()));
    body.insert(key("integration"), Value::String("lambda".to_string()));

    debug!("Adding path {path} to resources");
    paths.insert(key(path), Value::Mapping(body));
}

fn add_tables(graph: &mut Graph, tables: &Mapping, entry_path: &Path, errors: &mut Errors) {
    let Some(section) = ensure_mapping(graph, "tables") else {
        errors.push("Section 'tables' must be a mapping".to_string());
        return;
    };

    for (name, def) in tables {
        if section.contains_key(name) {
            errors.push(format!(
                "Import file {} contains duplicate table {}",
                entry_path.display(),
                key_text(name)
            ));
            continue;
        }

        debug!("Adding table {} to resources", key_text(name));
        section.insert(name.clone(), def.clone());
    }
}

fn load_fragment(path: &Path) -> Result<Mapping> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    match serde_yaml::from_str::<Value>(&text)? {
        Value::Mapping(m) => Ok(m),
        Value::Null => bail!("fragment is empty"),
        _ => bail!("fragment must be a mapping"),
    }
}

/// Lexically folds `.` and `..` without touching the file system.
pub fn normalize_path(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::get_path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, text).unwrap();
    }

    fn run(root: &Path, dirs: &[&str]) -> (Graph, Errors) {
        let mut g = Graph::new();
        let mut errs = Errors::new();
        let dirs: Vec<String> = dirs.iter().map(|d| d.to_string()).collect();
        import_fragments(&mut g, root, &dirs, &mut errs);
        (g, errs)
    }

    #[test]
    fn registers_unit_and_hoists_integration() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "backend/foo/easysam.yaml",
            "lambda:\n  name: foo\n  integration:\n    path: /foo\n    open: true\n",
        );

        let (g, errs) = run(tmp.path(), &["backend"]);
        assert!(errs.is_empty(), "{errs}");

        assert_eq!(
            get_path(&g, &["functions", "foo", "uri"]).and_then(Value::as_str),
            Some("backend/foo")
        );
        let path = get_path(&g, &["paths", "/foo"]).and_then(Value::as_mapping).unwrap();
        assert_eq!(get_str(path, "function"), Some("foo"));
        assert_eq!(get_str(path, "integration"), Some("lambda"));
        assert!(!path.contains_key("path"));
    }

    #[test]
    fn explicit_uri_is_kept() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "backend/foo/easysam.yaml",
            "lambda:\n  name: foo\n  resources:\n    uri: src/foo\n    timeout: 10\n",
        );

        let (g, _) = run(tmp.path(), &["backend"]);
        assert_eq!(
            get_path(&g, &["functions", "foo", "uri"]).and_then(Value::as_str),
            Some("src/foo")
        );
    }

    #[test]
    fn first_duplicate_wins_in_path_order() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "backend/a/easysam.yaml", "lambda: {name: dup}\n");
        write(tmp.path(), "backend/b/easysam.yaml", "lambda: {name: dup}\n");

        let (g, errs) = run(tmp.path(), &["backend"]);
        assert_eq!(errs.len(), 1);
        assert!(errs.contains("duplicate lambda name dup"));
        assert_eq!(
            get_path(&g, &["functions", "dup", "uri"]).and_then(Value::as_str),
            Some("backend/a")
        );
    }

    #[test]
    fn duplicate_paths_and_tables_are_reported() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "backend/a/easysam.yaml",
            "lambda: {name: a, integration: {path: /x, open: true}}\ntables: {items: {attributes: [{name: id, hash: true}]}}\n",
        );
        write(
            tmp.path(),
            "backend/b/easysam.yaml",
            "lambda: {name: b, integration: {path: /x, open: true}}\ntables: {items: {}}\n",
        );

        let (g, errs) = run(tmp.path(), &["backend"]);
        assert_eq!(errs.len(), 2, "{errs}");
        assert!(errs.contains("duplicate path /x"));
        assert!(errs.contains("duplicate table items"));
        assert!(crate::graph::has_entry(&g, "functions", "b"));
        assert_eq!(
            get_path(&g, &["paths", "/x", "function"]).and_then(Value::as_str),
            Some("a")
        );
    }

    #[test]
    fn unexpected_section_skips_fragment() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "backend/a/easysam.yaml", "lambda: {name: a}\nbuckets: {}\n");

        let (g, errs) = run(tmp.path(), &["backend"]);
        assert!(errs.contains("unexpected sections: buckets"));
        assert!(!crate::graph::has_entry(&g, "functions", "a"));
    }

    #[test]
    fn nested_imports_resolve_from_fragment_dir() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "backend/api/easysam.yaml", "import: [../../shared/jobs.yaml]\n");
        write(tmp.path(), "shared/jobs.yaml", "lambda: {name: jobs}\ntables: {jobs: {}}\n");

        let (g, errs) = run(tmp.path(), &["backend"]);
        assert!(errs.is_empty(), "{errs}");
        assert_eq!(
            get_path(&g, &["functions", "jobs", "uri"]).and_then(Value::as_str),
            Some("shared")
        );
        assert!(crate::graph::has_entry(&g, "tables", "jobs"));
    }

    #[test]
    fn self_import_is_reported_once() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "backend/easysam.yaml", "import: [easysam.yaml]\n");

        let (_, errs) = run(tmp.path(), &["backend"]);
        assert_eq!(errs.len(), 1);
        assert!(errs.contains("imports itself"));
    }

    #[test]
    fn broken_fragment_does_not_block_siblings() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "backend/a/easysam.yaml", "lambda: [unclosed\n");
        write(tmp.path(), "backend/b/easysam.yaml", "lambda: {name: b}\n");

        let (g, errs) = run(tmp.path(), &["backend"]);
        assert_eq!(errs.len(), 1);
        assert!(errs.contains("Error loading import file"));
        assert!(crate::graph::has_entry(&g, "functions", "b"));
    }

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize_path(Path::new("./a/b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize_path(Path::new("../../x")), PathBuf::from("../../x"));
    }
}
