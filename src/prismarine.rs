use anyhow::{bail, Context as _, Result};
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::{
    config::{PrismarineDef, PrismarinePackage},
    errors::Errors,
    graph::{ensure_mapping, get_str, key, Graph},
};

/// File holding a package's cluster and model declarations.
pub const MODELS_FILE: &str = "models.py";

/// One `@c.model(...)` registration, read statically.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRegistration {
    pub name: String,
    pub primary_key: String,
    pub sort_key: Option<String>,
    /// Bare function name or a trigger record; normalized with the tables.
    pub trigger: Option<Value>,
    pub ttl_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterScan {
    pub prefix: String,
    pub models: Vec<ModelRegistration>,
}

/// Regex-driven reader for model source files. Nothing is executed.
pub struct ModelScanner {
    cluster_re: Regex,
    model_re: Regex,
    class_re: Regex,
}

impl ModelScanner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            cluster_re: Regex::new(r#"Cluster\(\s*['"]([^'"]+)['"]\s*\)"#)?,
            model_re: Regex::new(r"(?m)^\s*@[A-Za-z_][A-Za-z0-9_]*\.model\(")?,
            class_re: Regex::new(r"(?m)^\s*class\s+([A-Za-z_][A-Za-z0-9_]*)")?,
        })
    }

    pub fn scan(&self, source: &str) -> Result<ClusterScan> {
        let Some(cluster) = self.cluster_re.captures(source) else {
            bail!("no Cluster(...) declaration found");
        };
        let prefix = cluster[1].to_string();

        let mut models = Vec::new();
        for m in self.model_re.find_iter(source) {
            let (args, end) = call_args(source, m.end())
                .with_context(|| format!("unterminated model decorator at byte {}", m.start()))?;

            let Some(class) = self.class_re.captures(&source[end..]) else {
                bail!("model decorator at byte {} is not followed by a class", m.start());
            };
            let name = class[1].to_string();

            let kwargs = parse_kwargs(&args)
                .with_context(|| format!("model {name}: cannot read decorator arguments"))?;

            let Some(primary_key) = get_str(&kwargs, "PK") else {
                bail!("model {name}: PK is required");
            };

            models.push(ModelRegistration {
                name,
                primary_key: primary_key.to_string(),
                sort_key: get_str(&kwargs, "SK").map(str::to_string),
                trigger: kwargs.get("trigger").filter(|v| !v.is_null()).cloned(),
                ttl_field: get_str(&kwargs, "ttl").map(str::to_string),
            });
        }

        if models.is_empty() {
            bail!("cluster {prefix} declares no models");
        }

        Ok(ClusterScan { prefix, models })
    }
}

/// Text between the parenthesis opened just before `start` and its match,
/// with comments removed and line breaks folded. Also returns the index
/// just past the closing parenthesis.
fn call_args(source: &str, start: usize) -> Option<(String, usize)> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut comment = false;
    let mut out = String::new();

    for (i, ch) in source[start..].char_indices() {
        if comment {
            if ch == '\n' {
                comment = false;
                out.push(' ');
            }
            continue;
        }

        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            out.push(ch);
            continue;
        }

        match ch {
            '\'' | '"' => quote = Some(ch),
            '#' => {
                comment = true;
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((out, start + i + 1));
                }
            }
            _ => {}
        }

        out.push(if ch == '\n' { ' ' } else { ch });
    }

    None
}

/// Splits on commas outside brackets and quotes.
fn split_top_level(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut last = 0;

    for (i, ch) in args.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&args[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&args[last..]);

    parts.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}

/// `PK='Foo', trigger={'function': 'x'}` read as a YAML flow mapping.
fn parse_kwargs(args: &str) -> Result<Mapping> {
    let mut fields = Vec::new();
    for arg in split_top_level(args) {
        let Some((name, value)) = arg.split_once('=') else {
            bail!("positional argument '{arg}' is not supported");
        };
        fields.push(format!("{}: {}", name.trim(), value.trim()));
    }

    let flow = format!("{{{}}}", fields.join(", "));
    serde_yaml::from_str(&flow).with_context(|| format!("invalid arguments: {flow}"))
}

/// Table entries for a scanned cluster, keyed `<prefix><Model>`.
pub fn build_tables(scan: &ClusterScan) -> Vec<(String, Mapping)> {
    scan.models
        .iter()
        .map(|model| {
            let mut attributes = vec![attribute(&model.primary_key, "hash")];
            if let Some(sk) = &model.sort_key {
                attributes.push(attribute(sk, "range"));
            }

            let mut body = Mapping::new();
            body.insert(key("attributes"), Value::Sequence(attributes));
            if let Some(trigger) = &model.trigger {
                body.insert(key("trigger"), trigger.clone());
            }
            if let Some(ttl) = &model.ttl_field {
                body.insert(key("ttl"), Value::String(ttl.clone()));
            }

            (format!("{}{}", scan.prefix, model.name), body)
        })
        .collect()
}

fn attribute(name: &str, role: &str) -> Value {
    let mut m = Mapping::new();
    m.insert(key("name"), Value::String(name.to_string()));
    m.insert(key(role), Value::Bool(true));
    Value::Mapping(m)
}

/// Registers the tables of every `prismarine` package into `tables`.
pub fn register_tables(graph: &mut Graph, search_paths: &[PathBuf], errors: &mut Errors) {
    let Some(section) = graph.get("prismarine") else {
        return;
    };
    if section.is_null() {
        return;
    }

    let def: PrismarineDef = match serde_yaml::from_value(section.clone()) {
        Ok(d) => d,
        Err(e) => {
            errors.push(format!("Invalid prismarine section: {e}"));
            return;
        }
    };

    let scanner = match ModelScanner::new() {
        Ok(s) => s,
        Err(e) => {
            errors.push(format!("{e:#}"));
            return;
        }
    };

    let prefix = get_str(graph, "prefix").map(str::to_string);

    for entry in &def.tables {
        let Some((base, package)) = entry_location(&def, entry, errors) else {
            continue;
        };
        info!("Processing prismarine package {base}/{package}");

        let Some(models_file) = locate_models(search_paths, base, package) else {
            errors.push(format!(
                "Error generating prismarine dynamo tables for {base}/{package}: {MODELS_FILE} not found"
            ));
            continue;
        };

        let scan = match fs::read_to_string(&models_file)
            .with_context(|| format!("failed to read {}", models_file.display()))
            .and_then(|text| scanner.scan(&text))
        {
            Ok(s) => s,
            Err(e) => {
                errors.push(format!(
                    "Error generating prismarine dynamo tables for {base}/{package}: {e:#}"
                ));
                continue;
            }
        };

        if let Some(prefix) = &prefix {
            if !scan.prefix.starts_with(prefix.as_str()) {
                errors.push(format!(
                    "Prismarine Cluster prefix ({}) must start with the master prefix ({prefix})",
                    scan.prefix
                ));
                continue;
            }
        }

        let Some(tables) = ensure_mapping(graph, "tables") else {
            errors.push("Section 'tables' must be a mapping".to_string());
            return;
        };

        for (name, body) in build_tables(&scan) {
            if tables.contains_key(name.as_str()) {
                errors.push(format!("Prismarine package {package} contains duplicate table {name}"));
                continue;
            }
            debug!("Adding prismarine table {name}");
            tables.insert(key(&name), Value::Mapping(body));
        }
    }
}

fn entry_location<'a>(
    def: &'a PrismarineDef,
    entry: &'a PrismarinePackage,
    errors: &mut Errors,
) -> Option<(&'a str, &'a str)> {
    let base = entry.base.as_deref().or(def.default_base.as_deref());
    let package = entry.package.as_deref();

    match (base, package) {
        (Some(b), Some(p)) => Some((b, p)),
        (None, p) => {
            errors.push(format!("No base found for {}", p.unwrap_or("<unnamed>")));
            None
        }
        (Some(b), None) => {
            errors.push(format!("No package found for {b}"));
            None
        }
    }
}

/// First `<search path>/<base>/<package>/models.py` that exists.
fn locate_models(search_paths: &[PathBuf], base: &str, package: &str) -> Option<PathBuf> {
    search_paths
        .iter()
        .map(|sp| package_dir(sp, base, package).join(MODELS_FILE))
        .find(|p| p.is_file())
}

pub fn package_dir(root: &Path, base: &str, package: &str) -> PathBuf {
    root.join(base).join(package)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::get_path;
    use tempfile::TempDir;

    const MODELS: &str = r#"
from typing import TypedDict
from prismarine.runtime import Cluster


c = Cluster('MyAppStore')


@c.model(PK='Foo', SK='Bar', ttl='ExpireAt')
class Item(TypedDict):
    Foo: str


@c.model(
    PK='OrderID',
    trigger={
        'function': 'orders',  # handler
        'batchsize': 50,
        'startingposition': 'trim-horizon'
    }
)
class Order(TypedDict):
    OrderID: str


@c.model(PK="UserID", trigger='userlogger')
class UserActivity(TypedDict):
    UserID: str
"#;

    #[test]
    fn scans_cluster_and_models() {
        let scan = ModelScanner::new().unwrap().scan(MODELS).unwrap();
        assert_eq!(scan.prefix, "MyAppStore");
        assert_eq!(scan.models.len(), 3);

        let item = &scan.models[0];
        assert_eq!(item.name, "Item");
        assert_eq!(item.sort_key.as_deref(), Some("Bar"));
        assert_eq!(item.ttl_field.as_deref(), Some("ExpireAt"));

        let order = &scan.models[1];
        assert_eq!(order.sort_key, None);
        let trigger = order.trigger.as_ref().and_then(Value::as_mapping).unwrap();
        assert_eq!(get_str(trigger, "function"), Some("orders"));
        assert_eq!(trigger.get("batchsize").and_then(Value::as_i64), Some(50));

        assert_eq!(scan.models[2].trigger, Some(Value::from("userlogger")));
    }

    #[test]
    fn builds_table_entries() {
        let scan = ModelScanner::new().unwrap().scan(MODELS).unwrap();
        let tables = build_tables(&scan);
        let names: Vec<&str> = tables.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["MyAppStoreItem", "MyAppStoreOrder", "MyAppStoreUserActivity"]);

        let attrs = tables[0].1.get("attributes").and_then(Value::as_sequence).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[1].get("range").and_then(Value::as_bool), Some(true));
        assert_eq!(get_str(&tables[0].1, "ttl"), Some("ExpireAt"));
    }

    #[test]
    fn missing_cluster_is_an_error() {
        let err = ModelScanner::new().unwrap().scan("class Foo: pass\n").unwrap_err();
        assert!(err.to_string().contains("Cluster"));
    }

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let dir = package_dir(tmp.path(), "common", "store");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MODELS_FILE), MODELS).unwrap();
        tmp
    }

    #[test]
    fn registers_tables_into_graph() {
        let tmp = tree();
        let mut g: Graph = serde_yaml::from_str(
            "prefix: MyApp\nprismarine:\n  default-base: common\n  tables: [{package: store}]\ntables:\n  MyAppStoreItem: {attributes: [{name: id}]}\n",
        )
        .unwrap();

        let mut errs = Errors::new();
        register_tables(&mut g, &[tmp.path().to_path_buf()], &mut errs);

        assert_eq!(errs.len(), 1, "{errs}");
        assert!(errs.contains("duplicate table MyAppStoreItem"));
        assert!(get_path(&g, &["tables", "MyAppStoreOrder", "trigger"]).is_some());
        assert!(get_path(&g, &["tables", "MyAppStoreUserActivity"]).is_some());
    }

    #[test]
    fn prefix_mismatch_and_missing_package() {
        let tmp = tree();
        let mut g: Graph = serde_yaml::from_str(
            "prefix: Other\nprismarine:\n  default-base: common\n  tables: [{package: store}, {base: common}, {package: nowhere}]\n",
        )
        .unwrap();

        let mut errs = Errors::new();
        register_tables(&mut g, &[tmp.path().to_path_buf()], &mut errs);

        assert_eq!(errs.len(), 3, "{errs}");
        assert!(errs.contains("must start with the master prefix (Other)"));
        assert!(errs.contains("No package found for common"));
        assert!(errs.contains("common/nowhere"));
        assert!(g.get("tables").is_none());
    }
}
