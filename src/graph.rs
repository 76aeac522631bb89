use serde_yaml::{Mapping, Value};

/// Raw resource graph: an ordered mapping keyed by section name.
pub type Graph = Mapping;

/// Name of the root declaration file inside a resources directory.
pub const ROOT_FILE: &str = "resources.yaml";

/// Name of a fragment file discovered under import directories.
pub const FRAGMENT_FILE: &str = "easysam.yaml";

/// Mapping sections (name -> definition) that get sorted after defaults.
pub const MAPPING_SECTIONS: &[&str] = &[
    "tables",
    "paths",
    "functions",
    "buckets",
    "queues",
    "streams",
    "authorizers",
    "search",
];

pub fn key(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Display form of a mapping key (keys are strings in practice).
pub fn key_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "~".to_string(),
        other => format!("{other:?}"),
    }
}

pub fn get_str<'a>(m: &'a Mapping, field: &str) -> Option<&'a str> {
    m.get(field).and_then(Value::as_str)
}

pub fn get_mapping<'a>(m: &'a Mapping, field: &str) -> Option<&'a Mapping> {
    m.get(field).and_then(Value::as_mapping)
}

/// String items of a sequence field; non-string items are skipped.
pub fn str_list(m: &Mapping, field: &str) -> Vec<String> {
    m.get(field)
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Returns the mapping stored under `name`, creating it when absent or null.
/// `None` when something other than a mapping already lives there.
pub fn ensure_mapping<'a>(m: &'a mut Mapping, name: &str) -> Option<&'a mut Mapping> {
    let slot = m.entry(key(name)).or_insert(Value::Null);
    if slot.is_null() {
        *slot = Value::Mapping(Mapping::new());
    }
    slot.as_mapping_mut()
}

/// Names of the entries of a mapping section, in stored order.
pub fn section_names(graph: &Graph, section: &str) -> Vec<String> {
    get_mapping(graph, section)
        .map(|m| m.keys().map(key_text).collect())
        .unwrap_or_default()
}

pub fn has_entry(graph: &Graph, section: &str, name: &str) -> bool {
    get_mapping(graph, section)
        .map(|m| m.contains_key(name))
        .unwrap_or(false)
}

/// Assigns `value` at `path`, creating intermediate mappings as needed.
/// A non-mapping value standing in the way is replaced.
pub fn set_path(m: &mut Mapping, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut cur = m;
    for seg in parents {
        let slot = cur.entry(key(seg)).or_insert(Value::Null);
        if !slot.is_mapping() {
            if !slot.is_null() {
                tracing::warn!("override replaces non-mapping value at '{seg}'");
            }
            *slot = Value::Mapping(Mapping::new());
        }
        let Some(next) = slot.as_mapping_mut() else {
            return;
        };
        cur = next;
    }

    cur.insert(key(last), value);
}

pub fn get_path<'a>(m: &'a Mapping, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut cur = m.get(*first)?;
    for seg in rest {
        cur = cur.as_mapping()?.get(*seg)?;
    }
    Some(cur)
}

/// Rebuilds a mapping with its keys in lexical order.
pub fn sort_mapping(m: &mut Mapping) {
    let mut entries: Vec<(Value, Value)> = std::mem::take(m).into_iter().collect();
    entries.sort_by_key(|(k, _)| key_text(k));
    *m = entries.into_iter().collect();
}

/// Sorts every mapping section, the import list, and the top level.
pub fn sort_sections(graph: &mut Graph) {
    for section in MAPPING_SECTIONS {
        if let Some(Value::Mapping(m)) = graph.get_mut(*section) {
            sort_mapping(m);
        }
    }

    if let Some(Value::Sequence(seq)) = graph.get_mut("import") {
        seq.sort_by_key(key_text);
    }

    sort_mapping(graph);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn set_path_creates_levels() {
        let mut g = parse("functions: {a: {timeout: 3}}");
        set_path(&mut g, &["functions", "a", "timeout"], Value::from(30));
        set_path(&mut g, &["buckets", "media", "public"], Value::from(true));

        assert_eq!(
            get_path(&g, &["functions", "a", "timeout"]).and_then(Value::as_i64),
            Some(30)
        );
        assert_eq!(
            get_path(&g, &["buckets", "media", "public"]).and_then(Value::as_bool),
            Some(true)
        );
    }

    #[test]
    fn set_path_replaces_scalar_parent() {
        let mut g = parse("prefix: app");
        set_path(&mut g, &["prefix", "x"], Value::from(1));
        assert!(get_mapping(&g, "prefix").is_some());
    }

    #[test]
    fn sort_sections_orders_keys() {
        let mut g = parse("tables: {b: {}, a: {}}\nimport: [z, y]\nbuckets: {}");
        sort_sections(&mut g);

        let top: Vec<String> = g.keys().map(key_text).collect();
        assert_eq!(top, vec!["buckets", "import", "tables"]);
        assert_eq!(section_names(&g, "tables"), vec!["a", "b"]);
        assert_eq!(str_list(&g, "import"), vec!["y", "z"]);
    }

    #[test]
    fn ensure_mapping_refuses_scalars() {
        let mut g = parse("paths: nope");
        assert!(ensure_mapping(&mut g, "paths").is_none());
        assert!(ensure_mapping(&mut g, "tables").is_some());
    }
}
