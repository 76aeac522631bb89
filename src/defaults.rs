use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::{
    config::{
        streams::STREAM_INTERVAL_SECONDS,
        tables::{default_startingposition, default_viewtype},
        Shorthand,
    },
    errors::Errors,
    graph::{key, key_text, Graph, MAPPING_SECTIONS},
};

/// Default search collection name.
pub const DEFAULT_SEARCH: &str = "searchable";

/// Rewrites shorthand forms into their canonical records and fills
/// section defaults. Applying it twice gives the same graph as once.
pub fn apply_defaults(graph: &mut Graph, errors: &mut Errors) {
    default_search(graph);
    default_empty_entries(graph);
    default_functions(graph);
    default_streams(graph, errors);
    default_tables(graph);
    default_paths(graph);
}

fn section_mut<'a>(graph: &'a mut Graph, name: &str) -> Option<&'a mut Mapping> {
    graph.get_mut(name).and_then(Value::as_mapping_mut)
}

fn set_default(m: &mut Mapping, field: &str, value: Value) {
    if !m.contains_key(field) {
        m.insert(key(field), value);
    }
}

fn default_search(graph: &mut Graph) {
    let empty = match graph.get("search") {
        Some(Value::Null) => true,
        Some(Value::Mapping(m)) => m.is_empty(),
        _ => false,
    };

    if empty {
        debug!("Search is empty, adding {DEFAULT_SEARCH}");
        let mut m = Mapping::new();
        m.insert(key(DEFAULT_SEARCH), Value::Mapping(Mapping::new()));
        graph.insert(key("search"), Value::Mapping(m));
    }
}

/// `name:` with no body becomes `name: {}` in every mapping section.
fn default_empty_entries(graph: &mut Graph) {
    for section in MAPPING_SECTIONS {
        match graph.get_mut(*section) {
            Some(slot @ Value::Null) => *slot = Value::Mapping(Mapping::new()),
            Some(Value::Mapping(m)) => {
                for (_, v) in m.iter_mut() {
                    if v.is_null() {
                        *v = Value::Mapping(Mapping::new());
                    }
                }
            }
            _ => {}
        }
    }
}

fn default_functions(graph: &mut Graph) {
    let Some(functions) = section_mut(graph, "functions") else {
        return;
    };

    for (name, function) in functions.iter_mut() {
        let Some(function) = function.as_mapping_mut() else {
            continue;
        };
        debug!("Processing function {}", key_text(name));

        if let Some(Value::Sequence(polls)) = function.get_mut("polls") {
            for poll in polls.iter_mut() {
                if let Ok(bare @ Shorthand::Bare(_)) = serde_yaml::from_value::<Shorthand>(poll.clone()) {
                    *poll = Value::Mapping(bare.into_structured("name"));
                }
            }
        }

        if let Some(searches) = function.get_mut("searches") {
            let empty = match searches {
                Value::Null => true,
                Value::Sequence(s) => s.is_empty(),
                _ => false,
            };
            if empty {
                *searches = Value::Sequence(vec![Value::String(DEFAULT_SEARCH.to_string())]);
            }
        }
    }
}

fn default_streams(graph: &mut Graph, errors: &mut Errors) {
    let Some(streams) = section_mut(graph, "streams") else {
        return;
    };

    for (name, stream) in streams.iter_mut() {
        let Some(stream) = stream.as_mapping_mut() else {
            continue;
        };

        if stream.contains_key("bucketname") {
            if stream.contains_key("buckets") {
                errors.push(format!(
                    "Stream '{}' cannot have both buckets and bucketname",
                    key_text(name)
                ));
                continue;
            }

            let mut private = Mapping::new();
            for field in ["bucketname", "bucketprefix", "intervalinseconds"] {
                if let Some(v) = stream.remove(field) {
                    private.insert(key(field), v);
                }
            }

            let mut buckets = Mapping::new();
            buckets.insert(key("private"), Value::Mapping(private));
            stream.insert(key("buckets"), Value::Mapping(buckets));
        }

        if let Some(Value::Mapping(buckets)) = stream.get_mut("buckets") {
            for (_, bucket) in buckets.iter_mut() {
                if bucket.is_null() {
                    *bucket = Value::Mapping(Mapping::new());
                }
                if let Some(bucket) = bucket.as_mapping_mut() {
                    set_default(bucket, "bucketprefix", Value::String(String::new()));
                    set_default(bucket, "intervalinseconds", Value::from(STREAM_INTERVAL_SECONDS));
                }
            }
        }
    }
}

fn default_tables(graph: &mut Graph) {
    let Some(tables) = section_mut(graph, "tables") else {
        return;
    };

    for (_, table) in tables.iter_mut() {
        let Some(trigger) = table.as_mapping_mut().and_then(|t| t.get_mut("trigger")) else {
            continue;
        };

        if let Ok(bare @ Shorthand::Bare(_)) = serde_yaml::from_value::<Shorthand>(trigger.clone()) {
            *trigger = Value::Mapping(bare.into_structured("function"));
        }

        if let Some(trigger) = trigger.as_mapping_mut() {
            set_default(trigger, "viewtype", Value::String(default_viewtype()));
            set_default(trigger, "startingposition", Value::String(default_startingposition()));
        }
    }
}

fn default_paths(graph: &mut Graph) {
    let Some(paths) = section_mut(graph, "paths") else {
        return;
    };

    for (_, path) in paths.iter_mut() {
        let Some(path) = path.as_mapping_mut() else {
            continue;
        };

        set_default(path, "integration", Value::String("lambda".to_string()));

        let integration = path.get("integration").and_then(Value::as_str).map(str::to_string);
        match integration.as_deref() {
            Some("dynamo") => set_default(path, "action", Value::String("GetItem".to_string())),
            Some("sqs") => set_default(path, "method", Value::String("post".to_string())),
            Some("lambda") => set_default(path, "greedy", Value::Bool(true)),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::get_path;

    fn parse(text: &str) -> Graph {
        serde_yaml::from_str(text).unwrap()
    }

    const SAMPLE: &str = r#"
functions:
  worker:
    uri: backend/worker
    polls: [jobs, {name: mail, batchsize: 5}]
    searches: []
  plain:
    uri: backend/plain
tables:
  items:
    attributes: [{name: id, hash: true}]
    trigger: worker
  orders:
    attributes: [{name: id, hash: true}]
    trigger: {function: worker, viewtype: keys-only}
streams:
  logs:
    bucketname: media
    bucketprefix: raw/
  multi:
    buckets:
      one: {bucketname: media}
      two: {extbucketarn: "arn:aws:s3:::ext", intervalinseconds: 60}
paths:
  /a: {function: worker, open: true}
  /b: {integration: dynamo, requestTemplate: x, responseTemplate: y}
  /c: {integration: sqs, queue: jobs, requestTemplate: x, responseTemplate: y}
  /d: {function: worker, open: true, greedy: false}
search:
queues:
  jobs:
"#;

    fn normalized() -> Graph {
        let mut g = parse(SAMPLE);
        let mut errs = Errors::new();
        apply_defaults(&mut g, &mut errs);
        assert!(errs.is_empty(), "{errs}");
        g
    }

    fn str_at<'a>(g: &'a Graph, path: &[&str]) -> Option<&'a str> {
        get_path(g, path).and_then(Value::as_str)
    }

    #[test]
    fn polls_and_searches() {
        let g = normalized();
        let polls = get_path(&g, &["functions", "worker", "polls"])
            .and_then(Value::as_sequence)
            .unwrap();
        assert_eq!(polls[0].get("name").and_then(Value::as_str), Some("jobs"));
        assert_eq!(polls[1].get("batchsize").and_then(Value::as_i64), Some(5));

        let searches = get_path(&g, &["functions", "worker", "searches"]).unwrap();
        assert_eq!(searches, &Value::Sequence(vec![Value::from("searchable")]));
        assert!(get_path(&g, &["functions", "plain", "searches"]).is_none());
        assert!(get_path(&g, &["search", "searchable"]).is_some());
    }

    #[test]
    fn stream_shorthand_promoted() {
        let g = normalized();
        assert!(get_path(&g, &["streams", "logs", "bucketname"]).is_none());
        assert_eq!(str_at(&g, &["streams", "logs", "buckets", "private", "bucketname"]), Some("media"));
        assert_eq!(str_at(&g, &["streams", "logs", "buckets", "private", "bucketprefix"]), Some("raw/"));
        assert_eq!(
            get_path(&g, &["streams", "logs", "buckets", "private", "intervalinseconds"])
                .and_then(Value::as_i64),
            Some(300)
        );
        assert_eq!(str_at(&g, &["streams", "multi", "buckets", "one", "bucketprefix"]), Some(""));
        assert_eq!(
            get_path(&g, &["streams", "multi", "buckets", "two", "intervalinseconds"])
                .and_then(Value::as_i64),
            Some(60)
        );
    }

    #[test]
    fn triggers_get_defaults() {
        let g = normalized();
        assert_eq!(str_at(&g, &["tables", "items", "trigger", "function"]), Some("worker"));
        assert_eq!(str_at(&g, &["tables", "items", "trigger", "viewtype"]), Some("new-and-old"));
        assert_eq!(str_at(&g, &["tables", "orders", "trigger", "viewtype"]), Some("keys-only"));
        assert_eq!(str_at(&g, &["tables", "orders", "trigger", "startingposition"]), Some("latest"));
    }

    #[test]
    fn path_defaults_per_integration() {
        let g = normalized();
        assert_eq!(str_at(&g, &["paths", "/a", "integration"]), Some("lambda"));
        assert_eq!(get_path(&g, &["paths", "/a", "greedy"]).and_then(Value::as_bool), Some(true));
        assert_eq!(get_path(&g, &["paths", "/d", "greedy"]).and_then(Value::as_bool), Some(false));
        assert_eq!(str_at(&g, &["paths", "/b", "action"]), Some("GetItem"));
        assert_eq!(str_at(&g, &["paths", "/c", "method"]), Some("post"));
        assert!(get_path(&g, &["paths", "/b", "greedy"]).is_none());
    }

    #[test]
    fn empty_entries_become_mappings() {
        let g = normalized();
        assert_eq!(get_path(&g, &["queues", "jobs"]), Some(&Value::Mapping(Mapping::new())));
    }

    #[test]
    fn idempotent() {
        let once = normalized();
        let mut twice = once.clone();
        let mut errs = Errors::new();
        apply_defaults(&mut twice, &mut errs);
        assert_eq!(once, twice);
    }

    #[test]
    fn stream_with_both_forms_is_reported() {
        let mut g = parse("streams:\n  s:\n    bucketname: a\n    buckets: {x: {bucketname: b}}\n");
        let mut errs = Errors::new();
        apply_defaults(&mut g, &mut errs);
        assert_eq!(errs.len(), 1);
        assert!(errs.contains("Stream 's' cannot have both buckets and bucketname"));
        assert_eq!(str_at(&g, &["streams", "s", "bucketname"]), Some("a"));
    }
}
