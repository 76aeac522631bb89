// src/validate/schema.rs
use anyhow::{Context as _, Result};
use jsonschema::{Draft, Validator};
use serde_json::Value as JsonValue;

use crate::{errors::Errors, graph::Graph};

const SCHEMA_BYTES: &[u8] = include_bytes!("resources.schema.json");

pub fn build_validator() -> Result<Validator> {
    let schema: JsonValue =
        serde_json::from_slice(SCHEMA_BYTES).context("parse resources.schema.json")?;
    jsonschema::options()
        .with_draft(Draft::Draft7)
        .build(&schema)
        .context("build resources schema validator")
}

/// Structural pass: per-section shapes, enumerations, numeric ranges and
/// key patterns. Messages are sorted so repeated runs report identically.
pub fn check(graph: &Graph, errors: &mut Errors) {
    let validator = match build_validator() {
        Ok(v) => v,
        Err(e) => {
            errors.push(format!("{e:#}"));
            return;
        }
    };

    let doc = match serde_json::to_value(graph) {
        Ok(v) => v,
        Err(e) => {
            errors.push(format!("Invalid resources data: {e}"));
            return;
        }
    };

    let mut found: Vec<String> = validator
        .iter_errors(&doc)
        .map(|err| format!("Invalid resources data: {} in {}", err, location(&err.instance_path().to_string())))
        .collect();
    found.sort();

    errors.extend(found);
}

fn location(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_text(text: &str) -> Errors {
        let g: Graph = serde_yaml::from_str(text).unwrap();
        let mut errs = Errors::new();
        check(&g, &mut errs);
        errs
    }

    #[test]
    fn accepts_normalized_graph() {
        let errs = check_text(
            r#"
prefix: MyApp
import: [backend]
functions:
  api: {uri: backend/api, timeout: 30, memory: 256, polls: [{name: jobs, batchsize: 10}]}
tables:
  items:
    attributes: [{name: id, hash: true}]
    trigger: {function: api, viewtype: new-and-old, startingposition: latest}
paths:
  /items/{id}: {integration: lambda, function: api, open: true, greedy: true}
queues:
  jobs: {delay: 0}
authorizers:
  auth: {function: api, token: Authorization, ttl: 300}
search:
  searchable: {}
enable_lambda_layer: false
"#,
        );
        assert!(errs.is_empty(), "{errs}");
    }

    #[test]
    fn reports_ranges_and_required_fields() {
        let errs = check_text(
            "functions:\n  api: {timeout: 901}\ntables:\n  items: {attributes: []}\n",
        );
        assert!(errs.contains("/functions/api"), "{errs}");
        assert!(errs.contains("/functions/api/timeout"), "{errs}");
        assert!(errs.contains("/tables/items/attributes"), "{errs}");
        assert_eq!(errs.len(), 3);
    }

    #[test]
    fn reports_unknown_sections_and_bad_enums() {
        let errs = check_text(
            "lambdas: {}\npaths:\n  /x: {integration: http}\n  bad: {integration: sqs}\n",
        );
        assert!(errs.contains("lambdas"), "{errs}");
        assert!(errs.contains("/paths/~1x/integration"), "{errs}");
        assert!(errs.contains("bad"), "{errs}");
    }

    #[test]
    fn lambda_paths_need_a_function() {
        let errs = check_text("paths:\n  /x: {integration: lambda, open: true}\n");
        assert_eq!(errs.len(), 1);
        assert!(errs.contains("function"), "{errs}");
    }
}
