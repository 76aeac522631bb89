// src/validate/refs.rs
use serde_yaml::{Mapping, Value};
use std::path::Path;

use crate::{
    config::Integration,
    errors::Errors,
    graph::{get_mapping, get_str, has_entry, key_text, str_list, Graph},
};

/// Placeholder accepted in place of an external bucket ARN until an
/// override supplies the real one.
pub const ARN_PLACEHOLDER: &str = "<overriden>";
pub const S3_ARN_PREFIX: &str = "arn:aws:s3:::";

/// Semantic pass: cross-references between sections, mutually exclusive
/// fields, and files or directories the graph points at.
pub fn check(resources_dir: &Path, graph: &Graph, errors: &mut Errors) {
    check_buckets(graph, errors);
    check_streams(graph, errors);
    check_functions(graph, errors);
    check_tables(graph, errors);
    check_paths(resources_dir, graph, errors);
    check_import(resources_dir, graph, errors);
    check_prismarine(resources_dir, graph, errors);
    check_authorizers(graph, errors);
}

fn entries<'a>(graph: &'a Graph, section: &str) -> impl Iterator<Item = (String, &'a Mapping)> {
    get_mapping(graph, section)
        .into_iter()
        .flat_map(|m| m.iter())
        .filter_map(|(k, v)| v.as_mapping().map(|body| (key_text(k), body)))
}

fn check_buckets(graph: &Graph, errors: &mut Errors) {
    for (name, bucket) in entries(graph, "buckets") {
        let public = bucket.get("public").and_then(Value::as_bool).unwrap_or(false);
        if name == "private" && public {
            errors.push(format!("Bucket '{name}' cannot be public"));
        }
    }
}

fn check_streams(graph: &Graph, errors: &mut Errors) {
    for (stream, body) in entries(graph, "streams") {
        let Some(buckets) = get_mapping(body, "buckets") else {
            continue;
        };

        for bucket in buckets.values().filter_map(Value::as_mapping) {
            match (get_str(bucket, "bucketname"), get_str(bucket, "extbucketarn")) {
                (None, None) => errors.push(format!(
                    "Stream '{stream}': 'bucketname' or 'extbucketarn' is required"
                )),
                (Some(_), Some(_)) => errors.push(format!(
                    "Stream '{stream}': 'bucketname' and 'extbucketarn' cannot be used together"
                )),
                (Some(name), None) => {
                    if !has_entry(graph, "buckets", name) {
                        errors.push(format!("Stream '{stream}': '{name}' must be a valid bucket"));
                    }
                }
                (None, Some(arn)) => {
                    if !arn.starts_with(S3_ARN_PREFIX) && arn != ARN_PLACEHOLDER {
                        errors.push(format!("Stream '{stream}': 'extbucketarn' must be a valid ARN"));
                    }
                }
            }
        }
    }
}

fn check_functions(graph: &Graph, errors: &mut Errors) {
    for (name, function) in entries(graph, "functions") {
        let refs = [
            ("buckets", "buckets", "Bucket", "bucket"),
            ("tables", "tables", "Table", "table"),
            ("send", "queues", "Send", "queue"),
            ("streams", "streams", "Stream", "stream"),
            ("searches", "search", "Search", "search collection"),
        ];

        for (field, section, label, kind) in refs {
            for target in str_list(function, field) {
                if !has_entry(graph, section, &target) {
                    errors.push(format!("Lambda {name}: {label} {target} must be a valid {kind}"));
                }
            }
        }

        let polls = function.get("polls").and_then(Value::as_sequence);
        for poll in polls.into_iter().flatten().filter_map(Value::as_mapping) {
            let Some(queue) = get_str(poll, "name") else {
                continue;
            };
            if !has_entry(graph, "queues", queue) {
                errors.push(format!("Lambda {name}: Queue {queue} must be a valid queue"));
            }
        }
    }
}

fn check_tables(graph: &Graph, errors: &mut Errors) {
    for (name, table) in entries(graph, "tables") {
        let Some(function) = get_mapping(table, "trigger").and_then(|t| get_str(t, "function")) else {
            continue;
        };
        if !has_entry(graph, "functions", function) {
            errors.push(format!("Table '{name}' trigger function '{function}' must be a valid function"));
        }
    }
}

fn check_paths(resources_dir: &Path, graph: &Graph, errors: &mut Errors) {
    for (path, details) in entries(graph, "paths") {
        let integration = get_str(details, "integration").map_or(Some(Integration::Lambda), Integration::parse);

        match integration {
            Some(Integration::Lambda) => check_lambda_path(graph, &path, details, errors),
            Some(Integration::Dynamo) => {
                if let Some(table) = get_str(details, "table") {
                    if !has_entry(graph, "tables", table) {
                        errors.push(format!("Dynamo path '{path}' table must be a valid table"));
                    }
                }
            }
            Some(Integration::Sqs) => {
                let queue = get_str(details, "queue");
                if !queue.is_some_and(|q| has_entry(graph, "queues", q)) {
                    errors.push(format!("SQS path '{path}' queue must be a valid queue"));
                }
            }
            // unknown integrations are a structural error
            None => continue,
        }

        if integration.is_some_and(Integration::needs_templates) {
            check_templates(resources_dir, &path, details, errors);
        }
    }
}

fn check_lambda_path(graph: &Graph, path: &str, details: &Mapping, errors: &mut Errors) {
    let authorizer = get_str(details, "authorizer");
    let open = details.get("open").and_then(Value::as_bool).unwrap_or(false);

    match (authorizer, open) {
        (Some(_), true) => errors.push(format!("Lambda path '{path}' cannot have both authorizer and open")),
        (None, false) => errors.push(format!("Lambda path '{path}' must have either authorizer or be open")),
        _ => {}
    }

    if let Some(authorizer) = authorizer {
        if !has_entry(graph, "authorizers", authorizer) {
            errors.push(format!("Lambda path '{path}' authorizer must be a valid authorizer"));
        }
    }

    if let Some(function) = get_str(details, "function") {
        if !has_entry(graph, "functions", function) {
            errors.push(format!("Lambda path '{path}' function must be a valid function"));
        }
    }
}

/// Exactly one source, inline or file, for each of request and response.
fn check_templates(resources_dir: &Path, path: &str, details: &Mapping, errors: &mut Errors) {
    for (kind, inline, file) in [
        ("request", "requestTemplate", "requestTemplateFile"),
        ("response", "responseTemplate", "responseTemplateFile"),
    ] {
        let has_inline = details.contains_key(inline);
        let file_ref = get_str(details, file);

        match (has_inline, file_ref) {
            (true, Some(_)) => {
                errors.push(format!("Path '{path}' cannot have both {inline} and {file}"));
            }
            (false, None) => {
                errors.push(format!("Path '{path}' must have a {kind} template"));
            }
            _ => {}
        }

        if let Some(f) = file_ref {
            if !resources_dir.join(f).is_file() {
                errors.push(format!("Path '{path}' {kind} template file '{f}' must be a valid file"));
            }
        }
    }
}

fn check_import(resources_dir: &Path, graph: &Graph, errors: &mut Errors) {
    for item in str_list(graph, "import") {
        if !resources_dir.join(&item).is_dir() {
            errors.push(format!("Import '{item}' must be a valid directory"));
        }
    }
}

fn check_prismarine(resources_dir: &Path, graph: &Graph, errors: &mut Errors) {
    let Some(prismarine) = get_mapping(graph, "prismarine") else {
        return;
    };

    let default_base = get_str(prismarine, "default-base");
    if let Some(base) = default_base {
        if !resources_dir.join(base).is_dir() {
            errors.push(format!("Prismarine default-base '{base}' must be a valid directory"));
            return;
        }
    }

    let tables = prismarine.get("tables").and_then(Value::as_sequence);
    for table in tables.into_iter().flatten().filter_map(Value::as_mapping) {
        let Some(base) = get_str(table, "base").or(default_base) else {
            continue;
        };
        if !resources_dir.join(base).is_dir() {
            errors.push(format!("Prismarine table package '{base}' must have a valid base directory"));
        }
    }
}

fn check_authorizers(graph: &Graph, errors: &mut Errors) {
    for (name, details) in entries(graph, "authorizers") {
        let sources = ["token", "query", "headers"]
            .iter()
            .filter(|f| details.contains_key(**f))
            .count();
        if sources != 1 {
            errors.push(format!(
                "Authorizer '{name}' must have exactly one of token, query or headers (found {sources})"
            ));
        }

        let function = get_str(details, "function");
        if !function.is_some_and(|f| has_entry(graph, "functions", f)) {
            errors.push(format!("Authorizer '{name}' function must be a valid function"));
        }
    }
}
