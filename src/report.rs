use crate::{
    cli::ReportMode,
    config::ResourceGraph,
    errors::Errors,
    graph::{section_names, Graph, MAPPING_SECTIONS},
};

pub fn build_report(graph: &Graph, errors: &Errors, mode: ReportMode) -> String {
    match mode {
        ReportMode::Off => String::new(),
        ReportMode::Summary => summary(graph, errors),
        ReportMode::Full => serde_yaml::to_string(graph)
            .unwrap_or_else(|e| format!("cannot serialize resource graph: {e}\n")),
    }
}

fn summary(graph: &Graph, errors: &Errors) -> String {
    let mut out = String::new();

    out.push_str("samgraph report (summary)\n");
    out.push_str("=========================\n");
    if let Some(prefix) = graph.get("prefix").and_then(|v| v.as_str()) {
        out.push_str(&format!("prefix: {prefix}\n"));
    }
    out.push_str(&format!("errors: {}\n", errors.len()));

    out.push_str("\nsections\n");
    for section in MAPPING_SECTIONS {
        let names = section_names(graph, section);
        if names.is_empty() {
            continue;
        }
        out.push_str(&format!("  {section}: {}\n", names.len()));
        for name in names {
            out.push_str(&format!("    - {name}\n"));
        }
    }

    // Typed view only works on a graph that passed validation.
    if let Ok(rg) = ResourceGraph::from_graph(graph) {
        out.push_str("\nauthorizers\n");
        for (name, a) in &rg.authorizers {
            out.push_str(&format!(
                "  - {name} (function={}, source={})\n",
                a.function,
                a.identity_source().unwrap_or("?")
            ));
        }
        out.push_str(&format!("\nlambda layer: {}\n", rg.enable_lambda_layer));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_sections() {
        let g: Graph = serde_yaml::from_str(
            "prefix: App\nfunctions:\n  api: {uri: x}\nauthorizers:\n  auth: {function: api, token: h}\n",
        )
        .unwrap();
        let mut errs = Errors::new();
        errs.push("boom");

        let text = build_report(&g, &errs, ReportMode::Summary);
        assert!(text.contains("prefix: App"));
        assert!(text.contains("errors: 1"));
        assert!(text.contains("  functions: 1\n    - api"));
        assert!(text.contains("auth (function=api, source=token)"));

        assert!(build_report(&g, &errs, ReportMode::Off).is_empty());
        assert!(build_report(&g, &errs, ReportMode::Full).contains("uri: x"));
    }
}
