use tracing::info;

use crate::{
    context::DeploymentContext,
    graph::{set_path, Graph},
};

/// Splits an override path on `/` or `.`, ignoring empty segments.
pub fn split_override_path(raw: &str) -> Vec<&str> {
    raw.split(|c: char| c == '/' || c == '.').filter(|s| !s.is_empty()).collect()
}

/// Writes every context override into the graph.
///
/// Runs after conditionals and before imports, so only keys coming from
/// the root file (or created here) can be targeted.
pub fn apply_overrides(graph: &mut Graph, ctx: &DeploymentContext) {
    for (raw_path, value) in ctx.overrides() {
        let path = split_override_path(raw_path);
        if path.is_empty() {
            continue;
        }

        info!("Applying override: {} = {:?}", path.join("."), value);
        set_path(graph, &path, value.clone());
    }
}
