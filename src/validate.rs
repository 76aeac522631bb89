use std::path::Path;
use tracing::info;

use crate::{errors::Errors, graph::Graph};

pub mod refs;
pub mod schema;

/// Structural pass, then semantic pass. Both only accumulate.
pub fn validate(resources_dir: &Path, graph: &Graph, errors: &mut Errors) {
    info!("Validating resources");

    let before = errors.len();
    schema::check(graph, errors);
    refs::check(resources_dir, graph, errors);

    info!("Validation found {} problem(s)", errors.len() - before);
}
