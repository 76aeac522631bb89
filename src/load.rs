use anyhow::{bail, Context as _, Result};
use serde_yaml::{Mapping, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::{
    conditional::resolve_conditionals,
    context::DeploymentContext,
    defaults::apply_defaults,
    errors::Errors,
    graph::{key, sort_sections, str_list, Graph, ROOT_FILE},
    import::import_fragments,
    overrides::apply_overrides,
    prismarine::register_tables,
    validate::validate,
};

/// Directory whose presence turns on the shared dependency layer.
pub const THIRDPARTY_DIR: &str = "thirdparty";

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub resources_dir: PathBuf,
    /// Extra roots for model packages, searched after `resources_dir`.
    pub search_paths: Vec<PathBuf>,
    pub context: DeploymentContext,
}

impl LoadOptions {
    pub fn new(resources_dir: impl Into<PathBuf>, context: DeploymentContext) -> Self {
        Self {
            resources_dir: resources_dir.into(),
            search_paths: Vec::new(),
            context,
        }
    }

    pub fn with_search_path(mut self, p: impl Into<PathBuf>) -> Self {
        self.search_paths.push(p.into());
        self
    }

    fn model_roots(&self) -> Vec<PathBuf> {
        std::iter::once(self.resources_dir.clone())
            .chain(self.search_paths.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// Every stage ran; `errors` may still be non-empty.
    Loaded { graph: Graph, errors: Errors },
    /// A conditional key needed a context field that was never supplied.
    /// No graph is produced.
    Fatal { errors: Errors },
}

impl LoadOutcome {
    pub fn errors(&self) -> &Errors {
        match self {
            LoadOutcome::Loaded { errors, .. } | LoadOutcome::Fatal { errors } => errors,
        }
    }

    pub fn graph(&self) -> Option<&Graph> {
        match self {
            LoadOutcome::Loaded { graph, .. } => Some(graph),
            LoadOutcome::Fatal { .. } => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, LoadOutcome::Fatal { .. })
    }
}

/// Compiles `<resources_dir>/resources.yaml` into a resolved graph:
/// conditionals, overrides, model tables, imports, defaults, ordering,
/// validation, then internal values.
pub fn load(opts: &LoadOptions) -> LoadOutcome {
    let mut errors = Errors::new();
    let root = &opts.resources_dir;
    let resources = root.join(ROOT_FILE);

    let raw = match read_root(&resources) {
        Ok(m) => m,
        Err(e) => {
            errors.push(format!("Error loading resources file {}: {e:#}", resources.display()));
            return LoadOutcome::Loaded {
                graph: Graph::new(),
                errors,
            };
        }
    };

    info!("Resolving conditional resources");
    debug!("Deployment context: {}", opts.context.debug_dump());
    let mut graph = match resolve_conditionals(&raw, &opts.context, &mut errors) {
        Ok(g) => g,
        Err(fatal) => return LoadOutcome::Fatal { errors: fatal.errors },
    };

    info!("Applying overrides");
    apply_overrides(&mut graph, &opts.context);

    info!("Processing resources");
    register_tables(&mut graph, &opts.model_roots(), &mut errors);

    let import_dirs = str_list(&graph, "import");
    if !import_dirs.is_empty() {
        import_fragments(&mut graph, root, &import_dirs, &mut errors);
    }

    apply_defaults(&mut graph, &mut errors);
    sort_sections(&mut graph);

    validate(root, &graph, &mut errors);

    info!("Adding internal values");
    let layer = root.join(THIRDPARTY_DIR).exists();
    graph.insert(key("enable_lambda_layer"), Value::Bool(layer));

    LoadOutcome::Loaded { graph, errors }
}

fn read_root(path: &Path) -> Result<Mapping> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    match serde_yaml::from_str::<Value>(&text)? {
        Value::Mapping(m) => Ok(m),
        Value::Null => Ok(Mapping::new()),
        _ => bail!("resources file must be a mapping"),
    }
}
