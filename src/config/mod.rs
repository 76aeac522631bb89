// src/config/mod.rs
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::graph::Graph;

pub mod authorizers;
pub mod functions;
pub mod paths;
pub mod streams;
pub mod tables;

pub use authorizers::AuthorizerDef;
pub use functions::{FunctionDef, PollDef};
pub use paths::{Integration, PathDef};
pub use streams::{BucketDef, QueueDef, StreamBucketDef, StreamDef};
pub use tables::{AttributeDef, PrismarineDef, PrismarinePackage, TableDef, TriggerDef};

/// A field that may be written as a bare name or as a full record.
///
/// Raw fragments are read into this first; the normalizer rewrites every
/// `Bare` into the `Structured` form so later stages only see records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Shorthand<T = Mapping> {
    Bare(String),
    Structured(T),
}

impl Shorthand<Mapping> {
    /// Canonical record; a bare name lands under `field`.
    pub fn into_structured(self, field: &str) -> Mapping {
        match self {
            Shorthand::Bare(name) => {
                let mut m = Mapping::new();
                m.insert(Value::String(field.to_string()), Value::String(name));
                m
            }
            Shorthand::Structured(m) => m,
        }
    }
}

/// Typed view of a loaded, normalized and validated graph.
#[derive(Debug, Default, Deserialize)]
pub struct ResourceGraph {
    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default)]
    pub import: Vec<String>,

    #[serde(default)]
    pub functions: BTreeMap<String, FunctionDef>,

    #[serde(default)]
    pub tables: BTreeMap<String, TableDef>,

    #[serde(default)]
    pub paths: BTreeMap<String, PathDef>,

    #[serde(default)]
    pub buckets: BTreeMap<String, BucketDef>,

    #[serde(default)]
    pub queues: BTreeMap<String, QueueDef>,

    #[serde(default)]
    pub streams: BTreeMap<String, StreamDef>,

    #[serde(default)]
    pub authorizers: BTreeMap<String, AuthorizerDef>,

    #[serde(default)]
    pub search: BTreeMap<String, Mapping>,

    #[serde(default)]
    pub prismarine: Option<PrismarineDef>,

    #[serde(default)]
    pub enable_lambda_layer: bool,
}

impl ResourceGraph {
    pub fn from_graph(graph: &Graph) -> Result<Self> {
        serde_yaml::from_value(Value::Mapping(graph.clone()))
            .context("resource graph does not match the typed model")
    }

    /// Deployable units in name order, with source dirs joined onto `root`.
    pub fn units(&self, root: &Path) -> Vec<DeployableUnit> {
        self.functions
            .iter()
            .map(|(name, f)| DeployableUnit {
                name: name.clone(),
                source_dir: root.join(&f.uri),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployableUnit {
    pub name: String,
    pub source_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_reads_both_forms() {
        let bare: Shorthand = serde_yaml::from_str("jobs").unwrap();
        let full: Shorthand = serde_yaml::from_str("{name: jobs, batchsize: 5}").unwrap();

        assert_eq!(bare, Shorthand::Bare("jobs".to_string()));
        let m = full.into_structured("name");
        assert_eq!(m.get("batchsize").and_then(Value::as_i64), Some(5));

        let m = bare.into_structured("name");
        assert_eq!(m.get("name").and_then(Value::as_str), Some("jobs"));
    }

    #[test]
    fn typed_view_lists_units() {
        let g: Graph = serde_yaml::from_str(
            "functions:\n  b: {uri: backend/b}\n  a: {uri: backend/a, timeout: 30}\n",
        )
        .unwrap();
        let rg = ResourceGraph::from_graph(&g).unwrap();
        let units = rg.units(Path::new("/app"));

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "a");
        assert_eq!(units[0].source_dir, Path::new("/app/backend/a"));
        assert_eq!(rg.functions["a"].timeout, Some(30));
    }
}
