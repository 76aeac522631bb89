// src/config/functions.rs
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDef {
    /// Source directory, relative to the resources dir.
    pub uri: String,

    #[serde(default)]
    pub timeout: Option<u32>,

    #[serde(default)]
    pub memory: Option<u32>,

    #[serde(default)]
    pub tables: Vec<String>,

    #[serde(default)]
    pub buckets: Vec<String>,

    #[serde(default)]
    pub send: Vec<String>,

    #[serde(default)]
    pub streams: Vec<String>,

    #[serde(default)]
    pub polls: Vec<PollDef>,

    /// Search collections; an empty list was already rewritten to the default collection.
    #[serde(default)]
    pub searches: Option<Vec<String>>,

    /// Layer name -> ARN or `{{resolve:ssm:...}}` handle.
    #[serde(default)]
    pub layers: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollDef {
    pub name: String,

    #[serde(default)]
    pub batchsize: Option<u32>,

    #[serde(default)]
    pub batchwindow: Option<u32>,
}
