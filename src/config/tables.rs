// src/config/tables.rs
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct TableDef {
    pub attributes: Vec<AttributeDef>,

    #[serde(default)]
    pub trigger: Option<TriggerDef>,

    /// Attribute holding the expiry timestamp.
    #[serde(default)]
    pub ttl: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeDef {
    pub name: String,

    #[serde(default)]
    pub hash: bool,

    #[serde(default)]
    pub range: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerDef {
    pub function: String,

    #[serde(default = "default_viewtype")]
    pub viewtype: String,

    #[serde(default = "default_startingposition")]
    pub startingposition: String,

    #[serde(default)]
    pub batchsize: Option<u32>,

    #[serde(default)]
    pub batchwindow: Option<u32>,
}

pub(crate) fn default_viewtype() -> String {
    "new-and-old".to_string()
}

pub(crate) fn default_startingposition() -> String {
    "latest".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrismarineDef {
    #[serde(default, rename = "default-base")]
    pub default_base: Option<String>,

    #[serde(default, rename = "access-module")]
    pub access_module: Option<String>,

    #[serde(default)]
    pub tables: Vec<PrismarinePackage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrismarinePackage {
    #[serde(default)]
    pub package: Option<String>,

    #[serde(default)]
    pub base: Option<String>,
}
