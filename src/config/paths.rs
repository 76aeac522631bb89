// src/config/paths.rs
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integration {
    Lambda,
    Dynamo,
    Sqs,
}

impl Integration {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lambda" => Some(Self::Lambda),
            "dynamo" => Some(Self::Dynamo),
            "sqs" => Some(Self::Sqs),
            _ => None,
        }
    }

    /// Integrations that are wired through request/response mapping templates.
    pub fn needs_templates(self) -> bool {
        matches!(self, Self::Dynamo | Self::Sqs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathDef {
    pub integration: Integration,

    #[serde(default)]
    pub function: Option<String>,

    #[serde(default)]
    pub authorizer: Option<String>,

    #[serde(default)]
    pub open: bool,

    #[serde(default)]
    pub greedy: Option<bool>,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub queue: Option<String>,

    #[serde(default)]
    pub table: Option<String>,

    #[serde(default, rename = "requestTemplate")]
    pub request_template: Option<String>,

    #[serde(default, rename = "requestTemplateFile")]
    pub request_template_file: Option<String>,

    #[serde(default, rename = "responseTemplate")]
    pub response_template: Option<String>,

    #[serde(default, rename = "responseTemplateFile")]
    pub response_template_file: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
