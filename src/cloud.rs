use anyhow::{Context as _, Result};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};
use tracing::{debug, info};

use crate::{
    errors::Errors,
    graph::{ensure_mapping, get_mapping, get_str, key, key_text, Graph},
};

/// A network the deployment can attach to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkFact {
    pub vpc_id: String,
    pub cidr: String,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
}

/// Read-only view of account state that the graph depends on but does not
/// declare. Implementations talk to a provider; errors are accumulated.
pub trait CloudProbe {
    fn networks(&self) -> Result<Vec<NetworkFact>>;

    fn policy_exists(&self, name: &str) -> Result<bool>;

    /// Value of a parameter-store entry, `None` when absent.
    fn parameter(&self, name: &str) -> Result<Option<String>>;

    fn layer_exists(&self, arn: &str) -> Result<bool>;
}

/// Probe answering from a fixed set of facts, read from YAML:
///
/// ```yaml
/// networks: [{vpc_id: vpc-1, cidr: 10.0.0.0/16, subnet_ids: [s-1]}]
/// policies: [media-access-prod]
/// parameters: {layers/pandas: "arn:aws:lambda:..."}
/// layers: ["arn:aws:lambda:..."]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticProbe {
    #[serde(default)]
    pub networks: Vec<NetworkFact>,

    #[serde(default)]
    pub policies: BTreeSet<String>,

    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    #[serde(default)]
    pub layers: BTreeSet<String>,
}

impl StaticProbe {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read cloud facts at {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("invalid cloud facts file {}", path.display()))
    }
}

impl CloudProbe for StaticProbe {
    fn networks(&self) -> Result<Vec<NetworkFact>> {
        Ok(self.networks.clone())
    }

    fn policy_exists(&self, name: &str) -> Result<bool> {
        Ok(self.policies.contains(name))
    }

    fn parameter(&self, name: &str) -> Result<Option<String>> {
        Ok(self.parameters.get(name).cloned())
    }

    fn layer_exists(&self, arn: &str) -> Result<bool> {
        Ok(self.layers.contains(arn))
    }
}

/// Writes `cloud: {vpc_id, vpc_cidr, subnet_ids}` from the single visible
/// network. Only graphs that opt in with `__future__` are touched.
pub fn enrich(graph: &mut Graph, probe: &dyn CloudProbe, errors: &mut Errors) {
    if !graph.contains_key("__future__") {
        return;
    }
    info!("Scanning cloud for resources");

    let networks = match probe.networks() {
        Ok(n) => n,
        Err(e) => {
            errors.push(format!("Error: cannot list networks: {e:#}"));
            return;
        }
    };

    let network = match networks.as_slice() {
        [] => {
            errors.push("Error: No VPCs found");
            return;
        }
        [one] => one,
        _ => {
            errors.push("Error: Not implemented for multiple VPCs");
            return;
        }
    };
    info!("Found VPC {} with CIDR {}", network.vpc_id, network.cidr);
    debug!("Subnet IDs: {:?}", network.subnet_ids);

    let Some(cloud) = ensure_mapping(graph, "cloud") else {
        errors.push("Error: 'cloud' must be a mapping");
        return;
    };

    cloud.insert(key("vpc_id"), Value::String(network.vpc_id.clone()));
    cloud.insert(key("vpc_cidr"), Value::String(network.cidr.clone()));
    cloud.insert(
        key("subnet_ids"),
        Value::Sequence(network.subnet_ids.iter().cloned().map(Value::String).collect()),
    );
}

/// Confirms out-of-band prerequisites: external bucket policies and custom
/// layers referenced by units.
pub fn check_prerequisites(
    graph: &Graph,
    environment: &str,
    probe: &dyn CloudProbe,
    errors: &mut Errors,
) {
    check_bucket_policies(graph, environment, probe, errors);
    check_layers(graph, probe, errors);
}

fn section_entries<'a>(graph: &'a Graph, section: &str) -> Vec<(String, &'a Mapping)> {
    get_mapping(graph, section)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_mapping().map(|body| (key_text(k), body)))
                .collect()
        })
        .unwrap_or_default()
}

fn check_bucket_policies(graph: &Graph, environment: &str, probe: &dyn CloudProbe, errors: &mut Errors) {
    for (bucket, details) in section_entries(graph, "buckets") {
        let Some(policy) = get_str(details, "extaccesspolicy") else {
            continue;
        };
        let full = format!("{policy}-{environment}");
        info!("Validating bucket policy: {full}");

        let found = probe.policy_exists(&full).unwrap_or_else(|e| {
            tracing::error!("Error listing policy {policy}: {e:#}");
            false
        });

        if !found {
            errors.push(format!(
                "Bucket '{bucket}' has an invalid extaccesspolicy: {policy}. \
                 Please create a policy with the name {full}."
            ));
        }
    }
}

fn check_layers(graph: &Graph, probe: &dyn CloudProbe, errors: &mut Errors) {
    for (function, details) in section_entries(graph, "functions") {
        let Some(layers) = get_mapping(details, "layers") else {
            continue;
        };

        for (layer, handle) in layers {
            let layer = key_text(layer);
            let Some(handle) = handle.as_str() else {
                errors.push(format!("Custom layer {layer} in function {function} is not supported"));
                continue;
            };

            let arn = match resolve_reference(handle) {
                None => handle.to_string(),
                Some(Reference::Parameter(name)) => {
                    info!("Validating SSM layer name: {name}");
                    match probe.parameter(&name) {
                        Ok(Some(v)) => v,
                        Ok(None) | Err(_) => {
                            errors.push(format!("SSM parameter {name} not found"));
                            continue;
                        }
                    }
                }
                Some(Reference::Other) => {
                    errors.push(format!("Custom layer {layer} by URI in ({function}) is not yet supported"));
                    continue;
                }
            };

            if !arn.starts_with("arn:") {
                errors.push(format!("Custom layer {layer} in function {function} is not supported"));
                continue;
            }

            info!("Looking for layer ARN: {arn}");
            if !probe.layer_exists(&arn).unwrap_or(false) {
                errors.push(format!("Layer ARN {arn} not found"));
            }
        }
    }
}

enum Reference {
    Parameter(String),
    Other,
}

/// `{{resolve:ssm:/name}}` handles point at a parameter holding the ARN.
fn resolve_reference(handle: &str) -> Option<Reference> {
    let inner = handle.strip_prefix("{{resolve:")?;
    let inner = inner.split("}}").next().unwrap_or(inner);

    Some(match inner.strip_prefix("ssm:") {
        Some(name) => Reference::Parameter(name.trim_start_matches('/').to_string()),
        None => Reference::Other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::get_path;

    fn probe() -> StaticProbe {
        serde_yaml::from_str(
            r#"
networks: [{vpc_id: vpc-1, cidr: 10.0.0.0/16, subnet_ids: [subnet-a, subnet-b]}]
policies: [media-access-prod]
parameters: {layers/pandas: "arn:aws:lambda:us-east-1:1:layer:pandas:3"}
layers: ["arn:aws:lambda:us-east-1:1:layer:pandas:3"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn enrich_requires_future_marker() {
        let mut g: Graph = serde_yaml::from_str("prefix: App").unwrap();
        let mut errs = Errors::new();
        enrich(&mut g, &probe(), &mut errs);
        assert!(!g.contains_key("cloud"));

        g.insert(key("__future__"), Value::Null);
        enrich(&mut g, &probe(), &mut errs);
        assert!(errs.is_empty());
        assert_eq!(get_path(&g, &["cloud", "vpc_id"]).and_then(Value::as_str), Some("vpc-1"));
        assert_eq!(
            get_path(&g, &["cloud", "subnet_ids"]).and_then(Value::as_sequence).map(Vec::len),
            Some(2)
        );
    }

    #[test]
    fn enrich_needs_exactly_one_network() {
        let mut g: Graph = serde_yaml::from_str("__future__: true").unwrap();
        let mut errs = Errors::new();
        enrich(&mut g, &StaticProbe::default(), &mut errs);
        assert!(errs.contains("No VPCs found"));

        let mut two = probe();
        two.networks.push(two.networks[0].clone());
        enrich(&mut g, &two, &mut errs);
        assert!(errs.contains("Not implemented for multiple VPCs"));
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn prerequisites() {
        let g: Graph = serde_yaml::from_str(
            r#"
buckets:
  media: {extaccesspolicy: media-access}
  docs: {extaccesspolicy: docs-access}
functions:
  api:
    uri: backend/api
    layers:
      pandas: "{{resolve:ssm:/layers/pandas}}"
      numpy: "{{resolve:ssm:/layers/numpy}}"
      direct: "arn:aws:lambda:us-east-1:1:layer:gone:1"
      web: "{{resolve:secretsmanager:x}}"
      local: ./layer
"#,
        )
        .unwrap();

        let mut errs = Errors::new();
        check_prerequisites(&g, "prod", &probe(), &mut errs);

        assert_eq!(errs.len(), 5, "{errs}");
        assert!(errs.contains("Please create a policy with the name docs-access-prod"));
        assert!(errs.contains("SSM parameter layers/numpy not found"));
        assert!(errs.contains("Layer ARN arn:aws:lambda:us-east-1:1:layer:gone:1 not found"));
        assert!(errs.contains("Custom layer web by URI in (api) is not yet supported"));
        assert!(errs.contains("Custom layer local in function api is not supported"));
    }
}
