use anyhow::{bail, Context as _, Result};
use serde_yaml::{Mapping, Value};
use std::{fs, path::Path};

use crate::graph::key_text;

/// Per-invocation deployment values. Built once, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentContext {
    environment: Option<String>,
    region: Option<String>,
    overrides: Vec<(String, Value)>,
}

impl DeploymentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a context file: a YAML mapping with `environment`, `region`
    /// (or `target_region`) and an `overrides` mapping.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read context file at {}", path.display()))?;
        Self::from_yaml(&text)
            .with_context(|| format!("invalid context file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        let raw: Value = serde_yaml::from_str(text)?;
        let map = match raw {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(m) => m,
            _ => bail!("deployment context must be a mapping"),
        };

        let region = match scalar_field(&map, "region")? {
            Some(r) => Some(r),
            None => scalar_field(&map, "target_region")?,
        };
        let mut ctx = Self {
            environment: scalar_field(&map, "environment")?,
            region,
            overrides: Vec::new(),
        };

        match map.get("overrides") {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(o)) => {
                for (k, v) in o {
                    ctx.overrides.push((key_text(k), v.clone()));
                }
            }
            Some(_) => bail!("'overrides' must be a mapping of path to value"),
        }

        Ok(ctx)
    }

    pub fn with_environment(mut self, env: impl Into<String>) -> Self {
        self.environment = Some(env.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Adds an override; a later override of the same path replaces the earlier one.
    pub fn with_override(mut self, path: impl Into<String>, value: Value) -> Self {
        let path = path.into();
        self.overrides.retain(|(p, _)| *p != path);
        self.overrides.push((path, value));
        self
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn overrides(&self) -> &[(String, Value)] {
        &self.overrides
    }

    /// Context value a condition field refers to.
    pub fn field(&self, condition: &str) -> Option<&str> {
        match condition {
            "environment" => self.environment(),
            "region" | "target_region" => self.region(),
            _ => None,
        }
    }

    pub fn debug_dump(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "environment: {}\n",
            self.environment.as_deref().unwrap_or("<unset>")
        ));
        out.push_str(&format!(
            "region: {}\n",
            self.region.as_deref().unwrap_or("<unset>")
        ));
        out.push_str("overrides:\n");
        for (k, v) in &self.overrides {
            let v = serde_yaml::to_string(v).unwrap_or_default();
            out.push_str(&format!("  {} = {}\n", k, v.trim_end()));
        }
        out
    }
}

/// Parses a `PATH=VALUE` override argument; the value is read as YAML so
/// `timeout=30` yields a number and `public=true` a bool.
pub fn parse_override_arg(raw: &str) -> Result<(String, Value)> {
    let Some((k, v)) = raw.split_once('=') else {
        bail!("invalid override (expected PATH=VALUE): {raw}");
    };

    let path = k.trim();
    if path.is_empty() {
        bail!("override path cannot be empty: {raw}");
    }

    let value: Value = serde_yaml::from_str(v.trim())
        .with_context(|| format!("invalid override value: {raw}"))?;

    Ok((path.to_string(), value))
}

// -------------------- helpers --------------------

fn scalar_field(map: &Mapping, field: &str) -> Result<Option<String>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => bail!("'{field}' must be a scalar"),
    }
}
