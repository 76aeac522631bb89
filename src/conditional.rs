use serde_yaml::{value::TaggedValue, Mapping, Value};
use tracing::{debug, info};

use crate::{
    context::DeploymentContext,
    errors::{Errors, FatalError},
    graph::{get_str, key, key_text},
};

/// YAML tag marking a context-gated key: `? !Conditional {key: k, environment: prod}`.
pub const CONDITIONAL_TAG: &str = "Conditional";

/// Condition value that always matches.
pub const ANY: &str = "any";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalKey {
    pub key: String,
    pub environment: String,
    pub region: String,
}

impl ConditionalKey {
    /// `Ok(None)` when `v` is an ordinary key.
    pub fn from_key(v: &Value) -> Result<Option<Self>, String> {
        let Value::Tagged(tagged) = v else {
            return Ok(None);
        };
        let TaggedValue { tag, value } = tagged.as_ref();
        if *tag != CONDITIONAL_TAG {
            return Ok(None);
        }

        let Some(body) = value.as_mapping() else {
            return Err("All !Conditional keys must be mappings".to_string());
        };
        let Some(k) = body.get("key").map(key_text) else {
            return Err("All !Conditional keys must have a key".to_string());
        };

        Ok(Some(Self {
            key: k,
            environment: condition_value(body, "environment"),
            region: condition_value(body, "region"),
        }))
    }

    /// Conjunction of the environment and region conditions. Both are always
    /// checked so a missing context field is reported no matter the order.
    pub fn matches(&self, ctx: &DeploymentContext, errors: &Errors) -> Result<bool, FatalError> {
        let env_ok = check_condition("environment", &self.environment, ctx, errors)?;
        let region_ok = check_condition("region", &self.region, ctx, errors)?;
        Ok(env_ok && region_ok)
    }
}

/// Replaces every conditional key with its plain key when the condition
/// holds and drops it otherwise. Recurses into mapping values.
pub fn resolve_conditionals(
    raw: &Mapping,
    ctx: &DeploymentContext,
    errors: &mut Errors,
) -> Result<Mapping, FatalError> {
    let mut resolved = Mapping::new();

    for (k, v) in raw {
        let value = match v {
            Value::Mapping(m) => Value::Mapping(resolve_conditionals(m, ctx, errors)?),
            other => other.clone(),
        };

        match ConditionalKey::from_key(k) {
            Ok(None) => {
                resolved.insert(k.clone(), value);
            }
            Ok(Some(cond)) => {
                if cond.matches(ctx, errors)? {
                    debug!("conditional key '{}' included", cond.key);
                    resolved.insert(key(&cond.key), value);
                } else {
                    debug!("conditional key '{}' excluded", cond.key);
                }
            }
            Err(msg) => errors.push(msg),
        }
    }

    Ok(resolved)
}

fn check_condition(
    condition: &str,
    value: &str,
    ctx: &DeploymentContext,
    errors: &Errors,
) -> Result<bool, FatalError> {
    let negate = value.starts_with('~');
    let expected = value.trim_start_matches('~');

    if expected == ANY {
        return Ok(true);
    }

    let Some(actual) = ctx.field(condition) else {
        return Err(FatalError::missing_condition(condition, errors.clone()));
    };

    info!(
        "Checking condition \"{condition}\" {expected} (condition) == {actual} (context) (negate={negate})"
    );

    let equal = expected == actual;
    Ok(if negate { !equal } else { equal })
}

fn condition_value(body: &Mapping, field: &str) -> String {
    match body.get(field) {
        None | Some(Value::Null) => ANY.to_string(),
        Some(v) => get_str(body, field)
            .map(str::to_string)
            .unwrap_or_else(|| key_text(v)),
    }
}
