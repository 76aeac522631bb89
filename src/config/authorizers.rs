// src/config/authorizers.rs
use serde::Deserialize;
use serde_yaml::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizerDef {
    pub function: String,

    #[serde(default)]
    pub token: Option<Value>,

    #[serde(default)]
    pub query: Option<Value>,

    #[serde(default)]
    pub headers: Option<Value>,

    /// Result cache lifetime in seconds.
    #[serde(default)]
    pub ttl: Option<u32>,
}

impl AuthorizerDef {
    pub fn identity_source(&self) -> Option<&'static str> {
        match (&self.token, &self.query, &self.headers) {
            (Some(_), None, None) => Some("token"),
            (None, Some(_), None) => Some("query"),
            (None, None, Some(_)) => Some("headers"),
            _ => None,
        }
    }
}
