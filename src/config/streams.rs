// src/config/streams.rs
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketDef {
    #[serde(default)]
    pub public: bool,

    /// Externally managed IAM policy, looked up as `<name>-<environment>`.
    #[serde(default)]
    pub extaccesspolicy: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueDef {
    #[serde(default)]
    pub delay: Option<u32>,

    #[serde(default)]
    pub visibility: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamDef {
    #[serde(default)]
    pub buckets: BTreeMap<String, StreamBucketDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamBucketDef {
    #[serde(default)]
    pub bucketname: Option<String>,

    #[serde(default)]
    pub extbucketarn: Option<String>,

    #[serde(default)]
    pub bucketprefix: String,

    #[serde(default = "default_interval")]
    pub intervalinseconds: u32,
}

/// Delivery buffering interval used when a stream bucket does not set one.
pub const STREAM_INTERVAL_SECONDS: u32 = 300;

fn default_interval() -> u32 {
    STREAM_INTERVAL_SECONDS
}
