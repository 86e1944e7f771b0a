//! Minimal request/message shapes the cache core needs to read.
//!
//! This is not a full OpenAI-compatible request/response surface — only the
//! subset of fields the key generator (fingerprinting) and the semantic
//! handler (prompt flattening) ever look at. The HTTP edge, streaming
//! deltas, and the rest of the wire format live elsewhere.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Message content: either a plain string or a list of multimodal parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multimodal message. Only `Text` parts contribute to
/// prompt flattening; everything else is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: serde_json::Value },
    InputAudio { input_audio: serde_json::Value },
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

/// A registered tool/function definition, as far as the cache key cares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub type_: String,
    pub function: serde_json::Value,
}

/// The fields of a chat/completions request the key generator fingerprints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionParams {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// Provider-specific fields not otherwise modeled here. Hashed in
    /// sorted key order — `BTreeMap` makes that structural rather than an
    /// extra sort step at hash time.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Cache-control, as parsed from the wire shape in §6:
/// `{ "ttl": <ns>, "namespace": "<string>", "no-cache": bool, "no-store": bool, "s-maxage": <ns> }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheControl {
    #[serde(default, rename = "ttl", with = "duration_nanos_opt")]
    pub ttl: Option<std::time::Duration>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default, rename = "no-cache")]
    pub no_cache: bool,
    #[serde(default, rename = "no-store")]
    pub no_store: bool,
    #[serde(default, rename = "s-maxage", with = "duration_nanos_opt")]
    pub s_maxage: Option<std::time::Duration>,
}

impl CacheControl {
    /// Parse from the wire JSON shape. Malformed input yields "no
    /// cache-control" (all defaults) rather than an error, per §6.
    pub fn from_json(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

mod duration_nanos_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_u64(d.as_nanos() as u64),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<u64>::deserialize(d)?;
        Ok(raw.map(Duration::from_nanos))
    }
}
