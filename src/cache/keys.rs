//! Deterministic fingerprinting for the exact-match cache path.
//!
//! `KeyGenerator` is a pure function of its inputs: same request, same key,
//! forever, across processes and platforms. No locale-sensitive formatting
//! — temperature and top-p are rendered to a fixed two decimal places with
//! `.` as the separator, and an unset field is omitted from the hash input
//! entirely rather than hashed as some sentinel, so `temperature: 0.0` and
//! `temperature` absent never collide.

use sha2::{Digest, Sha256};

use crate::api_types::ChatCompletionParams;

#[derive(Debug, Clone, Default)]
pub struct KeyGenerator {
    global_prefix: Option<String>,
}

impl KeyGenerator {
    pub fn new(global_prefix: impl Into<Option<String>>) -> Self {
        Self {
            global_prefix: global_prefix.into(),
        }
    }

    /// Derive a fingerprint for a chat/completions request, optionally
    /// scoped to a namespace.
    pub fn generate(&self, params: &ChatCompletionParams, namespace: Option<&str>) -> String {
        let digest = Self::fingerprint(params);
        self.finish(namespace, &digest)
    }

    /// Hash arbitrary pre-serialized content directly, bypassing the
    /// request-shaped fingerprint. Used by call sites that have already
    /// committed to their own canonical serialization.
    pub fn generate_raw(&self, namespace: Option<&str>, content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        self.finish(namespace, hasher.finalize().as_slice())
    }

    fn finish(&self, namespace: Option<&str>, digest: &[u8]) -> String {
        let hex = encode_hex(digest);
        let mut key = String::with_capacity(hex.len() + 32);
        if let Some(prefix) = &self.global_prefix {
            if !prefix.is_empty() {
                key.push_str(prefix);
                key.push(':');
            }
        }
        if let Some(ns) = namespace {
            if !ns.is_empty() {
                key.push_str(ns);
                key.push(':');
            }
        }
        key.push_str(&hex);
        key
    }

    fn fingerprint(params: &ChatCompletionParams) -> [u8; 32] {
        let mut hasher = Sha256::new();

        hasher.update(params.model.as_bytes());
        hasher.update(b"\x00");

        let messages_json = serde_json::to_vec(&params.messages).unwrap_or_default();
        hasher.update(&messages_json);
        hasher.update(b"\x00");

        if let Some(temperature) = params.temperature {
            hasher.update(format_2dp(temperature).as_bytes());
        }
        hasher.update(b"\x00");

        if let Some(max_tokens) = params.max_tokens {
            if max_tokens > 0 {
                hasher.update(max_tokens.to_string().as_bytes());
            }
        }
        hasher.update(b"\x00");

        if let Some(top_p) = params.top_p {
            hasher.update(format_2dp(top_p).as_bytes());
        }
        hasher.update(b"\x00");

        if !params.tools.is_empty() {
            let tools_json = serde_json::to_vec(&params.tools).unwrap_or_default();
            hasher.update(&tools_json);
        }
        hasher.update(b"\x00");

        // `extra` is a BTreeMap: iteration is already sorted by key, so
        // there is no separate sort step to get wrong.
        for (key, value) in &params.extra {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(serde_json::to_vec(value).unwrap_or_default());
            hasher.update(b"\x00");
        }

        hasher.finalize().into()
    }
}

fn format_2dp(value: f64) -> String {
    format!("{value:.2}")
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").expect("writing to a String never fails");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_types::{ContentPart, Message, MessageContent, ToolDefinition};

    fn base_params() -> ChatCompletionParams {
        ChatCompletionParams {
            model: "gpt-4o".to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: MessageContent::Text("hello".to_string()),
            }],
            temperature: Some(0.7),
            top_p: None,
            max_tokens: Some(256),
            tools: vec![],
            extra: Default::default(),
        }
    }

    #[test]
    fn determinism() {
        let gen = KeyGenerator::new(None);
        let params = base_params();
        assert_eq!(gen.generate(&params, None), gen.generate(&params, None));
    }

    #[test]
    fn discriminates_on_model() {
        let gen = KeyGenerator::new(None);
        let mut a = base_params();
        let mut b = base_params();
        a.model = "gpt-4o".to_string();
        b.model = "gpt-4o-mini".to_string();
        assert_ne!(gen.generate(&a, None), gen.generate(&b, None));
    }

    #[test]
    fn discriminates_on_messages() {
        let gen = KeyGenerator::new(None);
        let mut a = base_params();
        let mut b = base_params();
        b.messages[0].content = MessageContent::Text("goodbye".to_string());
        assert_ne!(gen.generate(&a, None), gen.generate(&b, None));
        a.messages.push(Message {
            role: "assistant".to_string(),
            content: MessageContent::Text("hi".to_string()),
        });
        assert_ne!(gen.generate(&a, None), gen.generate(&base_params(), None));
    }

    #[test]
    fn temperature_zero_differs_from_temperature_absent() {
        let gen = KeyGenerator::new(None);
        let mut with_zero = base_params();
        with_zero.temperature = Some(0.0);
        let mut without = base_params();
        without.temperature = None;
        assert_ne!(gen.generate(&with_zero, None), gen.generate(&without, None));
    }

    #[test]
    fn temperature_formatting_is_insensitive_to_trailing_precision() {
        let gen = KeyGenerator::new(None);
        let mut a = base_params();
        let mut b = base_params();
        a.temperature = Some(0.7);
        b.temperature = Some(0.700_000_01); // rounds to the same 2dp string
        assert_eq!(gen.generate(&a, None), gen.generate(&b, None));
    }

    #[test]
    fn max_tokens_zero_is_treated_as_absent() {
        let gen = KeyGenerator::new(None);
        let mut a = base_params();
        let mut b = base_params();
        a.max_tokens = Some(0);
        b.max_tokens = None;
        assert_eq!(gen.generate(&a, None), gen.generate(&b, None));
    }

    #[test]
    fn discriminates_on_tools() {
        let gen = KeyGenerator::new(None);
        let mut a = base_params();
        let mut b = base_params();
        b.tools.push(ToolDefinition {
            type_: "function".to_string(),
            function: serde_json::json!({"name": "lookup"}),
        });
        assert_ne!(gen.generate(&a, None), gen.generate(&b, None));
        a.tools.clear();
    }

    #[test]
    fn extra_fields_are_order_independent() {
        let gen = KeyGenerator::new(None);
        let mut a = base_params();
        let mut b = base_params();
        a.extra.insert("z".to_string(), serde_json::json!(1));
        a.extra.insert("a".to_string(), serde_json::json!(2));
        // BTreeMap insertion order never affects iteration order, but
        // assert the point explicitly: two maps built in opposite
        // insertion order still fingerprint identically.
        b.extra.insert("a".to_string(), serde_json::json!(2));
        b.extra.insert("z".to_string(), serde_json::json!(1));
        assert_eq!(gen.generate(&a, None), gen.generate(&b, None));
    }

    #[test]
    fn extra_fields_discriminate_on_value() {
        let gen = KeyGenerator::new(None);
        let mut a = base_params();
        let mut b = base_params();
        a.extra.insert("seed".to_string(), serde_json::json!(1));
        b.extra.insert("seed".to_string(), serde_json::json!(2));
        assert_ne!(gen.generate(&a, None), gen.generate(&b, None));
    }

    #[test]
    fn namespace_isolation() {
        let gen = KeyGenerator::new(None);
        let params = base_params();
        let a = gen.generate(&params, Some("tenant-a"));
        let b = gen.generate(&params, Some("tenant-b"));
        assert_ne!(a, b);
        assert!(a.starts_with("tenant-a:"));
        assert!(b.starts_with("tenant-b:"));
    }

    #[test]
    fn global_prefix_is_prepended() {
        let gen = KeyGenerator::new(Some("gw".to_string()));
        let params = base_params();
        let key = gen.generate(&params, Some("tenant"));
        assert!(key.starts_with("gw:tenant:"));
    }

    #[test]
    fn multimodal_content_parts_are_hashed() {
        let gen = KeyGenerator::new(None);
        let mut a = base_params();
        let mut b = base_params();
        a.messages[0].content = MessageContent::Parts(vec![ContentPart::Text {
            text: "describe this".to_string(),
        }]);
        b.messages[0].content = MessageContent::Parts(vec![ContentPart::Text {
            text: "describe that".to_string(),
        }]);
        assert_ne!(gen.generate(&a, None), gen.generate(&b, None));
    }

    #[test]
    fn generate_raw_is_deterministic_and_namespaced() {
        let gen = KeyGenerator::new(None);
        let a = gen.generate_raw(Some("ns"), b"some bytes");
        let b = gen.generate_raw(Some("ns"), b"some bytes");
        let c = gen.generate_raw(Some("other"), b"some bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
