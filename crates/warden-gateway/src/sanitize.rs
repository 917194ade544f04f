//! Content sanitisation: secret redaction and length capping.
//!
//! Redaction rules run in a fixed order and replace matched secret values
//! with `[REDACTED]` while preserving the surrounding structure, so a
//! second pass over already-sanitised text is a no-op.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use warden_types::config::ChatConfig;
use warden_types::request::RequestContext;

pub const REDACTION_MARKER: &str = "[REDACTED]";
pub const TRUNCATION_SUFFIX: &str = " [truncated]";

static QUOTED_ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(password|pwd|secret|api[_-]?key|token)\s*=\s*['"][^'"]+['"]"#)
        .expect("valid quoted assignment regex")
});

static CONNECTION_STRING_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Quoted values are left to the quoted-assignment rule; `[` is excluded
    // so an already-redacted value does not match again.
    Regex::new(r#"(?i)(Password|Pwd|Secret|SharedAccessKey|AccountKey)\s*=\s*[^;\s\["']+"#)
        .expect("valid connection string regex")
});

static BEARER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Bearer\s+[A-Za-z0-9._-]+").expect("valid bearer regex")
});

static JSON_SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"?(password|secret|apiKey|token)"?\s*:\s*"[^"]+""#)
        .expect("valid json secret regex")
});

pub struct Sanitizer {
    redact_enabled: bool,
    max_message_len: usize,
    max_metadata_len: usize,
}

impl Sanitizer {
    pub fn new(cfg: &ChatConfig) -> Self {
        Self {
            redact_enabled: cfg.redact_enabled,
            max_message_len: cfg.max_message_len,
            max_metadata_len: cfg.max_metadata_len,
        }
    }

    /// Redact then cap a free-text field.
    pub fn sanitize_text(&self, input: &str) -> String {
        let text = if self.redact_enabled {
            redact(input)
        } else {
            input.to_string()
        };
        truncate(&text, self.max_message_len)
    }

    /// Field-allowlisted copy of the caller context. Unknown fields never
    /// reach persistence; string fields go through text sanitisation.
    pub fn sanitize_context(&self, context: &RequestContext) -> RequestContext {
        RequestContext {
            execution_mode: Some(context.mode()),
            approved: context.approved,
            approval_id: context.approval_id.as_deref().map(|s| self.sanitize_text(s)),
            intent: context.intent.as_deref().map(|s| self.sanitize_text(s)),
            intent_id: context.intent_id.as_deref().map(|s| self.sanitize_text(s)),
            branch: context.branch.as_deref().map(|s| self.sanitize_text(s)),
            tags: context.tags.iter().map(|t| self.sanitize_text(t)).collect(),
            changed_paths: context
                .changed_paths
                .iter()
                .map(|p| self.sanitize_text(p))
                .collect(),
            columns: context.columns.iter().map(|c| self.sanitize_text(c)).collect(),
        }
    }

    /// Keeps only the metadata fields the chat log is allowed to carry,
    /// then enforces the serialized-size cap.
    pub fn sanitize_response_metadata(&self, metadata: &serde_json::Value) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        if let Some(intent) = metadata.get("intent").and_then(|v| v.as_str()) {
            out.insert("intent".to_string(), json!(self.sanitize_text(intent)));
        }
        if let Some(agent_id) = metadata.get("agentId").and_then(|v| v.as_str()) {
            out.insert("agentId".to_string(), json!(self.sanitize_text(agent_id)));
        }
        if let Some(confidence) = metadata.get("confidence") {
            out.insert("confidence".to_string(), confidence.clone());
        }
        self.truncate_metadata(serde_json::Value::Object(out))
    }

    fn truncate_metadata(&self, value: serde_json::Value) -> serde_json::Value {
        let serialized = value.to_string();
        if serialized.len() <= self.max_metadata_len {
            return value;
        }
        let cut = floor_char_boundary(&serialized, self.max_metadata_len);
        json!({ "_truncated": true, "_json": &serialized[..cut] })
    }
}

fn redact(text: &str) -> String {
    let out = QUOTED_ASSIGNMENT_RE
        .replace_all(text, format!("$1=\"{REDACTION_MARKER}\""))
        .into_owned();
    let out = CONNECTION_STRING_RE
        .replace_all(&out, format!("$1={REDACTION_MARKER}"))
        .into_owned();
    let out = BEARER_RE
        .replace_all(&out, format!("Bearer {REDACTION_MARKER}"))
        .into_owned();
    JSON_SECRET_RE
        .replace_all(&out, format!("\"$1\":\"{REDACTION_MARKER}\""))
        .into_owned()
}

/// Cap to `max_len` bytes, marking the cut when there is room for the
/// suffix. The result never exceeds `max_len`.
fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    if max_len > TRUNCATION_SUFFIX.len() {
        let cut = floor_char_boundary(text, max_len - TRUNCATION_SUFFIX.len());
        return format!("{}{TRUNCATION_SUFFIX}", &text[..cut]);
    }
    text[..floor_char_boundary(text, max_len)].to_string()
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
