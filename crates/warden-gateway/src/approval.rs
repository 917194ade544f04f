//! Approval gating for apply-mode execution.
//!
//! Ticket validation is stateless and re-performed on every apply request:
//! a structural pattern check first, then an optional round-trip to the
//! external approval authority. Any authority failure (network error,
//! non-2xx, explicit `valid: false`) fails closed.

use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use warden_types::config::ApprovalConfig;
use warden_types::request::ExecutionMode;

const AUTHORITY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ApprovalGate {
    pattern: Option<Regex>,
    validate_url: String,
    validate_method: String,
    validate_header: String,
    validate_token: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct AuthorityVerdict {
    valid: Option<bool>,
}

impl ApprovalGate {
    pub fn new(cfg: &ApprovalConfig) -> Self {
        let pattern = if cfg.ticket_pattern.is_empty() {
            None
        } else {
            match Regex::new(&cfg.ticket_pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    // An unparseable pattern must not disable the check;
                    // a sentinel that matches nothing keeps the gate closed.
                    warn!(%err, "invalid approval ticket pattern, failing closed");
                    Some(Regex::new(r"$never^").expect("valid sentinel regex"))
                }
            }
        };
        Self {
            pattern,
            validate_url: cfg.validate_url.clone(),
            validate_method: cfg.validate_method.to_uppercase(),
            validate_header: cfg.validate_header.clone(),
            validate_token: cfg.validate_token.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn requires_approval(&self, mode: ExecutionMode) -> bool {
        mode == ExecutionMode::Apply
    }

    /// Validate a ticket id. Returns false unless both the structural check
    /// and (when configured) the external authority accept it.
    pub async fn validate(&self, ticket_id: &str) -> bool {
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(ticket_id) {
                return false;
            }
        }

        if self.validate_url.is_empty() {
            return true;
        }

        self.check_authority(ticket_id).await
    }

    async fn check_authority(&self, ticket_id: &str) -> bool {
        let url = self.interpolate_url(ticket_id);
        let mut request = match self.validate_method.as_str() {
            "GET" => self.client.get(&url),
            "POST" => self
                .client
                .post(&url)
                .json(&serde_json::json!({ "ticketId": ticket_id })),
            other => {
                warn!(method = other, "unsupported approval validation method");
                return false;
            }
        };

        if !self.validate_header.is_empty() && !self.validate_token.is_empty() {
            request = request.header(&self.validate_header, &self.validate_token);
        }

        let response = match request.timeout(AUTHORITY_TIMEOUT).send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(%err, ticket_id, "approval authority unreachable");
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), ticket_id, "approval authority rejected ticket");
            return false;
        }

        // A success body without an explicit verdict counts as valid.
        match response.json::<AuthorityVerdict>().await {
            Ok(verdict) => verdict.valid.unwrap_or(true),
            Err(_) => true,
        }
    }

    fn interpolate_url(&self, ticket_id: &str) -> String {
        let encoded = urlencode(ticket_id);
        if self.validate_url.contains("{ticketId}") {
            return self.validate_url.replace("{ticketId}", &encoded);
        }
        if self.validate_method == "GET" {
            let separator = if self.validate_url.contains('?') { '&' } else { '?' };
            return format!("{}{}ticketId={}", self.validate_url, separator, encoded);
        }
        self.validate_url.clone()
    }
}

/// Minimal percent-encoding for a query value; ticket ids are short and
/// mostly alphanumeric, so this stays local instead of pulling a crate in.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
