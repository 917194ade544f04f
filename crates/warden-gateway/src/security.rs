//! Input/output policy scanning.
//!
//! Inbound text is screened for injection payloads before it is admitted;
//! outbound agent responses are screened for credential leakage and
//! privilege grants. Outbound violations are blocking: an agent emitting a
//! credential is a policy failure, not noise to filter out.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub violations: Vec<String>,
    pub severity: Severity,
}

impl ValidationResult {
    /// Inbound admission: medium and below passes (logged upstream), high
    /// and critical blocks.
    pub fn blocks_input(&self) -> bool {
        self.severity >= Severity::High
    }
}

struct DangerousPattern {
    regex: LazyLock<Regex>,
    description: &'static str,
}

macro_rules! dangerous {
    ($pattern:expr, $description:expr) => {
        DangerousPattern {
            regex: LazyLock::new(|| Regex::new($pattern).expect("valid dangerous pattern")),
            description: $description,
        }
    };
}

static DANGEROUS_PATTERNS: [DangerousPattern; 17] = [
    // Prompt injection
    dangerous!(r"(?i)ignora\s+(tutte?\s+le\s+)?istruzioni", "Instruction override (IT)"),
    dangerous!(r"(?i)ignore\s+(all\s+)?instructions", "Instruction override (EN)"),
    dangerous!(r"(?i)override\s+(all\s+)?rules", "Rule override"),
    dangerous!(r"(?i)disregard\s+previous", "Previous instruction disregard"),
    dangerous!(r"(?i)forget\s+everything", "Memory reset attempt"),
    // Privilege escalation
    dangerous!(r"(?i)grant\s+all\s+(to\s+)?public", "Excessive privilege grant"),
    dangerous!(r"(?i)create\s+user.*admin", "Admin user creation"),
    dangerous!(r"(?i)alter\s+user.*sysadmin", "Sysadmin privilege"),
    // Hardcoded credentials
    dangerous!(r#"(?i)password\s*=\s*['"][^'"]{3,}['"]"#, "Hardcoded password"),
    dangerous!(r#"(?i)api[_-]?key\s*=\s*['"][^'"]+['"]"#, "Hardcoded API key"),
    dangerous!(r#"(?i)secret\s*=\s*['"][^'"]+['"]"#, "Hardcoded secret"),
    // Command injection
    dangerous!(r"(?i);\s*exec\s*\(", "Command execution"),
    dangerous!(r"\$\([^)]+\)", "Shell command substitution"),
    dangerous!(r"`[^`]+`", "Backtick execution"),
    // SQL injection
    dangerous!(r"(?i)';\s*drop\s+table", "SQL DROP injection"),
    dangerous!(r"(?i)'\s+or\s+'1'\s*=\s*'1", "SQL OR injection"),
    dangerous!(r"(?i)union\s+select", "SQL UNION injection"),
];

static OUTPUT_PASSWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)password\s*=\s*['"][^'"]{3,}['"]"#).expect("valid output password regex")
});
static OUTPUT_API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)api[_-]?key\s*=\s*['"][^'"]+['"]"#).expect("valid output api key regex")
});
static KEYVAULT_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<KEYVAULT").expect("valid keyvault regex"));
static GRANT_ALL_PUBLIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)GRANT\s+ALL.*TO.*PUBLIC").expect("valid grant regex")
});

/// Screen inbound free text for injection payloads.
pub fn validate_agent_input(text: &str) -> ValidationResult {
    let violations: Vec<String> = DANGEROUS_PATTERNS
        .iter()
        .filter(|p| p.regex.is_match(text))
        .map(|p| p.description.to_string())
        .collect();

    let severity = match violations.len() {
        0 => Severity::None,
        1 => Severity::Medium,
        2..=3 => Severity::High,
        _ => Severity::Critical,
    };

    ValidationResult {
        is_valid: violations.is_empty(),
        violations,
        severity,
    }
}

/// Screen a serialized agent response for credential leakage and excessive
/// privilege grants. Any violation makes the whole response invalid.
pub fn validate_agent_output(output: &serde_json::Value) -> ValidationResult {
    let serialized = output.to_string();
    let mut violations = Vec::new();

    let has_keyvault_ref = KEYVAULT_PLACEHOLDER_RE.is_match(&serialized);
    if OUTPUT_PASSWORD_RE.is_match(&serialized) && !has_keyvault_ref {
        violations.push("Hardcoded password detected (use Key Vault)".to_string());
    }
    if OUTPUT_API_KEY_RE.is_match(&serialized) && !has_keyvault_ref {
        violations.push("Hardcoded API key detected".to_string());
    }
    if GRANT_ALL_PUBLIC_RE.is_match(&serialized) {
        violations.push("Excessive privilege grant detected".to_string());
    }

    let severity = if violations.is_empty() {
        Severity::None
    } else {
        Severity::High
    };

    ValidationResult {
        is_valid: violations.is_empty(),
        violations,
        severity,
    }
}
