//! Tenant filesystem isolation.
//!
//! Every file access on behalf of a tenant is checked against two zones:
//! the tenant's own sandbox (`agents/tenants/<tenant>`, read-write) and the
//! shared core zone (`agents/core`, read-only). Anything else, including any
//! path that resolves outside the base directory, is a security violation.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Read,
    Write,
}

impl std::fmt::Display for FileOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityViolation {
    #[error("path '{path}' is outside the base directory")]
    OutsideBase { path: String },

    #[error("access to '{path}' denied for tenant '{tenant_id}' (operation: {operation})")]
    ZoneDenied {
        path: String,
        tenant_id: String,
        operation: FileOp,
    },
}

pub struct TenantGuard {
    base_dir: PathBuf,
}

impl TenantGuard {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: normalize(&base_dir.into()),
        }
    }

    /// Pure predicate: re-verifies the whole chain on every call, no caching.
    ///
    /// Succeeds only when the lexically resolved path stays inside the base
    /// directory AND lands in a zone the operation permits:
    /// - write: the tenant's own sandbox subtree;
    /// - read: the tenant sandbox or the shared read-only core subtree.
    pub fn validate_path(
        &self,
        target: &str,
        tenant_id: &str,
        operation: FileOp,
    ) -> Result<(), SecurityViolation> {
        let candidate = Path::new(target);
        let resolved = if candidate.is_absolute() {
            normalize(candidate)
        } else {
            normalize(&self.base_dir.join(candidate))
        };

        let relative = match resolved.strip_prefix(&self.base_dir) {
            Ok(rel) => rel,
            Err(_) => {
                return Err(SecurityViolation::OutsideBase {
                    path: target.to_string(),
                })
            }
        };

        let tenant_zone = Path::new("agents").join("tenants").join(tenant_id);
        if relative.starts_with(&tenant_zone) {
            return Ok(());
        }

        let core_zone = Path::new("agents").join("core");
        if operation == FileOp::Read && relative.starts_with(&core_zone) {
            return Ok(());
        }

        Err(SecurityViolation::ZoneDenied {
            path: target.to_string(),
            tenant_id: tenant_id.to_string(),
            operation,
        })
    }
}

/// Lexical resolution: collapses `.` and `..` without touching the
/// filesystem, so non-existent paths are judged the same as existing ones.
/// A `..` that would climb above the root is dropped, which keeps escapes
/// representable as "outside base" rather than panicking.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    // Above the filesystem root; keep the component so the
                    // prefix check fails instead of silently re-anchoring.
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> TenantGuard {
        TenantGuard::new("/srv/warden")
    }

    #[test]
    fn tenant_can_write_own_sandbox() {
        let g = guard();
        assert!(g
            .validate_path("agents/tenants/acme/workspace/plan.json", "acme", FileOp::Write)
            .is_ok());
    }

    #[test]
    fn tenant_cannot_touch_other_sandbox() {
        let g = guard();
        for op in [FileOp::Read, FileOp::Write] {
            let err = g
                .validate_path("agents/tenants/globex/data.json", "acme", op)
                .unwrap_err();
            assert!(matches!(err, SecurityViolation::ZoneDenied { .. }));
        }
    }

    #[test]
    fn two_tenants_never_both_pass_on_a_private_path() {
        let g = guard();
        let path = "agents/tenants/acme/secrets.json";
        let acme = g.validate_path(path, "acme", FileOp::Read).is_ok();
        let globex = g.validate_path(path, "globex", FileOp::Read).is_ok();
        assert!(acme);
        assert!(!globex);
    }

    #[test]
    fn core_is_read_only() {
        let g = guard();
        assert!(g
            .validate_path("agents/core/orchestrator.js", "acme", FileOp::Read)
            .is_ok());
        let err = g
            .validate_path("agents/core/orchestrator.js", "acme", FileOp::Write)
            .unwrap_err();
        assert!(matches!(err, SecurityViolation::ZoneDenied { .. }));
    }

    #[test]
    fn traversal_out_of_base_always_fails() {
        let g = guard();
        for op in [FileOp::Read, FileOp::Write] {
            let err = g
                .validate_path("agents/tenants/acme/../../../etc/passwd", "acme", op)
                .unwrap_err();
            assert!(matches!(err, SecurityViolation::OutsideBase { .. }));
        }
    }

    #[test]
    fn traversal_within_base_is_judged_by_zone() {
        let g = guard();
        // Resolves back into another tenant's sandbox; denied by zone.
        let err = g
            .validate_path("agents/tenants/acme/../globex/file", "acme", FileOp::Read)
            .unwrap_err();
        assert!(matches!(err, SecurityViolation::ZoneDenied { .. }));
    }

    #[test]
    fn absolute_escape_fails() {
        let g = guard();
        let err = g
            .validate_path("/etc/passwd", "acme", FileOp::Read)
            .unwrap_err();
        assert!(matches!(err, SecurityViolation::OutsideBase { .. }));
    }

    #[test]
    fn absolute_path_inside_base_is_allowed() {
        let g = guard();
        assert!(g
            .validate_path("/srv/warden/agents/tenants/acme/out.txt", "acme", FileOp::Write)
            .is_ok());
    }

    #[test]
    fn sibling_prefix_does_not_leak() {
        // "acme-evil" must not match the "acme" sandbox by string prefix.
        let g = guard();
        let err = g
            .validate_path("agents/tenants/acme-evil/x", "acme", FileOp::Read)
            .unwrap_err();
        assert!(matches!(err, SecurityViolation::ZoneDenied { .. }));
    }

    #[test]
    fn base_root_itself_is_denied() {
        let g = guard();
        assert!(g.validate_path(".", "acme", FileOp::Read).is_err());
        assert!(g.validate_path("agents", "acme", FileOp::Read).is_err());
    }
}
