//! Target normalization: registry ids to auditable URLs.

use url::Url;

use super::error::AuditError;

/// Turn a registry id into a scheme-qualified, host-only URL.
///
/// Bare domains get `https://`. Paths, queries and fragments are dropped.
///
/// ```ignore
/// assert_eq!(normalize_target("example.gov/about?x=1")?, "https://example.gov");
/// ```
pub fn normalize_target(raw: &str) -> Result<String, AuditError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AuditError::InvalidTarget("empty target".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate).map_err(|e| AuditError::InvalidTarget(format!("{}: {}", trimmed, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AuditError::InvalidTarget(format!(
            "{}: unsupported scheme {}",
            trimmed,
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(AuditError::InvalidTarget(format!("{}: missing host", trimmed)));
    }

    Ok(url.origin().ascii_serialization())
}
