//! Parsing the auditing tool's JSON report into a [`ScoreSet`].
//!
//! Lighthouse reports scores as fractions in `categories.<id>.score`; a
//! category may be absent or have a null score, both of which count as 0.

use serde::Deserialize;
use std::collections::HashMap;

use super::error::AuditError;
use crate::domain::ScoreSet;

#[derive(Debug, Deserialize)]
struct Report {
    categories: Option<HashMap<String, CategoryResult>>,
    #[serde(rename = "runtimeError")]
    runtime_error: Option<RuntimeError>,
}

#[derive(Debug, Deserialize)]
struct CategoryResult {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RuntimeError {
    code: Option<String>,
    message: Option<String>,
}

/// Convert a 0..1 fraction to an integer percentage.
fn to_percent(score: f64) -> u8 {
    if !score.is_finite() {
        return 0;
    }
    (score * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Parse a raw report.
///
/// A report the tool flagged with a runtime error becomes a process error, so
/// its message can be classified for retry like any other tool failure.
pub fn parse_report(raw: &str) -> Result<ScoreSet, AuditError> {
    let report: Report = serde_json::from_str(raw.trim())
        .map_err(|e| AuditError::Malformed(format!("report is not valid JSON: {}", e)))?;

    if let Some(err) = report.runtime_error {
        let code = err.code.unwrap_or_default();
        let message = err.message.unwrap_or_default();
        return Err(AuditError::Process(format!("{} {}", code, message).trim().to_string()));
    }

    let categories = report
        .categories
        .ok_or_else(|| AuditError::Malformed("report has no categories".to_string()))?;

    let score = |key: &str| {
        categories
            .get(key)
            .and_then(|c| c.score)
            .map(to_percent)
            .unwrap_or(0)
    };

    Ok(ScoreSet {
        performance: score("performance"),
        accessibility: score("accessibility"),
        best_practices: score("best-practices"),
        seo: score("seo"),
        pwa: score("pwa"),
    })
}
