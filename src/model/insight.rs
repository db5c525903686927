//! Typed payloads from the AI collaborator (optimizer, report generator,
//! daily digest). Bodies are decoded and range-checked here, at the boundary,
//! so the rest of the crate never handles untyped JSON from that service.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Error type for insight decoding
#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("unknown insight kind: {0} (expected optimization, report or digest)")]
    UnknownKind(String),
    #[error("malformed {kind} payload: {source}")]
    Malformed {
        kind: InsightKind,
        source: serde_json::Error,
    },
    #[error("{field} out of range: {value}")]
    OutOfRange { field: String, value: f64 },
    #[error("unknown suggestion type: {0}")]
    UnknownSuggestion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Optimization,
    Report,
    Digest,
}

impl InsightKind {
    pub fn parse(s: &str) -> Result<InsightKind, InsightError> {
        match s {
            "optimization" | "optimize" => Ok(InsightKind::Optimization),
            "report" => Ok(InsightKind::Report),
            "digest" | "daily-digest" => Ok(InsightKind::Digest),
            other => Err(InsightError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for InsightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsightKind::Optimization => write!(f, "optimization"),
            InsightKind::Report => write!(f, "report"),
            InsightKind::Digest => write!(f, "digest"),
        }
    }
}

/// A decoded AI payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Insight {
    Optimization(OptimizationResult),
    Report(ReportResult),
    Digest(DigestResult),
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub total: usize,
}

/// What a suggestion proposes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuggestionAction {
    /// Move crews from an item ahead of schedule to one behind
    ReallocateCrew {
        from_wbs: String,
        to_wbs: String,
        crew_delta: i32,
    },
    /// Overtime for an item far behind schedule
    ExtendShift { current_spi: f64, target_spi: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSuggestion")]
pub struct Suggestion {
    pub wbs_code: String,
    pub description: String,
    /// 0..=100
    pub impact_score: u8,
    pub action: SuggestionAction,
}

#[derive(Deserialize)]
struct RawSuggestion {
    #[serde(rename = "type")]
    kind: String,
    wbs_code: String,
    #[serde(default)]
    description: String,
    impact_score: i64,
    #[serde(default)]
    details: serde_json::Value,
}

#[derive(Deserialize)]
struct ReallocateDetails {
    from_wbs: String,
    to_wbs: String,
    #[serde(default = "default_crew_delta")]
    crew_delta: i32,
}

fn default_crew_delta() -> i32 {
    1
}

#[derive(Deserialize)]
struct ExtendShiftDetails {
    current_spi: f64,
    #[serde(default = "default_target_spi")]
    target_spi: f64,
}

fn default_target_spi() -> f64 {
    1.0
}

impl TryFrom<RawSuggestion> for Suggestion {
    type Error = InsightError;

    fn try_from(raw: RawSuggestion) -> Result<Self, Self::Error> {
        if !(0..=100).contains(&raw.impact_score) {
            return Err(InsightError::OutOfRange {
                field: "impact_score".into(),
                value: raw.impact_score as f64,
            });
        }
        let malformed = |source| InsightError::Malformed {
            kind: InsightKind::Optimization,
            source,
        };
        let action = match raw.kind.as_str() {
            "reallocate_crew" => {
                let d: ReallocateDetails =
                    serde_json::from_value(raw.details).map_err(malformed)?;
                SuggestionAction::ReallocateCrew {
                    from_wbs: d.from_wbs,
                    to_wbs: d.to_wbs,
                    crew_delta: d.crew_delta,
                }
            }
            "extend_shift" => {
                let d: ExtendShiftDetails =
                    serde_json::from_value(raw.details).map_err(malformed)?;
                SuggestionAction::ExtendShift {
                    current_spi: d.current_spi,
                    target_spi: d.target_spi,
                }
            }
            other => return Err(InsightError::UnknownSuggestion(other.to_string())),
        };
        Ok(Suggestion {
            wbs_code: raw.wbs_code,
            description: raw.description,
            impact_score: raw.impact_score as u8,
            action,
        })
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResult {
    pub generated_at: DateTime<Utc>,
    pub markdown: String,
    pub metrics: ReportMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetrics {
    pub project_name: String,
    pub report_date: NaiveDate,
    pub overall_progress_pct: f64,
    pub total_wbs_items: usize,
    #[serde(default)]
    pub items: Vec<ItemMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetric {
    pub code: String,
    pub name: String,
    pub planned_qty: f64,
    pub actual_qty: f64,
    pub progress_pct: f64,
    pub spi: f64,
}

// ---------------------------------------------------------------------------
// Daily digest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestResult {
    pub date: NaiveDate,
    pub summary: String,
    pub kpi: DigestKpi,
    #[serde(default)]
    pub highlights: Vec<DigestHighlight>,
    #[serde(default)]
    pub concerns: Vec<DigestConcern>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestKpi {
    pub total_workers: f64,
    pub active_items: usize,
    pub qty_today: f64,
    pub overall_progress: f64,
    #[serde(default)]
    pub worker_trend: f64,
    #[serde(default)]
    pub qty_trend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestHighlight {
    pub wbs_code: String,
    pub wbs_name: String,
    pub qty_today: f64,
    pub workers: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestConcern {
    pub wbs_code: String,
    pub wbs_name: String,
    pub issue: String,
    pub workers: f64,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn check_pct(field: &str, value: f64) -> Result<(), InsightError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(InsightError::OutOfRange {
            field: field.to_string(),
            value,
        })
    }
}

fn parse<T: serde::de::DeserializeOwned>(kind: InsightKind, body: &str) -> Result<T, InsightError> {
    serde_json::from_str(body).map_err(|source| InsightError::Malformed { kind, source })
}

/// Decode and validate a payload of the given kind
pub fn decode_insight(kind: InsightKind, body: &str) -> Result<Insight, InsightError> {
    match kind {
        InsightKind::Optimization => {
            let mut result: OptimizationResult = parse(kind, body)?;
            if result.total == 0 {
                result.total = result.suggestions.len();
            }
            Ok(Insight::Optimization(result))
        }
        InsightKind::Report => {
            let result: ReportResult = parse(kind, body)?;
            check_pct(
                "metrics.overall_progress_pct",
                result.metrics.overall_progress_pct,
            )?;
            for item in &result.metrics.items {
                check_pct(&format!("{}.progress_pct", item.code), item.progress_pct)?;
            }
            Ok(Insight::Report(result))
        }
        InsightKind::Digest => {
            let result: DigestResult = parse(kind, body)?;
            check_pct("kpi.overall_progress", result.kpi.overall_progress)?;
            if result.kpi.total_workers < 0.0 {
                return Err(InsightError::OutOfRange {
                    field: "kpi.total_workers".into(),
                    value: result.kpi.total_workers,
                });
            }
            Ok(Insight::Digest(result))
        }
    }
}

impl Insight {
    pub fn kind(&self) -> InsightKind {
        match self {
            Insight::Optimization(_) => InsightKind::Optimization,
            Insight::Report(_) => InsightKind::Report,
            Insight::Digest(_) => InsightKind::Digest,
        }
    }

    /// One-line human summary
    pub fn headline(&self) -> String {
        match self {
            Insight::Optimization(r) => {
                let top = r
                    .suggestions
                    .iter()
                    .max_by_key(|s| s.impact_score)
                    .map(|s| format!(", top: {} (impact {})", s.wbs_code, s.impact_score))
                    .unwrap_or_default();
                format!("{} suggestion(s){}", r.total, top)
            }
            Insight::Report(r) => format!(
                "{} report for {}: {:.1}% over {} item(s)",
                r.metrics.project_name,
                r.metrics.report_date,
                r.metrics.overall_progress_pct,
                r.metrics.total_wbs_items
            ),
            Insight::Digest(r) => format!(
                "{}: {} worker(s) on {} item(s), {:.1}% overall, {} concern(s)",
                r.date,
                r.kpi.total_workers,
                r.kpi.active_items,
                r.kpi.overall_progress,
                r.concerns.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTIMIZATION: &str = r#"{
        "suggestions": [
            {"type": "reallocate_crew", "wbs_code": "CW-02",
             "description": "Move 1 crew from CW-01 to CW-02", "impact_score": 40,
             "details": {"from_wbs": "CW-01", "to_wbs": "CW-02", "crew_delta": 1}},
            {"type": "extend_shift", "wbs_code": "CW-03",
             "description": "Consider overtime", "impact_score": 55,
             "details": {"current_spi": 0.31, "target_spi": 1.0}}
        ]
    }"#;

    #[test]
    fn test_decode_optimization() {
        let insight = decode_insight(InsightKind::Optimization, OPTIMIZATION).unwrap();
        let Insight::Optimization(result) = &insight else {
            panic!("expected optimization");
        };
        assert_eq!(result.total, 2);
        assert_eq!(
            result.suggestions[0].action,
            SuggestionAction::ReallocateCrew {
                from_wbs: "CW-01".into(),
                to_wbs: "CW-02".into(),
                crew_delta: 1,
            }
        );
        assert!(matches!(
            result.suggestions[1].action,
            SuggestionAction::ExtendShift { current_spi, .. } if current_spi == 0.31
        ));
        assert_eq!(insight.headline(), "2 suggestion(s), top: CW-03 (impact 55)");
    }

    #[test]
    fn test_reject_impact_out_of_range() {
        let body = r#"{"suggestions": [{"type": "extend_shift", "wbs_code": "X",
            "impact_score": 140, "details": {"current_spi": 0.2}}]}"#;
        let err = decode_insight(InsightKind::Optimization, body).unwrap_err();
        assert!(err.to_string().contains("impact_score"));
    }

    #[test]
    fn test_reject_unknown_suggestion_type() {
        let body = r#"{"suggestions": [{"type": "hire_more", "wbs_code": "X",
            "impact_score": 10}]}"#;
        let err = decode_insight(InsightKind::Optimization, body).unwrap_err();
        assert!(err.to_string().contains("hire_more"));
    }

    #[test]
    fn test_decode_report() {
        let body = r#"{
            "generated_at": "2026-02-18T07:00:00Z",
            "markdown": "Progress is steady.",
            "metrics": {"project_name": "E2NS", "report_date": "2026-02-18",
                        "overall_progress_pct": 41.5, "total_wbs_items": 2,
                        "items": [{"code": "CW-01", "name": "East", "planned_qty": 10,
                                   "actual_qty": 8, "progress_pct": 80, "spi": 0.8}]}
        }"#;
        let insight = decode_insight(InsightKind::Report, body).unwrap();
        assert_eq!(insight.kind(), InsightKind::Report);
        assert_eq!(
            insight.headline(),
            "E2NS report for 2026-02-18: 41.5% over 2 item(s)"
        );
    }

    #[test]
    fn test_reject_report_progress_over_100() {
        let body = r#"{
            "generated_at": "2026-02-18T07:00:00Z", "markdown": "",
            "metrics": {"project_name": "E2NS", "report_date": "2026-02-18",
                        "overall_progress_pct": 141.0, "total_wbs_items": 0}
        }"#;
        assert!(matches!(
            decode_insight(InsightKind::Report, body),
            Err(InsightError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_decode_digest() {
        let body = r#"{
            "date": "2026-02-18", "summary": "Quiet day.",
            "kpi": {"total_workers": 14, "active_items": 3, "qty_today": 12.5,
                    "overall_progress": 22.0, "worker_trend": -2, "qty_trend": 1.5},
            "highlights": [{"wbs_code": "CW-01", "wbs_name": "East", "qty_today": 8, "workers": 5}],
            "concerns": [{"wbs_code": "CW-02", "wbs_name": "West",
                          "issue": "Workers assigned but no quantity recorded", "workers": 4}],
            "generated_at": "2026-02-18T18:00:00Z"
        }"#;
        let insight = decode_insight(InsightKind::Digest, body).unwrap();
        assert_eq!(
            insight.headline(),
            "2026-02-18: 14 worker(s) on 3 item(s), 22.0% overall, 1 concern(s)"
        );
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            decode_insight(InsightKind::Digest, "{\"date\": 3}"),
            Err(InsightError::Malformed { kind: InsightKind::Digest, .. })
        ));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(InsightKind::parse("optimize").unwrap(), InsightKind::Optimization);
        assert!(InsightKind::parse("forecast").is_err());
    }

    #[test]
    fn test_serialize_tagged() {
        let insight = decode_insight(InsightKind::Optimization, OPTIMIZATION).unwrap();
        let value = serde_json::to_value(&insight).unwrap();
        assert_eq!(value["kind"], "optimization");
        assert_eq!(value["suggestions"][0]["action"]["type"], "reallocate_crew");
    }
}
