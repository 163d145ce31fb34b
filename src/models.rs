use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsightType {
    Finding,
    Alert,
    Trend,
    Recommendation,
    Comparison,
    Milestone,
}

impl InsightType {
    pub fn as_str(self) -> &'static str {
        match self {
            InsightType::Finding => "finding",
            InsightType::Alert => "alert",
            InsightType::Trend => "trend",
            InsightType::Recommendation => "recommendation",
            InsightType::Comparison => "comparison",
            InsightType::Milestone => "milestone",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightSeverity {
    Positive,
    Neutral,
    Warning,
    Critical,
}

impl InsightSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            InsightSeverity::Positive => "positive",
            InsightSeverity::Neutral => "neutral",
            InsightSeverity::Warning => "warning",
            InsightSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationQuality {
    Verified,
    Estimated,
    Missing,
}

impl ObservationQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            ObservationQuality::Verified => "verified",
            ObservationQuality::Estimated => "estimated",
            ObservationQuality::Missing => "missing",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "verified" => Some(ObservationQuality::Verified),
            "estimated" => Some(ObservationQuality::Estimated),
            "missing" => Some(ObservationQuality::Missing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Region {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct MemberState {
    pub id: i64,
    pub name: String,
    pub iso_code: String,
    pub iso3_code: Option<String>,
    pub region_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct IndicatorDefinition {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub unit: Option<String>,
    pub goal_id: Option<i64>,
    pub target_value: Option<f64>,
    pub baseline_value: Option<f64>,
    pub baseline_year: Option<i32>,
}

/// One provider record after normalization, prior to reference resolution.
/// Records whose value was null never reach this type.
#[derive(Debug, Clone)]
pub struct NormalizedObservation {
    pub iso_code: String,
    pub iso3_code: String,
    pub year: i32,
    pub value: f64,
}

/// A fully resolved observation bound for the store, keyed by
/// (indicator_id, member_state_id, year).
#[derive(Debug, Clone)]
pub struct ObservationRow {
    pub indicator_id: i64,
    pub member_state_id: i64,
    pub year: i32,
    pub value: Option<f64>,
    pub quality: ObservationQuality,
    pub source_detail: String,
}

#[derive(Debug, Clone)]
pub struct QualityScoreRow {
    pub member_state_id: i64,
    pub indicator_id: i64,
    pub completeness_pct: f64,
    pub timeliness_years: Option<i32>,
    pub consistency_score: f64,
    pub overall_score: f64,
    pub assessed_at: DateTime<Utc>,
}

/// An insight produced by one analyzer, not yet persisted.
#[derive(Debug, Clone)]
pub struct InsightDraft {
    pub insight_type: InsightType,
    pub severity: InsightSeverity,
    pub title: String,
    pub description: String,
    pub evidence: serde_json::Value,
    pub goal_id: Option<i64>,
    pub indicator_id: Option<i64>,
    pub member_state_id: Option<i64>,
}

#[derive(Debug, Default)]
pub struct InsightCounts {
    pub finding: i64,
    pub alert: i64,
    pub trend: i64,
    pub recommendation: i64,
    pub comparison: i64,
    pub milestone: i64,
}

impl InsightCounts {
    pub fn bump(&mut self, insight_type: InsightType) {
        match insight_type {
            InsightType::Finding => self.finding += 1,
            InsightType::Alert => self.alert += 1,
            InsightType::Trend => self.trend += 1,
            InsightType::Recommendation => self.recommendation += 1,
            InsightType::Comparison => self.comparison += 1,
            InsightType::Milestone => self.milestone += 1,
        }
    }

    pub fn total(&self) -> i64 {
        self.finding + self.alert + self.trend + self.recommendation + self.comparison + self.milestone
    }
}

/// The narrow per-domain tables populated column-by-column by flagged
/// indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedTable {
    Gender,
    Youth,
}

impl DerivedTable {
    pub fn table_name(self) -> &'static str {
        match self {
            DerivedTable::Gender => "gender_metrics",
            DerivedTable::Youth => "youth_metrics",
        }
    }
}

/// Maps an indicator to the derived-metric column it feeds, if any. A write
/// touches only its own column, so unrelated indicators can populate the same
/// (member_state_id, year) row over time.
pub fn derived_metric_column(indicator_code: &str) -> Option<(DerivedTable, &'static str)> {
    match indicator_code {
        "SG.GEN.PARL.ZS" => Some((DerivedTable::Gender, "women_parliament_pct")),
        "SE.ENR.PRIM.FM.ZS" => Some((DerivedTable::Gender, "gender_parity_education")),
        "SL.TLF.CACT.FE.ZS" => Some((DerivedTable::Gender, "women_labor_force_pct")),
        "SH.STA.MMRT" => Some((DerivedTable::Gender, "maternal_mortality_ratio")),
        "SP.ADO.TFRT" => Some((DerivedTable::Gender, "adolescent_fertility_rate")),
        "SL.UEM.1524.ZS" => Some((DerivedTable::Youth, "youth_unemployment_pct")),
        "SE.SEC.ENRR" => Some((DerivedTable::Youth, "secondary_enrollment_pct")),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    pub status: RunStatus,
    pub records_processed: i64,
    pub records_failed: i64,
    pub records_skipped: i64,
    pub indicators_fetched: usize,
    pub insights_generated: i64,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub records_processed: i64,
    pub records_failed: i64,
}
