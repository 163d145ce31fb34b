use std::collections::{BTreeMap, HashMap};

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analyzers;
use crate::config::WatchConfig;
use crate::db;
use crate::error::PipelineError;
use crate::models::{IndicatorDefinition, InsightCounts, MemberState, Region};
use crate::quality::{round2, SeriesPoint};

#[derive(Debug, Clone)]
pub struct ObservationPoint {
    pub indicator_id: i64,
    pub member_state_id: i64,
    pub year: i32,
    pub value: f64,
}

/// In-memory snapshot of the stored state that analyzers read. Built from one
/// batch fetch per catalog plus one for observed values; analyzers never
/// touch the store themselves.
pub struct AnalyzerState {
    indicators: Vec<IndicatorDefinition>,
    by_code: HashMap<String, usize>,
    states: HashMap<i64, MemberState>,
    regions: HashMap<i64, String>,
    // indicator id -> state id -> series ascending by year
    series: HashMap<i64, BTreeMap<i64, Vec<SeriesPoint>>>,
}

/// An entity's most recent non-null observation for one indicator.
#[derive(Debug, Clone)]
pub struct LatestValue {
    pub member_state_id: i64,
    pub state_name: String,
    pub iso_code: String,
    pub region_id: Option<i64>,
    pub year: i32,
    pub value: f64,
}

/// Change between an entity's two most recent observations.
#[derive(Debug, Clone)]
pub struct YoyChange {
    pub member_state_id: i64,
    pub state_name: String,
    pub iso_code: String,
    pub latest_year: i32,
    pub latest_value: f64,
    pub previous_year: i32,
    pub previous_value: f64,
    pub pct_change: f64,
}

impl AnalyzerState {
    pub fn from_parts(
        indicators: Vec<IndicatorDefinition>,
        states: Vec<MemberState>,
        regions: Vec<Region>,
        observations: Vec<ObservationPoint>,
    ) -> Self {
        let by_code = indicators
            .iter()
            .enumerate()
            .map(|(idx, ind)| (ind.code.clone(), idx))
            .collect();
        let states = states.into_iter().map(|s| (s.id, s)).collect();
        let regions = regions.into_iter().map(|r| (r.id, r.name)).collect();

        let mut series: HashMap<i64, BTreeMap<i64, Vec<SeriesPoint>>> = HashMap::new();
        for obs in observations {
            series
                .entry(obs.indicator_id)
                .or_default()
                .entry(obs.member_state_id)
                .or_default()
                .push(SeriesPoint {
                    year: obs.year,
                    value: obs.value,
                });
        }
        for per_state in series.values_mut() {
            for points in per_state.values_mut() {
                points.sort_by_key(|p| p.year);
            }
        }

        Self {
            indicators,
            by_code,
            states,
            regions,
            series,
        }
    }

    pub async fn load(pool: &PgPool) -> Result<Self, PipelineError> {
        let indicators = db::fetch_indicators(pool).await?;
        let states = db::fetch_member_states(pool).await?;
        let regions = db::fetch_regions(pool).await?;
        let observations = db::fetch_observed_values(pool)
            .await?
            .into_iter()
            .map(|obs| ObservationPoint {
                indicator_id: obs.indicator_id,
                member_state_id: obs.member_state_id,
                year: obs.year,
                value: obs.value,
            })
            .collect();
        Ok(Self::from_parts(indicators, states, regions, observations))
    }

    pub fn indicators(&self) -> &[IndicatorDefinition] {
        &self.indicators
    }

    pub fn indicator(&self, code: &str) -> Option<&IndicatorDefinition> {
        self.by_code.get(code).map(|&idx| &self.indicators[idx])
    }

    pub fn region_name(&self, region_id: Option<i64>) -> Option<&str> {
        region_id.and_then(|id| self.regions.get(&id)).map(String::as_str)
    }

    /// Latest non-null value per entity; entities without data are excluded.
    pub fn latest_values(&self, indicator_code: &str) -> Vec<LatestValue> {
        let Some(indicator) = self.indicator(indicator_code) else {
            return Vec::new();
        };
        let Some(per_state) = self.series.get(&indicator.id) else {
            return Vec::new();
        };
        per_state
            .iter()
            .filter_map(|(state_id, points)| {
                let last = points.last()?;
                let state = self.states.get(state_id)?;
                Some(LatestValue {
                    member_state_id: *state_id,
                    state_name: state.name.clone(),
                    iso_code: state.iso_code.clone(),
                    region_id: state.region_id,
                    year: last.year,
                    value: last.value,
                })
            })
            .collect()
    }

    /// Percent change between the two most recent observations per entity.
    /// Entities with fewer than two observations, or a previous value of
    /// exactly zero, are skipped.
    pub fn year_over_year(&self, indicator_code: &str) -> Vec<YoyChange> {
        let Some(indicator) = self.indicator(indicator_code) else {
            return Vec::new();
        };
        let Some(per_state) = self.series.get(&indicator.id) else {
            return Vec::new();
        };
        per_state
            .iter()
            .filter_map(|(state_id, points)| {
                if points.len() < 2 {
                    return None;
                }
                let latest = points[points.len() - 1];
                let previous = points[points.len() - 2];
                if previous.value == 0.0 {
                    return None;
                }
                let state = self.states.get(state_id)?;
                let pct_change =
                    round2((latest.value - previous.value) / previous.value.abs() * 100.0);
                Some(YoyChange {
                    member_state_id: *state_id,
                    state_name: state.name.clone(),
                    iso_code: state.iso_code.clone(),
                    latest_year: latest.year,
                    latest_value: latest.value,
                    previous_year: previous.year,
                    previous_value: previous.value,
                    pct_change,
                })
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct InsightSummary {
    pub generation_id: Uuid,
    pub total: i64,
    pub counts: InsightCounts,
}

/// Runs the fixed analyzer battery against the current stored state and
/// materializes a new insight generation.
///
/// Drafts are persisted as they are produced, under a generation that is not
/// yet current; a single transactional swap at the end retires the previous
/// active set. A failing analyzer is logged and contributes zero insights;
/// the rest of the battery still runs.
pub async fn generate_insights(
    pool: &PgPool,
    cfg: &WatchConfig,
    run_id: Option<i64>,
) -> anyhow::Result<InsightSummary> {
    let state = AnalyzerState::load(pool).await?;
    let generation_id = db::open_generation(pool).await?;
    let mut counts = InsightCounts::default();

    for analyzer in analyzers::battery(&cfg.analysis) {
        match analyzer.analyze(&state) {
            Ok(drafts) => {
                for draft in drafts {
                    counts.bump(draft.insight_type);
                    db::insert_insight(pool, generation_id, run_id, &draft).await?;
                }
            }
            Err(e) => {
                let err = PipelineError::Analyzer {
                    analyzer: analyzer.name(),
                    message: e.to_string(),
                };
                warn!(error = %err, "analyzer failed, contributing zero insights");
            }
        }
    }

    db::activate_generation(pool, generation_id).await?;
    if let Some(run_id) = run_id {
        db::set_insights_generated(pool, run_id, counts.total()).await?;
    }

    info!(
        generation = %generation_id,
        total = counts.total(),
        findings = counts.finding,
        alerts = counts.alert,
        trends = counts.trend,
        recommendations = counts.recommendation,
        comparisons = counts.comparison,
        milestones = counts.milestone,
        "insights generated"
    );
    Ok(InsightSummary {
        generation_id,
        total: counts.total(),
        counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicator(id: i64, code: &str) -> IndicatorDefinition {
        IndicatorDefinition {
            id,
            code: code.to_string(),
            name: code.to_string(),
            unit: None,
            goal_id: None,
            target_value: None,
            baseline_value: None,
            baseline_year: None,
        }
    }

    fn member(id: i64, name: &str, region_id: Option<i64>) -> MemberState {
        MemberState {
            id,
            name: name.to_string(),
            iso_code: name[..2].to_uppercase(),
            iso3_code: None,
            region_id,
        }
    }

    fn obs(indicator_id: i64, state_id: i64, year: i32, value: f64) -> ObservationPoint {
        ObservationPoint {
            indicator_id,
            member_state_id: state_id,
            year,
            value,
        }
    }

    fn fixture() -> AnalyzerState {
        AnalyzerState::from_parts(
            vec![indicator(1, "SG.GEN.PARL.ZS")],
            vec![
                member(1, "Rwanda", Some(1)),
                member(2, "Kenya", Some(1)),
                member(3, "Chad", Some(2)),
            ],
            vec![
                Region {
                    id: 1,
                    name: "East Africa".to_string(),
                },
                Region {
                    id: 2,
                    name: "Central Africa".to_string(),
                },
            ],
            vec![
                obs(1, 1, 2020, 55.0),
                obs(1, 1, 2022, 61.3),
                obs(1, 2, 2021, 21.0),
                obs(1, 2, 2022, 23.3),
            ],
        )
    }

    #[test]
    fn latest_values_exclude_entities_without_data() {
        let state = fixture();
        let latest = state.latest_values("SG.GEN.PARL.ZS");
        assert_eq!(latest.len(), 2);
        let rwanda = latest.iter().find(|v| v.state_name == "Rwanda").unwrap();
        assert_eq!(rwanda.year, 2022);
        assert_eq!(rwanda.value, 61.3);
        assert!(!latest.iter().any(|v| v.state_name == "Chad"));
    }

    #[test]
    fn latest_values_for_unknown_indicator_are_empty() {
        let state = fixture();
        assert!(state.latest_values("NY.GDP.PCAP.CD").is_empty());
    }

    #[test]
    fn year_over_year_uses_the_two_most_recent_periods() {
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "X")],
            vec![member(1, "Rwanda", None)],
            Vec::new(),
            vec![obs(1, 1, 2019, 10.0), obs(1, 1, 2021, 40.0), obs(1, 1, 2022, 44.0)],
        );
        let changes = state.year_over_year("X");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].previous_value, 40.0);
        assert_eq!(changes[0].latest_value, 44.0);
        assert_eq!(changes[0].pct_change, 10.0);
    }

    #[test]
    fn year_over_year_skips_zero_previous_values() {
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "X")],
            vec![member(1, "Rwanda", None)],
            Vec::new(),
            vec![obs(1, 1, 2021, 0.0), obs(1, 1, 2022, 5.0)],
        );
        assert!(state.year_over_year("X").is_empty());
    }

    #[test]
    fn year_over_year_needs_two_periods() {
        let state = fixture();
        // Rwanda and Kenya both have two periods in the fixture.
        assert_eq!(state.year_over_year("SG.GEN.PARL.ZS").len(), 2);

        let single = AnalyzerState::from_parts(
            vec![indicator(1, "X")],
            vec![member(1, "Rwanda", None)],
            Vec::new(),
            vec![obs(1, 1, 2022, 5.0)],
        );
        assert!(single.year_over_year("X").is_empty());
    }

    #[test]
    fn negative_previous_uses_magnitude_for_the_denominator() {
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "X")],
            vec![member(1, "Rwanda", None)],
            Vec::new(),
            vec![obs(1, 1, 2021, -40.0), obs(1, 1, 2022, -30.0)],
        );
        let changes = state.year_over_year("X");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].pct_change, 25.0);
    }
}
