use std::collections::HashMap;

use chrono::{Datelike, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::config::QualityConfig;
use crate::db;
use crate::models::QualityScoreRow;

pub(crate) fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy)]
pub struct SeriesPoint {
    pub year: i32,
    pub value: f64,
}

/// Share of the expected period window covered by distinct observed years.
pub fn completeness_pct(series: &[SeriesPoint], cfg: &QualityConfig) -> f64 {
    let expected = cfg.expected_years();
    if expected == 0 {
        return 0.0;
    }
    let mut years: Vec<i32> = series
        .iter()
        .filter(|p| p.year >= cfg.window_start_year && p.year <= cfg.window_end_year)
        .map(|p| p.year)
        .collect();
    years.sort_unstable();
    years.dedup();
    years.len() as f64 / expected as f64 * 100.0
}

/// Age of the latest observation in years; undefined without data.
pub fn timeliness_years(series: &[SeriesPoint], current_year: i32) -> Option<i32> {
    series
        .iter()
        .map(|p| p.year)
        .max()
        .map(|latest| current_year - latest)
}

/// Penalizes adjacent-year jumps whose relative change magnitude exceeds the
/// configured threshold. A previous value of zero is never flagged. Fewer
/// than two observations score a clean 100.
pub fn consistency_score(series: &[SeriesPoint], cfg: &QualityConfig) -> f64 {
    if series.len() < 2 {
        return 100.0;
    }
    let mut sorted = series.to_vec();
    sorted.sort_by_key(|p| p.year);

    let mut flagged = 0u32;
    for pair in sorted.windows(2) {
        let prev = pair[0].value;
        let curr = pair[1].value;
        if prev != 0.0 && ((curr - prev) / prev).abs() > cfg.jump_threshold {
            flagged += 1;
        }
    }
    (100.0 - cfg.jump_penalty * f64::from(flagged)).max(0.0)
}

pub fn overall_score(
    completeness: f64,
    timeliness: Option<i32>,
    consistency: f64,
    cfg: &QualityConfig,
) -> f64 {
    let timeliness_score = timeliness
        .map(|age| (100.0 - cfg.staleness_penalty * f64::from(age)).max(0.0))
        .unwrap_or(0.0);
    completeness * cfg.completeness_weight
        + timeliness_score * cfg.timeliness_weight
        + consistency * cfg.consistency_weight
}

pub fn score_pair(
    member_state_id: i64,
    indicator_id: i64,
    series: &[SeriesPoint],
    cfg: &QualityConfig,
    current_year: i32,
    assessed_at: chrono::DateTime<Utc>,
) -> QualityScoreRow {
    let completeness = completeness_pct(series, cfg);
    let timeliness = timeliness_years(series, current_year);
    let consistency = consistency_score(series, cfg);
    let overall = overall_score(completeness, timeliness, consistency, cfg);
    QualityScoreRow {
        member_state_id,
        indicator_id,
        completeness_pct: round2(completeness),
        timeliness_years: timeliness,
        consistency_score: round2(consistency),
        overall_score: round2(overall),
        assessed_at,
    }
}

#[derive(Debug, Clone)]
pub struct ScoreSummary {
    pub total_scores: usize,
}

/// Recomputes quality scores for every (member state, indicator) pair,
/// including pairs with no data at all. One batch fetch of all observed
/// values, grouped in memory; prior scores are fully replaced.
pub async fn assess_quality(pool: &PgPool, cfg: &QualityConfig) -> anyhow::Result<ScoreSummary> {
    let states = db::fetch_member_states(pool).await?;
    let indicators = db::fetch_indicators(pool).await?;
    let observations = db::fetch_observed_values(pool).await?;

    let mut grouped: HashMap<(i64, i64), Vec<SeriesPoint>> = HashMap::new();
    for obs in observations {
        grouped
            .entry((obs.member_state_id, obs.indicator_id))
            .or_default()
            .push(SeriesPoint {
                year: obs.year,
                value: obs.value,
            });
    }

    let current_year = Utc::now().year();
    let assessed_at = Utc::now();
    let mut rows = Vec::with_capacity(states.len() * indicators.len());
    for state in &states {
        for indicator in &indicators {
            let series = grouped
                .get(&(state.id, indicator.id))
                .map(|points| points.as_slice())
                .unwrap_or(&[]);
            rows.push(score_pair(
                state.id,
                indicator.id,
                series,
                cfg,
                current_year,
                assessed_at,
            ));
        }
    }

    db::upsert_quality_scores(pool, &rows).await?;
    info!(total_scores = rows.len(), "data quality assessed");
    Ok(ScoreSummary {
        total_scores: rows.len(),
    })
}

// ── Read aggregations ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct IndicatorQuality {
    pub indicator: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct QualityGap {
    pub state: String,
    pub indicator: String,
}

#[derive(Debug, Clone, Default)]
pub struct QualityOverview {
    pub continental_avg_score: f64,
    pub states_with_good_data: usize,
    pub states_with_poor_data: usize,
    pub most_complete_indicators: Vec<IndicatorQuality>,
    pub least_complete_indicators: Vec<IndicatorQuality>,
    pub gaps: Vec<QualityGap>,
}

const GOOD_SCORE: f64 = 70.0;
const POOR_SCORE: f64 = 40.0;
const TOP_INDICATORS: usize = 5;
const MAX_GAPS: usize = 20;

pub async fn quality_overview(pool: &PgPool) -> anyhow::Result<QualityOverview> {
    let scores = db::fetch_quality_scores(pool).await?;
    if scores.is_empty() {
        return Ok(QualityOverview::default());
    }

    let state_names: HashMap<i64, String> = db::fetch_member_states(pool)
        .await?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();
    let indicator_names: HashMap<i64, String> = db::fetch_indicators(pool)
        .await?
        .into_iter()
        .map(|i| (i.id, i.name))
        .collect();

    let mut by_state: HashMap<i64, Vec<f64>> = HashMap::new();
    let mut by_indicator: HashMap<i64, Vec<f64>> = HashMap::new();
    for score in &scores {
        by_state
            .entry(score.member_state_id)
            .or_default()
            .push(score.overall_score);
        by_indicator
            .entry(score.indicator_id)
            .or_default()
            .push(score.overall_score);
    }

    let state_avgs: Vec<f64> = by_state.values().map(|v| mean(v)).collect();
    let continental_avg_score = round1(mean(&state_avgs));
    let states_with_good_data = state_avgs.iter().filter(|&&v| v > GOOD_SCORE).count();
    let states_with_poor_data = state_avgs.iter().filter(|&&v| v < POOR_SCORE).count();

    let mut indicator_avgs: Vec<(i64, f64)> = by_indicator
        .into_iter()
        .map(|(id, values)| (id, mean(&values)))
        .collect();
    indicator_avgs
        .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let named = |&(id, score): &(i64, f64)| IndicatorQuality {
        indicator: indicator_names.get(&id).cloned().unwrap_or_default(),
        score: round1(score),
    };
    let most_complete_indicators: Vec<IndicatorQuality> =
        indicator_avgs.iter().take(TOP_INDICATORS).map(named).collect();
    let least_complete_indicators: Vec<IndicatorQuality> = indicator_avgs
        .iter()
        .rev()
        .take(TOP_INDICATORS)
        .map(named)
        .collect();

    // Pairs with nothing observed in the expected window.
    let gaps: Vec<QualityGap> = scores
        .iter()
        .filter(|s| s.completeness_pct == 0.0)
        .take(MAX_GAPS)
        .map(|s| QualityGap {
            state: state_names.get(&s.member_state_id).cloned().unwrap_or_default(),
            indicator: indicator_names.get(&s.indicator_id).cloned().unwrap_or_default(),
        })
        .collect();

    Ok(QualityOverview {
        continental_avg_score,
        states_with_good_data,
        states_with_poor_data,
        most_complete_indicators,
        least_complete_indicators,
        gaps,
    })
}

#[derive(Debug, Clone)]
pub struct StateQuality {
    pub state_name: String,
    pub iso_code: String,
    pub overall_score: f64,
    pub completeness: f64,
    pub indicators_covered: usize,
}

pub async fn quality_by_state(pool: &PgPool) -> anyhow::Result<Vec<StateQuality>> {
    let scores = db::fetch_quality_scores(pool).await?;
    let states: HashMap<i64, (String, String)> = db::fetch_member_states(pool)
        .await?
        .into_iter()
        .map(|s| (s.id, (s.name, s.iso_code)))
        .collect();

    let mut grouped: HashMap<i64, (Vec<f64>, Vec<f64>)> = HashMap::new();
    for score in &scores {
        let entry = grouped.entry(score.member_state_id).or_default();
        entry.0.push(score.overall_score);
        entry.1.push(score.completeness_pct);
    }

    let mut result: Vec<StateQuality> = grouped
        .into_iter()
        .filter_map(|(state_id, (overall, completeness))| {
            let (name, iso_code) = states.get(&state_id)?.clone();
            Some(StateQuality {
                state_name: name,
                iso_code,
                overall_score: round1(mean(&overall)),
                completeness: round1(mean(&completeness)),
                indicators_covered: overall.len(),
            })
        })
        .collect();
    result.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(result)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: &[(i32, f64)]) -> Vec<SeriesPoint> {
        points
            .iter()
            .map(|&(year, value)| SeriesPoint { year, value })
            .collect()
    }

    #[test]
    fn completeness_counts_distinct_years_in_window() {
        let cfg = QualityConfig::default();
        let s = series(&[
            (2005, 1.0),
            (2010, 2.0),
            (2015, 3.0),
            (2020, 4.0),
            (2022, 5.0),
        ]);
        assert_eq!(completeness_pct(&s, &cfg), 20.0);
    }

    #[test]
    fn completeness_ignores_years_outside_window() {
        let cfg = QualityConfig::default();
        let s = series(&[(1995, 1.0), (1998, 2.0), (2010, 3.0)]);
        assert_eq!(completeness_pct(&s, &cfg), 4.0);
    }

    #[test]
    fn timeliness_is_age_of_latest_year() {
        assert_eq!(timeliness_years(&series(&[(2018, 1.0), (2022, 2.0)]), 2026), Some(4));
        assert_eq!(timeliness_years(&[], 2026), None);
    }

    #[test]
    fn one_large_jump_among_four_pairs_scores_80() {
        let cfg = QualityConfig::default();
        let s = series(&[
            (2000, 10.0),
            (2001, 11.0),
            (2002, 12.0),
            (2003, 50.0),
            (2004, 51.0),
        ]);
        assert_eq!(consistency_score(&s, &cfg), 80.0);
    }

    #[test]
    fn two_large_jumps_score_60() {
        let cfg = QualityConfig::default();
        let s = series(&[
            (2000, 10.0),
            (2001, 40.0),
            (2002, 10.0),
            (2003, 40.0),
            (2004, 41.0),
        ]);
        assert_eq!(consistency_score(&s, &cfg), 60.0);
    }

    #[test]
    fn zero_previous_value_is_never_a_jump() {
        let cfg = QualityConfig::default();
        let s = series(&[(2000, 0.0), (2001, 500.0)]);
        assert_eq!(consistency_score(&s, &cfg), 100.0);
    }

    #[test]
    fn short_series_scores_clean() {
        let cfg = QualityConfig::default();
        assert_eq!(consistency_score(&[], &cfg), 100.0);
        assert_eq!(consistency_score(&series(&[(2020, 3.0)]), &cfg), 100.0);
    }

    #[test]
    fn overall_weights_components() {
        let cfg = QualityConfig::default();
        // completeness 50, timeliness 2 years (score 70), consistency 100
        let overall = overall_score(50.0, Some(2), 100.0, &cfg);
        assert!((overall - (0.4 * 50.0 + 0.3 * 70.0 + 0.3 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn missing_data_zeroes_the_timeliness_component() {
        let cfg = QualityConfig::default();
        let overall = overall_score(0.0, None, 100.0, &cfg);
        assert!((overall - 30.0).abs() < 1e-9);
    }

    #[test]
    fn score_pair_rounds_for_storage() {
        let cfg = QualityConfig::default();
        let s = series(&[(2020, 1.0), (2021, 2.0), (2022, 3.0)]);
        let row = score_pair(1, 2, &s, &cfg, 2026, Utc::now());
        assert_eq!(row.completeness_pct, 12.0);
        assert_eq!(row.timeliness_years, Some(4));
        assert_eq!(row.consistency_score, 100.0);
    }
}
