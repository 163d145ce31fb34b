use std::collections::HashMap;

use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::models::{
    DerivedTable, IndicatorDefinition, InsightDraft, MemberState, QualityScoreRow, Region,
    RunStatus,
};

/// Observation upserts are grouped into batches of this size.
pub const OBSERVATION_BATCH: usize = 500;

const SCORE_BATCH: usize = 200;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Lookup tables translating external codes to catalog ids, built once per
/// pipeline run. A code with no entry is unresolvable; consumers skip the
/// record and account for it separately from true failures.
pub struct ReferenceMaps {
    entities: HashMap<String, i64>,
    indicators: HashMap<String, i64>,
}

impl ReferenceMaps {
    pub fn from_catalog(states: &[MemberState], indicators: &[IndicatorDefinition]) -> Self {
        let mut entities = HashMap::new();
        for state in states {
            entities.insert(state.iso_code.clone(), state.id);
            if let Some(iso3) = &state.iso3_code {
                entities.insert(iso3.clone(), state.id);
            }
        }
        let indicators = indicators
            .iter()
            .map(|ind| (ind.code.clone(), ind.id))
            .collect();
        Self { entities, indicators }
    }

    /// Resolves an entity by its primary code, falling back to the alternate.
    pub fn resolve_entity(&self, iso_code: &str, iso3_code: &str) -> Option<i64> {
        self.entities
            .get(iso_code)
            .or_else(|| self.entities.get(iso3_code))
            .copied()
    }

    pub fn require_indicator(&self, code: &str) -> Result<i64> {
        self.indicators
            .get(code)
            .copied()
            .ok_or_else(|| PipelineError::UnresolvedReference {
                kind: "indicator",
                code: code.to_string(),
            })
    }
}

pub async fn fetch_regions(pool: &PgPool) -> Result<Vec<Region>> {
    let rows = sqlx::query("SELECT id, name FROM indicator_watch.regions")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| Region {
            id: row.get("id"),
            name: row.get("name"),
        })
        .collect())
}

pub async fn fetch_member_states(pool: &PgPool) -> Result<Vec<MemberState>> {
    let rows = sqlx::query(
        "SELECT id, name, iso_code, iso3_code, region_id \
         FROM indicator_watch.member_states ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| MemberState {
            id: row.get("id"),
            name: row.get("name"),
            iso_code: row.get("iso_code"),
            iso3_code: row.get("iso3_code"),
            region_id: row.get("region_id"),
        })
        .collect())
}

pub async fn fetch_indicators(pool: &PgPool) -> Result<Vec<IndicatorDefinition>> {
    let rows = sqlx::query(
        "SELECT id, code, name, unit, goal_id, target_value, baseline_value, baseline_year \
         FROM indicator_watch.indicators ORDER BY code",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| IndicatorDefinition {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
            unit: row.get("unit"),
            goal_id: row.get("goal_id"),
            target_value: row.get("target_value"),
            baseline_value: row.get("baseline_value"),
            baseline_year: row.get("baseline_year"),
        })
        .collect())
}

// ── Run tracker ─────────────────────────────────────────────────────

pub async fn open_run(pool: &PgPool) -> Result<i64> {
    let row = sqlx::query(
        "INSERT INTO indicator_watch.pipeline_runs (status, started_at) \
         VALUES ($1, $2) RETURNING id",
    )
    .bind(RunStatus::Running.as_str())
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn close_run(
    pool: &PgPool,
    run_id: i64,
    processed: i64,
    failed: i64,
    skipped: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE indicator_watch.pipeline_runs \
         SET status = $2, completed_at = $3, records_processed = $4, \
             records_failed = $5, records_skipped = $6 \
         WHERE id = $1",
    )
    .bind(run_id)
    .bind(RunStatus::Completed.as_str())
    .bind(Utc::now())
    .bind(processed)
    .bind(failed)
    .bind(skipped)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fail_run(pool: &PgPool, run_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE indicator_watch.pipeline_runs SET status = $2, completed_at = $3 WHERE id = $1",
    )
    .bind(run_id)
    .bind(RunStatus::Failed.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_insights_generated(pool: &PgPool, run_id: i64, total: i64) -> Result<()> {
    sqlx::query("UPDATE indicator_watch.pipeline_runs SET insights_generated = $2 WHERE id = $1")
        .bind(run_id)
        .bind(total)
        .execute(pool)
        .await?;
    Ok(())
}

// ── Loader ──────────────────────────────────────────────────────────

/// Keyed upsert of one batch of observations. Re-running with identical input
/// rewrites the same rows; nothing is duplicated.
pub async fn upsert_observation_chunk(
    pool: &PgPool,
    rows: &[crate::models::ObservationRow],
) -> Result<()> {
    let mut indicator_ids = Vec::with_capacity(rows.len());
    let mut state_ids = Vec::with_capacity(rows.len());
    let mut years = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len());
    let mut qualities = Vec::with_capacity(rows.len());
    let mut sources = Vec::with_capacity(rows.len());
    for row in rows {
        indicator_ids.push(row.indicator_id);
        state_ids.push(row.member_state_id);
        years.push(row.year);
        values.push(row.value);
        qualities.push(row.quality.as_str().to_string());
        sources.push(row.source_detail.clone());
    }

    sqlx::query(
        r#"
        INSERT INTO indicator_watch.observations
            (indicator_id, member_state_id, year, value, quality, source_detail)
        SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::int[], $4::float8[], $5::text[], $6::text[])
        ON CONFLICT (indicator_id, member_state_id, year)
        DO UPDATE SET value = EXCLUDED.value,
                      quality = EXCLUDED.quality,
                      source_detail = EXCLUDED.source_detail
        "#,
    )
    .bind(&indicator_ids)
    .bind(&state_ids)
    .bind(&years)
    .bind(&values)
    .bind(&qualities)
    .bind(&sources)
    .execute(pool)
    .await?;
    Ok(())
}

/// Column-level upsert into a derived-metric table. Only the named column is
/// written, so rows shared across source indicators keep their other columns.
/// `column` comes from the fixed mapping in `models::derived_metric_column`,
/// never from input.
pub async fn upsert_derived_metric(
    pool: &PgPool,
    table: DerivedTable,
    column: &str,
    member_state_id: i64,
    year: i32,
    value: f64,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO indicator_watch.{table} (member_state_id, year, {column}) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (member_state_id, year) DO UPDATE SET {column} = EXCLUDED.{column}",
        table = table.table_name(),
        column = column,
    );
    sqlx::query(&sql)
        .bind(member_state_id)
        .bind(year)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

// ── Observations ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoredObservation {
    pub indicator_id: i64,
    pub member_state_id: i64,
    pub year: i32,
    pub value: f64,
}

/// All observed (non-null) values in one round trip, for in-memory grouping
/// by the assessor and the analyzer state.
pub async fn fetch_observed_values(pool: &PgPool) -> Result<Vec<StoredObservation>> {
    let rows = sqlx::query(
        "SELECT indicator_id, member_state_id, year, value \
         FROM indicator_watch.observations WHERE value IS NOT NULL ORDER BY year",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| StoredObservation {
            indicator_id: row.get("indicator_id"),
            member_state_id: row.get("member_state_id"),
            year: row.get("year"),
            value: row.get("value"),
        })
        .collect())
}

// ── Quality scores ──────────────────────────────────────────────────

pub async fn upsert_quality_scores(pool: &PgPool, rows: &[QualityScoreRow]) -> Result<()> {
    for chunk in rows.chunks(SCORE_BATCH) {
        let mut state_ids = Vec::with_capacity(chunk.len());
        let mut indicator_ids = Vec::with_capacity(chunk.len());
        let mut completeness = Vec::with_capacity(chunk.len());
        let mut timeliness = Vec::with_capacity(chunk.len());
        let mut consistency = Vec::with_capacity(chunk.len());
        let mut overall = Vec::with_capacity(chunk.len());
        let mut assessed = Vec::with_capacity(chunk.len());
        for row in chunk {
            state_ids.push(row.member_state_id);
            indicator_ids.push(row.indicator_id);
            completeness.push(row.completeness_pct);
            timeliness.push(row.timeliness_years);
            consistency.push(row.consistency_score);
            overall.push(row.overall_score);
            assessed.push(row.assessed_at);
        }

        sqlx::query(
            r#"
            INSERT INTO indicator_watch.quality_scores
                (member_state_id, indicator_id, completeness_pct, timeliness_years,
                 consistency_score, overall_score, assessed_at)
            SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::float8[], $4::int[],
                                 $5::float8[], $6::float8[], $7::timestamptz[])
            ON CONFLICT (member_state_id, indicator_id)
            DO UPDATE SET completeness_pct = EXCLUDED.completeness_pct,
                          timeliness_years = EXCLUDED.timeliness_years,
                          consistency_score = EXCLUDED.consistency_score,
                          overall_score = EXCLUDED.overall_score,
                          assessed_at = EXCLUDED.assessed_at
            "#,
        )
        .bind(&state_ids)
        .bind(&indicator_ids)
        .bind(&completeness)
        .bind(&timeliness)
        .bind(&consistency)
        .bind(&overall)
        .bind(&assessed)
        .execute(pool)
        .await?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StoredQualityScore {
    pub member_state_id: i64,
    pub indicator_id: i64,
    pub completeness_pct: f64,
    pub overall_score: f64,
}

pub async fn fetch_quality_scores(pool: &PgPool) -> Result<Vec<StoredQualityScore>> {
    let rows = sqlx::query(
        "SELECT member_state_id, indicator_id, completeness_pct, overall_score \
         FROM indicator_watch.quality_scores",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| StoredQualityScore {
            member_state_id: row.get("member_state_id"),
            indicator_id: row.get("indicator_id"),
            completeness_pct: row.get("completeness_pct"),
            overall_score: row.get("overall_score"),
        })
        .collect())
}

// ── Insights ────────────────────────────────────────────────────────

pub async fn open_generation(pool: &PgPool) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO indicator_watch.insight_generations (id, started_at) VALUES ($1, $2)")
        .bind(id)
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(id)
}

/// Inserts a draft under a not-yet-current generation. The previous active
/// set stays visible until `activate_generation` swaps the pointer.
pub async fn insert_insight(
    pool: &PgPool,
    generation_id: Uuid,
    run_id: Option<i64>,
    draft: &InsightDraft,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO indicator_watch.insights
            (generation_id, pipeline_run_id, insight_type, severity, title, description,
             evidence, goal_id, indicator_id, member_state_id, generated_at,
             is_active, included_in_report)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, FALSE, FALSE)
        "#,
    )
    .bind(generation_id)
    .bind(run_id)
    .bind(draft.insight_type.as_str())
    .bind(draft.severity.as_str())
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(&draft.evidence)
    .bind(draft.goal_id)
    .bind(draft.indicator_id)
    .bind(draft.member_state_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Retires the previous active set and promotes the new generation in one
/// transaction, so readers never observe zero active insights.
pub async fn activate_generation(pool: &PgPool, generation_id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE indicator_watch.insights SET is_active = (generation_id = $1) \
         WHERE is_active OR generation_id = $1",
    )
    .bind(generation_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "UPDATE indicator_watch.insight_generations SET is_current = (id = $1) \
         WHERE is_current OR id = $1",
    )
    .bind(generation_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: i64, iso2: &str, iso3: Option<&str>) -> MemberState {
        MemberState {
            id,
            name: format!("State {id}"),
            iso_code: iso2.to_string(),
            iso3_code: iso3.map(|c| c.to_string()),
            region_id: None,
        }
    }

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

    #[test]
    fn entity_resolution_covers_both_codes() {
        let refs = ReferenceMaps::from_catalog(
            &[state(1, "RW", Some("RWA")), state(2, "KE", None)],
            &[indicator(10, "SG.GEN.PARL.ZS")],
        );
        assert_eq!(refs.resolve_entity("RW", ""), Some(1));
        assert_eq!(refs.resolve_entity("??", "RWA"), Some(1));
        assert_eq!(refs.resolve_entity("KE", "KEN"), Some(2));
        assert_eq!(refs.resolve_entity("TZ", "TZA"), None);
    }

    #[test]
    fn unknown_indicator_is_an_unresolved_reference() {
        let refs = ReferenceMaps::from_catalog(&[], &[indicator(10, "SG.GEN.PARL.ZS")]);
        assert_eq!(refs.require_indicator("SG.GEN.PARL.ZS").ok(), Some(10));
        assert!(refs.require_indicator("NY.GDP.PCAP.CD").is_err());
    }
}
