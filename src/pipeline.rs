use std::path::Path;

use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::db::{self, ReferenceMaps};
use crate::models::{
    derived_metric_column, ImportSummary, ObservationQuality, ObservationRow, RunStatus,
    RunSummary,
};
use crate::provider::{FetchOutcome, ObservationProvider, PeriodRange};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Indicator codes to fetch; defaults to the full catalog.
    pub indicator_codes: Option<Vec<String>>,
    /// Entity codes to fetch; defaults to all tracked member states.
    pub entity_codes: Option<Vec<String>>,
    pub range: PeriodRange,
}

/// Runs the extract-load pipeline: open a run, fetch each indicator from the
/// provider, resolve references, upsert observations and derived metrics,
/// close the run with final counts.
///
/// Per-indicator failures never abort the run; they only show up in the
/// counters. The run itself fails only when setup breaks before any
/// indicator is processed.
pub async fn run_pipeline(
    pool: &PgPool,
    provider: &dyn ObservationProvider,
    cfg: &WatchConfig,
    opts: &PipelineOptions,
) -> anyhow::Result<RunSummary> {
    let run_id = db::open_run(pool).await?;

    let setup = async {
        let states = db::fetch_member_states(pool).await?;
        let indicators = db::fetch_indicators(pool).await?;
        Ok::<_, crate::error::PipelineError>((states, indicators))
    };
    let (states, indicators) = match setup.await {
        Ok(catalogs) => catalogs,
        Err(e) => {
            db::fail_run(pool, run_id).await?;
            return Err(e.into());
        }
    };
    let refs = ReferenceMaps::from_catalog(&states, &indicators);

    let indicator_codes: Vec<String> = opts
        .indicator_codes
        .clone()
        .unwrap_or_else(|| indicators.iter().map(|ind| ind.code.clone()).collect());
    let entity_codes: Vec<String> = opts
        .entity_codes
        .clone()
        .unwrap_or_else(|| states.iter().map(|s| s.iso_code.clone()).collect());

    info!(
        run_id,
        indicators = indicator_codes.len(),
        entities = entity_codes.len(),
        "pipeline started"
    );

    let mut processed = 0i64;
    let mut failed = 0i64;
    let mut skipped = 0i64;

    for code in &indicator_codes {
        let indicator_id = match refs.require_indicator(code) {
            Ok(id) => id,
            Err(e) => {
                warn!(indicator = %code, error = %e, "indicator not in catalog, skipping");
                continue;
            }
        };

        // A transport failure yields zero records for this indicator; the
        // run continues with the next one.
        let outcome = match provider.fetch_indicator(code, &entity_codes, opts.range).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(indicator = %code, error = %e, "fetch failed, continuing with zero records");
                FetchOutcome::default()
            }
        };
        failed += outcome.malformed as i64;

        let mut rows = Vec::with_capacity(outcome.records.len());
        for record in &outcome.records {
            match refs.resolve_entity(&record.iso_code, &record.iso3_code) {
                Some(member_state_id) => rows.push(ObservationRow {
                    indicator_id,
                    member_state_id,
                    year: record.year,
                    value: Some(record.value),
                    quality: ObservationQuality::Verified,
                    source_detail: format!("World Bank API ({code})"),
                }),
                None => {
                    debug!(indicator = %code, entity = %record.iso_code, "unresolved entity code");
                    if cfg.strict_references {
                        failed += 1;
                    } else {
                        skipped += 1;
                    }
                }
            }
        }

        // Keyed upsert in bounded batches. A failed batch aborts the rest of
        // this indicator's load; earlier batches stay applied.
        let mut applied = 0usize;
        for chunk in rows.chunks(db::OBSERVATION_BATCH) {
            if let Err(e) = db::upsert_observation_chunk(pool, chunk).await {
                warn!(indicator = %code, error = %e, "observation batch failed");
                break;
            }
            applied += chunk.len();
        }
        processed += applied as i64;
        failed += (rows.len() - applied) as i64;

        if applied == rows.len() {
            if let Err(e) = apply_derived_metrics(pool, code, &rows).await {
                warn!(indicator = %code, error = %e, "derived metric update failed");
            }
        }

        info!(indicator = %code, records = applied, "indicator loaded");
    }

    db::close_run(pool, run_id, processed, failed, skipped).await?;
    info!(run_id, processed, failed, skipped, "pipeline completed");

    Ok(RunSummary {
        run_id,
        status: RunStatus::Completed,
        records_processed: processed,
        records_failed: failed,
        records_skipped: skipped,
        indicators_fetched: indicator_codes.len(),
        insights_generated: 0,
    })
}

async fn apply_derived_metrics(
    pool: &PgPool,
    indicator_code: &str,
    rows: &[ObservationRow],
) -> crate::error::Result<()> {
    let Some((table, column)) = derived_metric_column(indicator_code) else {
        return Ok(());
    };
    for row in rows {
        if let Some(value) = row.value {
            db::upsert_derived_metric(pool, table, column, row.member_state_id, row.year, value)
                .await?;
        }
    }
    Ok(())
}

#[derive(Debug, serde::Deserialize)]
struct CsvObservation {
    country_iso: String,
    indicator_code: String,
    year: i32,
    value: Option<f64>,
    quality: Option<String>,
}

/// Imports supplementary observations from a CSV file with columns
/// `country_iso, indicator_code, year, value` and an optional `quality`
/// column (verified/estimated/missing). Unknown codes count as failures
/// here, unlike the provider path.
pub async fn import_csv(pool: &PgPool, path: &Path) -> anyhow::Result<ImportSummary> {
    let states = db::fetch_member_states(pool).await?;
    let indicators = db::fetch_indicators(pool).await?;
    let refs = ReferenceMaps::from_catalog(&states, &indicators);

    let source_detail = format!(
        "Manual upload: {}",
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    );

    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    let mut failed = 0i64;

    for result in reader.deserialize::<CsvObservation>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "malformed csv row");
                failed += 1;
                continue;
            }
        };

        let country = record.country_iso.to_uppercase();
        let Some(member_state_id) = refs.resolve_entity(&country, &country) else {
            warn!(entity = %country, "unknown country code");
            failed += 1;
            continue;
        };
        let indicator_id = match refs.require_indicator(&record.indicator_code) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "unknown indicator code");
                failed += 1;
                continue;
            }
        };

        let quality = match record.quality.as_deref().filter(|tag| !tag.is_empty()) {
            Some(tag) => match ObservationQuality::parse(tag) {
                Some(quality) => quality,
                None => {
                    warn!(tag, "unknown quality tag");
                    failed += 1;
                    continue;
                }
            },
            None if record.value.is_some() => ObservationQuality::Verified,
            None => ObservationQuality::Missing,
        };
        rows.push(ObservationRow {
            indicator_id,
            member_state_id,
            year: record.year,
            value: record.value,
            quality,
            source_detail: source_detail.clone(),
        });
    }

    let mut processed = 0i64;
    for chunk in rows.chunks(db::OBSERVATION_BATCH) {
        db::upsert_observation_chunk(pool, chunk).await?;
        processed += chunk.len() as i64;
    }

    info!(processed, failed, "csv import finished");
    Ok(ImportSummary {
        records_processed: processed,
        records_failed: failed,
    })
}
