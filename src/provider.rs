use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::NormalizedObservation;

pub const WORLD_BANK_BASE: &str = "https://api.worldbank.org/v2";

const PER_PAGE: u32 = 10_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct PeriodRange {
    pub start_year: i32,
    pub end_year: i32,
}

impl PeriodRange {
    fn as_date_param(&self) -> String {
        format!("{}:{}", self.start_year, self.end_year)
    }
}

/// What one indicator fetch produced: usable records plus a count of rows the
/// provider sent that failed validation.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<NormalizedObservation>,
    pub malformed: usize,
}

/// Source of indicator observations. Injected into the pipeline so tests and
/// alternate deployments can swap the transport.
#[async_trait]
pub trait ObservationProvider: Send + Sync {
    async fn fetch_indicator(
        &self,
        indicator_code: &str,
        entity_codes: &[String],
        range: PeriodRange,
    ) -> Result<FetchOutcome>;
}

/// World Bank API client. Responses are `[page_meta, records]` envelopes;
/// a null record value means "no data", never zero.
pub struct WorldBankProvider {
    client: reqwest::Client,
    base_url: String,
}

impl WorldBankProvider {
    pub fn new() -> std::result::Result<Self, reqwest::Error> {
        Self::with_base_url(WORLD_BANK_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> std::result::Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn fetch_page(&self, url: &str, date: &str, page: u32) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .query(&[
                ("format", "json".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("date", date.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ObservationProvider for WorldBankProvider {
    async fn fetch_indicator(
        &self,
        indicator_code: &str,
        entity_codes: &[String],
        range: PeriodRange,
    ) -> Result<FetchOutcome> {
        let country_path = if entity_codes.is_empty() {
            "all".to_string()
        } else {
            entity_codes.join(";")
        };
        let url = format!(
            "{}/country/{}/indicator/{}",
            self.base_url, country_path, indicator_code
        );
        let date = range.as_date_param();

        let first = self.fetch_page(&url, &date, 1).await?;
        let (pages, raw) = parse_envelope(&first)?;
        let (mut records, mut malformed) = normalize(raw);

        for page in 2..=pages {
            let body = self.fetch_page(&url, &date, page).await?;
            let (_, raw) = parse_envelope(&body)?;
            let (more, bad) = normalize(raw);
            records.extend(more);
            malformed += bad;
        }

        info!(
            indicator = indicator_code,
            records = records.len(),
            pages,
            "provider fetch complete"
        );
        Ok(FetchOutcome { records, malformed })
    }
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    #[serde(default = "default_pages")]
    pages: u32,
}

fn default_pages() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct ProviderRecord {
    #[serde(rename = "countryiso3code", default)]
    iso3: String,
    country: CodedRef,
    date: String,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CodedRef {
    id: String,
}

/// Splits a provider page into its declared page count and raw records.
/// An envelope with fewer than two elements carries a message instead of
/// data and is treated as empty.
fn parse_envelope(body: &serde_json::Value) -> Result<(u32, Vec<ProviderRecord>)> {
    let items = body
        .as_array()
        .ok_or_else(|| PipelineError::Validation("provider response is not an array".to_string()))?;
    if items.len() < 2 {
        return Ok((1, Vec::new()));
    }

    let meta: PageMeta = serde_json::from_value(items[0].clone())
        .map_err(|e| PipelineError::Validation(format!("page metadata: {e}")))?;
    let records = if items[1].is_null() {
        Vec::new()
    } else {
        serde_json::from_value(items[1].clone())
            .map_err(|e| PipelineError::Validation(format!("record list: {e}")))?
    };
    Ok((meta.pages, records))
}

/// Drops null-value records (absence of data is not a zero) and counts rows
/// with an unparseable period as malformed.
fn normalize(raw: Vec<ProviderRecord>) -> (Vec<NormalizedObservation>, usize) {
    let mut records = Vec::with_capacity(raw.len());
    let mut malformed = 0;
    for record in raw {
        let Some(value) = record.value else {
            continue;
        };
        match record.date.parse::<i32>() {
            Ok(year) => records.push(NormalizedObservation {
                iso_code: record.country.id,
                iso3_code: record.iso3,
                year,
                value,
            }),
            Err(_) => malformed += 1,
        }
    }
    (records, malformed)
}
