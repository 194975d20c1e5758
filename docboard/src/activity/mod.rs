// Daily activity samples from an external data provider

use crate::document::ActivitySample;
use crate::error::{DocboardError, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::Deserialize;

/// Fixed seed so that repeated fetches return the same series.
pub const DEFAULT_SEED: u64 = 12345;

/// One raw provider row. Values are arbitrary integers until normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RawActivity {
    pub mobile: i64,
    pub desktop: i64,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    data: Vec<RawActivity>,
}

/// A source of daily mobile/desktop pairs.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Fetch `days` raw rows, oldest first.
    async fn fetch(&self, days: usize) -> Result<Vec<RawActivity>>;
}

/// Map raw rows into the 0..=99 range and date them so the last row is `today`.
pub fn normalize(raw: &[RawActivity], today: NaiveDate) -> Vec<ActivitySample> {
    let len = raw.len() as i64;
    raw.iter()
        .enumerate()
        .map(|(i, r)| ActivitySample {
            date: today - Duration::days(len - i as i64 - 1),
            mobile: r.mobile.rem_euclid(100) as u32,
            desktop: r.desktop.rem_euclid(100) as u32,
        })
        .collect()
}

/// Fetch and normalize a window of `days` samples ending at `today`.
pub async fn load_activity(
    source: &dyn ActivitySource,
    days: usize,
    today: NaiveDate,
) -> Result<Vec<ActivitySample>> {
    let raw = source.fetch(days).await.map_err(DocboardError::into_query)?;
    log::debug!("Fetched {} activity rows", raw.len());
    Ok(normalize(&raw, today))
}

/// Faker-style HTTP provider: `GET <url>?_seed=..&_quantity=..&mobile=number&desktop=number`.
pub struct HttpActivitySource {
    client: reqwest::Client,
    url: String,
    seed: u64,
}

impl HttpActivitySource {
    pub fn new(url: &str, seed: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(HttpActivitySource {
            client,
            url: url.to_string(),
            seed,
        })
    }

    pub(crate) fn request(&self, days: usize) -> Result<reqwest::Request> {
        Ok(self
            .client
            .get(&self.url)
            .query(&[
                ("_seed", self.seed.to_string()),
                ("_quantity", days.to_string()),
                ("mobile", "number".to_string()),
                ("desktop", "number".to_string()),
            ])
            .build()?)
    }
}

#[async_trait]
impl ActivitySource for HttpActivitySource {
    async fn fetch(&self, days: usize) -> Result<Vec<RawActivity>> {
        let request = self.request(days)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| DocboardError::Query(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DocboardError::Query(format!(
                "activity provider returned {status}"
            )));
        }
        let body: ProviderResponse = response
            .json()
            .await
            .map_err(|e| DocboardError::Query(e.to_string()))?;
        Ok(body.data)
    }
}

/// A fixed series, for tests and offline use.
pub struct StaticActivitySource {
    rows: Vec<RawActivity>,
}

impl StaticActivitySource {
    pub fn new(rows: Vec<RawActivity>) -> Self {
        StaticActivitySource { rows }
    }
}

#[async_trait]
impl ActivitySource for StaticActivitySource {
    async fn fetch(&self, days: usize) -> Result<Vec<RawActivity>> {
        let skip = self.rows.len().saturating_sub(days);
        Ok(self.rows[skip..].to_vec())
    }
}
