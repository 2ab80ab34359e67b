//! Quebec open data portal source
//!
//! Reads records from a CKAN `datastore_search` resource. No key is needed;
//! the dataset is chosen by resource id. Records without a readable start
//! date are dropped.

use super::{nearest_metro, EventSource, EventSourceError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use sdk::types::{EventCategory, EventRecord, PriceRange};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub struct OpenDataSource {
    base_url: String,
    resource_id: String,
    tz: Tz,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct DatastoreResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: DatastoreResult,
}

#[derive(Debug, Default, Deserialize)]
struct DatastoreResult {
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(default)]
    name: String,
    venue: Option<String>,
    address: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    #[serde(default)]
    url: String,
    /// Free text or a number
    price: Option<Value>,
}

impl OpenDataSource {
    pub fn new(base_url: &str, resource_id: &str, tz: Tz, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            resource_id: resource_id.to_string(),
            tz,
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn normalize(&self, record: Record) -> Option<EventRecord> {
        let start = record
            .start_date
            .as_deref()
            .and_then(|s| parse_date(s, self.tz))?;
        let end = record.end_date.as_deref().and_then(|s| parse_date(s, self.tz));
        let address = record
            .address
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| "Montreal".to_string());

        Some(EventRecord {
            category: EventCategory::infer(&record.name),
            metro: nearest_metro(&address).to_string(),
            name: record.name,
            venue: record
                .venue
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "Unknown Venue".to_string()),
            address,
            start,
            end,
            price: price(record.price.as_ref()),
            url: record.url,
            source: "Quebec Open Data".to_string(),
        })
    }
}

/// RFC 3339, a naive local timestamp, or a bare date at local midnight
fn parse_date(text: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Missing or "free" means free; a number is a single price in CAD
fn price(value: Option<&Value>) -> Option<PriceRange> {
    let free = || Some(PriceRange::new(0.0, 0.0, "CAD"));
    match value {
        None | Some(Value::Null) => free(),
        Some(Value::Number(n)) => n.as_f64().map(|p| PriceRange::new(p, p, "CAD")),
        Some(Value::String(s)) => {
            let lower = s.trim().to_lowercase();
            if lower.is_empty() || lower == "free" || lower == "gratuit" {
                return free();
            }
            lower
                .trim_start_matches('$')
                .parse::<f64>()
                .ok()
                .map(|p| PriceRange::new(p, p, "CAD"))
        }
        Some(_) => None,
    }
}

#[async_trait]
impl EventSource for OpenDataSource {
    fn name(&self) -> &str {
        "open_data"
    }

    async fn fetch(&self, _now: DateTime<Utc>) -> Result<Vec<EventRecord>, EventSourceError> {
        let url = format!("{}/datastore_search", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("resource_id", self.resource_id.as_str()), ("limit", "50")])
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EventSourceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let data: DatastoreResponse = response
            .json()
            .await
            .map_err(|e| EventSourceError::Parse(e.to_string()))?;

        if !data.success {
            return Err(EventSourceError::Parse(
                "datastore reported an unsuccessful search".to_string(),
            ));
        }

        Ok(data
            .result
            .records
            .into_iter()
            .filter_map(|record| self.normalize(record))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Montreal;
    use serde_json::json;

    #[test]
    fn test_parse_date_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 7, 10, 23, 0, 0).unwrap();
        assert_eq!(parse_date("2025-07-10T23:00:00Z", Montreal), Some(expected));
        assert_eq!(parse_date("2025-07-10T19:00:00", Montreal), Some(expected));
        assert_eq!(parse_date("2025-07-10 19:00:00", Montreal), Some(expected));
        assert_eq!(
            parse_date("2025-07-10", Montreal),
            Some(Utc.with_ymd_and_hms(2025, 7, 10, 4, 0, 0).unwrap())
        );
        assert_eq!(parse_date("next week", Montreal), None);
    }

    #[test]
    fn test_price_shapes() {
        assert!(price(None).unwrap().is_free());
        assert!(price(Some(&json!("Gratuit"))).unwrap().is_free());
        assert_eq!(
            price(Some(&json!(15))),
            Some(PriceRange::new(15.0, 15.0, "CAD"))
        );
        assert_eq!(
            price(Some(&json!("$20"))),
            Some(PriceRange::new(20.0, 20.0, "CAD"))
        );
        assert_eq!(price(Some(&json!("Varies"))), None);
    }
}
