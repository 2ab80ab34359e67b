//! Ticketmaster Discovery API source

use super::{nearest_metro, EventSource, EventSourceError};
use crate::config::EventsConfig;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use sdk::types::{EventCategory, EventRecord, PriceRange};
use serde::Deserialize;
use std::time::Duration;

pub struct TicketmasterSource {
    base_url: String,
    api_key: String,
    latlong: String,
    radius_km: u32,
    tz: Tz,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_embedded", default)]
    embedded: Option<EmbeddedEvents>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddedEvents {
    #[serde(default)]
    events: Vec<TmEvent>,
}

#[derive(Debug, Deserialize)]
struct TmEvent {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    dates: TmDates,
    #[serde(rename = "priceRanges", default)]
    price_ranges: Vec<TmPriceRange>,
    #[serde(rename = "_embedded", default)]
    embedded: TmEventEmbedded,
}

#[derive(Debug, Default, Deserialize)]
struct TmDates {
    #[serde(default)]
    start: TmDate,
    #[serde(default)]
    end: TmDate,
}

#[derive(Debug, Default, Deserialize)]
struct TmDate {
    #[serde(rename = "dateTime")]
    date_time: Option<DateTime<Utc>>,
    #[serde(rename = "localDate")]
    local_date: Option<NaiveDate>,
    #[serde(rename = "localTime")]
    local_time: Option<NaiveTime>,
}

#[derive(Debug, Deserialize)]
struct TmPriceRange {
    #[serde(default)]
    min: f64,
    #[serde(default)]
    max: f64,
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct TmEventEmbedded {
    #[serde(default)]
    venues: Vec<TmVenue>,
}

#[derive(Debug, Default, Deserialize)]
struct TmVenue {
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: TmAddress,
    #[serde(default)]
    city: TmCity,
    #[serde(default)]
    state: TmState,
}

#[derive(Debug, Default, Deserialize)]
struct TmAddress {
    line1: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TmCity {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TmState {
    #[serde(rename = "stateCode")]
    state_code: Option<String>,
}

impl TmDate {
    fn resolve(&self, tz: Tz) -> Option<DateTime<Utc>> {
        if let Some(dt) = self.date_time {
            return Some(dt);
        }
        let date = self.local_date?;
        let naive = match self.local_time {
            Some(time) => date.and_time(time),
            None => date.and_hms_opt(0, 0, 0)?,
        };
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl TicketmasterSource {
    pub fn new(
        base_url: &str,
        api_key: String,
        config: &EventsConfig,
        tz: Tz,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            latlong: format!("{},{}", config.latitude, config.longitude),
            radius_km: config.radius_km,
            tz,
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn normalize(&self, event: TmEvent) -> Option<EventRecord> {
        let start = event.dates.start.resolve(self.tz)?;
        let end = event.dates.end.resolve(self.tz);

        let venue = event.embedded.venues.into_iter().next().unwrap_or_default();
        let line1 = venue.address.line1.unwrap_or_default();
        let address = format!(
            "{}, {}, {}",
            line1,
            venue.city.name.unwrap_or_else(|| "Montreal".to_string()),
            venue.state.state_code.unwrap_or_else(|| "QC".to_string())
        );

        let price = event
            .price_ranges
            .into_iter()
            .next()
            .map(|p| PriceRange::new(p.min, p.max, p.currency));

        Some(EventRecord {
            category: EventCategory::infer(&event.name),
            metro: nearest_metro(&format!("{} {}", venue.name, line1)).to_string(),
            name: event.name,
            venue: if venue.name.is_empty() {
                "Unknown Venue".to_string()
            } else {
                venue.name
            },
            address,
            start,
            end,
            price,
            url: event.url,
            source: "Ticketmaster".to_string(),
        })
    }
}

#[async_trait]
impl EventSource for TicketmasterSource {
    fn name(&self) -> &str {
        "ticketmaster"
    }

    async fn fetch(&self, _now: DateTime<Utc>) -> Result<Vec<EventRecord>, EventSourceError> {
        let url = format!("{}/events.json", self.base_url);
        let radius = self.radius_km.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("latlong", self.latlong.as_str()),
                ("radius", radius.as_str()),
                ("unit", "km"),
                ("keyword", "festival"),
                ("classificationName", "music,arts,theater"),
                ("size", "50"),
            ])
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

        let data: SearchResponse = response
            .json()
            .await
            .map_err(|e| EventSourceError::Parse(e.to_string()))?;

        Ok(data
            .embedded
            .map(|e| e.events)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|event| self.normalize(event))
            .collect())
    }
}
