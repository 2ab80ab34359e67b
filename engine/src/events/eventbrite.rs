//! Eventbrite API source

use super::{nearest_metro, EventSource, EventSourceError};
use crate::config::EventsConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use sdk::types::{EventCategory, EventRecord, PriceRange};
use serde::Deserialize;
use std::time::Duration;

/// Days ahead covered by a search
const SEARCH_HORIZON_DAYS: i64 = 90;

pub struct EventbriteSource {
    base_url: String,
    token: String,
    location: String,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    events: Vec<EbEvent>,
}

#[derive(Debug, Deserialize)]
struct EbEvent {
    #[serde(default)]
    name: EbText,
    #[serde(default)]
    url: String,
    start: Option<EbTime>,
    end: Option<EbTime>,
    #[serde(default)]
    venue: Option<EbVenue>,
    #[serde(default)]
    is_free: bool,
    #[serde(default)]
    ticket_availability: Option<EbTicketAvailability>,
}

#[derive(Debug, Default, Deserialize)]
struct EbText {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EbTime {
    utc: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct EbVenue {
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: EbAddress,
}

#[derive(Debug, Default, Deserialize)]
struct EbAddress {
    localized_address_display: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EbTicketAvailability {
    minimum_ticket_price: Option<EbCost>,
    maximum_ticket_price: Option<EbCost>,
}

#[derive(Debug, Deserialize)]
struct EbCost {
    major_value: String,
    currency: String,
}

impl EventbriteSource {
    pub fn new(base_url: &str, token: String, config: &EventsConfig, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            location: config.location.clone(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn normalize(event: EbEvent) -> Option<EventRecord> {
        let name = event.name.text.unwrap_or_default();
        let start = event.start?.utc;
        let venue = event.venue.unwrap_or_default();
        let address = venue
            .address
            .localized_address_display
            .unwrap_or_else(|| "Montreal".to_string());

        let price = if event.is_free {
            Some(PriceRange::new(0.0, 0.0, "CAD"))
        } else {
            event.ticket_availability.and_then(price_range)
        };

        Some(EventRecord {
            category: EventCategory::infer(&name),
            metro: nearest_metro(&address).to_string(),
            name,
            venue: if venue.name.is_empty() {
                "Unknown Venue".to_string()
            } else {
                venue.name
            },
            address,
            start,
            end: event.end.map(|t| t.utc),
            price,
            url: event.url,
            source: "Eventbrite".to_string(),
        })
    }
}

fn price_range(availability: EbTicketAvailability) -> Option<PriceRange> {
    let min = availability.minimum_ticket_price?;
    let max = availability.maximum_ticket_price;

    let min_value: f64 = min.major_value.parse().ok()?;
    let max_value = max
        .as_ref()
        .and_then(|m| m.major_value.parse().ok())
        .unwrap_or(min_value);

    Some(PriceRange::new(min_value, max_value, min.currency))
}

#[async_trait]
impl EventSource for EventbriteSource {
    fn name(&self) -> &str {
        "eventbrite"
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<EventRecord>, EventSourceError> {
        let url = format!("{}/events/search/", self.base_url);
        let range_start = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let range_end = (now + ChronoDuration::days(SEARCH_HORIZON_DAYS))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("location.address", self.location.as_str()),
                ("expand", "venue,ticket_availability"),
                ("q", "festival"),
                ("start_date.range_start", range_start.as_str()),
                ("start_date.range_end", range_end.as_str()),
                ("page_size", "50"),
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
            .events
            .into_iter()
            .filter_map(Self::normalize)
            .collect())
    }
}
