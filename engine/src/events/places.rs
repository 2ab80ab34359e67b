//! Google Places text search source
//!
//! Places has no event listings, so each festival venue found nearby becomes
//! one open-ended listing covering the next month.

use super::{nearest_metro, EventSource, EventSourceError};
use crate::config::EventsConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sdk::types::{EventCategory, EventRecord};
use serde::Deserialize;
use std::time::Duration;

/// How long a venue listing stays open
const LISTING_DAYS: i64 = 30;

pub struct GooglePlacesSource {
    base_url: String,
    api_key: String,
    query: String,
    location: String,
    radius_m: String,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct TextSearchResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    results: Vec<Place>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Place {
    #[serde(default)]
    name: String,
    formatted_address: Option<String>,
    #[serde(default)]
    website: String,
}

impl GooglePlacesSource {
    pub fn new(base_url: &str, api_key: String, config: &EventsConfig, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            query: format!("festival venue {}", config.location),
            location: format!("{},{}", config.latitude, config.longitude),
            radius_m: (u64::from(config.radius_km) * 1_000).to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn normalize(place: Place, now: DateTime<Utc>) -> Option<EventRecord> {
        let venue = place.name.trim().to_string();
        if venue.is_empty() {
            return None;
        }
        let address = place
            .formatted_address
            .unwrap_or_else(|| "Montreal".to_string());

        Some(EventRecord {
            name: format!("Events at {}", venue),
            category: EventCategory::infer(&venue),
            metro: nearest_metro(&address).to_string(),
            venue,
            address,
            start: now,
            end: Some(now + ChronoDuration::days(LISTING_DAYS)),
            price: None,
            url: place.website,
            source: "Google Places".to_string(),
        })
    }
}

#[async_trait]
impl EventSource for GooglePlacesSource {
    fn name(&self) -> &str {
        "google_places"
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<EventRecord>, EventSourceError> {
        let url = format!("{}/textsearch/json", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("query", self.query.as_str()),
                ("location", self.location.as_str()),
                ("radius", self.radius_m.as_str()),
                ("type", "establishment"),
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

        let data: TextSearchResponse = response
            .json()
            .await
            .map_err(|e| EventSourceError::Parse(e.to_string()))?;

        // Places reports key and quota problems in the body of a 200
        match data.status.as_str() {
            "OK" | "ZERO_RESULTS" => {}
            other => {
                return Err(EventSourceError::Http {
                    status: status.as_u16(),
                    body: format!("{} {}", other, data.error_message.unwrap_or_default()),
                })
            }
        }

        Ok(data
            .results
            .into_iter()
            .filter_map(|place| Self::normalize(place, now))
            .collect())
    }
}
