//! Festival and event data
//!
//! Event sources normalize third-party listings into `EventRecord`s. The
//! catalog queries every enabled source in turn, keeps valid current events,
//! and falls back to a curated Montreal dataset when nothing usable comes
//! back. Source failures are logged and never fatal.

use crate::config::EventsConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use sdk::types::EventRecord;
use std::time::Duration;
use tracing::{info, warn};

pub mod curated;
pub mod eventbrite;
pub mod filter;
pub mod open_data;
pub mod places;
pub mod ticketmaster;

pub use eventbrite::EventbriteSource;
pub use filter::{DaySpec, FestivalQuery, TimeSpec};
pub use open_data::OpenDataSource;
pub use places::GooglePlacesSource;
pub use ticketmaster::TicketmasterSource;

/// Events starting earlier than this are dropped
const PAST_WINDOW_DAYS: i64 = 30;

/// Events starting later than this are dropped
const FUTURE_WINDOW_DAYS: i64 = 90;

const MIN_NAME_LEN: usize = 3;

/// Errors from a single event source
#[derive(Debug, thiserror::Error)]
pub enum EventSourceError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for EventSourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EventSourceError::Parse(err.to_string())
        } else {
            EventSourceError::Network(err.to_string())
        }
    }
}

/// A provider of normalized event listings
#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<EventRecord>, EventSourceError>;
}

/// Aggregates event sources with a curated fallback
pub struct EventCatalog {
    sources: Vec<Box<dyn EventSource>>,
    max_events: usize,
    tz: Tz,
}

impl EventCatalog {
    pub fn new(sources: Vec<Box<dyn EventSource>>, max_events: usize, tz: Tz) -> Self {
        Self {
            sources,
            max_events,
            tz,
        }
    }

    /// Enable each source whose key is present in the environment
    pub fn from_config(config: &EventsConfig, tz: Tz) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut sources: Vec<Box<dyn EventSource>> = Vec::new();

        match config.ticketmaster.api_key() {
            Some(key) => sources.push(Box::new(TicketmasterSource::new(
                &config.ticketmaster.base_url,
                key,
                config,
                tz,
                timeout,
            ))),
            None => info!(
                env = %config.ticketmaster.api_key_env,
                "Ticketmaster disabled, key not set"
            ),
        }

        match config.eventbrite.api_key() {
            Some(token) => sources.push(Box::new(EventbriteSource::new(
                &config.eventbrite.base_url,
                token,
                config,
                timeout,
            ))),
            None => info!(
                env = %config.eventbrite.api_key_env,
                "Eventbrite disabled, token not set"
            ),
        }

        match config.google_places.api_key() {
            Some(key) => sources.push(Box::new(GooglePlacesSource::new(
                &config.google_places.base_url,
                key,
                config,
                timeout,
            ))),
            None => info!(
                env = %config.google_places.api_key_env,
                "Google Places disabled, key not set"
            ),
        }

        match config.open_data.resource_id() {
            Some(resource_id) => sources.push(Box::new(OpenDataSource::new(
                &config.open_data.base_url,
                resource_id,
                tz,
                timeout,
            ))),
            None => info!("Quebec open data disabled, no resource_id configured"),
        }

        Self::new(sources, config.max_events, tz)
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Current events from every source, or the curated set if none
    pub async fn collect(&self, now: DateTime<Utc>) -> Vec<EventRecord> {
        let mut events = Vec::new();

        for source in &self.sources {
            match source.fetch(now).await {
                Ok(found) => {
                    info!(source = source.name(), count = found.len(), "Fetched events");
                    events.extend(found);
                }
                Err(e) => warn!(source = source.name(), error = %e, "Event source failed"),
            }
        }

        let mut valid: Vec<EventRecord> = events
            .into_iter()
            .filter(|event| is_valid_event(event, now))
            .collect();
        valid.truncate(self.max_events);

        if valid.is_empty() {
            warn!("No live events available, using curated festivals");
            return curated::festivals(now, self.tz);
        }

        valid
    }
}

/// Name long enough and start inside the accepted window
pub fn is_valid_event(event: &EventRecord, now: DateTime<Utc>) -> bool {
    if event.name.trim().chars().count() < MIN_NAME_LEN {
        return false;
    }

    let earliest = now - ChronoDuration::days(PAST_WINDOW_DAYS);
    let latest = now + ChronoDuration::days(FUTURE_WINDOW_DAYS);
    earliest <= event.start && event.start <= latest
}

/// Neighbourhood keywords and their metro station, checked in order
const METRO_STATIONS: &[(&str, &str)] = &[
    ("quartier des spectacles", "Place-des-Arts"),
    ("place des arts", "Place-des-Arts"),
    ("old port", "Place-d'Armes"),
    ("parc jean-drapeau", "Jean-Drapeau"),
    ("quartier latin", "Berri-UQAM"),
    ("downtown", "McGill"),
    ("plateau", "Sherbrooke"),
    ("mile end", "Laurier"),
];

/// Nearest metro station for an address
pub fn nearest_metro(address: &str) -> &'static str {
    let lower = address.to_lowercase();
    METRO_STATIONS
        .iter()
        .find(|(area, _)| lower.contains(area))
        .map(|(_, station)| *station)
        .unwrap_or("Multiple stations")
}

/// Events formatted for a generation prompt
pub fn format_catalog(events: &[EventRecord], tz: Tz) -> String {
    if events.is_empty() {
        return "No festivals currently available.".to_string();
    }

    events
        .iter()
        .map(|event| format_event(event, tz))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_event(event: &EventRecord, tz: Tz) -> String {
    let fmt = "%Y-%m-%d %H:%M";
    let start = event.start.with_timezone(&tz).format(fmt);
    let end = event.effective_end().with_timezone(&tz).format(fmt);
    let price = event
        .price
        .as_ref()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        "Festival: {}\nVenue: {}\nAddress: {}\nCategory: {}\nPrice: {}\nMetro: {}\nDates: {} to {}\nSource: {}\n",
        event.name, event.venue, event.address, event.category, price, event.metro, start, end, event.source
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sdk::types::EventCategory;

    fn event(name: &str, start: DateTime<Utc>) -> EventRecord {
        EventRecord {
            name: name.to_string(),
            venue: "Venue".to_string(),
            address: "Downtown Montreal".to_string(),
            start,
            end: None,
            price: None,
            category: EventCategory::Other,
            metro: "McGill".to_string(),
            url: String::new(),
            source: "test".to_string(),
        }
    }

    struct FailingSource;

    #[async_trait]
    impl EventSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch(&self, _now: DateTime<Utc>) -> Result<Vec<EventRecord>, EventSourceError> {
            Err(EventSourceError::Network("unreachable".into()))
        }
    }

    struct FixedSource(Vec<EventRecord>);

    #[async_trait]
    impl EventSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self, _now: DateTime<Utc>) -> Result<Vec<EventRecord>, EventSourceError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_nearest_metro() {
        assert_eq!(nearest_metro("175 Rue Sainte-Catherine, Place des Arts"), "Place-des-Arts");
        assert_eq!(nearest_metro("Old Port of Montreal, QC"), "Place-d'Armes");
        assert_eq!(nearest_metro("Parc Jean-Drapeau"), "Jean-Drapeau");
        assert_eq!(nearest_metro("5000 Boulevard Somewhere"), "Multiple stations");
    }

    #[test]
    fn test_validity_window() {
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        assert!(is_valid_event(&event("Jazz Fest", now), now));
        assert!(is_valid_event(&event("Jazz Fest", now - ChronoDuration::days(30)), now));
        assert!(!is_valid_event(&event("Jazz Fest", now - ChronoDuration::days(31)), now));
        assert!(!is_valid_event(&event("Jazz Fest", now + ChronoDuration::days(91)), now));
        assert!(!is_valid_event(&event("ab", now), now));
    }

    #[tokio::test]
    async fn test_failing_sources_fall_back_to_curated() {
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        let catalog = EventCatalog::new(vec![Box::new(FailingSource)], 50, chrono_tz::America::Montreal);

        let events = catalog.collect(now).await;
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.source == curated::CURATED_SOURCE));
    }

    #[tokio::test]
    async fn test_catalog_filters_and_caps() {
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        let mut listed: Vec<EventRecord> = (0..60).map(|i| event(&format!("Event {}", i), now)).collect();
        listed.push(event("x", now));

        let catalog = EventCatalog::new(
            vec![Box::new(FailingSource), Box::new(FixedSource(listed))],
            50,
            chrono_tz::America::Montreal,
        );

        let events = catalog.collect(now).await;
        assert_eq!(events.len(), 50);
        assert!(events.iter().all(|e| e.source == "test"));
    }

    #[test]
    fn test_format_catalog_empty() {
        assert_eq!(
            format_catalog(&[], chrono_tz::America::Montreal),
            "No festivals currently available."
        );
    }
}
