//! Curated Montreal festivals
//!
//! Used when no live source returns anything. Festivals recur every year on
//! roughly the same dates, so each entry is anchored to the current year and
//! moved to the next one once it is more than a month past.

use super::{nearest_metro, PAST_WINDOW_DAYS};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc};
use chrono_tz::Tz;
use sdk::types::{EventCategory, EventRecord, PriceRange};

pub const CURATED_SOURCE: &str = "Curated";

struct Festival {
    name: &'static str,
    venue: &'static str,
    address: &'static str,
    /// (month, day, hour) local time
    start: (u32, u32, u32),
    end: (u32, u32, u32),
    price: (f64, f64),
    category: EventCategory,
    /// Overrides the address-based lookup
    metro: Option<&'static str>,
    url: &'static str,
}

const FESTIVALS: &[Festival] = &[
    Festival {
        name: "Montreal Jazz Festival",
        venue: "Quartier des Spectacles",
        address: "Quartier des Spectacles, Montreal, QC H2X 1X8",
        start: (6, 27, 18),
        end: (7, 6, 23),
        price: (25.0, 150.0),
        category: EventCategory::Music,
        metro: None,
        url: "https://www.montrealjazzfest.com",
    },
    Festival {
        name: "Osheaga Music Festival",
        venue: "Parc Jean-Drapeau",
        address: "Parc Jean-Drapeau, Montreal, QC H3C 6A3",
        start: (8, 2, 12),
        end: (8, 4, 23),
        price: (150.0, 300.0),
        category: EventCategory::Music,
        metro: None,
        url: "https://www.osheaga.com",
    },
    Festival {
        name: "Just for Laughs Comedy Festival",
        venue: "Quartier Latin",
        address: "Quartier Latin, Montreal, QC H2L 2L4",
        start: (7, 10, 19),
        end: (7, 28, 23),
        price: (30.0, 120.0),
        category: EventCategory::Comedy,
        metro: None,
        url: "https://www.hahaha.com",
    },
    Festival {
        name: "Montreal International Film Festival",
        venue: "Various Cinemas",
        address: "Downtown Montreal, QC",
        start: (8, 22, 10),
        end: (9, 2, 23),
        price: (15.0, 50.0),
        category: EventCategory::Film,
        metro: Some("Place-des-Arts"),
        url: "https://www.ffm-montreal.org",
    },
    Festival {
        name: "Montreal Food Festival",
        venue: "Old Port of Montreal",
        address: "Old Port of Montreal, QC H2Y 1C6",
        start: (7, 15, 11),
        end: (7, 21, 22),
        price: (20.0, 80.0),
        category: EventCategory::Food,
        metro: None,
        url: "https://www.montrealfoodfest.com",
    },
];

/// The curated festivals, dated relative to `now`
pub fn festivals(now: DateTime<Utc>, tz: Tz) -> Vec<EventRecord> {
    let year = now.with_timezone(&tz).year();
    let cutoff = now - ChronoDuration::days(PAST_WINDOW_DAYS);

    let mut events: Vec<EventRecord> = FESTIVALS
        .iter()
        .filter_map(|festival| {
            let this_year = festival.record(year, tz)?;
            if this_year.effective_end() < cutoff {
                festival.record(year + 1, tz)
            } else {
                Some(this_year)
            }
        })
        .collect();

    events.sort_by_key(|event| event.start);
    events
}

impl Festival {
    fn record(&self, year: i32, tz: Tz) -> Option<EventRecord> {
        let start = local(tz, year, self.start)?;
        let end = local(tz, year, self.end)?;

        Some(EventRecord {
            name: self.name.to_string(),
            venue: self.venue.to_string(),
            address: self.address.to_string(),
            start,
            end: Some(end),
            price: Some(PriceRange::new(self.price.0, self.price.1, "CAD")),
            category: self.category,
            metro: self
                .metro
                .unwrap_or_else(|| nearest_metro(self.address))
                .to_string(),
            url: self.url.to_string(),
            source: CURATED_SOURCE.to_string(),
        })
    }
}

fn local(tz: Tz, year: i32, (month, day, hour): (u32, u32, u32)) -> Option<DateTime<Utc>> {
    tz.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
