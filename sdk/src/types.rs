//! Normalized event types shared by every event source

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A festival or event, normalized from whichever source produced it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub name: String,
    pub venue: String,
    pub address: String,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<PriceRange>,
    pub category: EventCategory,
    pub metro: String,
    #[serde(default)]
    pub url: String,
    /// Name of the source that produced the record
    pub source: String,
}

impl EventRecord {
    /// End of the event, or its start when the source gave no end
    pub fn effective_end(&self) -> DateTime<Utc> {
        self.end.unwrap_or(self.start)
    }

    /// Whether the event is running at `instant`
    pub fn is_running_at(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.effective_end()
    }
}

/// Ticket price range
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
    pub currency: String,
}

impl PriceRange {
    pub fn new(min: f64, max: f64, currency: impl Into<String>) -> Self {
        Self {
            min,
            max,
            currency: currency.into(),
        }
    }

    pub fn is_free(&self) -> bool {
        self.max <= 0.0
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_free() {
            write!(f, "Free")
        } else if (self.max - self.min).abs() < f64::EPSILON {
            write!(f, "${:.0} {}", self.min, self.currency)
        } else {
            write!(f, "${:.0}-{:.0} {}", self.min, self.max, self.currency)
        }
    }
}

/// Broad event category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Music,
    Film,
    Food,
    Art,
    Comedy,
    Dance,
    Other,
}

impl EventCategory {
    pub const ALL: [EventCategory; 7] = [
        EventCategory::Music,
        EventCategory::Film,
        EventCategory::Food,
        EventCategory::Art,
        EventCategory::Comedy,
        EventCategory::Dance,
        EventCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Music => "music",
            EventCategory::Film => "film",
            EventCategory::Food => "food",
            EventCategory::Art => "art",
            EventCategory::Comedy => "comedy",
            EventCategory::Dance => "dance",
            EventCategory::Other => "other",
        }
    }

    /// Keywords that suggest this category in free text
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            EventCategory::Music => &["music", "concert", "jazz", "rock", "pop", "band", "singer"],
            EventCategory::Film => &["film", "movie", "cinema", "documentary", "screening"],
            EventCategory::Food => &["food", "culinary", "wine", "beer", "taste", "dining", "restaurant"],
            EventCategory::Art => &["art", "exhibition", "gallery", "museum", "painting", "sculpture"],
            EventCategory::Comedy => &["comedy", "standup", "humor", "laugh", "joke"],
            EventCategory::Dance => &["dance", "ballet", "performance", "theatre", "theater"],
            EventCategory::Other => &[],
        }
    }

    /// Infer a category from free text, first match wins
    pub fn infer(text: &str) -> EventCategory {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        Self::ALL
            .iter()
            .copied()
            .find(|category| {
                category
                    .keywords()
                    .iter()
                    .any(|keyword| words.contains(keyword))
            })
            .unwrap_or(EventCategory::Other)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_infer_category() {
        assert_eq!(EventCategory::infer("Montreal Jazz Festival"), EventCategory::Music);
        assert_eq!(EventCategory::infer("Just for Laughs"), EventCategory::Other);
        assert_eq!(EventCategory::infer("Standup night"), EventCategory::Comedy);
        assert_eq!(EventCategory::infer("Wine & cheese"), EventCategory::Food);
    }

    #[test]
    fn test_price_display() {
        assert_eq!(PriceRange::new(25.0, 150.0, "CAD").to_string(), "$25-150 CAD");
        assert_eq!(PriceRange::new(0.0, 0.0, "CAD").to_string(), "Free");
        assert_eq!(PriceRange::new(40.0, 40.0, "USD").to_string(), "$40 USD");
    }

    #[test]
    fn test_is_running_at() {
        let event = EventRecord {
            name: "Osheaga".into(),
            venue: "Parc Jean-Drapeau".into(),
            address: "Parc Jean-Drapeau, Montreal".into(),
            start: Utc.with_ymd_and_hms(2024, 8, 2, 16, 0, 0).unwrap(),
            end: Some(Utc.with_ymd_and_hms(2024, 8, 5, 3, 0, 0).unwrap()),
            price: None,
            category: EventCategory::Music,
            metro: "Jean-Drapeau".into(),
            url: String::new(),
            source: "test".into(),
        };

        assert!(event.is_running_at(Utc.with_ymd_and_hms(2024, 8, 3, 0, 0, 0).unwrap()));
        assert!(!event.is_running_at(Utc.with_ymd_and_hms(2024, 8, 6, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("Music".parse::<EventCategory>(), Ok(EventCategory::Music));
        assert!("polka".parse::<EventCategory>().is_err());
    }

    #[test]
    fn test_category_serializes_lowercase() {
        let json = serde_json::to_string(&EventCategory::Comedy).unwrap();
        assert_eq!(json, "\"comedy\"");
        let parsed: EventCategory = serde_json::from_str("\"film\"").unwrap();
        assert_eq!(parsed, EventCategory::Film);
    }
}
