//! Festival search by category, day and time of day
//!
//! Day and time words resolve to a single instant in the configured
//! timezone. Events running at that instant are listed before the other
//! category matches.

use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc,
    Weekday,
};
use chrono_tz::Tz;
use sdk::types::{EventCategory, EventRecord};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaySpec {
    Any,
    Today,
    Tomorrow,
    /// Today, defaulting the time to the evening
    Tonight,
    /// Next occurrence, never today
    Weekday(Weekday),
    Date(NaiveDate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSpec {
    Any,
    Morning,
    Afternoon,
    Evening,
    At(NaiveTime),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {kind} '{value}'")]
pub struct FilterParseError {
    kind: &'static str,
    value: String,
}

impl FromStr for DaySpec {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "" | "any" | "all" => Ok(DaySpec::Any),
            "today" | "now" => Ok(DaySpec::Today),
            "tomorrow" => Ok(DaySpec::Tomorrow),
            "tonight" => Ok(DaySpec::Tonight),
            _ => {
                if let Ok(weekday) = lower.parse::<Weekday>() {
                    return Ok(DaySpec::Weekday(weekday));
                }
                NaiveDate::parse_from_str(&lower, "%Y-%m-%d")
                    .map(DaySpec::Date)
                    .map_err(|_| FilterParseError {
                        kind: "day",
                        value: s.to_string(),
                    })
            }
        }
    }
}

impl FromStr for TimeSpec {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "" | "any" | "all" => Ok(TimeSpec::Any),
            "morning" | "am" => Ok(TimeSpec::Morning),
            "afternoon" | "pm" => Ok(TimeSpec::Afternoon),
            "evening" | "night" => Ok(TimeSpec::Evening),
            _ => NaiveTime::parse_from_str(&lower, "%H:%M")
                .map(TimeSpec::At)
                .map_err(|_| FilterParseError {
                    kind: "time",
                    value: s.to_string(),
                }),
        }
    }
}

impl TimeSpec {
    /// The part of the day `hour` falls in; late night keeps the hour itself
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => TimeSpec::Morning,
            12..=16 => TimeSpec::Afternoon,
            17..=21 => TimeSpec::Evening,
            _ => NaiveTime::from_hms_opt(hour, 0, 0).map_or(TimeSpec::Evening, TimeSpec::At),
        }
    }

    fn clock(&self) -> Option<NaiveTime> {
        match self {
            TimeSpec::Any => None,
            TimeSpec::Morning => NaiveTime::from_hms_opt(9, 0, 0),
            TimeSpec::Afternoon => NaiveTime::from_hms_opt(14, 0, 0),
            TimeSpec::Evening => NaiveTime::from_hms_opt(19, 0, 0),
            TimeSpec::At(t) => Some(*t),
        }
    }
}

/// Category, day and time criteria for the festival listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FestivalQuery {
    /// Substring of the name or category; `None` matches everything
    pub category: Option<String>,
    pub day: DaySpec,
    pub time: TimeSpec,
}

/// An event that matched, and whether it runs at the requested instant
#[derive(Debug, Clone, PartialEq)]
pub struct FestivalMatch {
    pub event: EventRecord,
    pub running: bool,
}

impl FestivalQuery {
    pub fn new(category: Option<&str>, day: DaySpec, time: TimeSpec) -> Self {
        let category = category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty() && c != "any" && c != "all");
        Self {
            category,
            day,
            time,
        }
    }

    /// Pick category, day and time words out of a free-text request
    ///
    /// The first recognized word of each kind wins. Without a day word the
    /// query is for today; without a time word it uses the part of the day
    /// it is now in `tz`, except that `tonight` keeps its evening default.
    /// Text naming no category matches every category.
    pub fn from_text(text: &str, now: DateTime<Utc>, tz: Tz) -> Self {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != ':' && c != '-'))
            .filter(|w| !w.is_empty())
            .collect();

        let category = match EventCategory::infer(&lower) {
            EventCategory::Other => None,
            found => Some(found.as_str().to_string()),
        };

        let day = words
            .iter()
            .filter_map(|w| w.parse::<DaySpec>().ok())
            .find(|d| *d != DaySpec::Any)
            .unwrap_or(DaySpec::Today);

        let time = words
            .iter()
            .filter_map(|w| w.parse::<TimeSpec>().ok())
            .find(|t| *t != TimeSpec::Any)
            .unwrap_or_else(|| match day {
                DaySpec::Tonight => TimeSpec::Any,
                _ => TimeSpec::from_hour(now.with_timezone(&tz).hour()),
            });

        Self {
            category,
            day,
            time,
        }
    }

    /// The instant described by day and time, or `None` when both are any
    ///
    /// A missing day means today; a missing time keeps the current time of
    /// day, except for `tonight` which means the evening.
    pub fn target_instant(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        if self.day == DaySpec::Any && self.time == TimeSpec::Any {
            return None;
        }

        let local_now = now.with_timezone(&tz);
        let today = local_now.date_naive();

        let date = match self.day {
            DaySpec::Any | DaySpec::Today | DaySpec::Tonight => today,
            DaySpec::Tomorrow => today + ChronoDuration::days(1),
            DaySpec::Weekday(weekday) => next_weekday(today, weekday),
            DaySpec::Date(date) => date,
        };

        let time = match (self.time.clock(), self.day) {
            (Some(t), _) => t,
            (None, DaySpec::Tonight) => TimeSpec::Evening.clock()?,
            (None, _) => local_now.time(),
        };

        let naive = date.and_time(time);
        tz.from_local_datetime(&naive)
            .earliest()
            // A time inside a DST gap resolves to the hour after
            .or_else(|| tz.from_local_datetime(&(naive + ChronoDuration::hours(1))).earliest())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn matches_category(&self, event: &EventRecord) -> bool {
        match &self.category {
            None => true,
            Some(c) => {
                event.name.to_lowercase().contains(c.as_str()) || event.category.as_str().contains(c.as_str())
            }
        }
    }

    /// Category matches, running events first, otherwise in catalog order
    pub fn apply(&self, events: &[EventRecord], now: DateTime<Utc>, tz: Tz) -> Vec<FestivalMatch> {
        let instant = self.target_instant(now, tz);

        let mut matches: Vec<FestivalMatch> = events
            .iter()
            .filter(|event| self.matches_category(event))
            .map(|event| FestivalMatch {
                running: instant.map_or(false, |at| event.is_running_at(at)),
                event: event.clone(),
            })
            .collect();

        matches.sort_by_key(|m| !m.running);
        matches
    }
}

fn next_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut ahead = target - current;
    if ahead <= 0 {
        ahead += 7;
    }
    today + ChronoDuration::days(ahead)
}

impl fmt::Display for DaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaySpec::Any => write!(f, "any day"),
            DaySpec::Today => write!(f, "today"),
            DaySpec::Tomorrow => write!(f, "tomorrow"),
            DaySpec::Tonight => write!(f, "tonight"),
            DaySpec::Weekday(w) => write!(f, "{}", w),
            DaySpec::Date(d) => write!(f, "{}", d),
        }
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSpec::Any => write!(f, "any time"),
            TimeSpec::Morning => write!(f, "morning"),
            TimeSpec::Afternoon => write!(f, "afternoon"),
            TimeSpec::Evening => write!(f, "evening"),
            TimeSpec::At(t) => write!(f, "{}", t.format("%H:%M")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::curated;
    use chrono_tz::America::Montreal;

    // Tuesday 2025-07-01, 12:00 in Montreal
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 16, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_day_spec() {
        assert_eq!("Today".parse::<DaySpec>().unwrap(), DaySpec::Today);
        assert_eq!("now".parse::<DaySpec>().unwrap(), DaySpec::Today);
        assert_eq!("fri".parse::<DaySpec>().unwrap(), DaySpec::Weekday(Weekday::Fri));
        assert_eq!("Saturday".parse::<DaySpec>().unwrap(), DaySpec::Weekday(Weekday::Sat));
        assert_eq!(
            "2025-07-04".parse::<DaySpec>().unwrap(),
            DaySpec::Date(NaiveDate::from_ymd_opt(2025, 7, 4).unwrap())
        );
        assert!("someday".parse::<DaySpec>().is_err());
    }

    #[test]
    fn test_parse_time_spec() {
        assert_eq!("pm".parse::<TimeSpec>().unwrap(), TimeSpec::Afternoon);
        assert_eq!("night".parse::<TimeSpec>().unwrap(), TimeSpec::Evening);
        assert_eq!(
            "21:30".parse::<TimeSpec>().unwrap(),
            TimeSpec::At(NaiveTime::from_hms_opt(21, 30, 0).unwrap())
        );
        assert!("late".parse::<TimeSpec>().is_err());
    }

    #[test]
    fn test_target_instant() {
        let query = FestivalQuery::new(None, DaySpec::Tonight, TimeSpec::Any);
        let at = query.target_instant(now(), Montreal).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2025, 7, 1, 23, 0, 0).unwrap());

        // Tuesday asking for Tuesday means next week
        let query = FestivalQuery::new(None, DaySpec::Weekday(Weekday::Tue), TimeSpec::Morning);
        let at = query.target_instant(now(), Montreal).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2025, 7, 8, 13, 0, 0).unwrap());

        let any = FestivalQuery::new(None, DaySpec::Any, TimeSpec::Any);
        assert!(any.target_instant(now(), Montreal).is_none());
    }

    #[test]
    fn test_apply_lists_running_first() {
        let events = curated::festivals(now(), Montreal);
        let query = FestivalQuery::new(Some("music"), DaySpec::Today, TimeSpec::Evening);
        let matches = query.apply(&events, now(), Montreal);

        assert_eq!(matches.len(), 2);
        assert!(matches[0].running);
        assert_eq!(matches[0].event.name, "Montreal Jazz Festival");
        assert!(!matches[1].running);
    }

    #[test]
    fn test_from_text_picks_words() {
        let query = FestivalQuery::from_text("Any jazz concerts on Friday evening?", now(), Montreal);
        assert_eq!(query.category.as_deref(), Some("music"));
        assert_eq!(query.day, DaySpec::Weekday(Weekday::Fri));
        assert_eq!(query.time, TimeSpec::Evening);

        let query = FestivalQuery::from_text("comedy tonight", now(), Montreal);
        assert_eq!(query.category.as_deref(), Some("comedy"));
        assert_eq!(query.day, DaySpec::Tonight);
        assert_eq!(query.time, TimeSpec::Any);

        let query = FestivalQuery::from_text("something on 2025-07-04 at 21:30", now(), Montreal);
        assert_eq!(query.category, None);
        assert_eq!(query.day, DaySpec::Date(NaiveDate::from_ymd_opt(2025, 7, 4).unwrap()));
        assert_eq!(query.time, TimeSpec::At(NaiveTime::from_hms_opt(21, 30, 0).unwrap()));
    }

    #[test]
    fn test_from_text_defaults_to_today_and_current_part_of_day() {
        // 12:00 in Montreal
        let query = FestivalQuery::from_text("what's happening", now(), Montreal);
        assert_eq!(query.day, DaySpec::Today);
        assert_eq!(query.time, TimeSpec::Afternoon);

        // 23:00 in Montreal
        let late = Utc.with_ymd_and_hms(2025, 7, 2, 3, 0, 0).unwrap();
        let query = FestivalQuery::from_text("film festivals", late, Montreal);
        assert_eq!(query.category.as_deref(), Some("film"));
        assert_eq!(query.time, TimeSpec::At(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
    }

    #[test]
    fn test_time_from_hour() {
        assert_eq!(TimeSpec::from_hour(6), TimeSpec::Morning);
        assert_eq!(TimeSpec::from_hour(12), TimeSpec::Afternoon);
        assert_eq!(TimeSpec::from_hour(21), TimeSpec::Evening);
        assert_eq!(
            TimeSpec::from_hour(2),
            TimeSpec::At(NaiveTime::from_hms_opt(2, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_category_matches_name_or_category() {
        let events = curated::festivals(now(), Montreal);
        let query = FestivalQuery::new(Some("Laughs"), DaySpec::Any, TimeSpec::Any);
        let matches = query.apply(&events, now(), Montreal);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].event.name, "Just for Laughs Comedy Festival");

        let all = FestivalQuery::new(Some("any"), DaySpec::Any, TimeSpec::Any);
        assert_eq!(all.apply(&events, now(), Montreal).len(), events.len());
    }
}
