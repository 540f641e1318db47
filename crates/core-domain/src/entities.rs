use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use penny_error::AgentError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Calendar,
    Mail,
    Search,
    Weather,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calendar => write!(f, "calendar"),
            Self::Mail => write!(f, "mail"),
            Self::Search => write!(f, "search"),
            Self::Weather => write!(f, "weather"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Calendar {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// All-day events carry a plain date; timed events carry an instant with the
/// offset of the timezone it was rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventTime {
    DateTime(DateTime<FixedOffset>),
    Date(NaiveDate),
}

impl EventTime {
    /// Parses `YYYY-MM-DD` or an RFC 3339 timestamp that carries an offset.
    pub fn parse(s: &str) -> Result<Self, AgentError> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::DateTime(dt));
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::Date(d));
        }
        Err(AgentError::invalid_date(format!(
            "'{s}' is neither a date (YYYY-MM-DD) nor a timestamp with offset"
        )))
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// ISO-8601 text form, also used as the event sort key.
    pub fn iso(&self) -> String {
        match self {
            Self::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.iso())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start_time: EventTime,
    pub end_time: EventTime,
    pub calendar_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub received: DateTime<Utc>,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimeWindow {
    pub fn new(
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Self, AgentError> {
        if start >= end {
            return Err(AgentError::invalid_input(format!(
                "start_time {} must be before end_time {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, AgentError> {
        let parse = |name: &str, s: &str| {
            DateTime::parse_from_rfc3339(s.trim()).map_err(|e| {
                AgentError::invalid_input(format!("{name} '{s}' is not RFC 3339: {e}"))
            })
        };
        Self::new(parse("start_time", start)?, parse("end_time", end)?)
    }

    pub fn time_min(&self) -> String {
        self.start.to_rfc3339()
    }

    pub fn time_max(&self) -> String {
        self.end.to_rfc3339()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.city, &self.region, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            write!(f, "unknown")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentConditions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_c: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feels_like_c: Option<i32>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_kmph: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_c: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_c: Option<i32>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<CurrentConditions>,
    pub days: Vec<DailyForecast>,
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id:{})", self.name, self.id)
    }
}

impl fmt::Display for CalendarEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} - {}] {} ({})",
            self.start_time, self.end_time, self.name, self.calendar_id
        )
    }
}

impl fmt::Display for MailMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.content.chars().take(80).collect();
        let suffix = if self.content.chars().count() > 80 {
            "..."
        } else {
            ""
        };
        write!(
            f,
            "[{}] {}: {} | {preview}{suffix}",
            self.id, self.from, self.subject
        )
    }
}
