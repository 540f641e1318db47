use chrono::{DateTime, Utc};
use penny_domain::{Calendar, CalendarEvent, Forecast, Location, MailMessage, SearchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Compact,
    Expanded,
    Full,
}

impl Format {
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("full") => Self::Full,
            Some("expanded") => Self::Expanded,
            _ => Self::Compact,
        }
    }
}

pub fn format_calendars(calendars: &[Calendar], fmt: Format) -> String {
    match fmt {
        Format::Compact | Format::Expanded => {
            let mut lines: Vec<String> = Vec::with_capacity(calendars.len() + 1);
            lines.push(format!("{} calendars:", calendars.len()));
            for cal in calendars {
                let desc = match (&cal.description, fmt) {
                    (Some(d), Format::Expanded) => format!(" - {}", clean_text(d)),
                    (Some(d), _) => format!(" - {}", truncate(d, 60)),
                    (None, _) => String::new(),
                };
                lines.push(format!("  {}{desc} (id:{})", cal.name, cal.id));
            }
            lines.join("\n")
        }
        Format::Full => to_json(calendars),
    }
}

pub fn format_events(events: &[CalendarEvent], fmt: Format) -> String {
    match fmt {
        Format::Compact | Format::Expanded => {
            let max_text = if fmt == Format::Expanded { 0 } else { 100 };
            let mut lines: Vec<String> = Vec::with_capacity(events.len() + 1);
            lines.push(format!("{} events:", events.len()));
            for ev in events {
                lines.push(format_event_line(ev, max_text));
            }
            lines.join("\n")
        }
        Format::Full => to_json(events),
    }
}

pub fn format_event(event: &CalendarEvent, fmt: Format) -> String {
    match fmt {
        Format::Compact => format_event_line(event, 100).trim_start().to_string(),
        Format::Expanded => format_event_line(event, 0).trim_start().to_string(),
        Format::Full => to_json(event),
    }
}

pub fn format_mail_messages(messages: &[MailMessage], fmt: Format) -> String {
    match fmt {
        Format::Compact | Format::Expanded => {
            let max_text = if fmt == Format::Expanded { 0 } else { 200 };
            let mut lines: Vec<String> = Vec::with_capacity(messages.len() + 1);
            lines.push(format!("{} messages:", messages.len()));
            for msg in messages {
                lines.push(format_mail_line(msg, max_text));
            }
            lines.join("\n")
        }
        Format::Full => to_json(messages),
    }
}

pub fn format_mail_message(msg: &MailMessage, fmt: Format) -> String {
    match fmt {
        Format::Compact => format_mail_line(msg, 200).trim_start().to_string(),
        Format::Expanded => {
            let mut lines = vec![
                format!("From: {}", msg.from),
                format!("Subject: {}", msg.subject),
                format!("Date: {}", msg.received.to_rfc3339()),
            ];
            if let Some(ref to) = msg.to {
                lines.insert(1, format!("To: {to}"));
            }
            lines.push(format!("Id: {}", msg.id));
            lines.push(String::new());
            lines.push(msg.content.replace('\r', ""));
            lines.join("\n")
        }
        Format::Full => to_json(msg),
    }
}

pub fn format_search_results(results: &[SearchResult], fmt: Format) -> String {
    match fmt {
        Format::Compact | Format::Expanded => {
            let max_text = if fmt == Format::Expanded { 0 } else { 160 };
            let mut lines: Vec<String> = Vec::with_capacity(results.len() + 1);
            lines.push(format!("{} results:", results.len()));
            for (i, r) in results.iter().enumerate() {
                let date = r
                    .date
                    .as_ref()
                    .map(|d| format!(" ({d})"))
                    .unwrap_or_default();
                lines.push(format!("  {}. {}{date} {}", i + 1, r.title, r.url));
                if !r.snippet.is_empty() {
                    let snippet = if max_text > 0 {
                        truncate(&r.snippet, max_text)
                    } else {
                        clean_text(&r.snippet)
                    };
                    lines.push(format!("     {snippet}"));
                }
            }
            lines.join("\n")
        }
        Format::Full => to_json(results),
    }
}

pub fn format_location(location: &Location, fmt: Format) -> String {
    match fmt {
        Format::Compact | Format::Expanded => {
            let mut parts = vec![location.to_string()];
            if let Some(ref c) = location.coordinates {
                parts.push(format!("loc:{c}"));
            }
            if let Some(ref tz) = location.timezone {
                parts.push(format!("tz:{tz}"));
            }
            parts.join(" | ")
        }
        Format::Full => to_json(location),
    }
}

pub fn format_forecast(forecast: &Forecast, fmt: Format) -> String {
    match fmt {
        Format::Compact | Format::Expanded => {
            let mut lines = vec![format!("Weather for {}:", forecast.location)];
            if let Some(ref now) = forecast.current {
                let mut line = format!(
                    "  now: {}°C (feels {}°C) {}",
                    reading(now.temp_c),
                    reading(now.feels_like_c),
                    now.description
                );
                if fmt == Format::Expanded {
                    line.push_str(&format!(
                        ", humidity {}%, wind {} km/h",
                        reading(now.humidity),
                        reading(now.wind_kmph)
                    ));
                }
                lines.push(line);
            }
            for day in &forecast.days {
                lines.push(format!(
                    "  {}: {}..{}°C {}",
                    day.date.format("%a %b %d"),
                    reading(day.min_c),
                    reading(day.max_c),
                    day.description
                ));
            }
            lines.join("\n")
        }
        Format::Full => to_json(forecast),
    }
}

fn reading<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

fn format_event_line(ev: &CalendarEvent, max_text: usize) -> String {
    let mut extras = String::new();
    if let Some(ref loc) = ev.location {
        extras.push_str(&format!(" @{}", clean_text(loc)));
    }
    if let Some(ref desc) = ev.description {
        let d = if max_text > 0 {
            truncate(desc, max_text)
        } else {
            clean_text(desc)
        };
        extras.push_str(&format!(" desc:{d}"));
    }
    let id = if ev.id.is_empty() {
        String::new()
    } else {
        format!(" id:{}", ev.id)
    };
    format!(
        "  [{} - {}] {}{extras} (cal:{}{id})",
        ev.start_time, ev.end_time, ev.name, ev.calendar_id
    )
}

fn format_mail_line(msg: &MailMessage, max_text: usize) -> String {
    let ts = format_timestamp(&msg.received);
    let text = if max_text > 0 {
        truncate(&msg.content, max_text)
    } else {
        clean_text(&msg.content)
    };
    let subj = if max_text > 0 {
        truncate(&msg.subject, 60)
    } else {
        clean_text(&msg.subject)
    };
    format!(
        "  [{ts}] {from}: subj:{subj} | {text} (id:{id})",
        from = msg.from,
        id = msg.id,
    )
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%b %d %H:%M").to_string()
}

fn clean_text(s: &str) -> String {
    let clean: String = s.chars().filter(|c| *c != '\r').collect();
    clean.replace('\n', " ")
}

fn truncate(s: &str, max: usize) -> String {
    let oneline = clean_text(s);
    if oneline.chars().count() > max {
        let truncated: String = oneline.chars().take(max).collect();
        format!("{truncated}...")
    } else {
        oneline
    }
}

fn to_json<T: serde::Serialize + ?Sized>(val: &T) -> String {
    serde_json::to_string(val).unwrap_or_else(|e| format!("serialization error: {e}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use penny_domain::{CurrentConditions, DailyForecast, EventTime};

    fn event() -> CalendarEvent {
        CalendarEvent {
            id: "ev1".into(),
            name: "Standup".into(),
            description: Some("Daily sync\nbring notes".into()),
            location: Some("Room 4".into()),
            start_time: EventTime::parse("2024-03-04T09:00:00+02:00").unwrap(),
            end_time: EventTime::parse("2024-03-04T09:15:00+02:00").unwrap(),
            calendar_id: "work".into(),
        }
    }

    fn message() -> MailMessage {
        MailMessage {
            id: "m1".into(),
            subject: "Lunch?".into(),
            from: "Ann <ann@example.com>".into(),
            to: Some("me@example.com".into()),
            received: Utc.with_ymd_and_hms(2024, 3, 1, 11, 30, 0).unwrap(),
            content: "Hi,\r\nnoon at the usual place?\r\n".into(),
        }
    }

    #[test]
    fn format_parse_defaults_to_compact() {
        assert_eq!(Format::parse(None), Format::Compact);
        assert_eq!(Format::parse(Some("full")), Format::Full);
        assert_eq!(Format::parse(Some("bogus")), Format::Compact);
    }

    #[test]
    fn event_lines() {
        let out = format_events(&[event()], Format::Compact);
        assert_eq!(
            out,
            "1 events:\n  [2024-03-04T09:00:00+02:00 - 2024-03-04T09:15:00+02:00] Standup @Room 4 desc:Daily sync bring notes (cal:work id:ev1)"
        );
    }

    #[test]
    fn full_format_is_json() {
        let out = format_events(&[event()], Format::Full);
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v[0]["start_time"], "2024-03-04T09:00:00+02:00");
        assert_eq!(v[0]["calendar_id"], "work");
    }

    #[test]
    fn compact_mail_truncates_and_flattens() {
        let mut msg = message();
        msg.content = "x".repeat(300);
        let out = format_mail_messages(&[msg], Format::Compact);
        assert!(out.starts_with("1 messages:\n  [Mar 01 11:30] Ann <ann@example.com>: subj:Lunch? | "));
        assert!(out.contains(&format!("{}...", "x".repeat(200))));
    }

    #[test]
    fn expanded_single_mail_keeps_line_breaks() {
        let out = format_mail_message(&message(), Format::Expanded);
        assert!(out.starts_with("From: Ann <ann@example.com>\nTo: me@example.com\nSubject: Lunch?"));
        assert!(out.ends_with("Hi,\nnoon at the usual place?\n"));
    }

    #[test]
    fn forecast_lines() {
        let forecast = Forecast {
            location: "Oslo, Norway".into(),
            current: Some(CurrentConditions {
                temp_c: Some(-3),
                feels_like_c: Some(-8),
                description: "Light snow".into(),
                humidity: Some(86),
                wind_kmph: None,
            }),
            days: vec![DailyForecast {
                date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                min_c: Some(-9),
                max_c: Some(-2),
                description: "Sunny".into(),
            }],
        };
        assert_eq!(
            format_forecast(&forecast, Format::Compact),
            "Weather for Oslo, Norway:\n  now: -3°C (feels -8°C) Light snow\n  Wed Jan 10: -9..-2°C Sunny"
        );
        assert!(format_forecast(&forecast, Format::Expanded)
            .contains("humidity 86%, wind ? km/h"));
    }

    #[test]
    fn search_results_are_numbered() {
        let results = vec![SearchResult {
            title: "Rust".into(),
            url: "https://www.rust-lang.org/".into(),
            snippet: "A language empowering everyone".into(),
            date: None,
        }];
        assert_eq!(
            format_search_results(&results, Format::Compact),
            "1 results:\n  1. Rust https://www.rust-lang.org/\n     A language empowering everyone"
        );
    }
}
