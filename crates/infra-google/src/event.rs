use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use penny_domain::{CalendarEvent, EventTime};
use penny_error::AgentError;

use crate::wire::{WireEvent, WireEventTime};

pub const UNTITLED: &str = "(No title)";

#[derive(Debug, Clone, PartialEq)]
pub struct EventInsert {
    pub calendar_id: String,
    pub event: WireEvent,
}

pub fn to_event(
    wire: &WireEvent,
    calendar_id: &str,
    timezone: Option<Tz>,
) -> Result<CalendarEvent, AgentError> {
    let start = wire
        .start
        .as_ref()
        .ok_or_else(|| AgentError::invalid_date(format!("event '{}' has no start", wire.id)))?;
    let end = wire
        .end
        .as_ref()
        .ok_or_else(|| AgentError::invalid_date(format!("event '{}' has no end", wire.id)))?;

    Ok(CalendarEvent {
        id: wire.id.clone(),
        name: non_empty(&wire.summary).unwrap_or_else(|| UNTITLED.to_string()),
        description: non_empty(&wire.description),
        location: non_empty(&wire.location),
        start_time: to_event_time(start, timezone)?,
        end_time: to_event_time(end, timezone)?,
        calendar_id: calendar_id.to_string(),
    })
}

/// `dateTime` wins over `date`. Timestamps are re-expressed in `timezone`,
/// which is mandatory for them.
pub fn to_event_time(wire: &WireEventTime, timezone: Option<Tz>) -> Result<EventTime, AgentError> {
    if let Some(ref ts) = wire.date_time {
        let tz = timezone.ok_or_else(|| {
            AgentError::invalid_date(format!("timestamp '{ts}' given but no timezone supplied"))
        })?;
        let instant = parse_wire_timestamp(ts, wire.time_zone.as_deref())?;
        return Ok(EventTime::DateTime(instant.with_timezone(&tz).fixed_offset()));
    }

    if let Some(ref d) = wire.date {
        let date = NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|e| AgentError::invalid_date(format!("date '{d}': {e}")))?;
        return Ok(EventTime::Date(date));
    }

    Err(AgentError::invalid_date(
        "event time has neither dateTime nor date",
    ))
}

fn parse_wire_timestamp(
    ts: &str,
    wire_zone: Option<&str>,
) -> Result<DateTime<FixedOffset>, AgentError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Ok(dt);
    }

    // Offset-less timestamps are only meaningful next to a timeZone field.
    let zone: Tz = wire_zone
        .and_then(|z| z.parse().ok())
        .ok_or_else(|| AgentError::invalid_date(format!("timestamp '{ts}' has no offset")))?;
    let naive = NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| AgentError::invalid_date(format!("timestamp '{ts}': {e}")))?;
    zone.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
        .ok_or_else(|| AgentError::invalid_date(format!("'{ts}' does not exist in {zone}")))
}

pub fn from_event(event: &CalendarEvent) -> Result<EventInsert, AgentError> {
    let ordered = match (&event.start_time, &event.end_time) {
        (EventTime::Date(s), EventTime::Date(e)) => s <= e,
        (EventTime::DateTime(s), EventTime::DateTime(e)) => s <= e,
        _ => {
            return Err(AgentError::invalid_date(
                "start_time and end_time must both be dates or both be timestamps",
            ))
        }
    };
    if !ordered {
        return Err(AgentError::invalid_date(format!(
            "end_time {} is before start_time {}",
            event.end_time, event.start_time
        )));
    }

    Ok(EventInsert {
        calendar_id: event.calendar_id.clone(),
        event: WireEvent {
            id: event.id.clone(),
            summary: Some(event.name.clone()),
            description: non_empty(&event.description),
            location: non_empty(&event.location),
            start: Some(from_event_time(&event.start_time)),
            end: Some(from_event_time(&event.end_time)),
            ..Default::default()
        },
    })
}

pub fn from_event_time(time: &EventTime) -> WireEventTime {
    match time {
        EventTime::DateTime(dt) => WireEventTime {
            date_time: Some(dt.to_rfc3339()),
            ..Default::default()
        },
        EventTime::Date(d) => WireEventTime {
            date: Some(d.format("%Y-%m-%d").to_string()),
            ..Default::default()
        },
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Offset, Utc};

    fn timed(start: &str, end: &str) -> WireEvent {
        WireEvent {
            id: "ev1".into(),
            summary: Some("Dentist".into()),
            start: Some(WireEventTime {
                date_time: Some(start.into()),
                ..Default::default()
            }),
            end: Some(WireEventTime {
                date_time: Some(end.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn all_day(start: &str, end: &str) -> WireEvent {
        WireEvent {
            id: "ev2".into(),
            summary: Some("Holiday".into()),
            description: Some("".into()),
            start: Some(WireEventTime {
                date: Some(start.into()),
                ..Default::default()
            }),
            end: Some(WireEventTime {
                date: Some(end.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn all_day_events_never_get_a_timezone() {
        let tz: Tz = "Europe/Helsinki".parse().unwrap();
        let event = to_event(&all_day("2024-12-24", "2024-12-27"), "family", Some(tz)).unwrap();
        assert_eq!(
            event.start_time,
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 12, 24).unwrap())
        );
        assert!(event.end_time.is_all_day());
        assert_eq!(event.description, None);
        assert_eq!(event.calendar_id, "family");
    }

    #[test]
    fn timed_events_take_the_requested_offset() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let event = to_event(
            &timed("2024-01-15T15:00:00Z", "2024-07-15T15:00:00Z"),
            "work",
            Some(tz),
        )
        .unwrap();

        let (EventTime::DateTime(start), EventTime::DateTime(end)) =
            (event.start_time, event.end_time)
        else {
            panic!("expected timestamps");
        };
        let utc_start = start.with_timezone(&Utc);
        let expected = tz.offset_from_utc_datetime(&utc_start.naive_utc()).fix();
        assert_eq!(*start.offset(), expected);
        assert_eq!(start.offset().local_minus_utc(), -5 * 3600);
        assert_eq!(end.offset().local_minus_utc(), -4 * 3600);
        assert_eq!(start.to_rfc3339(), "2024-01-15T10:00:00-05:00");
    }

    #[test]
    fn timestamp_without_timezone_fails() {
        let err = to_event(&timed("2024-01-15T15:00:00Z", "2024-01-15T16:00:00Z"), "c", None)
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidDate(_)));
    }

    #[test]
    fn missing_date_fields_fail() {
        let mut wire = all_day("2024-01-01", "2024-01-02");
        wire.end = Some(WireEventTime::default());
        let err = to_event(&wire, "c", None).unwrap_err();
        assert!(matches!(err, AgentError::InvalidDate(_)));
    }

    #[test]
    fn offsetless_timestamp_uses_wire_zone() {
        let wire = WireEventTime {
            date_time: Some("2024-06-01T09:00:00".into()),
            time_zone: Some("Europe/Berlin".into()),
            ..Default::default()
        };
        let t = to_event_time(&wire, Some(Tz::UTC)).unwrap();
        assert_eq!(t.iso(), "2024-06-01T07:00:00+00:00");
    }

    #[test]
    fn untitled_events_get_a_name() {
        let mut wire = all_day("2024-01-01", "2024-01-02");
        wire.summary = None;
        assert_eq!(to_event(&wire, "c", None).unwrap().name, UNTITLED);
    }

    #[test]
    fn round_trips_timed_event() {
        let tz: Tz = "Europe/Helsinki".parse().unwrap();
        let original = timed("2024-03-10T08:00:00+02:00", "2024-03-10T09:30:00+02:00");
        let event = to_event(&original, "work", Some(tz)).unwrap();

        let insert = from_event(&event).unwrap();
        assert_eq!(insert.calendar_id, "work");
        assert_eq!(insert.event.start, original.start);
        assert_eq!(insert.event.end, original.end);

        let again = to_event(&insert.event, &insert.calendar_id, Some(tz)).unwrap();
        assert_eq!(again.start_time, event.start_time);
        assert_eq!(again.end_time, event.end_time);
        assert_eq!(again.calendar_id, event.calendar_id);
    }

    #[test]
    fn round_trips_all_day_event() {
        let original = all_day("2024-05-01", "2024-05-02");
        let event = to_event(&original, "home", None).unwrap();
        let insert = from_event(&event).unwrap();
        assert_eq!(insert.event.start, original.start);
        assert_eq!(insert.event.end, original.end);
        assert_eq!(insert.calendar_id, "home");
    }

    #[test]
    fn optional_fields_only_when_present() {
        let event = CalendarEvent {
            id: String::new(),
            name: "Lunch".into(),
            description: Some("  ".into()),
            location: Some("Cafe".into()),
            start_time: EventTime::parse("2024-05-01T12:00:00+00:00").unwrap(),
            end_time: EventTime::parse("2024-05-01T13:00:00+00:00").unwrap(),
            calendar_id: "primary".into(),
        };
        let insert = from_event(&event).unwrap();
        assert_eq!(insert.event.description, None);
        assert_eq!(insert.event.location.as_deref(), Some("Cafe"));
        let json = serde_json::to_value(&insert.event).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("description").is_none());
    }

    #[test]
    fn mixed_kinds_are_rejected() {
        let event = CalendarEvent {
            id: String::new(),
            name: "Trip".into(),
            description: None,
            location: None,
            start_time: EventTime::parse("2024-05-01").unwrap(),
            end_time: EventTime::parse("2024-05-03T10:00:00+00:00").unwrap(),
            calendar_id: "primary".into(),
        };
        assert!(matches!(
            from_event(&event).unwrap_err(),
            AgentError::InvalidDate(_)
        ));
    }
}
