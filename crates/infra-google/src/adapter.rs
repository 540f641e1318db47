use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use penny_domain::*;
use penny_error::AgentError;
use tracing::debug;

use crate::api::{GoogleApi, HttpGoogleApi};
use crate::event::{from_event, to_event};
use crate::mime::decode_gmail_raw;
use crate::wire::{RawMessage, WireCalendar, WireEvent};

pub struct GoogleAdapter<A = HttpGoogleApi> {
    api: A,
}

impl<A: GoogleApi> GoogleAdapter<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    async fn calendar_events(
        &self,
        calendar_id: &str,
        window: &TimeWindow,
        timezone: Option<Tz>,
    ) -> Result<Vec<CalendarEvent>, AgentError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .api
                .events(calendar_id, window, page_token.as_deref())
                .await
                .map_err(|e| match e {
                    AgentError::NotFound(_) => AgentError::not_found(format!(
                        "calendar '{calendar_id}' not found, consider retrying with a corrected id from calendar_list"
                    )),
                    other => other,
                })?;
            items.extend(page.items);
            match page.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => break,
            }
        }

        let parents: HashSet<&str> = items
            .iter()
            .filter(|e| e.is_recurring())
            .map(|e| e.id.as_str())
            .collect();

        let mut events = Vec::new();
        for item in &items {
            if item.is_cancelled() {
                continue;
            }
            // Modified occurrences already come back from the instances query.
            if item
                .recurring_event_id
                .as_deref()
                .is_some_and(|p| parents.contains(p))
            {
                continue;
            }
            if item.is_recurring() {
                for instance in self
                    .instances(calendar_id, &item.id, window)
                    .await?
                    .iter()
                    .filter(|i| !i.is_cancelled())
                {
                    events.push(to_event(instance, calendar_id, timezone)?);
                }
            } else {
                events.push(to_event(item, calendar_id, timezone)?);
            }
        }

        debug!(calendar_id, count = events.len(), "calendar events");
        Ok(events)
    }

    async fn instances(
        &self,
        calendar_id: &str,
        event_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<WireEvent>, AgentError> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .api
                .event_instances(calendar_id, event_id, window, page_token.as_deref())
                .await?;
            out.extend(page.items);
            match page.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => break,
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl<A: GoogleApi> CalendarPort for GoogleAdapter<A> {
    async fn list_calendars(&self) -> Result<Vec<Calendar>, AgentError> {
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.api.calendar_list(page_token.as_deref()).await?;
            calendars.extend(page.items.iter().map(to_calendar));
            match page.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => break,
            }
        }
        debug!(count = calendars.len(), "listed calendars");
        Ok(calendars)
    }

    async fn list_events(
        &self,
        window: &TimeWindow,
        timezone: Option<Tz>,
        calendar_ids: Option<&[String]>,
    ) -> Result<Vec<CalendarEvent>, AgentError> {
        let ids: Vec<String> = match calendar_ids {
            Some(ids) => ids.to_vec(),
            None => self
                .list_calendars()
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect(),
        };

        let mut events = Vec::new();
        for id in &ids {
            events.extend(self.calendar_events(id, window, timezone).await?);
        }
        // Stable; mixed date/timestamp keys compare as text.
        events.sort_by_key(|e| e.start_time.iso());

        debug!(
            calendars = ids.len(),
            count = events.len(),
            "listed events"
        );
        Ok(events)
    }

    async fn create_event(
        &self,
        event: &CalendarEvent,
        timezone: Option<Tz>,
    ) -> Result<CalendarEvent, AgentError> {
        let insert = from_event(event)?;
        let created = self
            .api
            .insert_event(&insert.calendar_id, &insert.event)
            .await?;
        debug!(calendar_id = %insert.calendar_id, id = %created.id, "created event");

        match timezone {
            Some(_) => to_event(&created, &insert.calendar_id, timezone),
            None => Ok(CalendarEvent {
                id: created.id,
                ..event.clone()
            }),
        }
    }
}

#[async_trait]
impl<A: GoogleApi> MailPort for GoogleAdapter<A> {
    async fn list_messages(
        &self,
        query: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<MailMessage>, AgentError> {
        let page = self.api.list_messages(query, max_results).await?;
        debug!(refs = page.messages.len(), "message list");

        let mut messages = Vec::with_capacity(page.messages.len());
        for r in &page.messages {
            let raw = self.api.get_message(&r.id).await?;
            messages.push(to_mail_message(&raw)?);
        }
        debug!(count = messages.len(), "listed messages");
        Ok(messages)
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage, AgentError> {
        let raw = self.api.get_message(id).await?;
        to_mail_message(&raw)
    }
}

fn to_calendar(wire: &WireCalendar) -> Calendar {
    let name = wire
        .summary_override
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(wire.summary.as_deref())
        .unwrap_or_default()
        .to_string();
    Calendar {
        id: wire.id.clone(),
        name,
        description: wire.description.clone().filter(|d| !d.is_empty()),
    }
}

fn to_mail_message(raw: &RawMessage) -> Result<MailMessage, AgentError> {
    let decoded = decode_gmail_raw(&raw.raw)
        .map_err(|e| with_context(e, &format!("message '{}'", raw.id)))?;
    Ok(MailMessage {
        id: raw.id.clone(),
        subject: decoded.subject,
        from: decoded.from,
        to: decoded.to,
        received: received_at(raw)?,
        content: decoded.content,
    })
}

fn received_at(raw: &RawMessage) -> Result<DateTime<Utc>, AgentError> {
    let ms = raw.internal_date.as_deref().unwrap_or_default();
    ms.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| {
            AgentError::invalid_date(format!(
                "message '{}' has invalid internalDate '{ms}'",
                raw.id
            ))
        })
}

fn with_context(err: AgentError, what: &str) -> AgentError {
    match err {
        AgentError::Decode(m) => AgentError::decode(format!("{what}: {m}")),
        AgentError::UnsupportedContent(m) => {
            AgentError::unsupported_content(format!("{m} ({what})"))
        }
        other => other,
    }
}
