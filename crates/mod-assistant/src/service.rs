use std::sync::Arc;

use chrono::{Local, Utc};
use chrono_tz::Tz;
use penny_domain::{
    Calendar, CalendarEvent, CalendarPort, Capability, EventTime, Forecast, Location, MailMessage,
    MailPort, MemoryPort, SearchPort, SearchResult, TimeWindow, WeatherPort,
};
use penny_error::AgentError;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    pub calendar_id: String,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub timezone: Option<String>,
}

pub struct AssistantService {
    memory: Arc<dyn MemoryPort>,
    calendar: Option<Arc<dyn CalendarPort>>,
    mail: Option<Arc<dyn MailPort>>,
    search: Option<Arc<dyn SearchPort>>,
    weather: Option<Arc<dyn WeatherPort>>,
}

impl AssistantService {
    pub fn new(memory: Arc<dyn MemoryPort>) -> Self {
        Self {
            memory,
            calendar: None,
            mail: None,
            search: None,
            weather: None,
        }
    }

    pub fn register_calendar(&mut self, port: Arc<dyn CalendarPort>) {
        info!(capability = %Capability::Calendar, "registered adapter");
        self.calendar = Some(port);
    }

    pub fn register_mail(&mut self, port: Arc<dyn MailPort>) {
        info!(capability = %Capability::Mail, "registered adapter");
        self.mail = Some(port);
    }

    pub fn register_search(&mut self, port: Arc<dyn SearchPort>) {
        info!(capability = %Capability::Search, "registered adapter");
        self.search = Some(port);
    }

    pub fn register_weather(&mut self, port: Arc<dyn WeatherPort>) {
        info!(capability = %Capability::Weather, "registered adapter");
        self.weather = Some(port);
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.calendar.is_some() {
            caps.push(Capability::Calendar);
        }
        if self.mail.is_some() {
            caps.push(Capability::Mail);
        }
        if self.search.is_some() {
            caps.push(Capability::Search);
        }
        if self.weather.is_some() {
            caps.push(Capability::Weather);
        }
        caps
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn calendar(&self) -> Result<&Arc<dyn CalendarPort>, AgentError> {
        self.calendar
            .as_ref()
            .ok_or_else(|| AgentError::not_configured(Capability::Calendar.to_string()))
    }

    fn mail(&self) -> Result<&Arc<dyn MailPort>, AgentError> {
        self.mail
            .as_ref()
            .ok_or_else(|| AgentError::not_configured(Capability::Mail.to_string()))
    }

    fn search(&self) -> Result<&Arc<dyn SearchPort>, AgentError> {
        self.search
            .as_ref()
            .ok_or_else(|| AgentError::not_configured(Capability::Search.to_string()))
    }

    fn weather(&self) -> Result<&Arc<dyn WeatherPort>, AgentError> {
        self.weather
            .as_ref()
            .ok_or_else(|| AgentError::not_configured(Capability::Weather.to_string()))
    }

    pub fn current_date(&self, timezone: Option<&str>) -> Result<String, AgentError> {
        let now = match timezone.filter(|t| !t.trim().is_empty()) {
            Some(tz) => Utc::now().with_timezone(&parse_timezone(tz)?).to_rfc3339(),
            None => Local::now().to_rfc3339(),
        };
        Ok(now)
    }

    pub async fn load_memory(&self) -> Result<String, AgentError> {
        let memory = self.memory.load_memory().await?;
        info!(bytes = memory.len(), "loaded memory");
        Ok(memory)
    }

    /// Replaces the stored memory with `memory`; an empty string clears it.
    pub async fn save_memory(&self, memory: &str) -> Result<(), AgentError> {
        self.memory.save_memory(memory).await?;
        info!(bytes = memory.len(), "saved memory");
        Ok(())
    }

    pub async fn list_calendars(&self) -> Result<Vec<Calendar>, AgentError> {
        let calendars = self.calendar()?.list_calendars().await?;
        info!(count = calendars.len(), "listed calendars");
        Ok(calendars)
    }

    pub async fn list_events(
        &self,
        start_time: &str,
        end_time: &str,
        timezone: &str,
        calendar_ids: Option<&[String]>,
    ) -> Result<Vec<CalendarEvent>, AgentError> {
        validate_not_empty(start_time, "start_time")?;
        validate_not_empty(end_time, "end_time")?;
        validate_not_empty(timezone, "timezone")?;
        let window = TimeWindow::parse(start_time, end_time)?;
        let tz = parse_timezone(timezone)?;
        let ids = calendar_ids.filter(|ids| !ids.is_empty());
        if let Some(ids) = ids {
            for id in ids {
                validate_not_empty(id, "calendar_ids entry")?;
            }
        }

        let events = self.calendar()?.list_events(&window, Some(tz), ids).await?;
        info!(
            start_time,
            end_time,
            %tz,
            count = events.len(),
            "listed events"
        );
        Ok(events)
    }

    pub async fn create_event(&self, draft: EventDraft) -> Result<CalendarEvent, AgentError> {
        validate_not_empty(&draft.calendar_id, "calendar_id")?;
        validate_not_empty(&draft.name, "name")?;
        let tz = match draft.timezone.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(t) => Some(parse_timezone(t)?),
            None => None,
        };

        let event = CalendarEvent {
            id: String::new(),
            name: draft.name.trim().to_string(),
            description: draft.description,
            location: draft.location,
            start_time: EventTime::parse(&draft.start_time)?,
            end_time: EventTime::parse(&draft.end_time)?,
            calendar_id: draft.calendar_id.trim().to_string(),
        };

        let created = self.calendar()?.create_event(&event, tz).await?;
        info!(calendar_id = %created.calendar_id, id = %created.id, "created event");
        Ok(created)
    }

    pub async fn list_messages(
        &self,
        query: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<MailMessage>, AgentError> {
        let max_results = clamp(max_results, 1, 500, 100);
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let messages = self.mail()?.list_messages(query, max_results).await?;
        info!(query, max_results, count = messages.len(), "listed messages");
        Ok(messages)
    }

    pub async fn get_message(&self, id: &str) -> Result<MailMessage, AgentError> {
        validate_not_empty(id, "id")?;
        let message = self.mail()?.get_message(id.trim()).await?;
        info!(id, "read message");
        Ok(message)
    }

    pub async fn web_search(&self, query: &str) -> Result<Vec<SearchResult>, AgentError> {
        validate_not_empty(query, "query")?;
        let results = self.search()?.search(query).await?;
        info!(query, count = results.len(), "searched web");
        Ok(results)
    }

    pub async fn current_location(&self) -> Result<Location, AgentError> {
        let location = self.weather()?.current_location().await?;
        info!(location = %location, "resolved location");
        Ok(location)
    }

    pub async fn weather_forecast(&self, location: &str) -> Result<Forecast, AgentError> {
        validate_not_empty(location, "location")?;
        let forecast = self.weather()?.forecast(location).await?;
        info!(location, days = forecast.days.len(), "weather forecast");
        Ok(forecast)
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, AgentError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| AgentError::invalid_input(format!("'{name}' is not an IANA timezone: {e}")))
}

fn validate_not_empty(val: &str, name: &str) -> Result<(), AgentError> {
    if val.trim().is_empty() {
        return Err(AgentError::invalid_input(format!("{name} cannot be empty")));
    }
    Ok(())
}

fn clamp(val: usize, min: usize, max: usize, default: usize) -> usize {
    if val == 0 {
        default
    } else {
        val.max(min).min(max)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono_tz::Tz;

    use super::*;

    #[derive(Default)]
    struct MemFake {
        text: Mutex<String>,
    }

    #[async_trait]
    impl MemoryPort for MemFake {
        async fn load_memory(&self) -> Result<String, AgentError> {
            Ok(self.text.lock().unwrap().clone())
        }

        async fn save_memory(&self, memory: &str) -> Result<(), AgentError> {
            *self.text.lock().unwrap() = memory.to_string();
            Ok(())
        }
    }

    #[derive(Default)]
    struct MailFake {
        seen_max: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl MailPort for MailFake {
        async fn list_messages(
            &self,
            _query: Option<&str>,
            max_results: usize,
        ) -> Result<Vec<MailMessage>, AgentError> {
            *self.seen_max.lock().unwrap() = Some(max_results);
            Ok(Vec::new())
        }

        async fn get_message(&self, id: &str) -> Result<MailMessage, AgentError> {
            Err(AgentError::not_found(format!("message '{id}'")))
        }
    }

    #[derive(Default)]
    struct CalendarFake {
        seen: Mutex<Option<(TimeWindow, Option<Tz>)>>,
    }

    #[async_trait]
    impl CalendarPort for CalendarFake {
        async fn list_calendars(&self) -> Result<Vec<Calendar>, AgentError> {
            Ok(vec![Calendar {
                id: "primary".into(),
                name: "Me".into(),
                description: None,
            }])
        }

        async fn list_events(
            &self,
            window: &TimeWindow,
            timezone: Option<Tz>,
            _calendar_ids: Option<&[String]>,
        ) -> Result<Vec<CalendarEvent>, AgentError> {
            *self.seen.lock().unwrap() = Some((*window, timezone));
            Ok(Vec::new())
        }

        async fn create_event(
            &self,
            event: &CalendarEvent,
            _timezone: Option<Tz>,
        ) -> Result<CalendarEvent, AgentError> {
            Ok(CalendarEvent {
                id: "created".into(),
                ..event.clone()
            })
        }
    }

    fn service() -> AssistantService {
        AssistantService::new(Arc::new(MemFake::default()))
    }

    #[test]
    fn clamps_max_results() {
        assert_eq!(clamp(0, 1, 500, 100), 100);
        assert_eq!(clamp(7, 1, 500, 100), 7);
        assert_eq!(clamp(10_000, 1, 500, 100), 500);
    }

    #[test]
    fn capabilities_follow_registration() {
        let mut svc = service();
        assert!(svc.capabilities().is_empty());
        svc.register_mail(Arc::new(MailFake::default()));
        assert_eq!(svc.capabilities(), vec![Capability::Mail]);
        assert!(!svc.has(Capability::Calendar));
    }

    #[test]
    fn current_date_in_zone() {
        let now = service().current_date(Some("Asia/Kolkata")).unwrap();
        assert!(now.ends_with("+05:30"), "{now}");
        assert!(matches!(
            service().current_date(Some("Mars/Olympus")),
            Err(AgentError::InvalidInput(_))
        ));
        assert!(service().current_date(None).is_ok());
    }

    #[tokio::test]
    async fn memory_is_replaced_whole() {
        let svc = service();
        svc.save_memory("a").await.unwrap();
        svc.save_memory("b").await.unwrap();
        assert_eq!(svc.load_memory().await.unwrap(), "b");
    }

    #[tokio::test]
    async fn unregistered_capability_is_not_configured() {
        let err = service().list_calendars().await.unwrap_err();
        assert!(matches!(err, AgentError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn list_messages_clamps_before_the_port() {
        let mail = Arc::new(MailFake::default());
        let mut svc = service();
        svc.register_mail(mail.clone());

        svc.list_messages(None, 0).await.unwrap();
        assert_eq!(*mail.seen_max.lock().unwrap(), Some(100));
        svc.list_messages(Some("is:unread"), 9_999).await.unwrap();
        assert_eq!(*mail.seen_max.lock().unwrap(), Some(500));
    }

    #[tokio::test]
    async fn list_events_validates_window_and_zone() {
        let cal = Arc::new(CalendarFake::default());
        let mut svc = service();
        svc.register_calendar(cal.clone());

        let err = svc
            .list_events("2024-03-02T00:00:00Z", "2024-03-01T00:00:00Z", "UTC", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));

        let err = svc
            .list_events("2024-03-01T00:00:00Z", "2024-03-02T00:00:00Z", "Nowhere/City", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));

        svc.list_events(
            "2024-03-01T00:00:00Z",
            "2024-03-02T00:00:00Z",
            "Europe/Helsinki",
            None,
        )
        .await
        .unwrap();
        let (window, tz) = cal.seen.lock().unwrap().unwrap();
        assert_eq!(window.time_min(), "2024-03-01T00:00:00+00:00");
        assert_eq!(tz, Some(chrono_tz::Europe::Helsinki));
    }

    #[tokio::test]
    async fn create_event_rejects_bad_dates() {
        let mut svc = service();
        svc.register_calendar(Arc::new(CalendarFake::default()));

        let draft = EventDraft {
            calendar_id: "primary".into(),
            name: "Dentist".into(),
            start_time: "tomorrow".into(),
            end_time: "2024-03-02".into(),
            ..Default::default()
        };
        let err = svc.create_event(draft.clone()).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidDate(_)));

        let ok = EventDraft {
            start_time: "2024-03-01".into(),
            ..draft
        };
        let created = svc.create_event(ok).await.unwrap();
        assert_eq!(created.id, "created");
        assert!(created.start_time.is_all_day());
    }

    #[tokio::test]
    async fn blank_message_id_is_rejected() {
        let mut svc = service();
        svc.register_mail(Arc::new(MailFake::default()));
        assert!(matches!(
            svc.get_message("  ").await,
            Err(AgentError::InvalidInput(_))
        ));
        assert!(matches!(
            svc.get_message("abc").await,
            Err(AgentError::NotFound(_))
        ));
    }
}
