use async_trait::async_trait;
use chrono_tz::Tz;
use penny_error::AgentError;

use crate::entities::{
    Calendar, CalendarEvent, Forecast, Location, MailMessage, SearchResult, TimeWindow,
};

#[async_trait]
pub trait CalendarPort: Send + Sync {
    async fn list_calendars(&self) -> Result<Vec<Calendar>, AgentError>;

    /// Events of every requested calendar inside `window`, recurring events
    /// expanded, sorted by start time. `calendar_ids = None` means all calendars.
    async fn list_events(
        &self,
        window: &TimeWindow,
        timezone: Option<Tz>,
        calendar_ids: Option<&[String]>,
    ) -> Result<Vec<CalendarEvent>, AgentError>;

    async fn create_event(
        &self,
        event: &CalendarEvent,
        timezone: Option<Tz>,
    ) -> Result<CalendarEvent, AgentError>;
}

#[async_trait]
pub trait MailPort: Send + Sync {
    async fn list_messages(
        &self,
        query: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<MailMessage>, AgentError>;

    async fn get_message(&self, id: &str) -> Result<MailMessage, AgentError>;
}

/// Read-whole / replace-whole access to the user's memory blob. Merging is
/// the caller's job.
#[async_trait]
pub trait MemoryPort: Send + Sync {
    async fn load_memory(&self) -> Result<String, AgentError>;

    async fn save_memory(&self, memory: &str) -> Result<(), AgentError>;
}

#[async_trait]
pub trait SearchPort: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, AgentError>;
}

#[async_trait]
pub trait WeatherPort: Send + Sync {
    async fn current_location(&self) -> Result<Location, AgentError>;

    async fn forecast(&self, location: &str) -> Result<Forecast, AgentError>;
}
