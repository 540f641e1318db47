use async_trait::async_trait;
use penny_domain::{TimeWindow, TokenPair};
use penny_error::AgentError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::auth::OAuthClient;
use crate::wire::{CalendarListPage, EventsPage, MessageListPage, RawMessage, WireEvent};

const CALENDAR_BASE: &str = "https://www.googleapis.com/calendar/v3";
const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

#[async_trait]
pub trait GoogleApi: Send + Sync {
    async fn calendar_list(&self, page_token: Option<&str>)
        -> Result<CalendarListPage, AgentError>;

    async fn events(
        &self,
        calendar_id: &str,
        window: &TimeWindow,
        page_token: Option<&str>,
    ) -> Result<EventsPage, AgentError>;

    async fn event_instances(
        &self,
        calendar_id: &str,
        event_id: &str,
        window: &TimeWindow,
        page_token: Option<&str>,
    ) -> Result<EventsPage, AgentError>;

    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &WireEvent,
    ) -> Result<WireEvent, AgentError>;

    async fn list_messages(
        &self,
        query: Option<&str>,
        max_results: usize,
    ) -> Result<MessageListPage, AgentError>;

    async fn get_message(&self, id: &str) -> Result<RawMessage, AgentError>;
}

pub struct HttpGoogleApi {
    client: Client,
    oauth: OAuthClient,
    refresh_token: String,
    access_token: RwLock<String>,
}

impl HttpGoogleApi {
    pub fn new(oauth: OAuthClient, tokens: TokenPair) -> Self {
        Self {
            client: Client::new(),
            oauth,
            refresh_token: tokens.refresh_token,
            access_token: RwLock::new(tokens.access_token),
        }
    }

    /// Sends the request with the current access token. A 401 triggers one
    /// refresh and one replay.
    async fn authorized<F>(&self, build: F) -> Result<Response, AgentError>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let token = self.access_token.read().await.clone();
        let resp = build(&token).send().await.map_err(send_err)?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        debug!("access token rejected, refreshing");
        let fresh = self.oauth.refresh(&self.refresh_token).await?;
        *self.access_token.write().await = fresh.clone();
        build(&fresh).send().await.map_err(send_err)
    }

    async fn api_get<T: DeserializeOwned>(
        &self,
        url: Url,
        params: &[(&str, &str)],
        what: &str,
    ) -> Result<T, AgentError> {
        debug!(url = %url, "google GET");
        let resp = self
            .authorized(|token| {
                self.client
                    .get(url.clone())
                    .bearer_auth(token)
                    .query(params)
            })
            .await?;
        parse_google_response(resp, what).await
    }

    async fn api_post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &Value,
        what: &str,
    ) -> Result<T, AgentError> {
        debug!(url = %url, "google POST");
        let resp = self
            .authorized(|token| self.client.post(url.clone()).bearer_auth(token).json(body))
            .await?;
        parse_google_response(resp, what).await
    }
}

#[async_trait]
impl GoogleApi for HttpGoogleApi {
    async fn calendar_list(
        &self,
        page_token: Option<&str>,
    ) -> Result<CalendarListPage, AgentError> {
        let url = endpoint(CALENDAR_BASE, &["users", "me", "calendarList"])?;
        let mut params = Vec::new();
        if let Some(t) = page_token {
            params.push(("pageToken", t));
        }
        self.api_get(url, &params, "calendar list").await
    }

    async fn events(
        &self,
        calendar_id: &str,
        window: &TimeWindow,
        page_token: Option<&str>,
    ) -> Result<EventsPage, AgentError> {
        let url = endpoint(CALENDAR_BASE, &["calendars", calendar_id, "events"])?;
        let (time_min, time_max) = (window.time_min(), window.time_max());
        let mut params = vec![("timeMin", time_min.as_str()), ("timeMax", time_max.as_str())];
        if let Some(t) = page_token {
            params.push(("pageToken", t));
        }
        self.api_get(url, &params, &format!("calendar '{calendar_id}'"))
            .await
    }

    async fn event_instances(
        &self,
        calendar_id: &str,
        event_id: &str,
        window: &TimeWindow,
        page_token: Option<&str>,
    ) -> Result<EventsPage, AgentError> {
        let url = endpoint(
            CALENDAR_BASE,
            &["calendars", calendar_id, "events", event_id, "instances"],
        )?;
        let (time_min, time_max) = (window.time_min(), window.time_max());
        let mut params = vec![("timeMin", time_min.as_str()), ("timeMax", time_max.as_str())];
        if let Some(t) = page_token {
            params.push(("pageToken", t));
        }
        self.api_get(url, &params, &format!("instances of event '{event_id}'"))
            .await
    }

    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &WireEvent,
    ) -> Result<WireEvent, AgentError> {
        let url = endpoint(CALENDAR_BASE, &["calendars", calendar_id, "events"])?;
        let body = serde_json::to_value(event)
            .map_err(|e| AgentError::internal(format!("serialize event: {e}")))?;
        self.api_post(url, &body, &format!("calendar '{calendar_id}'"))
            .await
    }

    async fn list_messages(
        &self,
        query: Option<&str>,
        max_results: usize,
    ) -> Result<MessageListPage, AgentError> {
        let url = endpoint(GMAIL_BASE, &["messages"])?;
        let max = max_results.to_string();
        let mut params = vec![("maxResults", max.as_str())];
        if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
            params.push(("q", q));
        }
        self.api_get(url, &params, "message list").await
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage, AgentError> {
        let url = endpoint(GMAIL_BASE, &["messages", id])?;
        self.api_get(url, &[("format", "raw")], &format!("message '{id}'"))
            .await
    }
}

/// Appends percent-encoded path segments; calendar ids contain `@` and `#`.
fn endpoint(base: &str, segments: &[&str]) -> Result<Url, AgentError> {
    let mut url =
        Url::parse(base).map_err(|e| AgentError::internal(format!("bad base url: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| AgentError::internal(format!("{base} cannot take path segments")))?
        .extend(segments);
    Ok(url)
}

fn send_err(e: reqwest::Error) -> AgentError {
    AgentError::network(format!("google request failed: {e}"))
}

async fn parse_google_response<T: DeserializeOwned>(
    resp: Response,
    what: &str,
) -> Result<T, AgentError> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .json()
            .await
            .map_err(|e| AgentError::api(format!("{what}: invalid response: {e}")));
    }

    let body = resp.text().await.unwrap_or_default();
    let message = google_error_message(&body).unwrap_or(body);
    warn!(status = status.as_u16(), what, "google api error");

    match status {
        StatusCode::NOT_FOUND => Err(AgentError::not_found(format!("{what}: {message}"))),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(AgentError::auth(format!("{what}: {message}")))
        }
        _ => Err(AgentError::api(format!(
            "{what}: HTTP {}: {message}",
            status.as_u16()
        ))),
    }
}

fn google_error_message(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v["error"]["message"].as_str().map(|s| s.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn calendar_ids_are_percent_encoded() {
        let url = endpoint(
            CALENDAR_BASE,
            &["calendars", "en.finnish#holiday@group.v.calendar.google.com", "events"],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/en.finnish%23holiday@group.v.calendar.google.com/events"
        );
    }

    #[test]
    fn extracts_google_error_message() {
        let body = r#"{"error":{"code":404,"message":"Not Found","errors":[]}}"#;
        assert_eq!(google_error_message(body).as_deref(), Some("Not Found"));
        assert_eq!(google_error_message("<html>"), None);
    }
}
