use async_trait::async_trait;
use chrono::NaiveDate;
use penny_domain::{CurrentConditions, DailyForecast, Forecast, Location, WeatherPort};
use penny_error::AgentError;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::debug;

const IPINFO_URL: &str = "https://ipinfo.io/json";
const WTTR_BASE: &str = "https://wttr.in";

pub struct WeatherAdapter {
    client: Client,
}

impl WeatherAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn get_json(&self, url: Url, service: &str) -> Result<Value, AgentError> {
        debug!(url = %url, service, "GET");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AgentError::network(format!("{service} request failed: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AgentError::not_found(format!("{service}: unknown location")));
        }
        if !status.is_success() {
            return Err(AgentError::api(format!("{service} HTTP {}", status.as_u16())));
        }
        resp.json()
            .await
            .map_err(|e| AgentError::api(format!("{service}: invalid response: {e}")))
    }
}

impl Default for WeatherAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeatherPort for WeatherAdapter {
    async fn current_location(&self) -> Result<Location, AgentError> {
        let url = Url::parse(IPINFO_URL)
            .map_err(|e| AgentError::internal(format!("ipinfo url: {e}")))?;
        let body = self.get_json(url, "ipinfo").await?;
        let location = parse_location(&body);
        debug!(location = %location, "current location");
        Ok(location)
    }

    async fn forecast(&self, location: &str) -> Result<Forecast, AgentError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(AgentError::invalid_input("location cannot be empty"));
        }

        let mut url =
            Url::parse(WTTR_BASE).map_err(|e| AgentError::internal(format!("wttr url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| AgentError::internal("wttr url cannot take a path"))?
            .push(location);
        url.query_pairs_mut().append_pair("format", "j1");

        let body = self.get_json(url, "wttr").await?;
        let forecast = parse_forecast(&body, location)?;
        debug!(location = %forecast.location, days = forecast.days.len(), "weather forecast");
        Ok(forecast)
    }
}

fn opt_str(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn parse_location(body: &Value) -> Location {
    Location {
        city: opt_str(&body["city"]),
        region: opt_str(&body["region"]),
        country: opt_str(&body["country"]),
        coordinates: opt_str(&body["loc"]),
        timezone: opt_str(&body["timezone"]),
    }
}

/// wttr wraps every string in `[{"value": ...}]`.
fn first_value(v: &Value) -> Option<String> {
    opt_str(&v[0]["value"])
}

/// wttr sends numbers as strings. Missing or garbled readings stay `None`.
fn num<T: std::str::FromStr>(v: &Value) -> Option<T> {
    v.as_str().and_then(|s| s.trim().parse().ok())
}

fn parse_forecast(body: &Value, requested: &str) -> Result<Forecast, AgentError> {
    let area = &body["nearest_area"][0];
    let name = match (first_value(&area["areaName"]), first_value(&area["country"])) {
        (Some(a), Some(c)) => format!("{a}, {c}"),
        (Some(a), None) => a,
        _ => requested.to_string(),
    };

    let current = body["current_condition"].get(0).map(|c| CurrentConditions {
        temp_c: num(&c["temp_C"]),
        feels_like_c: num(&c["FeelsLikeC"]),
        description: first_value(&c["weatherDesc"]).unwrap_or_default(),
        humidity: num(&c["humidity"]),
        wind_kmph: num(&c["windspeedKmph"]),
    });

    let mut days = Vec::new();
    for day in body["weather"].as_array().map_or(&[] as &[Value], |v| v) {
        let raw_date = day["date"].as_str().unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
            .map_err(|e| AgentError::api(format!("wttr: bad date '{raw_date}': {e}")))?;
        days.push(DailyForecast {
            date,
            min_c: num(&day["mintempC"]),
            max_c: num(&day["maxtempC"]),
            description: midday_description(&day["hourly"]),
        });
    }

    Ok(Forecast {
        location: name,
        current,
        days,
    })
}

/// Description of the 12:00 slot, else the first one.
fn midday_description(hourly: &Value) -> String {
    let slots = hourly.as_array().map_or(&[] as &[Value], |v| v);
    slots
        .iter()
        .find(|h| h["time"].as_str() == Some("1200"))
        .or(slots.first())
        .and_then(|h| first_value(&h["weatherDesc"]))
        .unwrap_or_default()
}
