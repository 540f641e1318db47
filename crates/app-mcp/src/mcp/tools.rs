use penny_domain::Capability;
use serde_json::{json, Value};

use super::types::ToolDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    CurrentDate,
    LoadMemory,
    SaveMemory,
    CalendarList,
    CalendarListEvents,
    CalendarCreateEvent,
    EmailListMessages,
    EmailGetMessage,
    WebSearch,
    CurrentLocation,
    WeatherForecast,
}

impl Tool {
    pub const ALL: [Tool; 11] = [
        Tool::CurrentDate,
        Tool::LoadMemory,
        Tool::SaveMemory,
        Tool::CalendarList,
        Tool::CalendarListEvents,
        Tool::CalendarCreateEvent,
        Tool::EmailListMessages,
        Tool::EmailGetMessage,
        Tool::WebSearch,
        Tool::CurrentLocation,
        Tool::WeatherForecast,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::CurrentDate => "current_date",
            Tool::LoadMemory => "load_memory",
            Tool::SaveMemory => "save_memory",
            Tool::CalendarList => "calendar_list",
            Tool::CalendarListEvents => "calendar_list_events",
            Tool::CalendarCreateEvent => "calendar_create_event",
            Tool::EmailListMessages => "email_list_messages",
            Tool::EmailGetMessage => "email_get_message",
            Tool::WebSearch => "web_search",
            Tool::CurrentLocation => "current_location",
            Tool::WeatherForecast => "weather_forecast",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|t| t.name() == name)
    }

    /// `None` means always available.
    pub fn capability(self) -> Option<Capability> {
        match self {
            Tool::CurrentDate | Tool::LoadMemory | Tool::SaveMemory => None,
            Tool::CalendarList | Tool::CalendarListEvents | Tool::CalendarCreateEvent => {
                Some(Capability::Calendar)
            }
            Tool::EmailListMessages | Tool::EmailGetMessage => Some(Capability::Mail),
            Tool::WebSearch => Some(Capability::Search),
            Tool::CurrentLocation | Tool::WeatherForecast => Some(Capability::Weather),
        }
    }

    pub fn is_available(self, configured: &[Capability]) -> bool {
        self.capability().map_or(true, |c| configured.contains(&c))
    }

    pub fn description(self) -> &'static str {
        match self {
            Tool::CurrentDate => "Current date and time as an ISO-8601 timestamp. Pass the user's IANA timezone to get local time; without it the server's local time is returned.",
            Tool::LoadMemory => "Load the agent's persistent memory of key details from past conversations.",
            Tool::SaveMemory => "Persist long-term memory that may affect future conversations. This OVERWRITES the stored memory: always call load_memory first, merge the existing memory with the new information, resolve conflicts, drop outdated details, then save the full merged text. Never save partial updates.",
            Tool::CalendarList => "List the user's Google calendars with their ids. Use the ids with calendar_list_events and calendar_create_event.",
            Tool::CalendarListEvents => "List events between start_time and end_time across the user's calendars, recurring events expanded into individual occurrences, sorted by start. Timed events are shown in the given timezone; all-day events show a plain date.",
            Tool::CalendarCreateEvent => "Create an event in one of the user's calendars. Use YYYY-MM-DD dates for all-day events (end date is exclusive) or RFC 3339 timestamps with offset for timed events; start and end must be the same kind.",
            Tool::EmailListMessages => "List Gmail messages matching a Gmail search query (same syntax as the Gmail search box, e.g. 'from:alice is:unread newer_than:7d'). Returns sender, subject, received time and plain-text content.",
            Tool::EmailGetMessage => "Read one Gmail message by id, with its full plain-text content.",
            Tool::WebSearch => "Search the web and return ranked results with titles, URLs and snippets. Use for current events and facts you are unsure about.",
            Tool::CurrentLocation => "Approximate current location of the user from their IP address: city, region, country, coordinates and timezone.",
            Tool::WeatherForecast => "Current weather and a short daily forecast for a location (city name, airport code or 'lat,lon').",
        }
    }

    pub fn input_schema(self) -> Value {
        match self {
            Tool::CurrentDate => json!({
                "type": "object",
                "properties": {
                    "timezone": timezone_param()
                }
            }),
            Tool::LoadMemory => json!({
                "type": "object",
                "properties": {}
            }),
            Tool::CurrentLocation => json!({
                "type": "object",
                "properties": {
                    "format": format_param()
                }
            }),
            Tool::SaveMemory => json!({
                "type": "object",
                "properties": {
                    "memory": {
                        "type": "string",
                        "description": "The complete merged memory text"
                    }
                },
                "required": ["memory"]
            }),
            Tool::CalendarList => json!({
                "type": "object",
                "properties": {
                    "format": format_param()
                }
            }),
            Tool::CalendarListEvents => json!({
                "type": "object",
                "properties": {
                    "start_time": {
                        "type": "string",
                        "description": "Window start, RFC 3339 with offset (e.g. 2025-03-01T00:00:00+02:00)"
                    },
                    "end_time": {
                        "type": "string",
                        "description": "Window end (exclusive), RFC 3339 with offset"
                    },
                    "timezone": timezone_param(),
                    "calendar_ids": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Only these calendars (default: all calendars)"
                    },
                    "format": format_param()
                },
                "required": ["start_time", "end_time", "timezone"]
            }),
            Tool::CalendarCreateEvent => json!({
                "type": "object",
                "properties": {
                    "calendar_id": {
                        "type": "string",
                        "description": "Target calendar id ('primary' for the main calendar)"
                    },
                    "name": {
                        "type": "string",
                        "description": "Event title"
                    },
                    "start_time": {
                        "type": "string",
                        "description": "YYYY-MM-DD or RFC 3339 timestamp with offset"
                    },
                    "end_time": {
                        "type": "string",
                        "description": "YYYY-MM-DD or RFC 3339 timestamp with offset"
                    },
                    "description": {
                        "type": "string",
                        "description": "Optional event description"
                    },
                    "location": {
                        "type": "string",
                        "description": "Optional event location"
                    },
                    "timezone": timezone_param(),
                    "format": format_param()
                },
                "required": ["calendar_id", "name", "start_time", "end_time"]
            }),
            Tool::EmailListMessages => json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Gmail search query (default: all mail)"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Max messages to return (default: 100, max: 500)"
                    },
                    "format": format_param()
                }
            }),
            Tool::EmailGetMessage => json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "description": "Message id from email_list_messages"
                    },
                    "format": format_param()
                },
                "required": ["id"]
            }),
            Tool::WebSearch => json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "format": format_param()
                },
                "required": ["query"]
            }),
            Tool::WeatherForecast => json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "City name, airport code or 'lat,lon'. Use current_location to find the user's location."
                    },
                    "format": format_param()
                },
                "required": ["location"]
            }),
        }
    }

    pub fn def(self) -> ToolDef {
        ToolDef {
            name: self.name(),
            description: self.description(),
            input_schema: self.input_schema(),
        }
    }
}

pub fn available_tools(configured: &[Capability]) -> Vec<ToolDef> {
    Tool::ALL
        .into_iter()
        .filter(|t| t.is_available(configured))
        .map(Tool::def)
        .collect()
}

fn format_param() -> Value {
    json!({
        "type": "string",
        "description": "Response format: 'compact' (default, one line per item, long text truncated), 'expanded' (full text), or 'full' (complete JSON with all fields).",
        "enum": ["compact", "expanded", "full"]
    })
}

fn timezone_param() -> Value {
    json!({
        "type": "string",
        "description": "The user's IANA timezone, e.g. Europe/Helsinki"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique_and_parse_back() {
        let names: HashSet<&str> = Tool::ALL.iter().map(|t| t.name()).collect();
        assert_eq!(names.len(), Tool::ALL.len());
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(Tool::from_name("send_email"), None);
    }

    #[test]
    fn always_on_tools_without_capabilities() {
        let names: Vec<&str> = available_tools(&[]).iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["current_date", "load_memory", "save_memory"]);
    }

    #[test]
    fn capability_filtering() {
        let tools = available_tools(&[Capability::Mail, Capability::Weather]);
        let names: Vec<&str> = tools.iter().map(|t| t.name).collect();
        assert!(names.contains(&"email_list_messages"));
        assert!(names.contains(&"weather_forecast"));
        assert!(!names.contains(&"calendar_list"));
        assert!(!names.contains(&"web_search"));
        assert_eq!(available_tools(&[
            Capability::Calendar,
            Capability::Mail,
            Capability::Search,
            Capability::Weather,
        ])
        .len(), Tool::ALL.len());
    }

    #[test]
    fn required_params_exist_in_properties() {
        for tool in Tool::ALL {
            let schema = tool.input_schema();
            assert_eq!(schema["type"], "object", "{}", tool.name());
            if let Some(required) = schema["required"].as_array() {
                for r in required {
                    let key = r.as_str().unwrap_or_default();
                    assert!(
                        schema["properties"].get(key).is_some(),
                        "{}: required '{key}' missing from properties",
                        tool.name()
                    );
                }
            }
        }
    }
}
