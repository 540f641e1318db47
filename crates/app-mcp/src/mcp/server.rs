use penny_assistant::format;
use penny_assistant::{AssistantService, EventDraft, Format};
use penny_error::{AgentError, ErrorResponse};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use super::tools::{self, Tool};
use super::types::*;

pub struct McpServer {
    agent: AssistantService,
}

impl McpServer {
    pub fn new(agent: AssistantService) -> Self {
        Self { agent }
    }

    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut lines = stdin.lines();

        debug!("MCP server started, waiting for requests on stdin");

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(resp) = self.handle_line(line).await {
                write_response(&mut stdout, &resp).await?;
            }
        }

        debug!("stdin closed, MCP server shutting down");
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<RpcResponse> {
        let msg: RpcMessage = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                return Some(RpcResponse::err(
                    Value::Null,
                    ErrorCode::Parse,
                    format!("parse error: {e}"),
                ))
            }
        };

        if msg.is_notification() {
            if msg.method() == "notifications/initialized" {
                debug!("client initialized");
            }
            return None;
        }

        let id = msg.id.clone().unwrap_or(Value::Null);

        if !msg.is_valid_jsonrpc() {
            return Some(RpcResponse::err(
                id,
                ErrorCode::InvalidRequest,
                "invalid jsonrpc version (expected \"2.0\")",
            ));
        }

        let resp = match msg.method() {
            "" => RpcResponse::err(id, ErrorCode::InvalidRequest, "missing method"),
            "initialize" => self.handle_initialize(id),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, msg.params).await,
            "ping" => RpcResponse::ok(id, json!({})),
            method => RpcResponse::err(
                id,
                ErrorCode::MethodNotFound,
                format!("unknown method: {method}"),
            ),
        };
        Some(resp)
    }

    fn handle_initialize(&self, id: Value) -> RpcResponse {
        let caps: Vec<String> = self
            .agent
            .capabilities()
            .iter()
            .map(|c| c.to_string())
            .collect();
        info!(?caps, "initialized with capabilities");

        RpcResponse::from_serialize(id, &InitializeResult::penny())
    }

    fn handle_tools_list(&self, id: Value) -> RpcResponse {
        let list = ToolList {
            tools: tools::available_tools(&self.agent.capabilities()),
        };
        RpcResponse::from_serialize(id, &list)
    }

    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> RpcResponse {
        let params: CallToolParams = match params.and_then(|v| serde_json::from_value(v).ok()) {
            Some(p) => p,
            None => {
                return RpcResponse::err(id, ErrorCode::InvalidParams, "missing or invalid params")
            }
        };

        let args = params.arguments.unwrap_or(json!({}));
        let result = ToolResult::from(self.dispatch_tool(&params.name, &args).await);
        RpcResponse::from_serialize(id, &result)
    }

    async fn dispatch_tool(&self, name: &str, args: &Value) -> Result<String, String> {
        let Some(tool) = Tool::from_name(name) else {
            warn!(tool = name, "unknown tool called");
            return Err(format!("unknown tool: {name}"));
        };
        if let Some(cap) = tool.capability() {
            if !self.agent.has(cap) {
                return Err(fmt_err(AgentError::not_configured(format!(
                    "{name} needs the {cap} capability, which is not configured"
                ))));
            }
        }

        debug!(tool = name, "tool call");
        let fmt = Format::parse(args.get("format").and_then(|v| v.as_str()));

        match tool {
            Tool::CurrentDate => self
                .agent
                .current_date(get_str_opt(args, "timezone"))
                .map_err(fmt_err),
            Tool::LoadMemory => self.agent.load_memory().await.map_err(fmt_err),
            Tool::SaveMemory => {
                let memory = get_str(args, "memory")?;
                self.agent.save_memory(memory).await.map_err(fmt_err)?;
                Ok(format!("Memory saved ({} chars)", memory.chars().count()))
            }
            Tool::CalendarList => {
                let calendars = self.agent.list_calendars().await.map_err(fmt_err)?;
                Ok(format::format_calendars(&calendars, fmt))
            }
            Tool::CalendarListEvents => {
                let start = get_str(args, "start_time")?;
                let end = get_str(args, "end_time")?;
                let tz = get_str(args, "timezone")?;
                let ids = get_str_array_opt(args, "calendar_ids")?;
                let events = self
                    .agent
                    .list_events(start, end, tz, ids.as_deref())
                    .await
                    .map_err(fmt_err)?;
                Ok(format::format_events(&events, fmt))
            }
            Tool::CalendarCreateEvent => {
                let draft = EventDraft {
                    calendar_id: get_str(args, "calendar_id")?.to_string(),
                    name: get_str(args, "name")?.to_string(),
                    start_time: get_str(args, "start_time")?.to_string(),
                    end_time: get_str(args, "end_time")?.to_string(),
                    description: get_str_opt(args, "description").map(str::to_string),
                    location: get_str_opt(args, "location").map(str::to_string),
                    timezone: get_str_opt(args, "timezone").map(str::to_string),
                };
                let event = self.agent.create_event(draft).await.map_err(fmt_err)?;
                Ok(format!("Created: {}", format::format_event(&event, fmt)))
            }
            Tool::EmailListMessages => {
                let query = get_str_opt(args, "query");
                let max = args
                    .get("max_results")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize;
                let messages = self
                    .agent
                    .list_messages(query, max)
                    .await
                    .map_err(fmt_err)?;
                Ok(format::format_mail_messages(&messages, fmt))
            }
            Tool::EmailGetMessage => {
                let id = get_str(args, "id")?;
                let message = self.agent.get_message(id).await.map_err(fmt_err)?;
                Ok(format::format_mail_message(&message, fmt))
            }
            Tool::WebSearch => {
                let query = get_str(args, "query")?;
                let results = self.agent.web_search(query).await.map_err(fmt_err)?;
                Ok(format::format_search_results(&results, fmt))
            }
            Tool::CurrentLocation => {
                let location = self.agent.current_location().await.map_err(fmt_err)?;
                Ok(format::format_location(&location, fmt))
            }
            Tool::WeatherForecast => {
                let location = get_str(args, "location")?;
                let forecast = self
                    .agent
                    .weather_forecast(location)
                    .await
                    .map_err(fmt_err)?;
                Ok(format::format_forecast(&forecast, fmt))
            }
        }
    }
}

fn fmt_err(e: AgentError) -> String {
    let resp = ErrorResponse::from(&e);
    resp.to_compact()
}

fn get_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or(format!("missing '{key}' parameter"))
}

fn get_str_opt<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn get_str_array_opt(args: &Value, key: &str) -> Result<Option<Vec<String>>, String> {
    let Some(value) = args.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let arr = value
        .as_array()
        .ok_or(format!("'{key}' must be an array of strings"))?;
    arr.iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or(format!("'{key}[{i}]' is not a string"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

async fn write_response(
    stdout: &mut tokio::io::Stdout,
    resp: &RpcResponse,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string(resp)?;
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
