mod mcp;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use penny_assistant::AssistantService;
use penny_google::{GoogleAdapter, HttpGoogleApi, OAuthClient, OAuthConfig};
use penny_store::{FileMemoryStore, TokenStore};
use penny_web::{PerplexityAdapter, PerplexityConfig, WeatherAdapter};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use url::Url;

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8085/";
const DEFAULT_DATA_DIR: &str = "~/.local/share/agent-penny";

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("penny=info"));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    if env::var("PENNY_LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

struct StoreConfig {
    data_dir: PathBuf,
    user: String,
}

fn load_google_config() -> Result<OAuthConfig, String> {
    let client_id = env::var("OAUTH_GOOGLE_CLIENT_ID")
        .map_err(|_| "OAUTH_GOOGLE_CLIENT_ID env var not set".to_string())?;
    let client_secret = env::var("OAUTH_GOOGLE_CLIENT_SECRET")
        .map_err(|_| "OAUTH_GOOGLE_CLIENT_SECRET env var not set".to_string())?;
    let redirect_uri =
        env::var("OAUTH_GOOGLE_REDIRECT_URI").unwrap_or_else(|_| DEFAULT_REDIRECT_URI.to_string());
    Ok(OAuthConfig {
        client_id,
        client_secret,
        redirect_uri,
    })
}

fn load_store_config() -> Result<StoreConfig, String> {
    let user = env::var("PENNY_USER")
        .map_err(|_| "PENNY_USER env var not set (your Google e-mail address)".to_string())?;
    let raw = env::var("DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
    let data_dir = expand_home(&raw);

    std::fs::create_dir_all(&data_dir)
        .map_err(|e| format!("failed to create {}: {e}", data_dir.display()))?;

    Ok(StoreConfig { data_dir, user })
}

fn load_search_config() -> Result<PerplexityConfig, String> {
    let api_key = env::var("PERPLEXITY_API_KEY")
        .map_err(|_| "PERPLEXITY_API_KEY env var not set".to_string())?;
    Ok(PerplexityConfig { api_key })
}

fn weather_enabled() -> bool {
    !matches!(
        env::var("PENNY_WEATHER").as_deref(),
        Ok("off" | "0" | "false")
    )
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(rest)
        }
        None => PathBuf::from(path),
    }
}

/// Accepts either the bare code or the whole redirect URL the browser landed on.
fn extract_code(input: &str, expected_state: &str) -> Result<String, String> {
    let input = input.trim();
    if !input.contains("code=") && !input.contains("error=") {
        return Ok(input.to_string());
    }

    let url = Url::parse(input).map_err(|e| format!("invalid redirect URL: {e}"))?;
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    if let Some(err) = param("error") {
        return Err(format!("consent was not granted: {err}"));
    }
    if let Some(state) = param("state") {
        if state != expected_state {
            return Err("state mismatch; start `penny auth` again".to_string());
        }
    }
    param("code").ok_or_else(|| "redirect URL has no code".to_string())
}

async fn run_auth() -> Result<(), Box<dyn std::error::Error>> {
    let google = load_google_config()?;
    let store = load_store_config()?;
    let tokens = TokenStore::new(&store.data_dir, &store.user)?;
    let oauth = OAuthClient::new(google);

    let state = format!(
        "penny-{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    );

    eprintln!("Penny: Google Authentication");
    eprintln!("=============================");
    eprintln!("Open this URL in a browser and grant access:");
    eprintln!();
    eprintln!("{}", oauth.authorize_url(&state)?);
    eprintln!();
    eprintln!("Then paste the code (or the full URL you were redirected to):");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let input = lines.next_line().await?.ok_or("no input on stdin")?;
    let code = extract_code(&input, &state)?;

    let pair = oauth.exchange(&code).await?;
    let email = oauth.user_email(&pair.access_token).await?;
    if !email.eq_ignore_ascii_case(&store.user) {
        warn!(%email, user = %store.user, "signed-in account differs from PENNY_USER");
    }
    tokens.save_tokens(&pair).await?;

    eprintln!();
    eprintln!("Authenticated as: {email}");
    eprintln!("Tokens saved to {}", tokens.path().display());
    eprintln!("You can now run `penny mcp`");
    Ok(())
}

async fn run_mcp_server() -> Result<(), Box<dyn std::error::Error>> {
    let store = load_store_config()?;
    let memory = FileMemoryStore::new(&store.data_dir, &store.user)?;
    let mut agent = AssistantService::new(Arc::new(memory));

    match load_google_config() {
        Ok(cfg) => {
            let token_store = TokenStore::new(&store.data_dir, &store.user)?;
            match token_store.load_tokens().await {
                Ok(pair) => {
                    let api = HttpGoogleApi::new(OAuthClient::new(cfg), pair);
                    let adapter = Arc::new(GoogleAdapter::new(api));
                    agent.register_calendar(adapter.clone());
                    agent.register_mail(adapter);
                    info!("google configured");
                }
                Err(e) => info!("google not configured: {e}"),
            }
        }
        Err(e) => info!("google not configured: {e}"),
    }

    match load_search_config() {
        Ok(cfg) => {
            agent.register_search(Arc::new(PerplexityAdapter::new(cfg)));
            info!("web search configured");
        }
        Err(e) => info!("web search not configured: {e}"),
    }

    if weather_enabled() {
        agent.register_weather(Arc::new(WeatherAdapter::new()));
    } else {
        info!("weather disabled by PENNY_WEATHER");
    }

    let server = mcp::McpServer::new(agent);
    server.run().await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("mcp");

    let result = match cmd {
        "auth" => run_auth().await,
        "mcp" => run_mcp_server().await,
        "help" | "--help" | "-h" => {
            eprintln!("Penny: personal assistant tools over MCP");
            eprintln!();
            eprintln!("Usage:");
            eprintln!("  penny auth   Sign in with Google (interactive)");
            eprintln!("  penny mcp    Start MCP server (stdio)");
            eprintln!("  penny help   Show this help");
            eprintln!();
            eprintln!("Environment variables:");
            eprintln!("  PENNY_USER                  Your Google e-mail address (required)");
            eprintln!("  OAUTH_GOOGLE_CLIENT_ID      Google OAuth client id");
            eprintln!("  OAUTH_GOOGLE_CLIENT_SECRET  Google OAuth client secret");
            eprintln!("  OAUTH_GOOGLE_REDIRECT_URI   Redirect URI (default: {DEFAULT_REDIRECT_URI})");
            eprintln!("  DATA_DIR                    Data directory (default: {DEFAULT_DATA_DIR})");
            eprintln!("  PERPLEXITY_API_KEY          Enables web_search");
            eprintln!("  PENNY_WEATHER               Set to 'off' to disable weather tools");
            eprintln!("  RUST_LOG                    Log level (default: penny=info)");
            eprintln!("  PENNY_LOG_FORMAT            Set to 'json' for JSON logs");
            Ok(())
        }
        unknown => {
            eprintln!("Unknown command: {unknown}");
            eprintln!("Run `penny help` for usage");
            return;
        }
    };

    if let Err(e) = result {
        error!(%e, "fatal error");
        std::process::exit(1);
    }
}
