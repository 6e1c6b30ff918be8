use anyhow::{Result, bail};
use std::env;
use std::fmt;

pub const API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";
pub const API_URL_ENV_VAR: &str = "OPENROUTER_API_URL";
pub const TIMEOUT_ENV_VAR: &str = "ASK_TIMEOUT_SECS";

pub const MODEL: &str = "deepseek/deepseek-chat-v3-0324:free";
pub const APP_TITLE: &str = "ask";

const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;

pub const SYSTEM_PROMPT: &str = r#"
You are a helpful assistant. Please provide concise and accurate answers.
Format your answers clearly. Don't be too chatty. Be stoic and to the point.
Example:

User: What is 2+2
Assistant: 4

User: What is the capital of France?
Assistant: Paris

User: Give me python code to generate the Nth Fibonacci number.
Assistant: ```python
def fibonacci(n):
    a, b = 0, 1
    for _ in range(n):
        a, b = b, a + b
    return a
```
"#;

#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub system_prompt: String,
    pub request_timeout_secs: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| env::var(key).ok())
    }

    pub fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Result<Self> {
        let Some(api_key) = parse_api_key(get_var(API_KEY_ENV_VAR).as_deref()) else {
            bail!("Environment variable {API_KEY_ENV_VAR} is not set.");
        };
        let api_url = parse_api_url(get_var(API_URL_ENV_VAR).as_deref());
        let request_timeout_secs = parse_request_timeout_secs(get_var(TIMEOUT_ENV_VAR).as_deref());

        Ok(Self {
            api_key,
            api_url,
            model: MODEL.to_string(),
            system_prompt: SYSTEM_PROMPT.trim().to_string(),
            request_timeout_secs,
        })
    }
}

fn parse_api_key(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_api_url(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_API_URL)
        .to_string()
}

fn parse_request_timeout_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
}
