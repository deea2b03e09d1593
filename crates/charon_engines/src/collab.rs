#![forbid(unsafe_code)]

use std::env;
use std::time::Duration;

use charon_kernel_contracts::collab::{EnhanceDirective, EnhanceOutcome};
use charon_kernel_contracts::style::PromptStyle;
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "microsoft/phi-4-reasoning-plus:free";
const DEFAULT_APP_TITLE: &str = "Charon Prompt Gateway";
const DEFAULT_TIMEOUT_MS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCallError {
    pub provider: &'static str,
    pub http_status: Option<u16>,
    pub error_kind: &'static str,
}

impl ProviderCallError {
    fn new(provider: &'static str, error_kind: &'static str, http_status: Option<u16>) -> Self {
        Self {
            provider,
            http_status,
            error_kind,
        }
    }

    pub fn safe_detail(&self) -> String {
        match self.http_status {
            Some(status) => format!(
                "provider={} error={} status={}",
                self.provider, self.error_kind, status
            ),
            None => format!("provider={} error={}", self.provider, self.error_kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollabConfig {
    pub base_url: String,
    pub model: String,
    pub app_title: String,
    pub user_agent: String,
    pub timeout_ms: u32,
    /// Canned chat-completions response body for tests; set means no
    /// network is touched.
    pub fixture_json: Option<String>,
}

impl CollabConfig {
    pub fn mvp_v1() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            app_title: DEFAULT_APP_TITLE.to_string(),
            user_agent: "charon-collab/1.0".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            fixture_json: None,
        }
    }

    pub fn from_env() -> Self {
        Self {
            base_url: env::var("CHARON_COLLAB_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: env::var("CHARON_COLLAB_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            app_title: env::var("CHARON_COLLAB_APP_TITLE")
                .unwrap_or_else(|_| DEFAULT_APP_TITLE.to_string()),
            user_agent: env::var("CHARON_HTTP_USER_AGENT")
                .unwrap_or_else(|_| "charon-collab/1.0".to_string()),
            timeout_ms: env::var("CHARON_COLLAB_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|v| (500..=120_000).contains(v))
                .unwrap_or(DEFAULT_TIMEOUT_MS),
            fixture_json: None,
        }
    }
}

/// Client for the enhancement collaborator (OpenRouter-compatible
/// chat-completions endpoint). Callers hold the deduction open around
/// this call and roll back on any error it returns.
#[derive(Debug, Clone)]
pub struct CollabClient {
    config: CollabConfig,
}

impl CollabClient {
    pub fn new(config: CollabConfig) -> Self {
        Self { config }
    }

    pub fn enhance(
        &self,
        api_key: &str,
        directive: &EnhanceDirective,
    ) -> Result<EnhanceOutcome, ProviderCallError> {
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system_instruction(&directive.style) },
                { "role": "user", "content": directive.prompt.as_str() }
            ],
            "temperature": 0.7,
            "max_tokens": 2000,
        });

        let body: Value = if let Some(fixture) = self.config.fixture_json.as_deref() {
            serde_json::from_str(fixture)
                .map_err(|_| ProviderCallError::new("openrouter", "json_parse", None))?
        } else {
            let endpoint = format!("{}/chat/completions", self.config.base_url);
            self.post_json(&endpoint, api_key, &payload)?
        };

        let content = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ProviderCallError::new("openrouter", "empty_completion", None))?;

        EnhanceOutcome::v1(content.to_string())
            .map_err(|_| ProviderCallError::new("openrouter", "malformed_response", None))
    }

    fn post_json(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
    ) -> Result<Value, ProviderCallError> {
        let agent = build_http_agent(self.config.timeout_ms, &self.config.user_agent)
            .map_err(|_| ProviderCallError::new("openrouter", "config_invalid", None))?;
        let response = agent
            .post(endpoint)
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {api_key}"))
            .set("Accept", "application/json")
            .set("X-Title", &self.config.app_title)
            .send_json(payload.clone())
            .map_err(|e| provider_error_from_ureq("openrouter", e))?;
        serde_json::from_reader(response.into_reader())
            .map_err(|_| ProviderCallError::new("openrouter", "json_parse", None))
    }
}

/// Folds the validated style options into the collaborator's system
/// instruction. The wording stays minimal; the recognized vocabulary is
/// enforced upstream at the boundary.
fn system_instruction(style: &PromptStyle) -> String {
    format!(
        "You are an expert prompt engineer. Rewrite the user's prompt for a {role}. \
         Description level: {description}. Output length: {length}. \
         Format: {format}. Tone: {tone}. \
         Return only the rewritten prompt, with no commentary.",
        role = style.target_role,
        description = style.description.as_str(),
        length = style.length.as_str(),
        format = style.format.as_str(),
        tone = style.tone.as_str(),
    )
}

fn build_http_agent(timeout_ms: u32, user_agent: &str) -> Result<ureq::Agent, String> {
    if timeout_ms == 0 {
        return Err("timeout must be > 0".to_string());
    }
    let timeout = Duration::from_millis(u64::from(timeout_ms).max(100));
    Ok(ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(user_agent)
        .build())
}

fn provider_error_from_ureq(provider: &'static str, err: ureq::Error) -> ProviderCallError {
    match err {
        ureq::Error::Status(status, _) => {
            ProviderCallError::new(provider, "http_non_200", Some(status as u16))
        }
        ureq::Error::Transport(transport) => {
            let combined = format!("{:?} {}", transport.kind(), transport);
            ProviderCallError::new(provider, classify_transport_error_kind(&combined), None)
        }
    }
}

fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}
