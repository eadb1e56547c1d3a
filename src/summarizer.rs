//! LLM summarizer abstraction and providers.
//!
//! Defines the [`Summarizer`] trait and three HTTP implementations:
//! - **[`GeminiSummarizer`]**: Google Generative Language `generateContent`.
//! - **[`OpenAiSummarizer`]**: OpenAI-compatible `chat/completions`.
//! - **[`OllamaSummarizer`]**: a local Ollama instance's `/api/generate`.
//!
//! Use [`create_summarizer`] to build the provider named by `[llm] type`.
//! Every provider receives the same input: the prompt sections followed by
//! `Information:` and the JSON context (see [`message_parts`]). Calls are
//! made once; a failure propagates to the caller.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::LlmConfig;
use crate::error::SparkError;

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";

const GEMINI_MODEL: &str = "gemini-2.5-flash";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const OLLAMA_MODEL: &str = "llama3.2";

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Provider and model, for logging.
    fn describe(&self) -> String;

    /// Generate a Markdown answer for the prompt sections and context.
    async fn generate(&self, sections: &[String], context: &Value) -> Result<String>;
}

/// The text parts sent to a provider: the sections, then the context.
pub fn message_parts(sections: &[String], context: &Value) -> Result<Vec<String>> {
    let mut parts = sections.to_vec();
    parts.push("Information:".to_string());
    parts.push(serde_json::to_string(context)?);
    Ok(parts)
}

/// Build the summarizer configured in `[llm]`.
///
/// The API key comes from `llm.api_key`, falling back to `GEMINI_API_KEY`
/// or `OPENAI_API_KEY`. Ollama needs none.
pub fn create_summarizer(
    config: &LlmConfig,
    client: reqwest::Client,
) -> Result<Box<dyn Summarizer>> {
    let url = |default: &str| {
        config
            .url
            .clone()
            .unwrap_or_else(|| default.to_string())
            .trim_end_matches('/')
            .to_string()
    };
    let model = |default: &str| config.model.clone().unwrap_or_else(|| default.to_string());

    match config.kind.as_str() {
        "gemini" => Ok(Box::new(GeminiSummarizer {
            client,
            url: url(GEMINI_URL),
            model: model(GEMINI_MODEL),
            api_key: api_key(config, "GEMINI_API_KEY")?,
        })),
        "openai" => Ok(Box::new(OpenAiSummarizer {
            client,
            url: url(OPENAI_URL),
            model: model(OPENAI_MODEL),
            api_key: api_key(config, "OPENAI_API_KEY")?,
        })),
        "ollama" => Ok(Box::new(OllamaSummarizer {
            client,
            url: url(OLLAMA_URL),
            model: model(OLLAMA_MODEL),
        })),
        other => bail!("Unknown llm type: {}", other),
    }
}

fn api_key(config: &LlmConfig, env: &str) -> Result<String> {
    if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    std::env::var(env)
        .ok()
        .filter(|k| !k.is_empty())
        .with_context(|| format!("llm.api_key not set and {} not in the environment", env))
}

/// POST a JSON body and return the JSON answer; non-2xx is a provider error.
async fn post_json(request: reqwest::RequestBuilder, body: &Value, provider: &str) -> Result<Value> {
    let response = request
        .json(body)
        .send()
        .await
        .with_context(|| format!("{} request failed", provider))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| error_message(&v))
            .unwrap_or(text);
        return Err(SparkError::Provider(format!("{} API error {}: {}", provider, status, message)).into());
    }

    Ok(response.json().await?)
}

/// `{"error": {"message": ...}}` or `{"error": "..."}`.
fn error_message(json: &Value) -> Option<String> {
    let error = json.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(str::to_string)
}

// ============ Gemini ============

pub struct GeminiSummarizer {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    fn describe(&self) -> String {
        format!("gemini:{}", self.model)
    }

    async fn generate(&self, sections: &[String], context: &Value) -> Result<String> {
        let parts: Vec<Value> = message_parts(sections, context)?
            .into_iter()
            .map(|text| json!({ "text": text }))
            .collect();
        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
        });

        let model = self.model.trim_start_matches("models/");
        let request = self
            .client
            .post(format!("{}/models/{}:generateContent", self.url, model))
            .header("x-goog-api-key", &self.api_key);

        let json = post_json(request, &body, "Gemini").await?;
        parse_gemini_response(&json)
    }
}

/// First non-empty text part of the first candidate that has one.
pub fn parse_gemini_response(json: &Value) -> Result<String> {
    if let Some(message) = error_message(json) {
        return Err(SparkError::Provider(message).into());
    }

    let candidates = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidates"))?;

    candidates
        .iter()
        .filter_map(|c| c.pointer("/content/parts").and_then(|p| p.as_array()))
        .flatten()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .find(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SparkError::Provider("Gemini returned no text".into()).into())
}

// ============ OpenAI ============

pub struct OpenAiSummarizer {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn describe(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn generate(&self, sections: &[String], context: &Value) -> Result<String> {
        let content: Vec<Value> = message_parts(sections, context)?
            .into_iter()
            .map(|text| json!({ "type": "text", "text": text }))
            .collect();
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
        });

        let request = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .bearer_auth(&self.api_key);

        let json = post_json(request, &body, "OpenAI").await?;
        parse_openai_response(&json)
    }
}

/// Content of the first choice with a non-empty message.
pub fn parse_openai_response(json: &Value) -> Result<String> {
    let choices = json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices"))?;

    choices
        .iter()
        .filter_map(|c| c.pointer("/message/content").and_then(|t| t.as_str()))
        .find(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SparkError::Provider("OpenAI returned no content".into()).into())
}

// ============ Ollama ============

pub struct OllamaSummarizer {
    client: reqwest::Client,
    url: String,
    model: String,
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    fn describe(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn generate(&self, sections: &[String], context: &Value) -> Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": message_parts(sections, context)?.join("\n"),
            "stream": false,
        });

        let request = self.client.post(format!("{}/api/generate", self.url));
        let json = post_json(request, &body, "Ollama")
            .await
            .with_context(|| format!("Is Ollama running at {}?", self.url))?;
        parse_ollama_response(&json)
    }
}

pub fn parse_ollama_response(json: &Value) -> Result<String> {
    if let Some(message) = error_message(json) {
        return Err(SparkError::Provider(message).into());
    }
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response"))
}
