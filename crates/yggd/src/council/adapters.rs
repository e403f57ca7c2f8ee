//! Model adapters: a uniform wrapper over external model providers.
//!
//! Each adapter binds one council member to one provider model. The only
//! contract is `query(prompt) -> reply` plus an availability probe; an
//! unavailable adapter is skipped, never failed. Every call carries an
//! explicit timeout, and a timeout is reported as unavailability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use ygg_common::council::CouncilMember;
use ygg_common::{YggError, YggResult};

use crate::config::YggConfig;

/// What an adapter returns for one prompt.
#[derive(Debug, Clone)]
pub struct AdapterReply {
    pub content: String,
    /// Self-reported confidence 0-100, parsed from the reply tail.
    pub confidence: u8,
    pub reasoning: Option<String>,
    pub model: Option<String>,
}

/// The adapter contract. Availability is a capability, not a type: the
/// registry holds whichever adapters currently have credentials.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    fn member(&self) -> CouncilMember;
    fn model_id(&self) -> &str;
    async fn is_available(&self) -> bool;
    async fn query(&self, prompt: &str) -> YggResult<AdapterReply>;
}

// ============================================================================
// Reply parsing
// ============================================================================

/// Split the protocol tail (`CONFIDENCE:` / `REASONING:` lines) off a raw
/// member reply. Missing confidence defaults to 50.
pub fn parse_member_reply(raw: &str) -> (String, u8, Option<String>) {
    let mut confidence: Option<u8> = None;
    let mut reasoning: Option<String> = None;
    let mut content_lines: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("CONFIDENCE:") {
            if let Ok(v) = rest.trim().trim_end_matches('%').parse::<u32>() {
                confidence = Some(v.min(100) as u8);
                continue;
            }
        }
        if let Some(rest) = trimmed.strip_prefix("REASONING:") {
            reasoning = Some(rest.trim().to_string());
            continue;
        }
        content_lines.push(line);
    }

    let content = content_lines.join("\n").trim().to_string();
    (content, confidence.unwrap_or(50), reasoning)
}

// ============================================================================
// OpenAI-compatible chat adapters (Groq, OpenRouter)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Adapter for OpenAI-compatible chat completion endpoints.
pub struct ChatCompletionAdapter {
    member: CouncilMember,
    model: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl ChatCompletionAdapter {
    pub fn groq(member: CouncilMember, model: &str, api_key: &str, timeout: Duration) -> Self {
        Self::new(
            member,
            model,
            "https://api.groq.com/openai/v1/chat/completions",
            api_key,
            timeout,
        )
    }

    pub fn openrouter(member: CouncilMember, model: &str, api_key: &str, timeout: Duration) -> Self {
        Self::new(
            member,
            model,
            "https://openrouter.ai/api/v1/chat/completions",
            api_key,
            timeout,
        )
    }

    fn new(
        member: CouncilMember,
        model: &str,
        endpoint: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            member,
            model: model.to_string(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl LlmAdapter for ChatCompletionAdapter {
    fn member(&self) -> CouncilMember {
        self.member
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn query(&self, prompt: &str) -> YggResult<AdapterReply> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.member.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
        };

        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| YggError::AdapterTimeout(self.timeout.as_millis() as u64))?
            .map_err(|e| YggError::AdapterUnavailable(format!("{}: {}", self.member, e)))?;

        if !response.status().is_success() {
            return Err(YggError::AdapterUnavailable(format!(
                "{}: http {}",
                self.member,
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| YggError::AdapterUnavailable(format!("{}: bad body: {}", self.member, e)))?;
        let raw = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| YggError::AdapterUnavailable(format!("{}: empty choices", self.member)))?;

        let (content, confidence, reasoning) = parse_member_reply(&raw);
        debug!(member = %self.member, confidence, "adapter reply");
        Ok(AdapterReply {
            content,
            confidence,
            reasoning,
            model: Some(self.model.clone()),
        })
    }
}

// ============================================================================
// Gemini adapter
// ============================================================================

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    parts: Vec<GeminiReplyPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyPart {
    text: String,
}

/// Adapter for the Gemini `generateContent` endpoint.
pub struct GeminiAdapter {
    member: CouncilMember,
    model: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl GeminiAdapter {
    pub fn new(member: CouncilMember, model: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            member,
            model: model.to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl LlmAdapter for GeminiAdapter {
    fn member(&self) -> CouncilMember {
        self.member
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn query(&self, prompt: &str) -> YggResult<AdapterReply> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = GeminiRequest {
            system_instruction: GeminiContent {
                parts: vec![GeminiPart {
                    text: self.member.system_prompt(),
                }],
            },
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
        };

        let request = self.client.post(&url).json(&body).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| YggError::AdapterTimeout(self.timeout.as_millis() as u64))?
            .map_err(|e| YggError::AdapterUnavailable(format!("{}: {}", self.member, e)))?;

        if !response.status().is_success() {
            return Err(YggError::AdapterUnavailable(format!(
                "{}: http {}",
                self.member,
                response.status()
            )));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| YggError::AdapterUnavailable(format!("{}: bad body: {}", self.member, e)))?;
        let raw = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| YggError::AdapterUnavailable(format!("{}: empty candidates", self.member)))?;

        let (content, confidence, reasoning) = parse_member_reply(&raw);
        Ok(AdapterReply {
            content,
            confidence,
            reasoning,
            model: Some(self.model.clone()),
        })
    }
}

// ============================================================================
// Fake adapter for deterministic tests
// ============================================================================

/// In-process adapter with a canned reply. No network.
pub struct FakeAdapter {
    member: CouncilMember,
    reply: AdapterReply,
    available: bool,
    delay: Duration,
}

impl FakeAdapter {
    pub fn new(member: CouncilMember, content: &str, confidence: u8) -> Self {
        Self {
            member,
            reply: AdapterReply {
                content: content.to_string(),
                confidence,
                reasoning: None,
                model: Some("fake".to_string()),
            },
            available: true,
            delay: Duration::ZERO,
        }
    }

    pub fn with_reasoning(mut self, reasoning: &str) -> Self {
        self.reply.reasoning = Some(reasoning.to_string());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl LlmAdapter for FakeAdapter {
    fn member(&self) -> CouncilMember {
        self.member
    }

    fn model_id(&self) -> &str {
        "fake"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn query(&self, _prompt: &str) -> YggResult<AdapterReply> {
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.reply.clone())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// The set of capable adapters, keyed by member.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<CouncilMember, Arc<dyn LlmAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the production bindings from configured provider keys.
    /// Members without a keyed provider simply stay unregistered.
    pub fn from_config(config: &YggConfig) -> Self {
        let timeout = Duration::from_millis(config.adapter_timeout_ms);
        let mut registry = Self::new();

        if let Some(key) = &config.groq_api_key {
            registry.insert(Arc::new(ChatCompletionAdapter::groq(
                CouncilMember::Kvasir,
                "llama-3.3-70b-versatile",
                key,
                timeout,
            )));
            registry.insert(Arc::new(ChatCompletionAdapter::groq(
                CouncilMember::Saga,
                "llama-3.1-8b-instant",
                key,
                timeout,
            )));
            registry.insert(Arc::new(ChatCompletionAdapter::groq(
                CouncilMember::Loki,
                "llama-3.3-70b-versatile",
                key,
                timeout,
            )));
        }
        if let Some(key) = &config.gemini_api_key {
            registry.insert(Arc::new(GeminiAdapter::new(
                CouncilMember::Bragi,
                "gemini-2.0-flash",
                key,
                timeout,
            )));
            registry.insert(Arc::new(GeminiAdapter::new(
                CouncilMember::Syn,
                "gemini-2.0-flash-lite",
                key,
                timeout,
            )));
        }
        if let Some(key) = &config.openrouter_api_key {
            registry.insert(Arc::new(ChatCompletionAdapter::openrouter(
                CouncilMember::Nornes,
                "deepseek/deepseek-chat",
                key,
                timeout,
            )));
        }

        if registry.adapters.is_empty() {
            warn!("no provider keys configured - council will deadlock on every query");
        }
        registry
    }

    pub fn insert(&mut self, adapter: Arc<dyn LlmAdapter>) {
        self.adapters.insert(adapter.member(), adapter);
    }

    pub fn get(&self, member: CouncilMember) -> Option<Arc<dyn LlmAdapter>> {
        self.adapters.get(&member).cloned()
    }

    pub fn registered_members(&self) -> Vec<CouncilMember> {
        self.adapters.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
