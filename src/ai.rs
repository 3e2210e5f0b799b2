/// AI classification adapter
///
/// Wraps a chat-completion endpoint. The model is shown the tabs by position
/// and answers with `{"groups": [{"name", "color", "tabIds": [index, ...]}]}`.
/// Every failure on this path turns into "no AI groups".
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

use crate::color::GroupColor;
use crate::error::ClassifierError;
use crate::storage::{AiProviderConfig, Settings};
use crate::tab_data::{CandidateGroup, Tab};

/// AI suggestions with fewer tabs than this are not actionable
pub const MIN_AI_GROUP_SIZE: usize = 2;
pub const TEMPERATURE: f32 = 0.2;
pub const MAX_TOKENS: u32 = 4000;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a browser tab grouping assistant.
Group the user's tabs by topic and content similarity.
Reply with JSON in the form: { \"groups\": [{ \"name\": \"group name\", \"color\": \"color\", \"tabIds\": [tab indices] }] }
Available colors: \"blue\", \"red\", \"green\", \"yellow\", \"purple\", \"cyan\", \"orange\", \"pink\", \"grey\"
A tab's index is its zero-based position in the list you are given.
Create at most 5 groups, each with at least 2 tabs.
Tabs that fit no group may go into a group named \"Other\".";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Everything the transport needs for one POST
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub url: String,
    pub api_key: String,
    pub body: ChatCompletionRequest,
}

/// Raw HTTP outcome as seen by the transport
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct TabPrompt<'a> {
    title: &'a str,
    url: &'a str,
}

/// The HTTP transport to the classifier. Timeouts are the transport's business.
#[allow(async_fn_in_trait)]
pub trait ChatClient {
    async fn post(&self, request: &ChatRequest) -> Result<HttpReply, ClassifierError>;
}

impl<T: ChatClient> ChatClient for &T {
    async fn post(&self, request: &ChatRequest) -> Result<HttpReply, ClassifierError> {
        (**self).post(request).await
    }
}

/// Outcome of one classification attempt
#[derive(Debug)]
pub enum ClassifierResult {
    Groups(Vec<CandidateGroup>),
    /// Not attempted: no credential, or AI turned off
    Skipped(ClassifierError),
    Failed(ClassifierError),
}

impl ClassifierResult {
    pub fn into_groups(self) -> Vec<CandidateGroup> {
        match self {
            ClassifierResult::Groups(groups) => groups,
            ClassifierResult::Skipped(reason) => {
                log::warn!("Skipping AI grouping: {}", reason);
                Vec::new()
            }
            ClassifierResult::Failed(e) => {
                log::error!("AI grouping failed: {}", e);
                Vec::new()
            }
        }
    }
}

pub struct AiClassifier<C> {
    client: C,
}

impl<C: ChatClient> AiClassifier<C> {
    pub fn new(client: C) -> Self {
        AiClassifier { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Classify `tabs`, degrading every failure to an empty result
    pub async fn classify(&self, tabs: &[Tab], settings: &Settings, force: bool) -> Vec<CandidateGroup> {
        self.try_classify(tabs, settings, force).await.into_groups()
    }

    pub async fn try_classify(&self, tabs: &[Tab], settings: &Settings, force: bool) -> ClassifierResult {
        let config = &settings.ai_provider;
        if !config.is_configured() {
            return ClassifierResult::Skipped(ClassifierError::ConfigurationMissing);
        }
        if !settings.ai_enabled && !force {
            return ClassifierResult::Skipped(ClassifierError::Disabled);
        }

        match self.request_groups(tabs, config).await {
            Ok(groups) => {
                log::info!("AI suggested {} groups", groups.len());
                ClassifierResult::Groups(groups)
            }
            Err(e) => ClassifierResult::Failed(e),
        }
    }

    async fn request_groups(&self, tabs: &[Tab], config: &AiProviderConfig) -> Result<Vec<CandidateGroup>, ClassifierError> {
        let request = build_request(tabs, config)?;
        let reply = self.client.post(&request).await?;
        let content = read_reply(&reply)?;
        parse_groups(&content, tabs, &Uuid::new_v4().to_string())
    }
}

/// `{endpoint}/v1/chat/completions`, tolerating endpoints that already end in `/v1`
pub fn chat_url(endpoint: &str) -> String {
    let base = endpoint.trim().trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);
    format!("{}/v1/chat/completions", base)
}

pub fn build_request(tabs: &[Tab], config: &AiProviderConfig) -> Result<ChatRequest, ClassifierError> {
    let tab_data: Vec<TabPrompt> = tabs
        .iter()
        .map(|tab| TabPrompt {
            title: if tab.title.is_empty() { "Untitled" } else { tab.title.as_str() },
            url: tab.url.as_deref().unwrap_or(""),
        })
        .collect();

    let system_prompt = if config.system_prompt.trim().is_empty() {
        DEFAULT_SYSTEM_PROMPT.to_string()
    } else {
        config.system_prompt.clone()
    };

    Ok(ChatRequest {
        url: chat_url(&config.endpoint),
        api_key: config.api_key.clone(),
        body: ChatCompletionRequest {
            model: config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("Group the following tabs:\n{}", serde_json::to_string_pretty(&tab_data)?),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        },
    })
}

/// Pull the assistant message text out of an HTTP reply
fn read_reply(reply: &HttpReply) -> Result<String, ClassifierError> {
    let parsed: Option<ChatCompletionResponse> = serde_json::from_str(&reply.body).ok();

    if !reply.is_success() {
        let message = parsed
            .and_then(|r| r.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| "AI grouping request failed".to_string());
        return Err(ClassifierError::Http {
            status: reply.status,
            message,
        });
    }

    let parsed = match parsed {
        Some(parsed) => parsed,
        None => serde_json::from_str::<ChatCompletionResponse>(&reply.body)?,
    };

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ClassifierError::EmptyResponse)
}

/// Find the first balanced `{...}` in `text`, ignoring braces inside strings
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_document(content: &str) -> Result<Value, ClassifierError> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(content.trim()) {
        return Ok(value);
    }
    let object = extract_json_object(content).ok_or(ClassifierError::NoJsonObject)?;
    Ok(serde_json::from_str(object)?)
}

fn tab_index(value: &Value, len: usize) -> Option<usize> {
    let index = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    usize::try_from(index).ok().filter(|i| *i < len)
}

/// Turn the model's reply into candidate groups over `tabs`
///
/// Out-of-range indices are dropped, an index already claimed by an earlier
/// group is dropped, and groups left with fewer than two tabs are discarded.
pub fn parse_groups(content: &str, tabs: &[Tab], run_id: &str) -> Result<Vec<CandidateGroup>, ClassifierError> {
    let document = parse_document(content)?;
    let raw_groups = document
        .get("groups")
        .and_then(Value::as_array)
        .ok_or(ClassifierError::MalformedGroups)?;

    let mut claimed: HashSet<usize> = HashSet::new();
    let mut groups = Vec::new();

    for (index, raw) in raw_groups.iter().enumerate() {
        let indices: Vec<usize> = raw
            .get("tabIds")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(|id| tab_index(id, tabs.len())).collect())
            .unwrap_or_default();

        let mut members = Vec::new();
        for i in indices {
            if claimed.insert(i) {
                members.push(i);
            }
        }

        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Group {}", index + 1));

        if members.len() < MIN_AI_GROUP_SIZE {
            log::debug!("Dropping AI group \"{}\" with {} usable tabs", name, members.len());
            for i in members {
                claimed.remove(&i);
            }
            continue;
        }

        let color = raw
            .get("color")
            .and_then(Value::as_str)
            .filter(|color| !color.trim().is_empty())
            .map(GroupColor::resolve)
            .unwrap_or_else(|| GroupColor::palette(index));

        groups.push(CandidateGroup {
            id: format!("ai-group-{}-{}", run_id, index),
            name,
            color,
            tabs: members.into_iter().map(|i| tabs[i].clone()).collect(),
        });
    }

    Ok(groups)
}
