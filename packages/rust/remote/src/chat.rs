//! OpenAI-compatible client for the primary text provider.
//!
//! Plain generation goes through `/chat/completions`. Lessons with a knowledge
//! library go through `/responses`, the endpoint that accepts `file_search`.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use coursepress_core::services::{
    ContentGenerator, LessonContentRequest, ResearchBriefRequest, TopicIntroRequest,
};
use coursepress_shared::{
    ApiKey, GenerationOptions, LibraryId, ProviderConfig, PublishError, ResolvedOptions, Result,
};

use crate::http;
use crate::prompts;

// ---------------------------------------------------------------------------
// Wire types (shared with the search provider)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_recency_filter: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_options: Option<WebSearchOptions>,
}

impl ChatRequest {
    pub fn new(options: &ResolvedOptions, (system, user): (String, String)) -> Self {
        Self {
            model: options.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_output_tokens,
            search_recency_filter: None,
            web_search_options: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// `/responses` request with retrieval over a knowledge library.
#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    instructions: String,
    input: String,
    temperature: f32,
    max_output_tokens: u32,
    tools: Vec<RetrievalTool>,
}

impl ResponsesRequest {
    fn new(options: &ResolvedOptions, (system, user): (String, String), library: &LibraryId) -> Self {
        Self {
            model: options.model.clone(),
            instructions: system,
            input: user,
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
            tools: vec![RetrievalTool::file_search(library)],
        }
    }
}

/// Retrieval tool: search the given vector store while answering.
#[derive(Debug, Serialize)]
struct RetrievalTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub vector_store_ids: Vec<String>,
}

impl RetrievalTool {
    fn file_search(library: &LibraryId) -> Self {
        Self {
            kind: "file_search",
            vector_store_ids: vec![library.as_str().to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ResponsesResponse {
    /// `output_text` when present, else every `output_text` part joined.
    fn text(self) -> String {
        if let Some(text) = self.output_text.filter(|t| !t.trim().is_empty()) {
            return text;
        }
        self.output
            .into_iter()
            .flat_map(|item| item.content)
            .filter(|part| part.kind == "output_text")
            .map(|part| part.text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WebSearchOptions {
    pub search_context_size: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

/// Text of the first choice plus any citations the provider attached.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChatReply {
    pub content: String,
    pub citations: Vec<String>,
}

/// POST a chat request and return the first non-empty choice.
pub(crate) async fn complete(
    client: &Client,
    url: &str,
    key: &ApiKey,
    request: &ChatRequest,
) -> Result<ChatReply> {
    let response = client
        .post(url)
        .header(header::AUTHORIZATION, format!("Bearer {}", key.expose()))
        .json(request)
        .send()
        .await
        .map_err(|e| PublishError::Network(format!("{url}: {e}")))?;

    if !response.status().is_success() {
        return Err(PublishError::Enrichment(format!(
            "{url}: {}",
            http::status_message(response).await
        )));
    }

    let parsed: ChatResponse = response
        .json()
        .await
        .map_err(|e| PublishError::Enrichment(format!("{url}: malformed completion: {e}")))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| PublishError::Enrichment(format!("{url}: completion was empty")))?;

    Ok(ChatReply {
        content,
        citations: parsed.citations,
    })
}

/// POST a retrieval request to `/responses` and return its text.
async fn respond(
    client: &Client,
    url: &str,
    key: &ApiKey,
    request: &ResponsesRequest,
) -> Result<String> {
    let response = client
        .post(url)
        .header(header::AUTHORIZATION, format!("Bearer {}", key.expose()))
        .json(request)
        .send()
        .await
        .map_err(|e| PublishError::Network(format!("{url}: {e}")))?;

    if !response.status().is_success() {
        return Err(PublishError::Enrichment(format!(
            "{url}: {}",
            http::status_message(response).await
        )));
    }

    let parsed: ResponsesResponse = response
        .json()
        .await
        .map_err(|e| PublishError::Enrichment(format!("{url}: malformed response: {e}")))?;

    let text = parsed.text().trim().to_string();
    if text.is_empty() {
        return Err(PublishError::Enrichment(format!("{url}: response was empty")));
    }
    Ok(text)
}

/// Drop a surrounding Markdown code fence (```html ... ```), if any.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

// ---------------------------------------------------------------------------
// ChatProvider
// ---------------------------------------------------------------------------

/// Primary text provider over an OpenAI-compatible API.
pub struct ChatProvider {
    client: Client,
    url: String,
    responses_url: String,
    defaults: ResolvedOptions,
}

impl ChatProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = http::parse_base_url(&config.base_url, "[primary_provider].base_url")?;
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            url: http::join(&base_url, &["chat/completions"]),
            responses_url: http::join(&base_url, &["responses"]),
            defaults: ResolvedOptions::primary_defaults(),
        })
    }

    async fn generate(&self, request: ChatRequest, key: &ApiKey) -> Result<String> {
        let reply = complete(&self.client, &self.url, key, &request).await?;
        debug!(model = %request.model, chars = reply.content.len(), "completion received");
        Ok(strip_code_fence(&reply.content).to_string())
    }
}

#[async_trait]
impl ContentGenerator for ChatProvider {
    #[instrument(skip_all, fields(topic = %request.topic))]
    async fn research_brief(
        &self,
        request: &ResearchBriefRequest,
        options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<String> {
        let chat = ChatRequest::new(
            &options.merge(&self.defaults),
            prompts::research_brief(request),
        );
        self.generate(chat, key).await
    }

    #[instrument(skip_all, fields(topic = %request.upstream.topic_title))]
    async fn topic_introduction(
        &self,
        request: &TopicIntroRequest,
        options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<String> {
        let chat = ChatRequest::new(
            &options.merge(&self.defaults),
            prompts::topic_introduction(request),
        );
        self.generate(chat, key).await
    }

    #[instrument(skip_all, fields(lesson = %request.lesson_title, library = ?request.library))]
    async fn lesson_content(
        &self,
        request: &LessonContentRequest,
        options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<String> {
        let resolved = options.merge(&self.defaults);
        let prompt = prompts::lesson_content(request);
        let Some(library) = &request.library else {
            return self.generate(ChatRequest::new(&resolved, prompt), key).await;
        };

        let retrieval = ResponsesRequest::new(&resolved, prompt, library);
        let text = respond(&self.client, &self.responses_url, key, &retrieval).await?;
        debug!(model = %retrieval.model, chars = text.len(), "retrieval response received");
        Ok(strip_code_fence(&text).to_string())
    }
}
