//! Search-capable provider for shared topic web context and reference lists.
//!
//! Replies are free text that should contain one JSON value; anything that
//! does not parse is treated as "nothing usable" rather than an error.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use coursepress_core::services::{TopicWebContextRequest, WebReferencesRequest, WebResearcher};
use coursepress_shared::{
    ApiKey, GenerationOptions, LessonWebContext, ProviderConfig, ResolvedOptions, Result,
    TopicWebContext, WebReference,
};

use crate::chat::{ChatRequest, WebSearchOptions, complete};
use crate::http;
use crate::prompts;

/// Reference lists are capped at this many entries.
const MAX_REFERENCES: usize = 5;

#[derive(Debug, Deserialize)]
struct WireTopicContext {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    lessons: Vec<WireLessonContext>,
    #[serde(default)]
    sources: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireLessonContext {
    #[serde(rename = "lessonTitle", alias = "lesson_title", alias = "title")]
    lesson_title: String,
    #[serde(default)]
    context: String,
}

#[derive(Debug, Deserialize)]
struct WireReference {
    #[serde(default)]
    title: String,
    url: String,
}

/// Web research provider (Perplexity-style chat completions with search knobs).
pub struct SearchProvider {
    client: Client,
    url: String,
    defaults: ResolvedOptions,
}

impl SearchProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = http::parse_base_url(&config.base_url, "[web_provider].base_url")?;
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            url: http::join(&base_url, &["chat/completions"]),
            defaults: ResolvedOptions::web_defaults(),
        })
    }

    fn request(&self, options: &GenerationOptions, prompt: (String, String)) -> ChatRequest {
        let resolved = options.merge(&self.defaults);
        let mut chat = ChatRequest::new(&resolved, prompt);
        chat.search_recency_filter = Some(resolved.search_recency.as_str());
        chat.web_search_options = Some(WebSearchOptions {
            search_context_size: resolved.search_context_size.as_str(),
        });
        chat
    }
}

#[async_trait]
impl WebResearcher for SearchProvider {
    #[instrument(skip_all, fields(topic = %request.topic_title))]
    async fn topic_web_context(
        &self,
        request: &TopicWebContextRequest,
        options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<Option<TopicWebContext>> {
        let chat = self.request(options, prompts::topic_web_context(request));
        let reply = complete(&self.client, &self.url, key, &chat).await?;

        let Some(wire) = extract_json::<WireTopicContext>(&reply.content, '{', '}') else {
            debug!("web context reply held no parsable JSON object");
            return Ok(None);
        };

        let lessons: Vec<LessonWebContext> = wire
            .lessons
            .into_iter()
            .filter(|l| !l.context.trim().is_empty())
            .map(|l| LessonWebContext {
                lesson_title: l.lesson_title,
                context: l.context.trim().to_string(),
            })
            .collect();
        if lessons.is_empty() && wire.summary.trim().is_empty() {
            return Ok(None);
        }

        let sources = if wire.sources.is_empty() {
            reply.citations
        } else {
            wire.sources
        };
        Ok(Some(TopicWebContext {
            summary: wire.summary.trim().to_string(),
            lessons,
            sources,
        }))
    }

    #[instrument(skip_all, fields(topic = %request.topic_title))]
    async fn web_references(
        &self,
        request: &WebReferencesRequest,
        options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<Option<Vec<WebReference>>> {
        let chat = self.request(options, prompts::web_references(request));
        let reply = complete(&self.client, &self.url, key, &chat).await?;

        let mut references: Vec<WebReference> =
            extract_json::<Vec<WireReference>>(&reply.content, '[', ']')
                .unwrap_or_default()
                .into_iter()
                .filter(|r| Url::parse(&r.url).is_ok())
                .map(|r| WebReference {
                    title: if r.title.trim().is_empty() {
                        r.url.clone()
                    } else {
                        r.title.trim().to_string()
                    },
                    url: r.url,
                })
                .collect();

        if references.is_empty() {
            references = reply
                .citations
                .into_iter()
                .filter(|c| Url::parse(c).is_ok())
                .map(|c| WebReference {
                    title: c.clone(),
                    url: c,
                })
                .collect();
        }
        references.truncate(MAX_REFERENCES);

        Ok(Some(references).filter(|r| !r.is_empty()))
    }
}

/// Parse the outermost `open`..`close` span of `text` as JSON.
fn extract_json<T: DeserializeOwned>(text: &str, open: char, close: char) -> Option<T> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
