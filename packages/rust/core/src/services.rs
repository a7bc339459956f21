//! Contracts of the external collaborators the orchestrator drives.
//!
//! HTTP implementations live in `coursepress-remote`; tests use in-memory fakes.

use async_trait::async_trait;
use serde::Serialize;

use coursepress_shared::{
    ApiKey, GenerationOptions, LibraryId, NodeKind, RemoteObject, Result, TopicWebContext,
    WebReference,
};

/// Result of one preflight check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub ok: bool,
    pub error: Option<String>,
}

impl CheckResult {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Result of a parent/child link call. Linking never errors; it reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl LinkOutcome {
    pub fn linked() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// The remote object store (CMS) plus its relationship linker.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Does the store answer at all?
    async fn validate_connection(&self) -> CheckResult;
    /// Is the REST surface the publisher needs present?
    async fn check_api_surface(&self) -> CheckResult;
    /// Are the configured credentials accepted?
    async fn verify_credentials(&self) -> CheckResult;

    async fn create_root(&self, title: &str, body_html: &str) -> Result<RemoteObject>;

    async fn create_child(
        &self,
        kind: NodeKind,
        title: &str,
        body_html: &str,
        parent_id: &str,
    ) -> Result<RemoteObject>;

    /// Establish parent → child. Never fails; inspect the outcome.
    async fn link_parent_child(&self, parent_id: &str, child_id: &str) -> LinkOutcome;
}

// ---------------------------------------------------------------------------
// Enrichment requests
// ---------------------------------------------------------------------------

/// Title + description of a lesson, as passed to providers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonStub {
    pub title: String,
    pub description: String,
}

/// Everything above a node that generation should be framed by.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpstreamContext {
    pub book_title: String,
    pub research_brief: String,
    pub chapter_title: String,
    pub chapter_description: String,
    pub topic_title: String,
    pub learning_objective: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResearchBriefRequest {
    pub topic: String,
    pub must_haves: String,
    pub other_considerations: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicIntroRequest {
    pub upstream: UpstreamContext,
    pub lessons: Vec<LessonStub>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonContentRequest {
    pub upstream: UpstreamContext,
    pub lesson_title: String,
    pub lesson_description: String,
    pub style: String,
    pub user_context: Option<String>,
    /// Enables retrieval augmentation when present.
    pub library: Option<LibraryId>,
    /// Enables citation grounding when present.
    pub web_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicWebContextRequest {
    pub book_title: String,
    pub chapter_title: String,
    pub topic_title: String,
    pub lessons: Vec<LessonStub>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebReferencesRequest {
    pub book_title: String,
    pub topic_title: String,
}

/// Text generation with the primary provider.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn research_brief(
        &self,
        request: &ResearchBriefRequest,
        options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<String>;

    async fn topic_introduction(
        &self,
        request: &TopicIntroRequest,
        options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<String>;

    /// Returns HTML.
    async fn lesson_content(
        &self,
        request: &LessonContentRequest,
        options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<String>;
}

/// Live web research with a search-capable provider.
#[async_trait]
pub trait WebResearcher: Send + Sync {
    /// One context object covering every lesson of a topic. `None` when the
    /// provider had nothing usable.
    async fn topic_web_context(
        &self,
        request: &TopicWebContextRequest,
        options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<Option<TopicWebContext>>;

    async fn web_references(
        &self,
        request: &WebReferencesRequest,
        options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<Option<Vec<WebReference>>>;
}
